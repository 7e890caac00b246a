/*!

  The instruction stream is a flat array of 64 bit signed integers. An instruction is an opcode
  followed by as many inline operands as the opcode takes, zero to three. Operands are either
  constants (`CSTI`), stack adjustments (`INCSP`, `RET`), argument counts (`CALL`, `TCALL`) or
  absolute code addresses, which index the instruction stream itself.

    CSTI    k              INCSP n        RET k
    GOTO    addr           IFZERO addr    IFNZRO addr
    CALL    argc addr      TCALL argc pop addr

  All other opcodes take no operands. Nothing in the stream marks where one instruction ends and
  the next begins, so the stream can only be decoded from a known instruction boundary, which is
  what the interpreter does as it goes.

*/

mod instruction;
mod loader;
mod opcode;

pub use instruction::{assemble, Instruction};
pub use loader::{load_program, parse_program};
pub use opcode::{CodeWord, Opcode};
