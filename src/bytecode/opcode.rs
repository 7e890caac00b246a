use std::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display as StrumDisplay;

/// Integers in the instruction stream: opcodes, constants and code addresses alike.
pub type CodeWord = i64;

/**
  Opcodes of the list machine.

  The numeric values are fixed by the compiler that produces the bytecode, so the order the
  opcodes are listed below is significant and must not change.
*/
#[derive(
  StrumDisplay, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,             Eq,            PartialEq, Debug, Hash
)]
#[strum(serialize_all = "shouty_snake_case")]
#[repr(u8)]
pub enum Opcode {
  // Constants and arithmetic
  Csti = 0, // csti( k )
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Eq,
  Lt,
  Not,

  // Stack manipulation
  Dup,
  Swap,
  Ldi,
  Sti,
  Getbp,
  Getsp,
  Incsp,     // incsp( n )

  // Control
  Goto,      // goto( addr )
  Ifzero,    // ifzero( addr )
  Ifnzro,    // ifnzro( addr )
  Call,      // call( argc, addr )
  Tcall,     // tcall( argc, pop, addr )
  Ret,       // ret( k )

  // Input and output
  Printi,
  Printc,
  Ldargs,
  Stop,      // Opcode 25

  // Lists
  Nil,
  Cons,
  Car,
  Cdr,
  Setcar,
  Setcdr,    // Opcode 31
}

impl Opcode {
  pub fn code(&self) -> CodeWord {
    Into::<u8>::into(*self) as CodeWord
  }

  /// Converts a word of the instruction stream to an opcode, if it is one.
  pub fn from_code(code: CodeWord) -> Option<Opcode> {
    u8::try_from(code)
      .ok()
      .and_then(|byte| Opcode::try_from(byte).ok())
  }

  /// The number of inline operands following the opcode in the instruction stream.
  pub fn arity(&self) -> usize {
    match self {
      | Opcode::Csti
      | Opcode::Incsp
      | Opcode::Goto
      | Opcode::Ifzero
      | Opcode::Ifnzro
      | Opcode::Ret   => 1,
      Opcode::Call    => 2,
      Opcode::Tcall   => 3,
      _               => 0,
    }
  }
}
