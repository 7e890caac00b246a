use std::fmt::{Display, Formatter};

use super::opcode::{CodeWord, Opcode};
use crate::error::{MachineError, MachineResult};

/// Holds the decoded components of an instruction. As such, it enumerates the possible operand
/// counts: an opcode is followed by zero to three inline operands in the instruction stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// `[opcode]`
  Nullary(Opcode),
  /// `[opcode][operand]`
  Unary {
    opcode  : Opcode,
    operand : CodeWord,
  },
  /// `[opcode][first][second]`
  Binary {
    opcode : Opcode,
    first  : CodeWord,
    second : CodeWord,
  },
  /// `[opcode][first][second][third]`
  Ternary {
    opcode : Opcode,
    first  : CodeWord,
    second : CodeWord,
    third  : CodeWord,
  },
}

impl Instruction {
  /**
    Decodes the instruction starting at `address`. Returns the instruction together with the
    address just past its last operand.
  */
  pub fn decode(program: &[CodeWord], address: usize) -> MachineResult<(Instruction, usize)> {
    let code = *program
      .get(address)
      .ok_or(MachineError::ProgramCounterOutOfRange(address))?;
    let opcode = Opcode::from_code(code)
      .ok_or(MachineError::IllegalInstruction { opcode: code, address })?;

    let next = address + 1 + opcode.arity();
    let operands = program
      .get(address + 1..next)
      .ok_or(MachineError::TruncatedInstruction { address })?;

    let instruction = match *operands {
      [] => Instruction::Nullary(opcode),
      [operand] => Instruction::Unary { opcode, operand },
      [first, second] => Instruction::Binary { opcode, first, second },
      [first, second, third] => Instruction::Ternary { opcode, first, second, third },
      _ => unreachable!("Error: {} has more than three operands", opcode),
    };

    Ok((instruction, next))
  }

  pub fn opcode(&self) -> Opcode {
    match self {
      | Instruction::Nullary(opcode)
      | Instruction::Unary { opcode, .. }
      | Instruction::Binary { opcode, .. }
      | Instruction::Ternary { opcode, .. } => *opcode,
    }
  }

  /// Encodes the instruction back into the words of the instruction stream.
  pub fn encode(&self) -> Vec<CodeWord> {
    match *self {
      Instruction::Nullary(opcode) => vec![opcode.code()],
      Instruction::Unary { opcode, operand } => vec![opcode.code(), operand],
      Instruction::Binary { opcode, first, second } => vec![opcode.code(), first, second],
      Instruction::Ternary { opcode, first, second, third } => {
        vec![opcode.code(), first, second, third]
      }
    }
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Nullary(opcode) => {
        write!(f, "{}", opcode)
      }

      Instruction::Unary { opcode, operand } => {
        write!(f, "{} {}", opcode, operand)
      }

      Instruction::Binary { opcode, first, second } => {
        write!(f, "{} {} {}", opcode, first, second)
      }

      Instruction::Ternary { opcode, first, second, third } => {
        write!(f, "{} {} {} {}", opcode, first, second, third)
      }

    }
  }
}

/// Flattens a sequence of instructions into an instruction stream.
pub fn assemble(instructions: &[Instruction]) -> Vec<CodeWord> {
  instructions.iter().flat_map(Instruction::encode).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_operands_inline() {
    let program = vec![0, 17, 20, 2, 1, 9, 25];

    let (first, next) = Instruction::decode(&program, 0).unwrap();
    assert_eq!(first, Instruction::Unary { opcode: Opcode::Csti, operand: 17 });
    assert_eq!(next, 2);

    let (second, next) = Instruction::decode(&program, next).unwrap();
    assert_eq!(
      second,
      Instruction::Ternary { opcode: Opcode::Tcall, first: 2, second: 1, third: 9 }
    );
    assert_eq!(second.to_string(), "TCALL 2 1 9");
    assert_eq!(second.opcode(), Opcode::Tcall);
    assert_eq!(next, 6);

    let (third, _) = Instruction::decode(&program, next).unwrap();
    assert_eq!(third, Instruction::Nullary(Opcode::Stop));
  }

  #[test]
  fn decode_errors() {
    assert!(matches!(
      Instruction::decode(&[99], 0),
      Err(MachineError::IllegalInstruction { opcode: 99, address: 0 })
    ));
    assert!(matches!(
      Instruction::decode(&[19, 2], 0),
      Err(MachineError::TruncatedInstruction { address: 0 })
    ));
    assert!(matches!(
      Instruction::decode(&[25], 1),
      Err(MachineError::ProgramCounterOutOfRange(1))
    ));
  }

  #[test]
  fn assemble_inverts_decode() {
    let instructions = vec![
      Instruction::Unary { opcode: Opcode::Csti, operand: -4 },
      Instruction::Binary { opcode: Opcode::Call, first: 1, second: 0 },
      Instruction::Nullary(Opcode::Stop),
    ];
    let program = assemble(&instructions);
    assert_eq!(program, vec![0, -4, 19, 1, 0, 25]);

    let (call, _) = Instruction::decode(&program, 2).unwrap();
    assert_eq!(call, instructions[1]);
  }
}
