//! Every failure of the machine is fatal. `MachineError` carries the diagnostic message, and
//! `ErrorKind` groups the variants into the categories used to choose the process exit status.

use std::io;

use strum_macros::Display as StrumDisplay;
use thiserror::Error;

use crate::word::{Color, HeapRef, Word};

#[derive(StrumDisplay, Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorKind {
  /// The bytecode file could not be read or is not a list of integers, or output failed.
  Load,
  /// The instruction stream is malformed.
  Decode,
  /// The running program did something illegal.
  Program,
  /// A fixed-size resource ran out.
  Memory,
  /// The allocator or collector broke one of its own invariants.
  Consistency,
}

impl ErrorKind {
  pub fn exit_status(&self) -> i32 {
    match self {
      ErrorKind::Load        => 2,
      ErrorKind::Decode      => 3,
      ErrorKind::Program     => 4,
      ErrorKind::Memory      => 5,
      ErrorKind::Consistency => 6,
    }
  }
}

#[derive(Debug, Error)]
pub enum MachineError {
  // Load
  #[error("cannot read program file {0}: {1}")]
  Io(String, #[source] io::Error),
  #[error("line {line}: expected an integer but found `{found}`")]
  NotAnInteger { line: usize, found: String },
  #[error("cannot write output: {0}")]
  Output(#[from] io::Error),

  // Decode
  #[error("Illegal instruction {opcode} at address {address}")]
  IllegalInstruction { opcode: i64, address: usize },
  #[error("instruction at address {address} is missing its operands")]
  TruncatedInstruction { address: usize },
  #[error("program counter {0} is outside the program")]
  ProgramCounterOutOfRange(usize),
  #[error("code address {0} is negative")]
  NegativeCodeAddress(i64),

  // Program
  #[error("Cannot take car of null")]
  CarOfNull,
  #[error("Cannot take cdr of null")]
  CdrOfNull,
  #[error("Cannot set car of null")]
  SetCarOfNull,
  #[error("Cannot set cdr of null")]
  SetCdrOfNull,
  #[error("{operation} expected an integer but found {found}")]
  ExpectedInteger { operation: &'static str, found: Word },
  #[error("{operation} expected a pointer but found {found}")]
  ExpectedPointer { operation: &'static str, found: Word },
  #[error("division by zero")]
  DivisionByZero,
  #[error("stack index {0} is out of bounds")]
  StackIndex(i64),
  #[error("stack underflow")]
  StackUnderflow,

  // Memory
  #[error("Out of memory")]
  OutOfMemory,
  #[error("stack overflow: more than {0} slots")]
  StackOverflow(usize),
  #[error("heap of {0} words is too small")]
  HeapTooSmall(usize),

  // Consistency
  #[error("HEAP ERROR: block at heap[{0}] extends beyond heap")]
  BlockBeyondHeap(usize),
  #[error("HEAP ERROR: expected a block header at heap[{0}] but found {1}")]
  NotAHeader(usize, Word),
  #[error("HEAP ERROR: grey block at heap[{0}] during sweep")]
  GreyAtSweep(usize),
  #[error("HEAP ERROR: freelist item {item} (at heap[{index}]) is outside heap")]
  FreeBlockOutsideHeap { item: usize, index: usize },
  #[error("HEAP ERROR: {color} block at heap[{index}] on freelist")]
  LiveBlockOnFreeList { index: usize, color: Color },
  #[error("HEAP ERROR: freelist is cyclic")]
  CyclicFreeList,
  #[error("HEAP ERROR: pointer {0} does not reference a block")]
  DanglingPointer(HeapRef),
}

impl MachineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      | MachineError::Io(..)
      | MachineError::NotAnInteger { .. }
      | MachineError::Output(_) => ErrorKind::Load,

      | MachineError::IllegalInstruction { .. }
      | MachineError::TruncatedInstruction { .. }
      | MachineError::ProgramCounterOutOfRange(_)
      | MachineError::NegativeCodeAddress(_) => ErrorKind::Decode,

      | MachineError::CarOfNull
      | MachineError::CdrOfNull
      | MachineError::SetCarOfNull
      | MachineError::SetCdrOfNull
      | MachineError::ExpectedInteger { .. }
      | MachineError::ExpectedPointer { .. }
      | MachineError::DivisionByZero
      | MachineError::StackIndex(_)
      | MachineError::StackUnderflow => ErrorKind::Program,

      | MachineError::OutOfMemory
      | MachineError::StackOverflow(_)
      | MachineError::HeapTooSmall(_) => ErrorKind::Memory,

      | MachineError::BlockBeyondHeap(_)
      | MachineError::NotAHeader(..)
      | MachineError::GreyAtSweep(_)
      | MachineError::FreeBlockOutsideHeap { .. }
      | MachineError::LiveBlockOnFreeList { .. }
      | MachineError::CyclicFreeList
      | MachineError::DanglingPointer(_) => ErrorKind::Consistency,
    }
  }

  pub fn exit_status(&self) -> i32 {
    self.kind().exit_status()
  }
}

pub type MachineResult<T> = Result<T, MachineError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn categories_have_distinct_statuses() {
    let errors = vec![
      MachineError::NotAnInteger { line: 1, found: "x".to_string() },
      MachineError::IllegalInstruction { opcode: 99, address: 0 },
      MachineError::CarOfNull,
      MachineError::OutOfMemory,
      MachineError::BlockBeyondHeap(3),
    ];
    let mut statuses: Vec<i32> = errors.iter().map(MachineError::exit_status).collect();
    statuses.dedup();
    assert_eq!(statuses, vec![2, 3, 4, 5, 6]);
  }

  #[test]
  fn illegal_instruction_names_opcode_and_address() {
    let e = MachineError::IllegalInstruction { opcode: 42, address: 7 };
    assert_eq!(e.to_string(), "Illegal instruction 42 at address 7");
    assert_eq!(e.kind(), ErrorKind::Decode);
  }
}
