//! The list machine: a unified-stack abstract machine for list-C, a variant of micro-C with cons
//! cells. Arguments, locals, return addresses, saved base pointers and temporaries all live on one
//! operand stack; cons cells live in a mark-sweep collected heap whose root set is that stack.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::io::{self, Stdout, Write};

use crate::bytecode::{CodeWord, Instruction, Opcode};
use crate::config::MachineConfig;
use crate::error::{MachineError, MachineResult};
use crate::heap::Heap;
use crate::statistics::Statistics;
use crate::trace::{self, TABLE_DISPLAY_FORMAT};
use crate::word::{HeapRef, IntegerType, Tag, Word};

/// Base pointer value before the first call, far from any real frame.
const INITIAL_BASE_POINTER: isize = -999;

/// Field offsets within a cons cell
const CAR: usize = 0;
const CDR: usize = 1;

pub struct Machine<W: Write = Stdout> {
  config  : MachineConfig,

  // Memory Stores
  program : Vec<CodeWord>,   // Code memory, read only
  stack   : Vec<Word>,       // The operand stack, a fixed-size memory store
  heap    : Heap,            // Cons cells

  // Registers //
  pc : usize,                // Program counter: next instruction
  bp : isize,                // Base pointer, for local variable access
  sp : isize,                // Stack top pointer, -1 when the stack is empty

  args         : Vec<IntegerType>,  // Pushed by `LDARGS`
  out          : W,                 // `PRINTI`, `PRINTC` and trace output
  instructions : u64,
}

impl Machine<Stdout> {
  pub fn new(
    program : Vec<CodeWord>,
    args    : Vec<IntegerType>,
    config  : MachineConfig
  ) -> MachineResult<Machine<Stdout>> {
    Machine::with_output(program, args, config, io::stdout())
  }
}

impl<W: Write> Machine<W> {

  // region Construction and inspection

  pub fn with_output(
    program : Vec<CodeWord>,
    args    : Vec<IntegerType>,
    config  : MachineConfig,
    out     : W
  ) -> MachineResult<Machine<W>> {
    Ok(Machine {
      config,
      program,
      stack        : vec![Word::default(); config.stack_size],
      heap         : Heap::new(config.heap_size)?,
      pc           : 0,
      bp           : INITIAL_BASE_POINTER,
      sp           : -1,
      args,
      out,
      instructions : 0,
    })
  }

  /// The occupied part of the stack, bottom first. This is the collector's root set.
  pub fn stack(&self) -> &[Word] {
    let live = usize::try_from(self.sp.saturating_add(1)).unwrap_or(0);
    &self.stack[..live.min(self.stack.len())]
  }

  pub fn heap(&self) -> &Heap {
    &self.heap
  }

  pub fn program_counter(&self) -> usize {
    self.pc
  }

  pub fn base_pointer(&self) -> isize {
    self.bp
  }

  pub fn stack_pointer(&self) -> isize {
    self.sp
  }

  pub fn into_output(self) -> W {
    self.out
  }

  pub fn statistics(&self) -> Statistics {
    Statistics {
      instructions : self.instructions,
      allocations  : self.heap.allocations(),
      collections  : self.heap.collections(),
      heap         : self.heap.statistics().ok(),
      ..Statistics::default()
    }
  }

  // endregion

  // region Stack access

  /// Converts a stack index computed by the machine itself into a slot number.
  fn slot(&self, index: isize) -> MachineResult<usize> {
    if index < 0 {
      Err(MachineError::StackUnderflow)
    } else if index as usize >= self.stack.len() {
      Err(MachineError::StackOverflow(self.stack.len()))
    } else {
      Ok(index as usize)
    }
  }

  /// Converts a stack index supplied by the program (`LDI`, `STI`) into a slot number.
  fn program_slot(&self, index: IntegerType) -> MachineResult<usize> {
    match usize::try_from(index) {
      Ok(slot) if slot < self.stack.len() => Ok(slot),
      _ => Err(MachineError::StackIndex(index)),
    }
  }

  /// The stack pointer after moving it by `by` slots. It may come to rest at -1 (empty) but no
  /// lower, and never past the last slot.
  fn moved_stack_pointer(&self, by: IntegerType) -> MachineResult<isize> {
    let target = isize::try_from(by).ok().and_then(|by| self.sp.checked_add(by));
    match target {
      Some(target) if target < -1 => Err(MachineError::StackUnderflow),
      Some(target) if target >= 0 && target as usize >= self.stack.len() => {
        Err(MachineError::StackOverflow(self.stack.len()))
      }
      Some(target) => Ok(target),
      None if by < 0 => Err(MachineError::StackUnderflow),
      None => Err(MachineError::StackOverflow(self.stack.len())),
    }
  }

  /// Checks that `argc` arguments are on the stack.
  fn argument_count(&self, argc: IntegerType) -> MachineResult<isize> {
    match isize::try_from(argc) {
      Ok(argc) if argc >= 0 && argc <= self.sp + 1 => Ok(argc),
      _ => Err(MachineError::StackUnderflow),
    }
  }

  fn get(&self, index: isize) -> MachineResult<Word> {
    Ok(self.stack[self.slot(index)?])
  }

  fn set(&mut self, index: isize, word: Word) -> MachineResult<()> {
    let slot = self.slot(index)?;
    self.stack[slot] = word;
    Ok(())
  }

  fn top(&self) -> MachineResult<Word> {
    self.get(self.sp)
  }

  fn push(&mut self, word: Word) -> MachineResult<()> {
    self.set(self.sp + 1, word)?;
    self.sp += 1;
    Ok(())
  }

  fn pop(&mut self) -> MachineResult<Word> {
    let word = self.top()?;
    self.sp -= 1;
    Ok(word)
  }

  fn pop_integer(&mut self, operation: &'static str) -> MachineResult<IntegerType> {
    expect_integer(self.pop()?, operation)
  }

  /// Pops a cell pointer, failing with `null_error` if it is `HULL`.
  fn pop_cell(&mut self, operation: &'static str, null_error: MachineError) -> MachineResult<HeapRef> {
    let cell = expect_pointer(self.pop()?, operation)?;
    match cell.is_null() {
      true  => Err(null_error),
      false => Ok(cell),
    }
  }

  // endregion

  // region Execution

  /**
    Runs the program from the current program counter until `STOP`, returning the word on top of
    the stack at that point (integer 0 if the stack is empty). Any error ends the run; the machine
    is not meant to be resumed afterwards.
  */
  pub fn run(&mut self) -> MachineResult<Word> {
    let result = self.run_to_stop();
    self.out.flush()?;
    result
  }

  fn run_to_stop(&mut self) -> MachineResult<Word> {
    loop {
      if let Some(result) = self.step()? {
        return Ok(result);
      }
    }
  }

  /// Fetches, decodes and executes one instruction. Returns the result once `STOP` executes.
  pub fn step(&mut self) -> MachineResult<Option<Word>> {
    if self.config.trace {
      let line = trace::trace_line(self.stack(), &self.program, self.pc);
      writeln!(self.out, "{}", line)?;
    }

    let (instruction, next) = Instruction::decode(&self.program, self.pc)?;
    self.pc = next;
    self.instructions += 1;

    self.execute(instruction, next)
  }

  fn execute(&mut self, instruction: Instruction, next: usize) -> MachineResult<Option<Word>> {
    match instruction {

      Instruction::Unary { opcode: Opcode::Csti, operand } => {
        self.push(Word::Integer(operand))?;
      }

      Instruction::Nullary(opcode @ Opcode::Add)
      | Instruction::Nullary(opcode @ Opcode::Sub)
      | Instruction::Nullary(opcode @ Opcode::Mul)
      | Instruction::Nullary(opcode @ Opcode::Div)
      | Instruction::Nullary(opcode @ Opcode::Mod)
      | Instruction::Nullary(opcode @ Opcode::Lt) => {
        let right = self.pop_integer(operation_name(opcode))?;
        let left  = self.pop_integer(operation_name(opcode))?;
        self.push(Word::Integer(arithmetic(opcode, left, right)?))?;
      }

      Instruction::Nullary(Opcode::Eq) => {
        let right = self.pop()?;
        let left  = self.pop()?;
        self.push(Word::Integer((left == right) as IntegerType))?;
      }

      Instruction::Nullary(Opcode::Not) => {
        let value = self.pop()?;
        self.push(Word::Integer(value.is_zero() as IntegerType))?;
      }

      Instruction::Nullary(Opcode::Dup) => {
        let value = self.top()?;
        self.push(value)?;
      }

      Instruction::Nullary(Opcode::Swap) => {
        let top   = self.get(self.sp)?;
        let below = self.get(self.sp - 1)?;
        self.set(self.sp, below)?;
        self.set(self.sp - 1, top)?;
      }

      // Load indirect
      Instruction::Nullary(Opcode::Ldi) => {
        let index = self.pop_integer("LDI")?;
        let value = self.stack[self.program_slot(index)?];
        self.push(value)?;
      }

      // Store indirect, keep value on top
      Instruction::Nullary(Opcode::Sti) => {
        let value = self.pop()?;
        let index = self.pop_integer("STI")?;
        let slot  = self.program_slot(index)?;
        self.stack[slot] = value;
        self.push(value)?;
      }

      Instruction::Nullary(Opcode::Getbp) => {
        self.push(Word::Integer(self.bp as IntegerType))?;
      }

      Instruction::Nullary(Opcode::Getsp) => {
        self.push(Word::Integer(self.sp as IntegerType))?;
      }

      Instruction::Unary { opcode: Opcode::Incsp, operand } => {
        let target = self.moved_stack_pointer(operand)?;
        // Reserved slots start out as integers, so the collector never sees stale pointers.
        for index in self.sp + 1..=target {
          self.set(index, Word::default())?;
        }
        self.sp = target;
      }

      Instruction::Unary { opcode: Opcode::Goto, operand } => {
        self.pc = code_address(operand)?;
      }

      Instruction::Unary { opcode: Opcode::Ifzero, operand } => {
        if self.pop()?.is_zero() {
          self.pc = code_address(operand)?;
        }
      }

      Instruction::Unary { opcode: Opcode::Ifnzro, operand } => {
        if !self.pop()?.is_zero() {
          self.pc = code_address(operand)?;
        }
      }

      Instruction::Binary { opcode: Opcode::Call, first: argc, second: address } => {
        let argc   = self.argument_count(argc)?;
        // The frame grows by two slots.
        let target = self.moved_stack_pointer(2)?;
        let pc     = code_address(address)?;
        // Make room for the return address and old base pointer below the arguments.
        for i in 0..argc {
          let argument = self.get(self.sp - i)?;
          self.set(self.sp - i + 2, argument)?;
        }
        self.set(self.sp - argc + 1, Word::Integer(next as IntegerType))?;
        self.set(self.sp - argc + 2, Word::Integer(self.bp as IntegerType))?;
        self.sp = target;
        self.bp = self.sp + 1 - argc;
        self.pc = pc;
      }

      Instruction::Ternary { opcode: Opcode::Tcall, first: argc, second: pop, third: address } => {
        let argc   = self.argument_count(argc)?;
        let target = self.moved_stack_pointer(pop.checked_neg().unwrap_or(IntegerType::MAX))?;
        let pc     = code_address(address)?;
        if target + 1 < argc {
          return Err(MachineError::StackUnderflow);
        }
        // Slide the new arguments down over the discarded part of the frame.
        for i in (0..argc).rev() {
          let argument = self.get(self.sp - i)?;
          self.set(target - i, argument)?;
        }
        self.sp = target;
        self.pc = pc;
      }

      Instruction::Unary { opcode: Opcode::Ret, operand: locals } => {
        let result  = self.top()?;
        let frame   = self.moved_stack_pointer(locals.checked_neg().unwrap_or(IntegerType::MAX))?;
        let bp_slot = frame - 1;
        let bp      = expect_integer(self.get(bp_slot)?, "RET")?;
        let pc      = code_address(expect_integer(self.get(bp_slot - 1)?, "RET")?)?;
        self.bp = bp as isize;
        self.pc = pc;
        self.sp = bp_slot - 1;
        self.set(self.sp, result)?;
      }

      Instruction::Nullary(Opcode::Printi) => {
        let value = self.top()?;
        write!(self.out, "{} ", value)?;
      }

      // Integers print as the character with that code, pointers as `#addr`.
      Instruction::Nullary(Opcode::Printc) => {
        match self.top()? {
          Word::Integer(code) => {
            let character =
              u32::try_from(code)
                .ok()
                .and_then(std::char::from_u32)
                .unwrap_or(std::char::REPLACEMENT_CHARACTER);
            write!(self.out, "{}", character)?;
          }
          value => write!(self.out, "{}", value)?,
        }
      }

      // Push commandline arguments
      Instruction::Nullary(Opcode::Ldargs) => {
        for i in 0..self.args.len() {
          self.push(Word::Integer(self.args[i]))?;
        }
      }

      Instruction::Nullary(Opcode::Stop) => {
        return match self.sp < 0 {
          true  => Ok(Some(Word::Integer(0))),
          false => Ok(Some(self.top()?)),
        };
      }

      Instruction::Nullary(Opcode::Nil) => {
        self.push(Word::null())?;
      }

      Instruction::Nullary(Opcode::Cons) => {
        // Both operands stay on the stack, and so stay reachable, while allocating.
        let car = self.get(self.sp - 1)?;
        let cdr = self.get(self.sp)?;
        let live = (self.sp + 1) as usize;
        let cell = self.heap.allocate(Tag::Cons, 2, &self.stack[..live])?;
        self.heap.set_field(cell, CAR, car)?;
        self.heap.set_field(cell, CDR, cdr)?;
        self.sp -= 1;
        self.set(self.sp, Word::Pointer(cell))?;
      }

      Instruction::Nullary(Opcode::Car) => {
        let cell = self.pop_cell("CAR", MachineError::CarOfNull)?;
        let value = self.heap.field(cell, CAR)?;
        self.push(value)?;
      }

      Instruction::Nullary(Opcode::Cdr) => {
        let cell = self.pop_cell("CDR", MachineError::CdrOfNull)?;
        let value = self.heap.field(cell, CDR)?;
        self.push(value)?;
      }

      // The cell stays on the stack.
      Instruction::Nullary(Opcode::Setcar) => {
        let value = self.pop()?;
        let cell  = self.pop_cell("SETCAR", MachineError::SetCarOfNull)?;
        self.heap.set_field(cell, CAR, value)?;
        self.push(Word::Pointer(cell))?;
      }

      Instruction::Nullary(Opcode::Setcdr) => {
        let value = self.pop()?;
        let cell  = self.pop_cell("SETCDR", MachineError::SetCdrOfNull)?;
        self.heap.set_field(cell, CDR, value)?;
        self.push(Word::Pointer(cell))?;
      }

      _ => {
        unreachable!(
          "Error: {} was decoded with the wrong number of operands",
          instruction.opcode()
        );
      }

    } // end match on instruction

    Ok(None)
  }

  // endregion

}

fn operation_name(opcode: Opcode) -> &'static str {
  match opcode {
    Opcode::Add => "ADD",
    Opcode::Sub => "SUB",
    Opcode::Mul => "MUL",
    Opcode::Div => "DIV",
    Opcode::Mod => "MOD",
    Opcode::Lt  => "LT",
    _           => "arithmetic",
  }
}

/// Signed 64 bit arithmetic, wrapping on overflow.
fn arithmetic(opcode: Opcode, left: IntegerType, right: IntegerType) -> MachineResult<IntegerType> {
  let value = match opcode {
    Opcode::Add => left.wrapping_add(right),
    Opcode::Sub => left.wrapping_sub(right),
    Opcode::Mul => left.wrapping_mul(right),
    Opcode::Div if right == 0 => return Err(MachineError::DivisionByZero),
    Opcode::Div => left.wrapping_div(right),
    Opcode::Mod if right == 0 => return Err(MachineError::DivisionByZero),
    Opcode::Mod => left.wrapping_rem(right),
    Opcode::Lt  => (left < right) as IntegerType,
    _ => unreachable!("Error: {} is not an arithmetic operation", opcode),
  };
  Ok(value)
}

fn expect_integer(word: Word, operation: &'static str) -> MachineResult<IntegerType> {
  match word {
    Word::Integer(value) => Ok(value),
    found => Err(MachineError::ExpectedInteger { operation, found }),
  }
}

fn expect_pointer(word: Word, operation: &'static str) -> MachineResult<HeapRef> {
  match word {
    Word::Pointer(cell) => Ok(cell),
    found => Err(MachineError::ExpectedPointer { operation, found }),
  }
}

fn code_address(address: CodeWord) -> MachineResult<usize> {
  usize::try_from(address).map_err(|_| MachineError::NegativeCodeAddress(address))
}

impl<W: Write> Display for Machine<W> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let top = match self.sp < 0 {
      true  => None,
      false => Some(self.sp as usize),
    };
    let s_table = trace::make_register_table("S", self.stack(), top);
    let h_table = self.heap.make_block_table();

    let mut combined_table = table!([s_table, h_table]);

    combined_table.set_titles(row![ub->"Stack", ub->"Heap"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(
      f,
      "PC: {}\tBP: {}\tSP: {}\n{}",
      self.pc, self.bp, self.sp, combined_table
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{assemble, parse_program};
  use crate::bytecode::Instruction::{Binary, Nullary, Unary};
  use crate::bytecode::Opcode::*;
  use crate::word::HULL;

  fn machine(program: Vec<CodeWord>, args: Vec<IntegerType>) -> Machine<Vec<u8>> {
    Machine::with_output(program, args, MachineConfig::default(), Vec::new()).unwrap()
  }

  fn run(program: Vec<CodeWord>) -> MachineResult<Word> {
    machine(program, vec![]).run()
  }

  fn csti(k: CodeWord) -> Instruction {
    Unary { opcode: Csti, operand: k }
  }

  #[test]
  fn adds_constants() {
    assert_eq!(run(vec![0, 17, 0, 22, 1, 25]).unwrap(), Word::Integer(39));
  }

  #[test]
  fn binary_operations_take_second_from_top_first() {
    let cases = vec![(Sub, 7 - 3), (Mul, 21), (Div, 2), (Mod, 1), (Lt, 0), (Eq, 0)];
    for (opcode, expected) in cases {
      let program = assemble(&[csti(7), csti(3), Nullary(opcode), Nullary(Stop)]);
      assert_eq!(run(program).unwrap(), Word::Integer(expected), "{}", opcode);
    }
  }

  #[test]
  fn not_and_pointers_compare_by_identity() {
    let program = assemble(&[csti(0), Nullary(Not), Nullary(Stop)]);
    assert_eq!(run(program).unwrap(), Word::Integer(1));

    let program = assemble(&[Nullary(Nil), Nullary(Not), Nullary(Stop)]);
    assert_eq!(run(program).unwrap(), Word::Integer(1));

    let program = assemble(&[Nullary(Nil), Nullary(Nil), Nullary(Eq), Nullary(Stop)]);
    assert_eq!(run(program).unwrap(), Word::Integer(1));
  }

  #[test]
  fn division_by_zero_is_fatal() {
    let program = assemble(&[csti(1), csti(0), Nullary(Div), Nullary(Stop)]);
    assert!(matches!(run(program), Err(MachineError::DivisionByZero)));
  }

  #[test]
  fn arithmetic_on_pointers_is_rejected() {
    let program = assemble(&[Nullary(Nil), csti(1), Nullary(Add), Nullary(Stop)]);
    assert!(matches!(
      run(program),
      Err(MachineError::ExpectedInteger { operation: "ADD", .. })
    ));
  }

  #[test]
  fn dup_swap_and_indirect_access() {
    // [5 9] SWAP -> [9 5]; GETSP -> [9 5 1]; LDI -> [9 5 5]; ADD -> [9 10]; SUB -> [-1];
    // DUP, ADD -> [-2]
    let program = assemble(&[
      csti(5), csti(9), Nullary(Swap), Nullary(Getsp), Nullary(Ldi),
      Nullary(Add), Nullary(Sub), Nullary(Dup), Nullary(Add), Nullary(Stop),
    ]);
    assert_eq!(run(program).unwrap(), Word::Integer(-2));
  }

  #[test]
  fn sti_stores_and_keeps_value() {
    // Overwrite slot 0 with 42, then drop the copy and read slot 0.
    let program = assemble(&[
      csti(1), csti(0), csti(42), Nullary(Sti),
      Unary { opcode: Incsp, operand: -1 }, Nullary(Stop),
    ]);
    let mut m = machine(program, vec![]);
    assert_eq!(m.run().unwrap(), Word::Integer(42));
    assert_eq!(m.stack_pointer(), 0);
  }

  #[test]
  fn incsp_reserves_cleared_slots() {
    let program = assemble(&[
      csti(8), Unary { opcode: Incsp, operand: -1 },
      Unary { opcode: Incsp, operand: 3 }, Nullary(Stop),
    ]);
    let mut m = machine(program, vec![]);
    assert_eq!(m.run().unwrap(), Word::Integer(0));
    assert_eq!(m.stack(), &[Word::Integer(0); 3][..]);
  }

  #[test]
  fn conditional_jumps() {
    // 0: CSTI 0  2: IFZERO 7  4: CSTI 1  6: STOP  7: CSTI 2  9: STOP
    let program = vec![0, 0, 17, 7, 0, 1, 25, 0, 2, 25];
    assert_eq!(run(program).unwrap(), Word::Integer(2));

    // 0: CSTI 3  2: IFNZRO 7  4: CSTI 1  6: STOP  7: CSTI 2  9: STOP
    let program = vec![0, 3, 18, 7, 0, 1, 25, 0, 2, 25];
    assert_eq!(run(program).unwrap(), Word::Integer(2));

    // 0: NIL  1: IFNZRO 6  3: CSTI 1  5: STOP  6: CSTI 2  8: STOP
    let program = vec![26, 18, 6, 0, 1, 25, 0, 2, 25];
    assert_eq!(run(program).unwrap(), Word::Integer(1));
  }

  #[test]
  fn call_and_ret_restore_frame() {
    //  0: CSTI 100        caller's value
    //  2: CSTI 30
    //  4: CSTI 12
    //  6: CALL 2 10
    //  9: STOP
    // 10: GETBP; LDI      first argument
    // 12: GETBP; CSTI 1; ADD; LDI   second argument
    // 17: SUB
    // 18: RET 2
    let program = vec![
      0, 100, 0, 30, 0, 12, 19, 2, 10, 25,
      13, 11, 13, 0, 1, 1, 11, 2, 21, 2,
    ];
    let mut m = machine(program, vec![]);

    for _ in 0..4 {
      m.step().unwrap();
    }
    // Inside the callee: [100 | ret bp | 30 12]
    assert_eq!(m.program_counter(), 10);
    assert_eq!(m.base_pointer(), 3);
    assert_eq!(m.stack()[1], Word::Integer(9));
    assert_eq!(m.stack()[2], Word::Integer(INITIAL_BASE_POINTER as IntegerType));

    assert_eq!(m.run().unwrap(), Word::Integer(18));
    // The caller had one value before pushing arguments; one result is added.
    assert_eq!(m.stack(), &[Word::Integer(100), Word::Integer(18)][..]);
    assert_eq!(m.base_pointer(), INITIAL_BASE_POINTER);
    assert_eq!(m.program_counter(), 10);
  }

  #[test]
  fn tail_call_reuses_frame() {
    // Counts down from the argument in a tail-recursive loop.
    //  0: LDARGS
    //  1: CALL 1 5
    //  4: STOP
    //  5: GETBP; LDI          n
    //  7: IFZERO 20
    //  9: GETBP; LDI; CSTI 1; SUB    n - 1
    // 15: TCALL 1 1 5
    // 19: (unused)
    // 20: GETBP; LDI; RET 1
    let program = vec![
      24, 19, 1, 5, 25,
      13, 11, 17, 20,
      13, 11, 0, 1, 2,
      20, 1, 1, 5, 25, 25,
      13, 11, 21, 1,
    ];
    let mut m = machine(program, vec![1000]);
    assert_eq!(m.run().unwrap(), Word::Integer(0));
    assert_eq!(m.stack().len(), 1);
  }

  #[test]
  fn ldargs_pushes_in_order() {
    let program = assemble(&[Nullary(Ldargs), Nullary(Sub), Nullary(Stop)]);
    let mut m = machine(program, vec![10, 4]);
    assert_eq!(m.run().unwrap(), Word::Integer(6));
  }

  #[test]
  fn prints_without_popping() {
    let program = assemble(&[
      csti(7), Nullary(Printi), csti(65), Nullary(Printc), Nullary(Nil), Nullary(Printi),
      Nullary(Stop),
    ]);
    let mut m = machine(program, vec![]);
    m.run().unwrap();
    assert_eq!(m.stack().len(), 3);
    assert_eq!(String::from_utf8(m.into_output()).unwrap(), "7 A#0 ");
  }

  #[test]
  fn printc_prints_pointers_like_printi() {
    let program = assemble(&[Nullary(Nil), Nullary(Printc), Nullary(Stop)]);
    let mut m = machine(program, vec![]);
    assert_eq!(m.run().unwrap(), Word::null());
    assert_eq!(String::from_utf8(m.into_output()).unwrap(), "#0");
  }

  #[test]
  fn tail_call_cannot_drop_below_empty_stack() {
    // TCALL 0 5 4 on an empty stack
    let program = parse_program("20 0 5 4 25").unwrap();
    let config = MachineConfig::default().with_trace(true);
    let mut m = Machine::with_output(program, vec![], config, Vec::new()).unwrap();
    assert!(matches!(m.run(), Err(MachineError::StackUnderflow)));
    assert_eq!(m.stack_pointer(), -1);
    assert!(m.stack().is_empty());
    assert!(m.to_string().starts_with("PC: 4\tBP: -999\tSP: -1"));
  }

  #[test]
  fn failed_return_leaves_stack_pointer_in_range() {
    // CSTI 1; RET 5
    let mut m = machine(parse_program("0 1 21 5").unwrap(), vec![]);
    assert!(matches!(m.run(), Err(MachineError::StackUnderflow)));
    assert_eq!(m.stack_pointer(), 0);
    assert_eq!(m.stack(), &[Word::Integer(1)][..]);
    assert!(m.to_string().contains("SP: 0"));
  }

  #[test]
  fn extreme_stack_adjustments_are_bounds_errors() {
    let program = assemble(&[Unary { opcode: Incsp, operand: i64::MAX }, Nullary(Stop)]);
    let mut m = machine(program, vec![]);
    assert!(matches!(m.run(), Err(MachineError::StackOverflow(_))));
    assert_eq!(m.stack_pointer(), -1);

    let program = assemble(&[Unary { opcode: Incsp, operand: i64::MIN }, Nullary(Stop)]);
    assert!(matches!(run(program), Err(MachineError::StackUnderflow)));

    let program = assemble(&[csti(1), Unary { opcode: Ret, operand: i64::MIN }]);
    assert!(matches!(run(program), Err(MachineError::StackOverflow(_))));

    let call = Binary { opcode: Call, first: 3, second: 0 };
    let program = assemble(&[csti(1), call]);
    assert!(matches!(run(program), Err(MachineError::StackUnderflow)));
  }

  #[test]
  fn setcar_leaves_the_cell_on_the_stack() {
    // (1 . nil), set its car to 7, then read the car back through the same pointer.
    let program = assemble(&[
      csti(1), Nullary(Nil), Nullary(Opcode::Cons), csti(7), Nullary(Setcar), Nullary(Stop),
    ]);
    let mut m = machine(program, vec![]);
    let cell = match m.run().unwrap() {
      Word::Pointer(cell) => cell,
      other => panic!("expected the cell, found {}", other),
    };
    assert_eq!(m.stack().len(), 1);
    assert_eq!(m.heap().field(cell, CAR).unwrap(), Word::Integer(7));
    assert_eq!(m.heap().field(cell, CDR).unwrap(), Word::null());
  }

  #[test]
  fn cons_car_cdr() {
    let build = vec![Nullary(Nil), csti(5), Nullary(Swap), Nullary(Opcode::Cons)];

    let mut program = build.clone();
    program.extend(vec![Nullary(Car), Nullary(Stop)]);
    assert_eq!(run(assemble(&program)).unwrap(), Word::Integer(5));

    let mut program = build;
    program.extend(vec![Nullary(Cdr), Nullary(Stop)]);
    assert_eq!(run(assemble(&program)).unwrap(), Word::Pointer(HULL));
  }

  #[test]
  fn car_of_null_is_fatal() {
    let program = assemble(&[Nullary(Nil), Nullary(Car), Nullary(Stop)]);
    let error = run(program).unwrap_err();
    assert!(matches!(error, MachineError::CarOfNull));
    assert_eq!(error.to_string(), "Cannot take car of null");

    let program = assemble(&[Nullary(Nil), Nullary(Cdr), Nullary(Stop)]);
    assert!(matches!(run(program), Err(MachineError::CdrOfNull)));

    let program = assemble(&[Nullary(Nil), csti(1), Nullary(Setcar), Nullary(Stop)]);
    assert!(matches!(run(program), Err(MachineError::SetCarOfNull)));
  }

  #[test]
  fn setcdr_makes_a_cycle() {
    // (1 . nil), then set its cdr to itself, then follow cdr twice and take car.
    let program = assemble(&[
      csti(1), Nullary(Nil), Nullary(Opcode::Cons),
      Nullary(Dup), Nullary(Setcdr),
      Nullary(Cdr), Nullary(Cdr), Nullary(Car), Nullary(Stop),
    ]);
    assert_eq!(run(program).unwrap(), Word::Integer(1));
  }

  #[test]
  fn unknown_opcode_is_reported_with_address() {
    let error = run(vec![0, 1, 99, 25]).unwrap_err();
    assert!(matches!(error, MachineError::IllegalInstruction { opcode: 99, address: 2 }));
  }

  #[test]
  fn trace_prints_stack_and_instruction() {
    let program = vec![0, 17, 0, 22, 1, 25];
    let config = MachineConfig::default().with_trace(true);
    let mut m = Machine::with_output(program, vec![], config, Vec::new()).unwrap();
    m.run().unwrap();
    let output = String::from_utf8(m.into_output()).unwrap();
    assert_eq!(
      output,
      "[ ] {0:CSTI 17}\n[ 17 ] {2:CSTI 22}\n[ 17 22 ] {4:ADD}\n[ 39 ] {5:STOP}\n"
    );
  }

  #[test]
  fn garbage_lists_are_collected_while_running() {
    // Builds and drops a 3-cell list a thousand times in a 20-word heap.
    //  0: CSTI 1000           loop counter
    //  2: DUP; IFZERO 25
    //  5: NIL; CSTI 1; SWAP; CONS; CSTI 2; SWAP; CONS; CSTI 3; SWAP; CONS
    // 18: INCSP -1
    // 20: CSTI 1; SUB; GOTO 2
    // 25: STOP
    let body = parse_program("
      0 1000
      9 17 25
      26 0 1 10 27 0 2 10 27 0 3 10 27
      15 -1
      0 1 2
      16 2
      25
    ").unwrap();
    let config = MachineConfig::default().with_heap_size(20);
    let mut m = Machine::with_output(body, vec![], config, Vec::new()).unwrap();
    assert_eq!(m.run().unwrap(), Word::Integer(0));
    assert!(m.heap().collections() > 0);
    assert_eq!(m.heap().allocations(), 3000);
    m.heap().check().unwrap();
  }

  #[test]
  fn live_data_beyond_heap_is_out_of_memory() {
    // Room for three cells; the program keeps four reachable.
    let program = assemble(&[
      Nullary(Nil), csti(1), Nullary(Opcode::Cons),
      csti(2), Nullary(Opcode::Cons),
      csti(3), Nullary(Opcode::Cons),
      csti(4), Nullary(Opcode::Cons),
      Nullary(Stop),
    ]);
    let config = MachineConfig::default().with_heap_size(9);
    let mut m = Machine::with_output(program, vec![], config, Vec::new()).unwrap();
    let error = m.run().unwrap_err();
    assert!(matches!(error, MachineError::OutOfMemory));
    m.heap().check().unwrap();
  }

  #[test]
  fn binary_call_instruction_is_decoded() {
    let call = Binary { opcode: Call, first: 0, second: 4 };
    let program = assemble(&[call, Nullary(Stop), csti(4), Unary { opcode: Ret, operand: 0 }]);
    // CALL 0 4 -> callee pushes 4 and returns to STOP.
    assert_eq!(run(program).unwrap(), Word::Integer(4));
  }

  #[test]
  fn state_renders_stack_and_heap() {
    let program = assemble(&[Nullary(Nil), csti(5), Nullary(Opcode::Cons), Nullary(Stop)]);
    let mut m = machine(program, vec![]);
    m.run().unwrap();
    let rendered = m.to_string();
    assert!(rendered.starts_with("PC: 5\tBP: -999\tSP: 0"));
    assert!(rendered.contains("* --> S[0] ="));
    assert!(rendered.contains("#0, 5"));
  }
}
