//! Sizes of the machine's fixed resources. Nothing is resized once the machine has started.

/// Heap size in words
pub const HEAP_SIZE: usize = 1000;
/// Stack size in slots
pub const STACK_SIZE: usize = 1000;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MachineConfig {
  pub heap_size  : usize,
  pub stack_size : usize,
  /// Print the stack and the next instruction before every instruction.
  pub trace      : bool,
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      heap_size  : HEAP_SIZE,
      stack_size : STACK_SIZE,
      trace      : false,
    }
  }
}

impl MachineConfig {
  pub fn with_heap_size(self, heap_size: usize) -> Self {
    MachineConfig { heap_size, ..self }
  }

  pub fn with_stack_size(self, stack_size: usize) -> Self {
    MachineConfig { stack_size, ..self }
  }

  pub fn with_trace(self, trace: bool) -> Self {
    MachineConfig { trace, ..self }
  }
}
