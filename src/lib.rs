/*!
  The list machine: a stack bytecode interpreter for list-C programs, with a heap of cons cells
  managed by a first-fit free-list allocator and a mark-sweep collector.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;
extern crate strum;

pub mod bytecode;
pub mod collector;
pub mod config;
pub mod error;
pub mod heap;
pub mod machine;
pub mod statistics;
pub mod trace;
pub mod word;

pub use crate::config::MachineConfig;
pub use crate::error::{ErrorKind, MachineError, MachineResult};
pub use crate::machine::Machine;
pub use crate::word::{HeapRef, Word, HULL};
