//! Figures reported after a run with `--statistics`.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::heap::HeapStatistics;

#[derive(Default, Debug)]
pub struct Statistics {
  pub instructions : u64,
  pub allocations  : u64,
  pub collections  : u64,
  /// `None` if the heap could not be walked
  pub heap         : Option<HeapStatistics>,
  pub elapsed      : Duration,
}

impl Statistics {
  pub fn set_elapsed(&mut self, elapsed: Duration) {
    self.elapsed = elapsed;
  }
}

impl Display for Statistics {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "Instructions : {:10}", self.instructions)?;
    writeln!(f, "Allocations  : {:10}", self.allocations)?;
    writeln!(f, "Collections  : {:10}", self.collections)?;
    if let Some(heap) = &self.heap {
      writeln!(f, "{}", heap)?;
    }
    write!(f, "Used {:7.3} seconds", self.elapsed.as_secs_f64())
  }
}
