use std::path::PathBuf;
use std::process;
use std::time::Instant;

use structopt::clap::AppSettings;
use structopt::StructOpt;

use listmachine::bytecode::load_program;
use listmachine::{Machine, MachineConfig, MachineResult, Word};

/// Run a list-C bytecode program
#[derive(StructOpt, Debug)]
#[structopt(name = "listmachine", setting = AppSettings::AllowNegativeNumbers)]
struct Opt {
  /// Print the stack and next instruction before every step
  #[structopt(long = "trace")]
  trace: bool,

  /// Heap size in words
  #[structopt(long = "heap-size", default_value = "1000")]
  heap_size: usize,

  /// Stack size in slots
  #[structopt(long = "stack-size", default_value = "1000")]
  stack_size: usize,

  /// Report instruction, allocation and collection counts on stderr
  #[structopt(short = "S", long = "statistics")]
  statistics: bool,

  /// Print the registers, stack and heap after the run
  #[structopt(long = "dump-state")]
  dump_state: bool,

  /// File of whitespace-separated integers
  #[structopt(parse(from_os_str))]
  program: PathBuf,

  /// Integer arguments, pushed by `LDARGS`
  args: Vec<i64>,
}

fn run(opt: Opt) -> MachineResult<i32> {
  let program = load_program(&opt.program)?;
  let config = MachineConfig::default()
    .with_heap_size(opt.heap_size)
    .with_stack_size(opt.stack_size)
    .with_trace(opt.trace);

  let mut machine = Machine::new(program, opt.args, config)?;
  let start = Instant::now();
  let result = machine.run();
  let elapsed = start.elapsed();

  if opt.statistics {
    let mut statistics = machine.statistics();
    statistics.set_elapsed(elapsed);
    eprintln!("{}", statistics);
  }
  if opt.dump_state {
    println!("{}", machine);
  }

  match result? {
    Word::Integer(value) => Ok(value as i32),
    _                    => Ok(0),
  }
}

fn main() {
  let opt = Opt::from_args();

  match run(opt) {
    Ok(status) => process::exit(status),
    Err(e)     => {
      eprintln!("error: {}", e);
      process::exit(e.exit_status());
    }
  }
}
