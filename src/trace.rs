//! Rendering of the machine state. For `--trace`, one line per step: the live stack, with heap
//! references marked by `#`, followed by the address and text of the instruction about to execute.
//! The tables behind `--dump-state` share `TABLE_DISPLAY_FORMAT`.
//!
//! ```text
//! [ 17 22 ] {4:ADD}
//! [ 39 ] {5:STOP}
//! ```

use std::fmt::Display;

use prettytable::{format as TableFormat, Table};

use crate::bytecode::{CodeWord, Instruction};
use crate::word::Word;

lazy_static! {
  pub static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/// A two column table of `name[i] = value`, with the row at `highlight` marked by an arrow.
pub fn make_register_table<T>(name: &str, values: &[T], highlight: Option<usize>) -> Table
  where T: Display
{
  let mut table = Table::new();

  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Address", ubl->"Contents"]);

  for (i, value) in values.iter().enumerate() {
    match Some(i) == highlight {

      true  => {
        table.add_row(
          row![r->format!("* --> {}[{}] =", name, i), format!("{}", value)]
        );
      }

      false => {
        table.add_row(
          row![r->format!("{}[{}] =", name, i), format!("{}", value)]
        );
      }

    } // end match on highlight
  } // end for
  table
}

pub fn format_stack(stack: &[Word]) -> String {
  let mut text = String::from("[ ");
  for word in stack {
    text.push_str(&format!("{} ", word));
  }
  text.push(']');
  text
}

/// The instruction at `address`, or `<unknown>` if there is no valid instruction there.
pub fn format_instruction(program: &[CodeWord], address: usize) -> String {
  match Instruction::decode(program, address) {
    Ok((instruction, _)) => instruction.to_string(),
    Err(_)               => "<unknown>".to_string(),
  }
}

pub fn trace_line(stack: &[Word], program: &[CodeWord], address: usize) -> String {
  format!("{} {{{}:{}}}", format_stack(stack), address, format_instruction(program, address))
}
