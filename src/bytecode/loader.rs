/*!
  Bytecode files are plain text: decimal integers separated by arbitrary whitespace, including
  newlines. The file carries no structure beyond that. Opcodes and their inline operands are
  told apart only positionally, by the interpreter, so an ill-formed instruction stream is not
  detected until it is executed.
*/

use std::fs;
use std::path::Path;

use nom::{
  character::complete::{char as one_char, digit1, multispace0, multispace1},
  combinator::{all_consuming, map_res, opt, recognize},
  error::ErrorKind,
  multi::separated_list,
  sequence::{delimited, pair},
  IResult,
};

use super::opcode::CodeWord;
use crate::error::{MachineError, MachineResult};

/// Reads the whole file into memory and parses it.
pub fn load_program<P: AsRef<Path>>(path: P) -> MachineResult<Vec<CodeWord>> {
  let path = path.as_ref();
  let text = fs::read_to_string(path)
    .map_err(|e| MachineError::Io(path.display().to_string(), e))?;
  parse_program(&text)
}

fn integer(input: &str) -> IResult<&str, CodeWord, (&str, ErrorKind)> {
  map_res(
    recognize(pair(opt(one_char('-')), digit1)),
    |digits: &str| digits.parse::<CodeWord>()
  )(input)
}

/// Parses the text of a bytecode file into the instruction stream.
pub fn parse_program(text: &str) -> MachineResult<Vec<CodeWord>> {
  let program_p = all_consuming(
    delimited(
      multispace0,
      separated_list(multispace1, integer),
      multispace0
    )
  );

  match program_p(text) {
    Ok((_rest, program)) => Ok(program),

    | Err(nom::Err::Error((rest, _kind)))
    | Err(nom::Err::Failure((rest, _kind))) => Err(not_an_integer(text, rest)),

    // Only streaming parsers ask for more input.
    Err(nom::Err::Incomplete(_)) => Err(not_an_integer(text, "")),
  }
}

/// Builds the error for the token at the start of `rest`, which is a suffix of `text`.
fn not_an_integer(text: &str, rest: &str) -> MachineError {
  let rest   = rest.trim_start();
  let offset = text.len() - rest.len();
  let line   = text[..offset].matches('\n').count() + 1;
  let found  = rest.split_whitespace().next().unwrap_or("").to_string();
  MachineError::NotAnInteger { line, found }
}
