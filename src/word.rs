//! The tagged value unit of the machine. Every stack slot and every heap slot holds a `Word`, and
//! the discriminant is always inspected before the payload is interpreted. Integers and heap
//! references are distinguished by the enum variant rather than by bits packed into the value,
//! which is what lets the collector be precise rather than conservative.

use std::fmt::{Display, Formatter};
use std::ops::Add;

use strum_macros::Display as StrumDisplay;

/// Integers on the stack and in the heap are 64 bit signed.
pub type IntegerType = i64;

/**
  A reference into the heap. The index is that of the *first data word* of a block, so the
  block's header lives at `index - 1`. Because the heap always begins with a header at index 0,
  no block's data can start at 0, which leaves index 0 free to serve as the null sentinel `HULL`.
*/
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct HeapRef(pub usize);

/// The null pointer, the `nil` of list-C.
pub const HULL: HeapRef = HeapRef(0);

impl HeapRef {
  /// Converts the index of a block's header into a reference to that block.
  pub fn from_header_idx(header_idx: usize) -> HeapRef {
    HeapRef(header_idx + 1)
  }

  pub fn is_null(&self) -> bool {
    *self == HULL
  }

  /// Index of the block's header word.
  pub fn header_idx(&self) -> usize {
    debug_assert!(!self.is_null(), "HULL has no header");
    self.0 - 1
  }

  /// Index of the first data word.
  pub fn idx(&self) -> usize {
    self.0
  }
}

impl Display for HeapRef {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

// Offset into a block's data words
impl Add<usize> for HeapRef {
  type Output = usize;
  fn add(self, rhs: usize) -> usize {
    self.0 + rhs
  }
}

/// Block tag. Only cons cells are ever allocated; free blocks and orphans carry `Free`.
#[derive(StrumDisplay, Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Tag {
  Cons,
  Free,
}

/**
  Block colors.

    `White`: live or dead, not yet known (between collections every live block is white)
    `Grey` : reached by the mark phase, children not yet scanned
    `Black`: reached by the mark phase, children scanned
    `Blue` : on the free list, or an orphan
*/
#[derive(StrumDisplay, Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Color {
  White,
  Grey,
  Black,
  Blue,
}

/// The decoded fields of a block header. Color lives in its own field, so painting a block never
/// touches its tag or length.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Header {
  pub tag    : Tag,
  /// Number of data words, excluding the header itself.
  pub length : usize,
  pub color  : Color,
}

impl Header {
  pub fn new(tag: Tag, length: usize, color: Color) -> Header {
    Header { tag, length, color }
  }

  /// Returns a copy of the header with the color replaced.
  pub fn painted(self, color: Color) -> Header {
    Header { color, ..self }
  }

  pub fn is_free(&self) -> bool {
    matches!(self.color, Color::White | Color::Blue) && self.tag == Tag::Free
  }
}

impl Display for Header {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "<{} {} {}>", self.tag, self.length, self.color)
  }
}

/// The kinds of `Word`, used with `Word::is`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WordKind {
  Integer,
  Pointer,
  Header,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Word {
  Integer(IntegerType),
  Pointer(HeapRef),
  Header(Header),
}

impl Default for Word {
  fn default() -> Self {
    Word::Integer(0)
  }
}

impl Word {
  pub fn make_header(tag: Tag, length: usize, color: Color) -> Word {
    Word::Header(Header::new(tag, length, color))
  }

  pub fn null() -> Word {
    Word::Pointer(HULL)
  }

  pub fn kind(&self) -> WordKind {
    match self {
      Word::Integer(_) => WordKind::Integer,
      Word::Pointer(_) => WordKind::Pointer,
      Word::Header(_)  => WordKind::Header,
    }
  }

  pub fn is(&self, kind: WordKind) -> bool {
    self.kind() == kind
  }

  /// True for integer 0 and for `HULL`, which is how the conditional jumps and `NOT` read words.
  pub fn is_zero(&self) -> bool {
    match self {
      Word::Integer(i) => *i == 0,
      Word::Pointer(p) => p.is_null(),
      Word::Header(_)  => false,
    }
  }

  /// Panics if the word is not a header. Reaching this means the heap is corrupt, not that the
  /// program being run is wrong.
  pub fn header(&self) -> Header {
    match self {
      Word::Header(header) => *header,
      _ => unreachable!("Error: A header was required but found {:?}", self),
    }
  }

  pub fn tag(&self) -> Tag {
    self.header().tag
  }

  pub fn length(&self) -> usize {
    self.header().length
  }

  pub fn color(&self) -> Color {
    self.header().color
  }

  pub fn set_tag(&mut self, tag: Tag) {
    *self = Word::Header(Header { tag, ..self.header() });
  }

  pub fn set_length(&mut self, length: usize) {
    *self = Word::Header(Header { length, ..self.header() });
  }

  pub fn paint(&mut self, color: Color) {
    *self = Word::Header(self.header().painted(color));
  }
}

impl Display for Word {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Word::Integer(i)      => write!(f, "{}", i),
      Word::Pointer(p)      => write!(f, "{}", p),
      Word::Header(header)  => write!(f, "{}", header),
    }
  }
}
