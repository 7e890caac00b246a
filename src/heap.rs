/*!
  The heap is one fixed-size array of `Word`s, partitioned into contiguous blocks. Each block is a
  header word followed by `length` data words, and the next block starts immediately after the
  last data word. Free blocks are threaded into a singly linked free list through their first data
  word. A block whose length is zero is an orphan: it holds no data and is never on the free list.

  ```text
    heap[0]        heap[1]   ...  heap[n]       heap[n+1] ...
    <Cons 2 White> car       cdr  <Free 5 Blue> next ...
  ```
*/

use std::fmt::{Display, Formatter};

use prettytable::Table;

use crate::collector;
use crate::error::{MachineError, MachineResult};
use crate::trace::TABLE_DISPLAY_FORMAT;
use crate::word::{Color, Header, HeapRef, Tag, Word, HULL};

/// The smallest heap that can hold a free block: a header and the free list link.
pub const MIN_HEAP_SIZE: usize = 2;

pub struct Heap {
  words    : Vec<Word>,
  freelist : HeapRef,

  // Counters for statistics
  allocations : u64,
  collections : u64,
}

impl Heap {

  // region Construction and raw access

  /// Creates a heap holding a single free block that spans the whole array.
  pub fn new(capacity: usize) -> MachineResult<Heap> {
    if capacity < MIN_HEAP_SIZE {
      return Err(MachineError::HeapTooSmall(capacity));
    }

    let mut words = vec![Word::default(); capacity];
    words[0] = Word::make_header(Tag::Free, capacity - 1, Color::Blue);
    words[1] = Word::Pointer(HULL);

    Ok(Heap {
      words,
      freelist    : HeapRef::from_header_idx(0),
      allocations : 0,
      collections : 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.words.len()
  }

  pub fn freelist(&self) -> HeapRef {
    self.freelist
  }

  pub(crate) fn set_freelist(&mut self, head: HeapRef) {
    self.freelist = head;
  }

  pub fn allocations(&self) -> u64 {
    self.allocations
  }

  pub fn collections(&self) -> u64 {
    self.collections
  }

  pub(crate) fn count_collection(&mut self) {
    self.collections += 1;
  }

  /// The header stored at `idx`, or a consistency error if there is none.
  pub fn header_at(&self, idx: usize) -> MachineResult<Header> {
    match self.words.get(idx) {
      Some(Word::Header(header)) => Ok(*header),
      Some(word)                 => Err(MachineError::NotAHeader(idx, *word)),
      None                       => Err(MachineError::BlockBeyondHeap(idx)),
    }
  }

  pub(crate) fn set_header(&mut self, idx: usize, header: Header) {
    self.words[idx] = Word::Header(header);
  }

  /// Overwrites a header that has been absorbed into a larger block.
  pub(crate) fn clear_word(&mut self, idx: usize) {
    self.words[idx] = Word::default();
  }

  pub(crate) fn paint(&mut self, block: HeapRef, color: Color) {
    self.words[block.header_idx()].paint(color);
  }

  /// The header of the block `block` refers to. A reference that is null, out of bounds, or not
  /// immediately preceded by a header is dangling.
  pub fn header_of(&self, block: HeapRef) -> MachineResult<Header> {
    if block.is_null() || block.idx() >= self.words.len() {
      return Err(MachineError::DanglingPointer(block));
    }
    match self.words[block.header_idx()] {
      Word::Header(header) => Ok(header),
      _                    => Err(MachineError::DanglingPointer(block)),
    }
  }

  /// Reads data word `offset` of a block.
  pub fn field(&self, block: HeapRef, offset: usize) -> MachineResult<Word> {
    let header = self.header_of(block)?;
    if offset >= header.length {
      return Err(MachineError::DanglingPointer(block));
    }
    Ok(self.words[block + offset])
  }

  /// Overwrites data word `offset` of a block in place.
  pub fn set_field(&mut self, block: HeapRef, offset: usize, value: Word) -> MachineResult<()> {
    let header = self.header_of(block)?;
    if offset >= header.length {
      return Err(MachineError::DanglingPointer(block));
    }
    self.words[block + offset] = value;
    Ok(())
  }

  /// The data words of a block, as a slice.
  pub(crate) fn data(&self, block: HeapRef, length: usize) -> &[Word] {
    &self.words[block.idx()..block.idx() + length]
  }

  /// The free list link stored in the first data word of a free block.
  pub(crate) fn next_free(&self, block: HeapRef) -> MachineResult<HeapRef> {
    match self.words.get(block.idx()) {
      Some(Word::Pointer(next)) => Ok(*next),
      Some(word)                => Err(MachineError::NotAHeader(block.idx(), *word)),
      None                      => Err(MachineError::BlockBeyondHeap(block.header_idx())),
    }
  }

  pub(crate) fn set_next_free(&mut self, block: HeapRef, next: HeapRef) {
    self.words[block.idx()] = Word::Pointer(next);
  }

  /// Iterates over the blocks of the heap in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks { heap: self, next: 0 }
  }

  // endregion

  // region Allocation

  /**
    Allocates a block of `length` data words tagged `tag`. If no free block is large enough, the
    collector runs once with `roots` as the root set and the free list is searched again. A
    second failure is `OutOfMemory`.

    The data words of the new block are cleared to integer 0, so a block is never observed
    holding the stale free list link.
  */
  pub fn allocate(&mut self, tag: Tag, length: usize, roots: &[Word]) -> MachineResult<HeapRef> {
    debug_assert!(length > 0, "zero-length blocks are orphans");

    for attempt in 1..=2 {
      if let Some(block) = self.try_allocate(tag, length)? {
        self.allocations += 1;
        return Ok(block);
      }
      // No free space, do a garbage collection and try again
      if attempt == 1 {
        collector::collect(self, roots)?;
      }
    }

    Err(MachineError::OutOfMemory)
  }

  /// First-fit search of the free list. `None` means no free block is large enough.
  fn try_allocate(&mut self, tag: Tag, length: usize) -> MachineResult<Option<HeapRef>> {
    // The block whose link points at `free`; `None` means the link is `self.freelist`.
    let mut previous: Option<HeapRef> = None;
    let mut free = self.freelist;

    while !free.is_null() {
      let header_idx = free.header_idx();
      let header     = self.header_at(header_idx)?;
      if !header.is_free() || header.length == 0 {
        return Err(MachineError::LiveBlockOnFreeList { index: header_idx, color: header.color });
      }
      let available  = header.length;
      let next       = self.next_free(free)?;

      if available >= length {
        let rest = available - length;
        match rest {
          // Exact fit with free block
          0 => self.relink(previous, next),

          // A single leftover word cannot hold a header and a link, so it becomes an orphan.
          1 => {
            self.relink(previous, next);
            self.set_header(header_idx + length + 1, Header::new(Tag::Free, 0, Color::Blue));
          }

          // Split. The tail takes the place of the original block in the free list.
          _ => {
            let tail = HeapRef::from_header_idx(header_idx + length + 1);
            self.set_header(tail.header_idx(), Header::new(Tag::Free, rest - 1, Color::Blue));
            self.set_next_free(tail, next);
            self.relink(previous, tail);
          }
        }

        self.set_header(header_idx, Header::new(tag, length, Color::White));
        for word in &mut self.words[free.idx()..free.idx() + length] {
          *word = Word::default();
        }
        return Ok(Some(free));
      }

      previous = Some(free);
      free     = next;
    }

    Ok(None)
  }

  fn relink(&mut self, previous: Option<HeapRef>, next: HeapRef) {
    match previous {
      None        => self.freelist = next,
      Some(block) => self.set_next_free(block, next),
    }
  }

  // endregion

  // region Statistics and checks

  /// Walks the heap and the free list, tallying blocks. Fails if either walk leaves the heap.
  pub fn statistics(&self) -> MachineResult<HeapStatistics> {
    let mut stats = HeapStatistics::default();

    for block in self.blocks() {
      let (_, header) = block?;
      if header.length > 0 {
        stats.blocks += 1;
        stats.block_words += header.length;
      } else {
        stats.orphans += 1;
      }
    }

    let mut free = self.freelist;
    while !free.is_null() {
      stats.free += 1;
      if free.idx() >= self.capacity() {
        return Err(MachineError::FreeBlockOutsideHeap { item: stats.free, index: free.idx() });
      }
      let header = self.header_at(free.header_idx())?;
      if free.header_idx() + header.length + 1 > self.capacity() {
        return Err(MachineError::FreeBlockOutsideHeap {
          item  : stats.free,
          index : free.header_idx(),
        });
      }
      stats.free_words += header.length;
      stats.largest_free = stats.largest_free.max(header.length);
      // The free list can be no longer than the number of blocks.
      if stats.free > stats.blocks {
        return Err(MachineError::CyclicFreeList);
      }
      free = self.next_free(free)?;
    }

    Ok(stats)
  }

  /**
    Verifies the structural invariants of the heap:

     1. walking blocks from address 0 lands exactly on the end of the heap,
     2. the free list visits each block at most once and terminates in `HULL`,
     3. every block on the free list starts on a block boundary, is free (white or blue), and is
        not an orphan.
  */
  pub fn check(&self) -> MachineResult<()> {
    let mut boundaries = vec![false; self.capacity()];
    for block in self.blocks() {
      let (idx, _) = block?;
      boundaries[idx] = true;
    }

    let mut visited = vec![false; self.capacity()];
    let mut free = self.freelist;
    let mut item = 0;
    while !free.is_null() {
      item += 1;
      if free.idx() >= self.capacity() || !boundaries[free.header_idx()] {
        return Err(MachineError::FreeBlockOutsideHeap { item, index: free.idx() });
      }
      if visited[free.header_idx()] {
        return Err(MachineError::CyclicFreeList);
      }
      visited[free.header_idx()] = true;

      let header = self.header_at(free.header_idx())?;
      if !header.is_free() || header.length == 0 {
        return Err(MachineError::LiveBlockOnFreeList {
          index : free.header_idx(),
          color : header.color,
        });
      }
      free = self.next_free(free)?;
    }

    Ok(())
  }

  // endregion

}

/// Iterator over `(header index, header)` for every block, in address order.
pub struct Blocks<'h> {
  heap : &'h Heap,
  next : usize,
}

impl<'h> Iterator for Blocks<'h> {
  type Item = MachineResult<(usize, Header)>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next >= self.heap.capacity() {
      return None;
    }

    let idx = self.next;
    let header = match self.heap.header_at(idx) {
      Ok(header) => header,
      Err(e)     => {
        self.next = self.heap.capacity();
        return Some(Err(e));
      }
    };

    let after = idx + header.length + 1;
    if after > self.heap.capacity() {
      self.next = self.heap.capacity();
      return Some(Err(MachineError::BlockBeyondHeap(idx)));
    }

    self.next = after;
    Some(Ok((idx, header)))
  }
}

#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct HeapStatistics {
  /// Blocks with at least one data word, free or not
  pub blocks       : usize,
  pub block_words  : usize,
  /// Entries on the free list
  pub free         : usize,
  pub free_words   : usize,
  pub largest_free : usize,
  pub orphans      : usize,
}

impl Display for HeapStatistics {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "Heap: {} blocks ({} words); of which {} free ({} words, largest {} words); {} orphans",
      self.blocks, self.block_words, self.free, self.free_words, self.largest_free, self.orphans
    )
  }
}

impl Heap {
  /// One row per block: its address, its header and its data words.
  pub fn make_block_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ub->"Header", ubl->"Contents"]);

    for block in self.blocks() {
      match block {

        Ok((idx, header)) => {
          let contents = match header.tag {
            Tag::Cons => {
              self.data(HeapRef::from_header_idx(idx), header.length)
                  .iter()
                  .map(|word| format!("{}", word))
                  .collect::<Vec<String>>()
                  .join(", ")
            }
            Tag::Free if header.length > 0 => {
              format!("next: {}", self.words[idx + 1])
            }
            Tag::Free => String::new(),
          };
          let marker = match HeapRef::from_header_idx(idx) == self.freelist {
            true  => "* --> ",
            false => "",
          };
          table.add_row(
            row![r->format!("{}heap[{}] =", marker, idx), format!("{}", header), contents]
          );
        }

        Err(e) => {
          table.add_row(row![r->"!", "", format!("{}", e)]);
        }

      } // end match on block
    } // end for
    table
  }
}

impl Display for Heap {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.statistics() {
      Ok(stats) => writeln!(f, "{}", stats)?,
      Err(e)    => writeln!(f, "{}", e)?,
    }
    write!(f, "{}", self.make_block_table())
  }
}
