//! Mark-sweep collection of the cons heap.
//!
//! The root set is the live part of the operand stack. Marking paints every reachable block black,
//! using grey for blocks that have been reached but whose fields have not been scanned yet. The
//! sweep then walks the heap in address order: black blocks are repainted white, and every run of
//! adjacent white or blue blocks is coalesced into a single blue block on the free list.

use crate::error::{MachineError, MachineResult};
use crate::heap::Heap;
use crate::word::{Color, Header, HeapRef, Tag, Word, HULL};

/// Runs a full collection with `roots` as the root set.
pub fn collect(heap: &mut Heap, roots: &[Word]) -> MachineResult<()> {
  #[cfg(feature = "trace_collection")] println!("marking ...");
  mark_phase(heap, roots)?;
  #[cfg(feature = "trace_collection")] println!("{}", heap.statistics()?);

  #[cfg(feature = "trace_collection")] println!("sweeping ...");
  sweep_phase(heap)?;
  #[cfg(feature = "trace_collection")] println!("{}", heap.statistics()?);

  heap.count_collection();
  Ok(())
}

/// Paints every block reachable from `roots` black. Integers in the root set are skipped.
pub fn mark_phase(heap: &mut Heap, roots: &[Word]) -> MachineResult<()> {
  let mut grey: Vec<HeapRef> = Vec::new();

  for root in roots {
    match root {
      Word::Pointer(block) if !block.is_null() => shade(heap, *block, &mut grey)?,
      Word::Header(_) => {
        unreachable!("Error: A block header was found on the stack: {}", root);
      }
      _ => {}
    }
  }

  while let Some(block) = grey.pop() {
    let length = heap.header_of(block)?.length;
    let children: Vec<HeapRef> =
      heap.data(block, length)
          .iter()
          .filter_map(|word| match word {
            Word::Pointer(child) if !child.is_null() => Some(*child),
            _ => None,
          })
          .collect();

    heap.paint(block, Color::Black);
    for child in children {
      shade(heap, child, &mut grey)?;
    }
  }

  Ok(())
}

/// Queues a white block for scanning. Blocks that are already grey or black are left alone, which
/// is what makes marking terminate on cyclic structures.
fn shade(heap: &mut Heap, block: HeapRef, grey: &mut Vec<HeapRef>) -> MachineResult<()> {
  match heap.header_of(block)?.color {
    Color::White => {
      heap.paint(block, Color::Grey);
      grey.push(block);
      Ok(())
    }
    Color::Grey | Color::Black => Ok(()),
    // A reachable pointer into free memory
    Color::Blue => Err(MachineError::DanglingPointer(block)),
  }
}

/**
  Rebuilds the free list from scratch while walking the heap once.

  Black blocks survived marking and are repainted white. A white or blue block starts a run of
  dead blocks, which is extended over every directly following white or blue block and then
  becomes one blue free block. A run that amounts to no data words at all is an orphan and stays
  off the free list.
*/
pub fn sweep_phase(heap: &mut Heap) -> MachineResult<()> {
  let capacity = heap.capacity();
  let mut idx = 0;

  heap.set_freelist(HULL);

  while idx < capacity {
    let header = heap.header_at(idx)?;
    let after  = block_end(idx, &header, capacity)?;

    match header.color {

      Color::Black => {
        heap.set_header(idx, header.painted(Color::White));
        idx = after;
      }

      Color::Grey => {
        return Err(MachineError::GreyAtSweep(idx));
      }

      Color::White | Color::Blue => {
        let mut length = header.length;
        let mut next   = after;

        // Merge forward until a live block or the end of the heap.
        while next < capacity {
          let following = heap.header_at(next)?;
          if !matches!(following.color, Color::White | Color::Blue) {
            break;
          }
          let following_end = block_end(next, &following, capacity)?;
          heap.clear_word(next);
          length += following.length + 1;
          next    = following_end;
        }

        heap.set_header(idx, Header::new(Tag::Free, length, Color::Blue));
        if length > 0 {
          let block = HeapRef::from_header_idx(idx);
          let head  = heap.freelist();
          heap.set_next_free(block, head);
          heap.set_freelist(block);
        }
        idx = next;
      }

    } // end match on color
  }

  Ok(())
}

fn block_end(idx: usize, header: &Header, capacity: usize) -> MachineResult<usize> {
  let after = idx + header.length + 1;
  match after > capacity {
    true  => Err(MachineError::BlockBeyondHeap(idx)),
    false => Ok(after),
  }
}
