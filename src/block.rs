use crate::{
  arena::Arena,
  error::{HeapError, Result},
};

/// Size of a block header: a `size` word followed by a `next` word.
pub const HEADER_SIZE: usize = 16;

const SIZE_SLOT: usize = 0;
const NEXT_SLOT: usize = 8;

/// On-arena encoding of a missing link.
const NIL: u64 = u64::MAX;

/// Decoded block header.
///
/// `next` is only meaningful while the block sits on the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub size: usize,
  pub next: Option<usize>,
}

impl Block {
  pub fn new(
    size: usize,
    next: Option<usize>,
  ) -> Self {
    Self { size, next }
  }

  pub fn read(
    arena: &Arena,
    offset: usize,
  ) -> Result<Self> {
    let size = arena.read_word(slot(arena, offset, SIZE_SLOT)?)? as usize;
    let next = decode_link(arena.read_word(slot(arena, offset, NEXT_SLOT)?)?);

    Ok(Self { size, next })
  }

  pub fn write(
    &self,
    arena: &mut Arena,
    offset: usize,
  ) -> Result<()> {
    let size_slot = slot(arena, offset, SIZE_SLOT)?;
    let next_slot = slot(arena, offset, NEXT_SLOT)?;

    arena.write_word(size_slot, self.size as u64)?;
    arena.write_word(next_slot, encode_link(self.next))
  }
}

pub fn set_next(
  arena: &mut Arena,
  offset: usize,
  next: Option<usize>,
) -> Result<()> {
  write_next_raw(arena, offset, encode_link(next))
}

pub fn read_next_raw(
  arena: &Arena,
  offset: usize,
) -> Result<u64> {
  arena.read_word(slot(arena, offset, NEXT_SLOT)?)
}

pub fn write_next_raw(
  arena: &mut Arena,
  offset: usize,
  value: u64,
) -> Result<()> {
  let next_slot = slot(arena, offset, NEXT_SLOT)?;
  arena.write_word(next_slot, value)
}

/// Offset of the first payload byte of the block at `offset`.
pub const fn payload(offset: usize) -> usize {
  offset.saturating_add(HEADER_SIZE)
}

/// Offset one past the last payload byte.
///
/// Saturates, so a garbage size never aliases a real block start.
pub const fn end(
  offset: usize,
  size: usize,
) -> usize {
  payload(offset).saturating_add(size)
}

fn slot(
  arena: &Arena,
  offset: usize,
  slot: usize,
) -> Result<usize> {
  offset.checked_add(slot).ok_or(HeapError::OutOfBounds {
    offset,
    capacity: arena.len(),
  })
}

/// One free-list entry as seen by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeEntry {
  pub prev: Option<usize>,
  pub offset: usize,
  pub size: usize,
  pub next: Option<usize>,
}

/// Walks the free list in address order.
///
/// Yields an error and stops if a header cannot be read or a link does not
/// move strictly forward, so a corrupted list can never loop.
pub struct FreeBlocks<'a> {
  arena: &'a Arena,
  prev: Option<usize>,
  current: Option<usize>,
}

impl<'a> FreeBlocks<'a> {
  pub fn new(
    arena: &'a Arena,
    head: Option<usize>,
  ) -> Self {
    Self {
      arena,
      prev: None,
      current: head,
    }
  }
}

impl Iterator for FreeBlocks<'_> {
  type Item = Result<FreeEntry>;

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.current.take()?;

    let block = match Block::read(self.arena, offset) {
      Ok(block) => block,
      Err(err) => return Some(Err(err)),
    };

    if block.next.is_some_and(|next| next <= offset) {
      return Some(Err(HeapError::CorruptionDetected {
        offset,
        reason: "free list out of address order",
      }));
    }

    let entry = FreeEntry {
      prev: self.prev,
      offset,
      size: block.size,
      next: block.next,
    };

    self.prev = Some(offset);
    self.current = block.next;

    Some(Ok(entry))
  }
}

fn encode_link(next: Option<usize>) -> u64 {
  next.map_or(NIL, |offset| offset as u64)
}

fn decode_link(raw: u64) -> Option<usize> {
  if raw == NIL { None } else { Some(raw as usize) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::{ArenaProvider, HeapProvider};

  #[test]
  fn test_header_round_trip_through_arena() {
    let mut arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    Block::new(40, Some(56)).write(&mut arena, 0).unwrap();
    Block::new(4024, None).write(&mut arena, 56).unwrap();

    assert_eq!(Block::read(&arena, 0).unwrap(), Block::new(40, Some(56)));
    assert_eq!(Block::read(&arena, 56).unwrap(), Block::new(4024, None));
  }

  #[test]
  fn test_offset_zero_is_a_valid_link() {
    let mut arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    Block::new(8, Some(0)).write(&mut arena, 64).unwrap();

    assert_eq!(Block::read(&arena, 64).unwrap().next, Some(0));
  }

  #[test]
  fn test_header_past_the_end_is_rejected() {
    let arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    assert!(Block::read(&arena, 4088).is_err());
  }

  #[test]
  fn test_wild_link_is_out_of_bounds() {
    let arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    assert!(matches!(
      Block::read(&arena, usize::MAX - 4),
      Err(HeapError::OutOfBounds { .. })
    ));
  }

  #[test]
  fn test_free_blocks_walks_in_order() {
    let mut arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    Block::new(24, Some(96)).write(&mut arena, 0).unwrap();
    Block::new(32, Some(512)).write(&mut arena, 96).unwrap();
    Block::new(8, None).write(&mut arena, 512).unwrap();

    let entries: Vec<_> = FreeBlocks::new(&arena, Some(0)).map(|e| e.unwrap()).collect();

    assert_eq!(entries.len(), 3);
    assert_eq!(
      entries[1],
      FreeEntry {
        prev: Some(0),
        offset: 96,
        size: 32,
        next: Some(512)
      }
    );
    assert_eq!(entries[2].prev, Some(96));
    assert_eq!(entries[2].next, None);
  }

  #[test]
  fn test_free_blocks_empty_list() {
    let arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    assert_eq!(FreeBlocks::new(&arena, None).count(), 0);
  }

  #[test]
  fn test_free_blocks_stops_on_backward_link() {
    let mut arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    Block::new(24, Some(64)).write(&mut arena, 0).unwrap();
    Block::new(24, Some(0)).write(&mut arena, 64).unwrap();

    let items: Vec<_> = FreeBlocks::new(&arena, Some(0)).collect();

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(
      items[1],
      Err(HeapError::CorruptionDetected { offset: 64, .. })
    ));
  }

  #[test]
  fn test_geometry() {
    assert_eq!(payload(0), 16);
    assert_eq!(end(0, 40), 56);
    assert_eq!(end(usize::MAX - 8, 64), usize::MAX);
  }
}
