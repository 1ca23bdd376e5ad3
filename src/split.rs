use log::trace;

use crate::{
  arena::Arena,
  block::{Block, HEADER_SIZE},
  error::{HeapError, Result},
};

/// Shrinks the free block at `offset` to `required` payload bytes and writes
/// the leftover as a new free block right behind it.
///
/// The remainder takes over the original `next` link and the original block
/// now points at the remainder, so unlinking the original afterwards leaves
/// the remainder in its list position. Returns the remainder's offset, or
/// `None` if the leftover could not hold more than a bare header and the
/// block is handed out whole.
pub fn split(
  arena: &mut Arena,
  offset: usize,
  required: usize,
) -> Result<Option<usize>> {
  let block = Block::read(arena, offset)?;
  let leftover = block.size.checked_sub(required).ok_or(HeapError::CorruptionDetected {
    offset,
    reason: "placement chose a block smaller than the request",
  })?;

  if leftover <= HEADER_SIZE {
    trace!(
      "no split at {}: leftover {} kept as slack",
      offset, leftover
    );
    return Ok(None);
  }

  let remainder = offset + HEADER_SIZE + required;

  Block::new(leftover - HEADER_SIZE, block.next).write(arena, remainder)?;
  Block::new(required, Some(remainder)).write(arena, offset)?;

  trace!(
    "split {} ({} bytes) into {} + remainder {} ({} bytes)",
    offset,
    block.size,
    required,
    remainder,
    leftover - HEADER_SIZE
  );

  Ok(Some(remainder))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arena::{ArenaProvider, HeapProvider};

  fn arena_with_block(
    size: usize,
    next: Option<usize>,
  ) -> Arena {
    let mut arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();
    Block::new(size, next).write(&mut arena, 0).unwrap();
    arena
  }

  #[test]
  fn test_split_carves_remainder() {
    let mut arena = arena_with_block(4080, None);

    let remainder = split(&mut arena, 0, 40).unwrap();

    assert_eq!(remainder, Some(56));
    assert_eq!(Block::read(&arena, 0).unwrap(), Block::new(40, Some(56)));
    assert_eq!(Block::read(&arena, 56).unwrap(), Block::new(4024, None));
  }

  #[test]
  fn test_remainder_inherits_next_link() {
    let mut arena = arena_with_block(200, Some(1024));

    let remainder = split(&mut arena, 0, 64).unwrap().unwrap();

    assert_eq!(remainder, 80);
    assert_eq!(Block::read(&arena, 80).unwrap(), Block::new(120, Some(1024)));
    assert!(remainder < 1024);
  }

  #[test]
  fn test_leftover_of_header_size_is_not_split() {
    let mut arena = arena_with_block(64, Some(512));

    assert_eq!(split(&mut arena, 0, 48).unwrap(), None);
    assert_eq!(Block::read(&arena, 0).unwrap(), Block::new(64, Some(512)));
  }

  #[test]
  fn test_smallest_split_leaves_eight_byte_remainder() {
    let mut arena = arena_with_block(64, None);

    assert_eq!(split(&mut arena, 0, 40).unwrap(), Some(56));
    assert_eq!(Block::read(&arena, 56).unwrap().size, 8);
  }

  #[test]
  fn test_undersized_block_is_rejected() {
    let mut arena = arena_with_block(32, None);

    assert!(matches!(
      split(&mut arena, 0, 40),
      Err(HeapError::CorruptionDetected { offset: 0, .. })
    ));
  }

  #[test]
  fn test_exact_fit_is_not_split() {
    let mut arena = arena_with_block(64, None);

    assert_eq!(split(&mut arena, 0, 64).unwrap(), None);
  }
}
