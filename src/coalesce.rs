use log::trace;

use crate::{
  arena::Arena,
  block::{self, Block, FreeBlocks},
  error::{HeapError, Result},
};

/// Puts the block at `freed` back on the address-ordered free list, merging
/// it with whichever free neighbours touch it. Returns the new list head.
///
/// The block's `size` must be the one it was allocated with; its `next` slot
/// is ignored and overwritten.
pub fn coalesce(
  arena: &mut Arena,
  head: Option<usize>,
  freed: usize,
) -> Result<usize> {
  let mut block = Block::read(arena, freed)?;
  let freed_end = extent(arena, freed, block.size)?;

  let Some(head) = head else {
    trace!("release {}: list empty, becomes head", freed);
    block.next = None;
    block.write(arena, freed)?;
    return Ok(freed);
  };

  if freed < head {
    check_no_overlap(freed, freed_end, head)?;

    if freed_end == head {
      let successor = Block::read(arena, head)?;
      block.size = extent(arena, head, successor.size)? - block::payload(freed);
      block.next = successor.next;
      trace!("release {}: merged with head {}", freed, head);
    } else {
      block.next = Some(head);
      trace!("release {}: linked before head {}", freed, head);
    }

    block.write(arena, freed)?;
    return Ok(freed);
  }

  let (prev, prev_size, successor) = neighbours(arena, head, freed)?;
  let prev_end = block::end(prev, prev_size);

  check_no_overlap(prev, prev_end, freed)?;

  match successor {
    Some(next) if freed_end == next => {
      let absorbed = Block::read(arena, next)?;
      block.size = extent(arena, next, absorbed.size)? - block::payload(freed);
      block.next = absorbed.next;
      trace!("release {}: absorbed successor {}", freed, next);
    }
    Some(next) => {
      check_no_overlap(freed, freed_end, next)?;
      block.next = Some(next);
    }
    None => block.next = None,
  }

  if prev_end == freed {
    let merged = block::end(freed, block.size) - block::payload(prev);
    Block::new(merged, block.next).write(arena, prev)?;
    trace!("release {}: merged into predecessor {}", freed, prev);
  } else {
    block.write(arena, freed)?;
    block::set_next(arena, prev, Some(freed))?;
    trace!("release {}: spliced after {}", freed, prev);
  }

  Ok(head)
}

/// Finds the last free block below `freed` (with its size) and the first one
/// above it. `head` must lie below `freed`.
fn neighbours(
  arena: &Arena,
  head: usize,
  freed: usize,
) -> Result<(usize, usize, Option<usize>)> {
  let mut prev = None;

  for entry in FreeBlocks::new(arena, Some(head)) {
    let entry = entry?;

    if entry.offset == freed {
      return Err(HeapError::CorruptionDetected {
        offset: freed,
        reason: "block is already free",
      });
    }

    if entry.offset > freed {
      let (offset, size) = prev.ok_or(HeapError::CorruptionDetected {
        offset: head,
        reason: "free list head above released block",
      })?;
      return Ok((offset, size, Some(entry.offset)));
    }

    prev = Some((entry.offset, entry.size));
  }

  let (offset, size) = prev.ok_or(HeapError::CorruptionDetected {
    offset: head,
    reason: "free list head above released block",
  })?;

  Ok((offset, size, None))
}

/// End offset of a block that must lie wholly inside the arena.
fn extent(
  arena: &Arena,
  offset: usize,
  size: usize,
) -> Result<usize> {
  let end = block::end(offset, size);

  if end > arena.len() {
    return Err(HeapError::CorruptionDetected {
      offset,
      reason: "block runs past the end of the arena",
    });
  }

  Ok(end)
}

fn check_no_overlap(
  lower: usize,
  lower_end: usize,
  upper: usize,
) -> Result<()> {
  if lower_end > upper {
    return Err(HeapError::CorruptionDetected {
      offset: lower,
      reason: "released block overlaps a free block",
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    arena::{ArenaProvider, HeapProvider},
    block::HEADER_SIZE,
  };

  // Four tiled blocks: 0..64, 64..128, 128..192, 192..4096.
  const A: usize = 0;
  const B: usize = 64;
  const C: usize = 128;
  const D: usize = 192;
  const SMALL: usize = 48;
  const LAST: usize = 4096 - D - HEADER_SIZE;

  fn tiled_arena() -> Arena {
    let mut arena = HeapProvider::with_page_size(4096).reserve(4096).unwrap();

    for offset in [A, B, C] {
      Block::new(SMALL, None).write(&mut arena, offset).unwrap();
    }
    Block::new(LAST, None).write(&mut arena, D).unwrap();

    arena
  }

  fn link(
    arena: &mut Arena,
    offsets: &[usize],
  ) -> Option<usize> {
    for pair in offsets.windows(2) {
      block::set_next(arena, pair[0], Some(pair[1])).unwrap();
    }
    if let Some(&last) = offsets.last() {
      block::set_next(arena, last, None).unwrap();
    }
    offsets.first().copied()
  }

  fn list(
    arena: &Arena,
    head: usize,
  ) -> Vec<(usize, usize)> {
    FreeBlocks::new(arena, Some(head))
      .map(|entry| entry.unwrap())
      .map(|entry| (entry.offset, entry.size))
      .collect()
  }

  #[test]
  fn test_release_into_empty_list() {
    let mut arena = tiled_arena();

    let head = coalesce(&mut arena, None, B).unwrap();

    assert_eq!(head, B);
    assert_eq!(list(&arena, head), vec![(B, SMALL)]);
  }

  #[test]
  fn test_release_before_head_merges_when_adjacent() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[B]);

    let head = coalesce(&mut arena, head, A).unwrap();

    assert_eq!(head, A);
    assert_eq!(list(&arena, head), vec![(A, 2 * SMALL + HEADER_SIZE)]);
  }

  #[test]
  fn test_release_before_head_links_when_apart() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[C]);

    let head = coalesce(&mut arena, head, A).unwrap();

    assert_eq!(head, A);
    assert_eq!(list(&arena, head), vec![(A, SMALL), (C, SMALL)]);
  }

  #[test]
  fn test_release_merges_with_successor_only() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A, D]);

    let head = coalesce(&mut arena, head, C).unwrap();

    assert_eq!(head, A);
    assert_eq!(
      list(&arena, head),
      vec![(A, SMALL), (C, SMALL + HEADER_SIZE + LAST)]
    );
  }

  #[test]
  fn test_release_merges_into_predecessor_only() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A, D]);

    let head = coalesce(&mut arena, head, B).unwrap();

    assert_eq!(list(&arena, head), vec![(A, 2 * SMALL + HEADER_SIZE), (D, LAST)]);
  }

  #[test]
  fn test_release_three_way_merge() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A, C]);

    let head = coalesce(&mut arena, head, B).unwrap();

    assert_eq!(head, A);
    assert_eq!(list(&arena, head), vec![(A, 3 * SMALL + 2 * HEADER_SIZE)]);
  }

  #[test]
  fn test_release_three_way_merge_to_whole_arena() {
    let mut arena = tiled_arena();
    Block::new(2 * SMALL + HEADER_SIZE, None).write(&mut arena, A).unwrap();
    let head = link(&mut arena, &[A, D]);

    let head = coalesce(&mut arena, head, C).unwrap();

    assert_eq!(list(&arena, head), vec![(A, 4096 - HEADER_SIZE)]);
  }

  #[test]
  fn test_release_splices_between_distant_neighbours() {
    let mut arena = tiled_arena();
    Block::new(8, None).write(&mut arena, 64).unwrap();
    Block::new(8, None).write(&mut arena, 88).unwrap();
    Block::new(0, None).write(&mut arena, 112).unwrap();
    let head = link(&mut arena, &[A, C]);

    let head = coalesce(&mut arena, head, 88).unwrap();

    assert_eq!(list(&arena, head), vec![(A, SMALL), (88, 8), (C, SMALL)]);
  }

  #[test]
  fn test_release_after_last_block_appends() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A]);

    let head = coalesce(&mut arena, head, C).unwrap();

    assert_eq!(list(&arena, head), vec![(A, SMALL), (C, SMALL)]);
  }

  #[test]
  fn test_release_after_last_block_merges_when_adjacent() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A, B]);

    let head = coalesce(&mut arena, head, C).unwrap();

    assert_eq!(list(&arena, head), vec![(A, SMALL), (B, 2 * SMALL + HEADER_SIZE)]);
  }

  #[test]
  fn test_release_of_free_block_is_reported() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A, C]);

    assert!(matches!(
      coalesce(&mut arena, head, C),
      Err(HeapError::CorruptionDetected { offset: C, .. })
    ));
  }

  #[test]
  fn test_release_with_oversized_header_is_reported() {
    let mut arena = tiled_arena();
    let head = link(&mut arena, &[A]);
    Block::new(usize::MAX - 8, None).write(&mut arena, C).unwrap();

    assert!(matches!(
      coalesce(&mut arena, head, C),
      Err(HeapError::CorruptionDetected { offset: C, .. })
    ));
    assert_eq!(list(&arena, A), vec![(A, SMALL)]);

    Block::new(LAST + 8, None).write(&mut arena, D).unwrap();
    assert!(coalesce(&mut arena, head, D).is_err());
    assert_eq!(list(&arena, A), vec![(A, SMALL)]);
  }

  #[test]
  fn test_release_inside_free_block_is_reported() {
    let mut arena = tiled_arena();
    Block::new(SMALL + HEADER_SIZE + SMALL, None).write(&mut arena, A).unwrap();
    let head = link(&mut arena, &[A]);

    assert!(matches!(
      coalesce(&mut arena, head, B),
      Err(HeapError::CorruptionDetected { .. })
    ));
  }
}
