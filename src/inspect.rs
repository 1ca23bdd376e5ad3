//! Read-only views of allocator state.

use std::fmt;

use log::Level;

use crate::{
  arena::Arena,
  block::{self, Block, FreeBlocks, HEADER_SIZE},
  error::{HeapError, Result},
};

/// One free-list entry, with absolute addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset inside the arena.
  pub offset: usize,
  pub header_address: usize,
  pub payload_start: usize,
  pub payload_end: usize,
  /// Header address of the next free block.
  pub next: Option<usize>,
  /// Payload size, header excluded.
  pub size: usize,
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "header {:#x}, payload {:#x}..{:#x}, next ",
      self.header_address, self.payload_start, self.payload_end
    )?;

    match self.next {
      Some(next) => write!(f, "{:#x}", next)?,
      None => f.write_str("none")?,
    }

    write!(f, ", size {}", self.size)
  }
}

/// Any block in the arena, free or allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
  pub offset: usize,
  pub size: usize,
  pub free: bool,
}

/// Occupancy totals over the whole arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub capacity: usize,
  pub free_blocks: usize,
  pub used_blocks: usize,
  /// Payload bytes on the free list.
  pub free_bytes: usize,
  /// Payload bytes handed out, slack included.
  pub used_bytes: usize,
  pub largest_free: usize,
}

impl HeapStats {
  pub fn from_blocks(
    capacity: usize,
    blocks: &[BlockSummary],
  ) -> Self {
    blocks.iter().fold(
      Self {
        capacity,
        ..Self::default()
      },
      |mut stats, block| {
        if block.free {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
          stats.largest_free = stats.largest_free.max(block.size);
        } else {
          stats.used_blocks += 1;
          stats.used_bytes += block.size;
        }
        stats
      },
    )
  }

  /// Bytes taken by headers.
  pub fn header_bytes(&self) -> usize {
    (self.free_blocks + self.used_blocks) * HEADER_SIZE
  }
}

/// Consumer of free-list snapshots.
pub trait Inspector {
  fn inspect(
    &mut self,
    blocks: &[BlockInfo],
  );
}

impl<F> Inspector for F
where
  F: FnMut(&[BlockInfo]),
{
  fn inspect(
    &mut self,
    blocks: &[BlockInfo],
  ) {
    self(blocks)
  }
}

/// Writes each free block to the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct LogInspector {
  level: Level,
}

impl LogInspector {
  pub fn new(level: Level) -> Self {
    Self { level }
  }
}

impl Default for LogInspector {
  fn default() -> Self {
    Self::new(Level::Debug)
  }
}

impl Inspector for LogInspector {
  fn inspect(
    &mut self,
    blocks: &[BlockInfo],
  ) {
    match blocks.first() {
      Some(head) => log::log!(self.level, "free list head at {:#x}", head.header_address),
      None => log::log!(self.level, "free list empty, arena is full"),
    }

    for (index, info) in blocks.iter().enumerate() {
      log::log!(self.level, "block {}: {}", index, info);
    }
  }
}

/// Snapshot of the free list in list order.
pub fn dump(
  arena: &Arena,
  head: Option<usize>,
) -> Result<Vec<BlockInfo>> {
  let base = arena.base().as_ptr() as usize;

  FreeBlocks::new(arena, head)
    .map(|entry| {
      entry.map(|entry| BlockInfo {
        offset: entry.offset,
        header_address: base + entry.offset,
        payload_start: base + block::payload(entry.offset),
        payload_end: base + block::end(entry.offset, entry.size),
        next: entry.next.map(|next| base + next),
        size: entry.size,
      })
    })
    .collect()
}

/// Walks every block by header sizes from offset 0, marking those that sit on
/// the free list.
pub fn walk(
  arena: &Arena,
  head: Option<usize>,
) -> Result<Vec<BlockSummary>> {
  let mut free = FreeBlocks::new(arena, head);
  let mut next_free = free.next().transpose()?.map(|entry| entry.offset);
  let mut blocks = Vec::new();
  let mut offset = 0;

  while offset < arena.len() {
    let block = Block::read(arena, offset)?;
    let is_free = next_free == Some(offset);

    if is_free {
      next_free = free.next().transpose()?.map(|entry| entry.offset);
    }

    blocks.push(BlockSummary {
      offset,
      size: block.size,
      free: is_free,
    });

    offset = block::end(offset, block.size);
  }

  if offset != arena.len() {
    return Err(HeapError::CorruptionDetected {
      offset: blocks.last().map_or(0, |block| block.offset),
      reason: "blocks do not tile the arena",
    });
  }

  if let Some(stray) = next_free {
    return Err(HeapError::CorruptionDetected {
      offset: stray,
      reason: "free list entry is not a block boundary",
    });
  }

  Ok(blocks)
}
