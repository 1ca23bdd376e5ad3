//! Placement policies deciding which free block serves a request.

use std::fmt;

use crate::{
  block::{self, FreeBlocks},
  error::Result,
};

/// A free block chosen to satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fit {
  /// Header offset of the chosen block.
  pub offset: usize,
  /// Header offset of its free-list predecessor, `None` if it is the head.
  pub prev: Option<usize>,
  /// Payload size of the chosen block before splitting.
  pub size: usize,
}

/// Policy selecting a free block for an aligned request.
///
/// `find` scans the list but never mutates it. `placed` is called once the
/// allocator has carved the block, with the offset just past the allocation.
pub trait Placement: fmt::Debug {
  fn name(&self) -> &'static str;

  fn find(
    &mut self,
    blocks: FreeBlocks<'_>,
    required: usize,
  ) -> Result<Option<Fit>>;

  fn placed(
    &mut self,
    _fit: &Fit,
    _end: usize,
  ) {
  }
}

/// Lowest-address block that is large enough.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstFit;

impl Placement for FirstFit {
  fn name(&self) -> &'static str {
    "first-fit"
  }

  fn find(
    &mut self,
    blocks: FreeBlocks<'_>,
    required: usize,
  ) -> Result<Option<Fit>> {
    for entry in blocks {
      let entry = entry?;

      if entry.size >= required {
        return Ok(Some(Fit {
          offset: entry.offset,
          prev: entry.prev,
          size: entry.size,
        }));
      }
    }

    Ok(None)
  }
}

/// Block leaving the smallest leftover. An exact fit ends the scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct BestFit;

impl Placement for BestFit {
  fn name(&self) -> &'static str {
    "best-fit"
  }

  fn find(
    &mut self,
    blocks: FreeBlocks<'_>,
    required: usize,
  ) -> Result<Option<Fit>> {
    let mut best: Option<(usize, Fit)> = None;

    for entry in blocks {
      let entry = entry?;

      if entry.size < required {
        continue;
      }

      let leftover = entry.size - required;
      let fit = Fit {
        offset: entry.offset,
        prev: entry.prev,
        size: entry.size,
      };

      if leftover == 0 {
        return Ok(Some(fit));
      }

      if best.is_none_or(|(smallest, _)| leftover < smallest) {
        best = Some((leftover, fit));
      }
    }

    Ok(best.map(|(_, fit)| fit))
  }
}

/// Block leaving the largest leftover.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorstFit;

impl Placement for WorstFit {
  fn name(&self) -> &'static str {
    "worst-fit"
  }

  fn find(
    &mut self,
    blocks: FreeBlocks<'_>,
    required: usize,
  ) -> Result<Option<Fit>> {
    let mut worst: Option<(usize, Fit)> = None;

    for entry in blocks {
      let entry = entry?;

      if entry.size < required {
        continue;
      }

      let leftover = entry.size - required;

      if worst.is_none_or(|(largest, _)| leftover > largest) {
        worst = Some((
          leftover,
          Fit {
            offset: entry.offset,
            prev: entry.prev,
            size: entry.size,
          },
        ));
      }
    }

    Ok(worst.map(|(_, fit)| fit))
  }
}

/// First fit resuming where the previous placement ended.
///
/// The scan starts at the free block holding the cursor, or the first one
/// past it, and runs to the end of the list only. When it comes up empty the
/// cursor goes back to the head, so a block wholly below the cursor is found
/// on the following call, not this one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NextFit {
  cursor: usize,
}

impl Placement for NextFit {
  fn name(&self) -> &'static str {
    "next-fit"
  }

  fn find(
    &mut self,
    blocks: FreeBlocks<'_>,
    required: usize,
  ) -> Result<Option<Fit>> {
    for entry in blocks {
      let entry = entry?;

      // A release may have merged the cursor into a block starting below it.
      if block::end(entry.offset, entry.size) <= self.cursor {
        continue;
      }

      if entry.size >= required {
        return Ok(Some(Fit {
          offset: entry.offset,
          prev: entry.prev,
          size: entry.size,
        }));
      }
    }

    self.cursor = 0;
    Ok(None)
  }

  fn placed(
    &mut self,
    _fit: &Fit,
    end: usize,
  ) {
    self.cursor = end;
  }
}

/// Built-in placement policies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
  #[default]
  FirstFit,
  BestFit,
  WorstFit,
  NextFit,
}

impl Strategy {
  pub const ALL: [Strategy; 4] = [
    Strategy::FirstFit,
    Strategy::BestFit,
    Strategy::WorstFit,
    Strategy::NextFit,
  ];

  /// Builds a fresh policy instance, with Next-Fit's cursor at the head.
  pub fn placement(self) -> Box<dyn Placement> {
    match self {
      Strategy::FirstFit => Box::new(FirstFit),
      Strategy::BestFit => Box::new(BestFit),
      Strategy::WorstFit => Box::new(WorstFit),
      Strategy::NextFit => Box::new(NextFit::default()),
    }
  }
}

impl fmt::Display for Strategy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.placement().name())
  }
}
