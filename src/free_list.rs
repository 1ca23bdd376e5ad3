use std::ptr::NonNull;

use log::{debug, error, trace, warn};

use crate::{
  align::ALIGNMENT,
  arena::{Arena, ArenaProvider, MmapProvider},
  block::{self, Block, FreeBlocks, HEADER_SIZE},
  coalesce::coalesce,
  config::Config,
  error::{HeapError, ProviderError, Result},
  inspect::{self, BlockInfo, BlockSummary, HeapStats, Inspector},
  split::split,
  strategy::{Placement, Strategy},
};

/// Written into the `next` slot of allocated blocks in hardened mode.
const CANARY: u64 = 0xA110_CA7E_DB10_C000;

struct Heap {
  arena: Arena,
  head: Option<usize>,
  placement: Box<dyn Placement>,
  hardened: bool,
}

/// Free-list allocator over a single fixed arena.
///
/// The allocator starts out empty; [`init`](Self::init) reserves the arena
/// from the provider exactly once. Pointers returned by
/// [`allocate`](Self::allocate) stay valid until they are released or the
/// allocator is dropped, whichever comes first.
pub struct FreeListAllocator<P: ArenaProvider = MmapProvider> {
  provider: P,
  heap: Option<Heap>,
}

impl FreeListAllocator {
  pub fn new() -> Self {
    Self::with_provider(MmapProvider)
  }
}

impl Default for FreeListAllocator {
  fn default() -> Self {
    Self::new()
  }
}

impl<P: ArenaProvider> FreeListAllocator<P> {
  pub fn with_provider(provider: P) -> Self {
    Self { provider, heap: None }
  }

  /// Reserves an arena of at least `capacity` bytes and covers it with one
  /// free block.
  pub fn init(
    &mut self,
    capacity: usize,
    strategy: Strategy,
  ) -> Result<()> {
    self.init_with(&Config::new(capacity, strategy))
  }

  pub fn init_with(
    &mut self,
    config: &Config,
  ) -> Result<()> {
    self.init_with_placement(config, config.strategy.placement())
  }

  /// Like [`init_with`](Self::init_with), but with a caller-supplied
  /// placement policy in place of `config.strategy`.
  pub fn init_with_placement(
    &mut self,
    config: &Config,
    placement: Box<dyn Placement>,
  ) -> Result<()> {
    if self.heap.is_some() {
      return Err(HeapError::AlreadyInitialized);
    }

    if config.capacity == 0 || config.capacity > isize::MAX as usize {
      return Err(HeapError::InvalidSize {
        capacity: config.capacity,
      });
    }

    let mut arena = self.provider.reserve(config.capacity).inspect_err(|err| {
      warn!("arena reservation of {} bytes failed: {}", config.capacity, err);
    })?;

    let len = arena.len();
    if len < config.capacity || len <= HEADER_SIZE || len % ALIGNMENT != 0 {
      return Err(ProviderError::Layout { size: len }.into());
    }

    Block::new(len - HEADER_SIZE, None).write(&mut arena, 0)?;

    debug!(
      "initialized {}-byte arena at {:?} ({}, hardened: {})",
      len,
      arena.base(),
      placement.name(),
      config.hardened
    );

    self.heap = Some(Heap {
      arena,
      head: Some(0),
      placement,
      hardened: config.hardened,
    });

    Ok(())
  }

  pub fn is_initialized(&self) -> bool {
    self.heap.is_some()
  }

  /// Arena length in bytes.
  pub fn capacity(&self) -> Option<usize> {
    self.heap.as_ref().map(|heap| heap.arena.len())
  }

  pub fn base(&self) -> Option<NonNull<u8>> {
    self.heap.as_ref().map(|heap| heap.arena.base())
  }

  pub fn placement_name(&self) -> Option<&'static str> {
    self.heap.as_ref().map(|heap| heap.placement.name())
  }

  /// Hands out at least `size` bytes, 8-byte aligned.
  ///
  /// Returns `None` when no free block is large enough, in which case the
  /// free list is left as it was. An uninitialized allocator never fits.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let heap = self.heap.as_mut()?;

    heap.allocate(size).unwrap_or_else(|err| {
      error!("allocate({}) aborted: {}", size, err);
      None
    })
  }

  /// Gives a block back to the free list, merging it with free neighbours.
  ///
  /// `None` is a no-op. The pointer must come from [`allocate`](Self::allocate)
  /// on this allocator and must not have been released already; outside
  /// hardened mode only pointers that miss the arena are rejected.
  pub fn release(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) -> Result<()> {
    let Some(ptr) = ptr else {
      return Ok(());
    };

    let heap = self.heap.as_mut().ok_or(HeapError::Uninitialized)?;

    heap.release(ptr).inspect_err(|err| {
      warn!("release of {:?} rejected: {}", ptr, err);
    })
  }

  /// Free list snapshot, head first.
  pub fn dump(&self) -> Result<Vec<BlockInfo>> {
    match &self.heap {
      Some(heap) => inspect::dump(&heap.arena, heap.head),
      None => Ok(Vec::new()),
    }
  }

  pub fn inspect(
    &self,
    inspector: &mut dyn Inspector,
  ) -> Result<()> {
    let blocks = self.dump()?;
    inspector.inspect(&blocks);
    Ok(())
  }

  /// Every block in address order, free and allocated.
  pub fn heap_walk(&self) -> Result<Vec<BlockSummary>> {
    let heap = self.heap.as_ref().ok_or(HeapError::Uninitialized)?;
    inspect::walk(&heap.arena, heap.head)
  }

  pub fn stats(&self) -> Result<HeapStats> {
    let heap = self.heap.as_ref().ok_or(HeapError::Uninitialized)?;
    let blocks = inspect::walk(&heap.arena, heap.head)?;

    Ok(HeapStats::from_blocks(heap.arena.len(), &blocks))
  }
}

impl Heap {
  fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    let Some(required) = crate::align!(size) else {
      trace!("allocate({}): size overflows alignment", size);
      return Ok(None);
    };

    let candidates = FreeBlocks::new(&self.arena, self.head);
    let Some(fit) = self.placement.find(candidates, required)? else {
      trace!("allocate({}): no fit for {} bytes", size, required);
      return Ok(None);
    };

    split(&mut self.arena, fit.offset, required)?;

    // After a split `next` is the remainder, which takes the block's place.
    let block = Block::read(&self.arena, fit.offset)?;
    match fit.prev {
      Some(prev) => block::set_next(&mut self.arena, prev, block.next)?,
      None => self.head = block.next,
    }

    if self.hardened {
      block::write_next_raw(&mut self.arena, fit.offset, CANARY)?;
    }

    self.placement.placed(&fit, block::end(fit.offset, block.size));

    trace!(
      "allocate({}): block {} with {} bytes via {}",
      size,
      fit.offset,
      block.size,
      self.placement.name()
    );

    self.arena.ptr_at(block::payload(fit.offset)).map(Some)
  }

  fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<()> {
    let address = ptr.as_ptr() as usize;

    let payload = self
      .arena
      .offset_of(ptr.as_ptr())
      .filter(|&payload| payload >= HEADER_SIZE && payload % ALIGNMENT == 0)
      .ok_or(HeapError::ForeignPointer { address })?;
    let offset = payload - HEADER_SIZE;

    if self.hardened {
      self.verify_allocated(offset)?;
      block::set_next(&mut self.arena, offset, None)?;
    }

    self.head = Some(coalesce(&mut self.arena, self.head, offset)?);
    trace!("release {:?}: block {} back on the free list", ptr, offset);

    Ok(())
  }

  fn verify_allocated(
    &self,
    offset: usize,
  ) -> Result<()> {
    if block::read_next_raw(&self.arena, offset)? != CANARY {
      return Err(HeapError::CorruptionDetected {
        offset,
        reason: "allocation canary missing (double release or foreign pointer)",
      });
    }

    let size = Block::read(&self.arena, offset)?.size;
    if size % ALIGNMENT != 0 || block::end(offset, size) > self.arena.len() {
      return Err(HeapError::CorruptionDetected {
        offset,
        reason: "allocated block size out of range",
      });
    }

    Ok(())
  }
}
