//! Backing memory for the allocator.
//!
//! An [`Arena`] is a zero-filled, page-aligned byte range obtained once from
//! an [`ArenaProvider`]. The allocator never touches it through raw pointers
//! directly: every header access goes through the word accessors below, which
//! check bounds and alignment against the arena's offset space.

use std::{alloc, ptr::NonNull};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void};
use log::{debug, warn};

use crate::{
  align_to,
  error::{HeapError, ProviderError, Result},
};

/// Fallback when `sysconf` cannot report a page size.
const DEFAULT_PAGE_SIZE: usize = 4096;

const WORD: usize = size_of::<u64>();

/// Returns the OS page size.
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if size <= 0 {
    DEFAULT_PAGE_SIZE
  } else {
    size as usize
  }
}

enum Backing {
  Mapped,
  Heap(alloc::Layout),
}

/// A fixed byte range exclusively owned by one allocator.
pub struct Arena {
  base: NonNull<u8>,
  len: usize,
  backing: Backing,
}

impl Arena {
  /// Maps at least `min_bytes` of private, anonymous, zero-filled memory,
  /// rounded up to the OS page size.
  pub fn mapped(min_bytes: usize) -> std::result::Result<Self, ProviderError> {
    let size = align_to!(min_bytes, page_size()).ok_or(ProviderError::Layout { size: min_bytes })?;

    if size == 0 {
      return Err(ProviderError::Layout { size });
    }

    let address = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      let source = std::io::Error::last_os_error();
      warn!("mmap of {} bytes failed: {}", size, source);
      return Err(ProviderError::Map { size, source });
    }

    let base = NonNull::new(address as *mut u8).ok_or(ProviderError::OutOfMemory { size })?;
    debug!("mapped arena of {} bytes at {:?}", size, base);

    Ok(Self {
      base,
      len: size,
      backing: Backing::Mapped,
    })
  }

  /// Takes at least `min_bytes` of zeroed memory from the global allocator,
  /// rounded up to and aligned on `page_size`.
  pub fn zeroed(
    min_bytes: usize,
    page_size: usize,
  ) -> std::result::Result<Self, ProviderError> {
    if !page_size.is_power_of_two() || page_size < WORD {
      return Err(ProviderError::Layout { size: min_bytes });
    }

    let size = align_to!(min_bytes, page_size).ok_or(ProviderError::Layout { size: min_bytes })?;

    if size == 0 {
      return Err(ProviderError::Layout { size });
    }

    let layout = alloc::Layout::from_size_align(size, page_size).map_err(|_| ProviderError::Layout { size })?;

    // Safety: `layout` has a non-zero size.
    let address = unsafe { alloc::alloc_zeroed(layout) };
    let base = NonNull::new(address).ok_or(ProviderError::OutOfMemory { size })?;
    debug!("reserved heap-backed arena of {} bytes at {:?}", size, base);

    Ok(Self {
      base,
      len: size,
      backing: Backing::Heap(layout),
    })
  }

  /// Length of the arena in bytes.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Address of the first byte.
  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  /// Pointer to the byte at `offset`. `offset` may equal the length.
  pub(crate) fn ptr_at(
    &self,
    offset: usize,
  ) -> Result<NonNull<u8>> {
    if offset > self.len {
      return Err(self.out_of_bounds(offset));
    }

    // Safety: `offset` is within the allocation or one past its end.
    Ok(unsafe { self.base.add(offset) })
  }

  /// Maps an address back to its offset, if it lies inside the arena.
  pub fn offset_of(
    &self,
    address: *const u8,
  ) -> Option<usize> {
    let start = self.base.as_ptr() as usize;
    let address = address as usize;

    if address < start || address >= start + self.len {
      return None;
    }

    Some(address - start)
  }

  /// Reads the 64-bit word at `offset`.
  pub(crate) fn read_word(
    &self,
    offset: usize,
  ) -> Result<u64> {
    self.check_word(offset)?;

    // Safety: the word lies inside the arena and is 8-byte aligned because the
    // base is page aligned and `offset` is a multiple of 8.
    Ok(unsafe { self.base.as_ptr().add(offset).cast::<u64>().read() })
  }

  /// Writes the 64-bit word at `offset`.
  pub(crate) fn write_word(
    &mut self,
    offset: usize,
    value: u64,
  ) -> Result<()> {
    self.check_word(offset)?;

    // Safety: see `read_word`.
    unsafe { self.base.as_ptr().add(offset).cast::<u64>().write(value) };
    Ok(())
  }

  fn check_word(
    &self,
    offset: usize,
  ) -> Result<()> {
    let fits = offset.checked_add(WORD).is_some_and(|end| end <= self.len);

    if offset % WORD != 0 || !fits {
      return Err(self.out_of_bounds(offset));
    }

    Ok(())
  }

  fn out_of_bounds(
    &self,
    offset: usize,
  ) -> HeapError {
    HeapError::OutOfBounds {
      offset,
      capacity: self.len,
    }
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    match self.backing {
      Backing::Mapped => unsafe {
        if libc::munmap(self.base.as_ptr() as *mut c_void, self.len) != 0 {
          warn!("munmap of arena at {:?} failed", self.base);
        }
      },
      // Safety: the pointer came from `alloc_zeroed` with this same layout.
      Backing::Heap(layout) => unsafe { alloc::dealloc(self.base.as_ptr(), layout) },
    }
  }
}

impl std::fmt::Debug for Arena {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("Arena")
      .field("base", &self.base)
      .field("len", &self.len)
      .finish()
  }
}

/// Source of the arena handed to the allocator at initialization.
///
/// Implementations must return a zero-initialized buffer whose length is a
/// page multiple of at least `min_bytes`.
pub trait ArenaProvider {
  fn reserve(
    &self,
    min_bytes: usize,
  ) -> std::result::Result<Arena, ProviderError>;
}

/// Reserves arenas with `mmap(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapProvider;

impl ArenaProvider for MmapProvider {
  fn reserve(
    &self,
    min_bytes: usize,
  ) -> std::result::Result<Arena, ProviderError> {
    Arena::mapped(min_bytes)
  }
}

/// Reserves arenas from the global allocator with a fixed page size.
#[derive(Debug, Clone, Copy)]
pub struct HeapProvider {
  page_size: usize,
}

impl HeapProvider {
  pub fn new() -> Self {
    Self::with_page_size(page_size())
  }

  pub fn with_page_size(page_size: usize) -> Self {
    Self { page_size }
  }
}

impl Default for HeapProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl ArenaProvider for HeapProvider {
  fn reserve(
    &self,
    min_bytes: usize,
  ) -> std::result::Result<Arena, ProviderError> {
    Arena::zeroed(min_bytes, self.page_size)
  }
}
