//! Error types for the arena allocator.

use std::io;

use thiserror::Error;

/// Failure of an [`ArenaProvider`](crate::arena::ArenaProvider) to hand out
/// backing memory.
#[derive(Error, Debug)]
pub enum ProviderError {
  /// `mmap(2)` refused the mapping.
  #[error("failed to map {size} bytes: {source}")]
  Map {
    /// Length of the requested mapping.
    size: usize,
    /// OS error reported by the kernel.
    #[source]
    source: io::Error,
  },

  /// The rounded size cannot be described as a memory layout.
  #[error("no valid layout for {size} bytes")]
  Layout {
    /// Requested size after page rounding.
    size: usize,
  },

  /// The global allocator returned null.
  #[error("out of memory reserving {size} bytes")]
  OutOfMemory {
    /// Requested size after page rounding.
    size: usize,
  },

  /// A custom provider declined the request.
  #[error("provider refused to reserve {requested} bytes")]
  Refused {
    /// Minimum size asked for by the allocator.
    requested: usize,
  },
}

/// The main error type for allocator operations.
#[derive(Error, Debug)]
pub enum HeapError {
  /// `init` was called on an allocator that already owns an arena.
  #[error("allocator is already initialized")]
  AlreadyInitialized,

  /// `init` was called with a capacity of zero or one above `isize::MAX`.
  #[error("invalid arena capacity {capacity}")]
  InvalidSize {
    /// The rejected capacity.
    capacity: usize,
  },

  /// The arena provider could not supply backing memory.
  #[error("arena provider failed: {0}")]
  Provider(#[from] ProviderError),

  /// The operation needs an arena but `init` has not succeeded yet.
  #[error("allocator is not initialized")]
  Uninitialized,

  /// A released pointer does not address a payload inside the arena.
  #[error("address {address:#x} does not belong to the arena")]
  ForeignPointer {
    /// The offending address.
    address: usize,
  },

  /// A header access fell outside the arena or off the word grid.
  #[error("header access at offset {offset} outside arena of {capacity} bytes")]
  OutOfBounds {
    /// Byte offset of the access.
    offset: usize,
    /// Arena length in bytes.
    capacity: usize,
  },

  /// Block metadata is inconsistent.
  #[error("heap corruption detected at offset {offset}: {reason}")]
  CorruptionDetected {
    /// Byte offset of the offending header.
    offset: usize,
    /// What check failed.
    reason: &'static str,
  },
}

pub type Result<T> = std::result::Result<T, HeapError>;
