//! # rarena - A Fixed-Arena Free-List Allocator
//!
//! This crate provides a user-space **free-list allocator** that manages one
//! fixed-size arena reserved once from the operating system, with a
//! selectable block-placement strategy.
//!
//! ## Overview
//!
//! The arena is carved into variable-size blocks. Every block starts with a
//! header; free blocks are chained in a singly linked list kept in ascending
//! address order:
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │   ┌────┬──────┬────┬────┬────┬──────────┬────┬──────────────────┐    │
//!   │   │ H  │ used │ H  │free│ H  │   used   │ H  │       free       │    │
//!   │   └────┴──────┴────┴────┴────┴──────────┴────┴──────────────────┘    │
//!   │   ▲             ▲ │                        ▲                         │
//!   │   │             │ └───────── next ─────────┘                         │
//!   │  base          head                                                  │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   The arena never grows: when no free block fits, allocation fails.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rarena
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - Arena, ArenaProvider, MmapProvider, HeapProvider
//!   ├── block      - Header encoding and free-list walking (internal)
//!   ├── strategy   - First-, Best-, Worst- and Next-Fit placement
//!   ├── split      - Block splitting (internal)
//!   ├── coalesce   - Address-ordered reinsertion and merging (internal)
//!   ├── free_list  - FreeListAllocator
//!   ├── inspect    - Free-list dumps, heap walks, statistics
//!   ├── config     - Initialization settings
//!   └── error      - HeapError, ProviderError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rarena::{FreeListAllocator, Strategy};
//!
//! let mut allocator = FreeListAllocator::new();
//! allocator.init(4096, Strategy::BestFit).unwrap();
//!
//! let ptr = allocator.allocate(40).unwrap();
//!
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 40) };
//!
//! allocator.release(Some(ptr)).unwrap();
//! ```
//!
//! ## How It Works
//!
//! Each block is a 16-byte header followed by its payload. The header holds
//! the payload size; free blocks also use the second word as the link to the
//! next free block:
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │           Payload              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ next: offset    │  │  │     N bytes, N % 8 == 0  │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      16 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Allocating aligns the request to 8 bytes, lets the placement strategy pick
//! a free block, splits off the tail if it can still hold a header plus
//! payload, and unlinks the block:
//!
//! ```text
//!   Splitting a 4080-byte block for a 40-byte request:
//!
//!   before  ┌────┬───────────────────────────────────────────────┐
//!           │ H  │                    4080                       │
//!           └────┴───────────────────────────────────────────────┘
//!   after   ┌────┬──────┬────┬───────────────────────────────────┐
//!           │ H  │  40  │ H  │              4024                 │
//!           └────┴──────┴────┴───────────────────────────────────┘
//!             used        free (takes the old block's list slot)
//! ```
//!
//! Releasing walks the free list to the released block's address and merges
//! it with a free block ending right before it, one starting right after it,
//! or both:
//!
//! ```text
//!   ┌────┬──────┬────┬──────┬────┬──────┐       ┌────┬──────────────────────┐
//!   │ H  │ free │ H  │ rel. │ H  │ free │  ──►  │ H  │        free          │
//!   └────┴──────┴────┴──────┴────┴──────┘       └────┴──────────────────────┘
//! ```
//!
//! ## Placement Strategies
//!
//! | Strategy  | Picks                                              |
//! |-----------|----------------------------------------------------|
//! | First-Fit | the lowest-address block that fits                 |
//! | Best-Fit  | the smallest leftover; an exact fit stops the scan |
//! | Worst-Fit | the largest leftover                               |
//! | Next-Fit  | the first fit at or after the previous placement   |
//!
//! Next-Fit does not wrap around within one call: if nothing fits between the
//! cursor and the end of the list the call fails and the cursor rewinds to
//! the head for the next call.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives. Sharing an
//!   allocator across threads needs one lock around every call.
//! - **Fixed arena**: The arena is never grown or shrunk.
//! - **No resizing**: There is no `realloc`.
//! - **Trusting release**: Outside hardened mode, releasing a pointer twice or
//!   one that did not come from `allocate` corrupts the free list.
//! - **Unix-only**: `MmapProvider` requires `libc` and `mmap(2)`.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and never installs a logger.
//! Arena set-up is reported at `debug`, every split, merge and placement at
//! `trace`.

pub mod align;
pub mod arena;
mod block;
mod coalesce;
pub mod config;
pub mod error;
mod free_list;
pub mod inspect;
mod split;
pub mod strategy;

pub use arena::{Arena, ArenaProvider, HeapProvider, MmapProvider, page_size};
pub use block::{FreeBlocks, FreeEntry, HEADER_SIZE};
pub use config::Config;
pub use error::{HeapError, ProviderError};
pub use free_list::FreeListAllocator;
pub use inspect::{BlockInfo, BlockSummary, HeapStats, Inspector, LogInspector};
pub use strategy::{BestFit, FirstFit, Fit, NextFit, Placement, Strategy, WorstFit};
