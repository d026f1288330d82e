//! SArA: an arena-based region allocator and its containers for
//! byte-addressable memory with no host heap allocator.
//!
//! SArA targets embedded-class environments where the only primitive
//! available to user code is an externally supplied, contiguous,
//! byte-addressable region of memory. There is no host heap allocator,
//! garbage collector, or async runtime underneath any of it.
//!
//! # Architecture
//!
//! - **[`memory`]** — the `MemoryAccess` contract: typed reads/writes of
//!   plain-old-data at a byte offset, plus a combined head-then-body write.
//!   A `Vec<u8>`-backed reference implementation (`VecMemory`) is included
//!   for tests; a real embedded caller plugs in its own byte store.
//! - **[`allocator`]** — partitions `[start, limit)` into fixed-size
//!   arenas, bump-allocates within them, and reclaims a whole arena at once
//!   when its reference count drops to zero.
//! - **[`vector`]** — a chunked, skip-indexed dynamic array allocated
//!   entirely through an `Allocator`.
//! - **[`hashmap`]** — a Robin-Hood hash map over `u64` keys/values, stored
//!   in a `Vector<Entry>`.
//! - **[`tree`]** — a first-child/next-sibling k-way tree of fixed-size
//!   nodes.
//! - **[`ptr`]** — the `-1`-sentinel pointer newtype shared by every
//!   container's on-wire layout.
//! - **[`error`]** — the `Result<T>`/`Error` pair every fallible operation
//!   in this crate returns.
//!
//! # Example
//!
//! ```
//! use sara::allocator::Allocator;
//! use sara::memory::VecMemory;
//! use sara::vector::Vector;
//!
//! let mut alloc = Allocator::new(0, 1024 * 1024, VecMemory::new(2 * 1024 * 1024)).unwrap();
//! let mut v: Vector<u32> = Vector::new(&mut alloc).unwrap();
//! v.push(&mut alloc, 42).unwrap();
//! assert_eq!(v.get(&mut alloc, 0).unwrap(), 42);
//! ```
//!
//! # Non-goals
//!
//! Defragmentation, compaction, concurrent access, cross-arena allocations,
//! per-pointer reference counts, and protection against double-free or
//! use-after-free are all explicitly out of scope — the allocator tracks
//! references at arena granularity only, and misuse of a dangling pointer
//! is a user bug, not something this crate detects.

pub mod allocator;
pub mod error;
pub mod hashmap;
pub mod memory;
pub mod ptr;
pub mod tree;
pub mod vector;

pub use allocator::{ARENA_SIZE, Allocator, AllocatorState};
pub use error::{Error, Result};
pub use hashmap::{FxKeyHasher, KeyHasher, TaggedHashMap};
pub use memory::{MemoryAccess, ShiftedMemory, VecMemory};
pub use ptr::Ptr;
pub use tree::Tree;
pub use vector::Vector;
