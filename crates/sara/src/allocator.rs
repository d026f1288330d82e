//! The arena allocator: partitions a half-open byte range into fixed-size
//! arenas, tracks a bump head and an arena-granular reference count per
//! arena, and reclaims a whole arena at once when its reference count hits
//! zero.
//!
//! This is the one allocation primitive in the crate — [`crate::vector`],
//! [`crate::hashmap`], and [`crate::tree`] allocate exclusively through an
//! [`Allocator`]. See spec.md §4.2 for the line-by-line algorithm this
//! module implements.

use crate::error::{Error, Result};
use crate::memory::MemoryAccess;

/// Size of a single arena, in bytes — the largest value a 16-bit head or
/// reference count can represent.
pub const ARENA_SIZE: u32 = 65535;

/// Per-arena bookkeeping snapshot returned by [`Allocator::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorState {
    /// Total bytes allocated across all arenas (sum of `head`).
    pub allocated_bytes: u64,
    /// Total bytes not yet allocated across all arenas.
    pub unallocated_bytes: u64,
    /// Number of arenas with `head > 0`.
    pub occupied_arenas: usize,
    /// Number of arenas with `head == 0`.
    pub empty_arenas: usize,
    /// Sum of every arena's `ref_count`.
    pub total_ref_count: u64,
    /// The largest contiguous free block available in a single arena
    /// (`ARENA_SIZE − head`, maximized over arenas).
    pub largest_free_block: u32,
}

/// Partitions `[start_base, limit)` of a [`MemoryAccess`] store into
/// fixed-size arenas and bump-allocates within them.
///
/// The allocator carves its own bookkeeping (two parallel `u16` side tables,
/// `heads` and `ref_counts`) out of the front of the managed range; the
/// caller-visible floor is `start_base`, but the first byte actually
/// available for allocation is `start_base + 4 * arena_count`.
pub struct Allocator<M: MemoryAccess> {
    memory: M,
    start_base: i64,
    start: i64,
    limit: i64,
    arena_count: usize,
    heads_ptr: i64,
    ref_counts_ptr: i64,
    current_arena: usize,
}

impl<M: MemoryAccess> Allocator<M> {
    /// Partitions `[start_base, limit)` into arenas and zeroes both side
    /// tables through `memory`.
    ///
    /// `arena_count` is `(limit - start_base) / ARENA_SIZE`, computed before
    /// the side tables are carved out of the front of the range (spec.md
    /// §4.2) — so the last arena's usable span can extend a handful of
    /// bytes past `limit` once `4 * arena_count` bytes of header are
    /// subtracted from the front. `memory` should provide a little slack
    /// above `limit` to cover this.
    pub fn new(start_base: i64, limit: i64, memory: M) -> Result<Self> {
        let arena_count = ((limit - start_base) / i64::from(ARENA_SIZE)).max(0) as usize;
        let heads_ptr = start_base;
        let ref_counts_ptr = start_base + 2 * arena_count as i64;
        let start = start_base + 4 * arena_count as i64;

        let mut allocator = Self {
            memory,
            start_base,
            start,
            limit,
            arena_count,
            heads_ptr,
            ref_counts_ptr,
            current_arena: 0,
        };

        for i in 0..arena_count {
            allocator.write_head(i, 0);
            allocator.write_ref_count(i, 0);
        }

        sara_log::info!(
            "allocator initialized: {} arenas over [{}, {})",
            arena_count,
            start_base,
            limit
        );

        Ok(allocator)
    }

    /// The caller-visible floor of the managed range.
    #[must_use]
    pub const fn start_base(&self) -> i64 {
        self.start_base
    }

    /// The first byte offset actually available for allocation (past the
    /// side tables).
    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    /// The caller-visible ceiling of the managed range.
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.limit
    }

    /// The number of arenas the managed range was partitioned into.
    #[must_use]
    pub const fn arena_count(&self) -> usize {
        self.arena_count
    }

    /// The scan hint for the next allocation.
    #[must_use]
    pub const fn current_arena(&self) -> usize {
        self.current_arena
    }

    fn read_head(&self, arena: usize) -> u16 {
        self.memory.read(self.heads_ptr + 2 * arena as i64)
    }

    fn write_head(&mut self, arena: usize, value: u16) {
        self.memory.write(self.heads_ptr + 2 * arena as i64, value);
    }

    fn read_ref_count(&self, arena: usize) -> u16 {
        self.memory.read(self.ref_counts_ptr + 2 * arena as i64)
    }

    fn write_ref_count(&mut self, arena: usize, value: u16) {
        self.memory
            .write(self.ref_counts_ptr + 2 * arena as i64, value);
    }

    /// Resolves the arena index owning `ptr`.
    ///
    /// Preserves the reference implementation's strict `ptr > limit`
    /// (rather than `ptr >= limit`) bounds check, noted as a possibly-buggy
    /// but intentionally-unfixed behavior in spec.md §9: a pointer exactly
    /// at `limit` passes this check even though it addresses one byte past
    /// the last usable arena.
    fn arena_for_ptr(&self, ptr: i64) -> Result<usize> {
        if ptr < self.start || ptr > self.limit {
            return Err(Error::InvalidPointer { ptr });
        }
        let idx = ((ptr - self.start) / i64::from(ARENA_SIZE)) as usize;
        Ok(idx)
    }

    /// Bump-allocates `byte_count` bytes from the first arena (starting the
    /// circular scan at `current_arena`) with enough free space, and
    /// increments that arena's reference count.
    ///
    /// Fails with [`Error::AllocationTooLarge`] if `byte_count` exceeds
    /// [`ARENA_SIZE`], or [`Error::OutOfMemory`] if no arena fits.
    pub fn alloc(&mut self, byte_count: usize) -> Result<i64> {
        if byte_count > ARENA_SIZE as usize {
            return Err(Error::AllocationTooLarge {
                requested: byte_count,
                max: ARENA_SIZE as usize,
            });
        }

        if self.arena_count == 0 {
            return Err(Error::OutOfMemory {
                requested: byte_count,
            });
        }

        for step in 0..self.arena_count {
            let idx = (self.current_arena + step) % self.arena_count;
            let head = self.read_head(idx);
            if (head as usize) + byte_count <= ARENA_SIZE as usize {
                let old_head = head;
                let new_head = head + byte_count as u16;
                self.write_head(idx, new_head);

                let rc = self.read_ref_count(idx);
                self.write_ref_count(idx, rc.saturating_add(1));

                self.current_arena = idx;

                let ptr = self.start + idx as i64 * i64::from(ARENA_SIZE) + i64::from(old_head);
                sara_log::trace!("alloc({byte_count}) -> arena {idx}, ptr {ptr:#x}");
                return Ok(ptr);
            }
        }

        sara_log::warn!("alloc({byte_count}) failed: no arena has enough free space");
        Err(Error::OutOfMemory {
            requested: byte_count,
        })
    }

    /// Increments the reference count of the arena owning `ptr`.
    ///
    /// Fails with [`Error::InvalidPointer`] if `ptr` is out of range, or
    /// [`Error::RefCountSaturated`] if the arena's count is already
    /// `u16::MAX`.
    pub fn reference(&mut self, ptr: i64) -> Result<()> {
        let idx = self.arena_for_ptr(ptr)?;
        let rc = self.read_ref_count(idx);
        if rc == u16::MAX {
            return Err(Error::RefCountSaturated { arena: idx });
        }
        self.write_ref_count(idx, rc + 1);
        Ok(())
    }

    /// Decrements the reference count of the arena owning `ptr`. When the
    /// count reaches zero, the whole arena is reclaimed (`head` reset to
    /// `0`) and, if its index is below `current_arena`, the scan hint is
    /// biased toward it.
    ///
    /// Fails with [`Error::InvalidPointer`] if `ptr` is out of range, or
    /// [`Error::Overfree`] if the arena's count is already zero.
    pub fn deref(&mut self, ptr: i64) -> Result<()> {
        let idx = self.arena_for_ptr(ptr)?;
        let rc = self.read_ref_count(idx);
        if rc == 0 {
            return Err(Error::Overfree { arena: idx });
        }
        let rc = rc - 1;
        self.write_ref_count(idx, rc);
        if rc == 0 {
            self.write_head(idx, 0);
            if idx < self.current_arena {
                self.current_arena = idx;
            }
            sara_log::debug!("arena {idx} reclaimed (ref_count reached zero)");
        }
        Ok(())
    }

    /// Recomputes every arena's reference count from `live_ptrs`: zeroes
    /// every count, then increments the owning arena's count once per live
    /// pointer. Arenas with no live pointer are fully reclaimed
    /// (`head` reset to `0`); the scan hint is biased toward the lowest
    /// reclaimed index.
    ///
    /// Fails with [`Error::InvalidPointer`] on the first out-of-range
    /// pointer in `live_ptrs`.
    pub fn scan_and_sweep(&mut self, live_ptrs: &[i64]) -> Result<()> {
        for i in 0..self.arena_count {
            self.write_ref_count(i, 0);
        }

        for &ptr in live_ptrs {
            let idx = self.arena_for_ptr(ptr)?;
            let rc = self.read_ref_count(idx);
            self.write_ref_count(idx, rc.saturating_add(1));
        }

        for idx in (0..self.arena_count).rev() {
            if self.read_ref_count(idx) == 0 {
                self.write_head(idx, 0);
                self.current_arena = idx;
            }
        }

        sara_log::debug!(
            "scan_and_sweep: {} live pointers over {} arenas",
            live_ptrs.len(),
            self.arena_count
        );
        Ok(())
    }

    /// The arena the next allocation will be attempted against.
    #[must_use]
    pub fn arena_occupation(&self, arena: usize) -> Result<u16> {
        if arena >= self.arena_count {
            return Err(Error::IndexOutOfBounds {
                index: arena as u32,
                len: self.arena_count as u32,
            });
        }
        Ok(self.read_head(arena))
    }

    /// The current reference count of `arena`.
    pub fn arena_ref_count(&self, arena: usize) -> Result<u16> {
        if arena >= self.arena_count {
            return Err(Error::IndexOutOfBounds {
                index: arena as u32,
                len: self.arena_count as u32,
            });
        }
        Ok(self.read_ref_count(arena))
    }

    /// A summary snapshot of every arena's occupation and reference count.
    #[must_use]
    pub fn state(&self) -> AllocatorState {
        let mut state = AllocatorState::default();
        for i in 0..self.arena_count {
            let head = u64::from(self.read_head(i));
            let rc = u64::from(self.read_ref_count(i));

            state.allocated_bytes += head;
            state.total_ref_count += rc;
            if head > 0 {
                state.occupied_arenas += 1;
            } else {
                state.empty_arenas += 1;
            }
            let free = u64::from(ARENA_SIZE) - head;
            state.largest_free_block = state.largest_free_block.max(free as u32);
        }
        state.unallocated_bytes = self.arena_count as u64 * u64::from(ARENA_SIZE)
            - state.allocated_bytes;
        state
    }
}

impl<M: MemoryAccess> MemoryAccess for Allocator<M> {
    fn read<T: Copy>(&self, offset: i64) -> T {
        self.memory.read(offset)
    }

    fn write<T: Copy>(&mut self, offset: i64, value: T) {
        self.memory.write(offset, value);
    }

    fn write_compound<H: Copy, B: Copy>(&mut self, offset: i64, head: H, body: B) {
        self.memory.write_compound(offset, head, body);
    }

    fn read_compound<H: Copy, B: Copy>(&self, offset: i64) -> (H, B) {
        self.memory.read_compound(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::VecMemory;

    /// Builds a test allocator over `[0, size)` backed by a `VecMemory` with
    /// slack above `size`: arena_count is computed from the raw span
    /// `size / ARENA_SIZE` (spec.md §4.2), so the last arena's data can
    /// extend a few dozen bytes past `limit` once the side tables are
    /// carved out of the front. Real backing stores need the same slack.
    fn alloc(size: i64) -> Allocator<VecMemory> {
        Allocator::new(0, size, VecMemory::new(size as usize + 2 * ARENA_SIZE as usize)).unwrap()
    }

    #[test]
    fn test_construction_partitions_arenas() {
        let a = alloc(10 * 1024 * 1024);
        let expected = (10 * 1024 * 1024) / i64::from(ARENA_SIZE);
        assert_eq!(a.arena_count() as i64, expected);
        assert_eq!(a.current_arena(), 0);
    }

    #[test]
    fn test_basic_alloc_distinct_pointers() {
        let mut a = alloc(10 * 1024 * 1024);
        let p1 = a.alloc(256).unwrap();
        let p2 = a.alloc(256).unwrap();
        assert_ne!(p1, p2);
        assert_eq!(p2, p1 + 256);
    }

    #[test]
    fn test_alloc_too_large_fails() {
        let mut a = alloc(1024 * 1024);
        let err = a.alloc(ARENA_SIZE as usize + 1).unwrap_err();
        assert_eq!(
            err,
            Error::AllocationTooLarge {
                requested: ARENA_SIZE as usize + 1,
                max: ARENA_SIZE as usize
            }
        );
    }

    #[test]
    fn test_reference_and_deref_roundtrip() {
        let mut a = alloc(1024 * 1024);
        let p = a.alloc(1024).unwrap();
        a.reference(p).unwrap();
        assert_eq!(a.arena_ref_count(0).unwrap(), 2);
        a.deref(p).unwrap();
        assert_eq!(a.arena_ref_count(0).unwrap(), 1);
        a.deref(p).unwrap();
        assert_eq!(a.arena_ref_count(0).unwrap(), 0);
        assert_eq!(a.arena_occupation(0).unwrap(), 0);
    }

    #[test]
    fn test_overfree_fails() {
        let mut a = alloc(1024 * 1024);
        let p = a.alloc(16).unwrap();
        a.deref(p).unwrap();
        let err = a.deref(p).unwrap_err();
        assert_eq!(err, Error::Overfree { arena: 0 });
    }

    #[test]
    fn test_ref_count_saturation() {
        let mut a = alloc(1024 * 1024);
        let p = a.alloc(16).unwrap();
        for _ in 0..(u16::MAX - 1) {
            a.reference(p).unwrap();
        }
        let err = a.reference(p).unwrap_err();
        assert_eq!(err, Error::RefCountSaturated { arena: 0 });
    }

    #[test]
    fn test_invalid_pointer() {
        let mut a = alloc(1024 * 1024);
        assert_eq!(
            a.reference(-5).unwrap_err(),
            Error::InvalidPointer { ptr: -5 }
        );
        assert_eq!(
            a.deref(1_000_000_000).unwrap_err(),
            Error::InvalidPointer { ptr: 1_000_000_000 }
        );
    }

    #[test]
    fn test_arena_rollover() {
        let mut a = alloc(1024 * 1024);
        let _p1 = a.alloc(ARENA_SIZE as usize).unwrap();
        let arena_after_fill = a.current_arena();
        let _p2 = a.alloc(1024).unwrap();
        assert_ne!(a.current_arena(), arena_after_fill);
    }

    #[test]
    fn test_scan_and_sweep_reclaims_dead_arenas() {
        let mut a = alloc(1024 * 1024);
        let chunk = (ARENA_SIZE as usize / 4) + 1;
        let p1 = a.alloc(chunk).unwrap();
        let _p2 = a.alloc(chunk).unwrap();
        let _p3 = a.alloc(chunk).unwrap();
        let p4 = a.alloc(chunk).unwrap(); // spills into arena 1

        let arena1 = 0usize;
        let arena2 = 1usize;
        assert!(a.arena_ref_count(arena1).unwrap() > 0);
        assert!(a.arena_ref_count(arena2).unwrap() > 0);

        a.scan_and_sweep(&[p4]).unwrap();

        assert_eq!(a.arena_occupation(arena1).unwrap(), 0);
        assert_eq!(a.arena_ref_count(arena1).unwrap(), 0);
        assert!(a.arena_occupation(arena2).unwrap() > 0);
        assert_eq!(a.arena_ref_count(arena2).unwrap(), 1);
        let _ = p1;
    }

    #[test]
    fn test_state_summary() {
        let mut a = alloc(1024 * 1024);
        let p = a.alloc(1024).unwrap();
        a.reference(p).unwrap();
        let state = a.state();
        assert_eq!(state.allocated_bytes, 1024);
        assert_eq!(state.occupied_arenas, 1);
        assert_eq!(state.total_ref_count, 2);
        assert_eq!(state.largest_free_block, u64::from(ARENA_SIZE) as u32 - 1024);
    }

    #[test]
    fn test_memory_access_passthrough() {
        let mut a = alloc(1024 * 1024);
        let p = a.alloc(16).unwrap();
        a.write(p, 0xDEAD_BEEFu32);
        let value: u32 = a.read(p);
        assert_eq!(value, 0xDEAD_BEEF);
    }
}
