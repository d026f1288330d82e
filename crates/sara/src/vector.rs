//! A chunked, skip-indexed dynamic array allocated entirely through an
//! [`Allocator`].
//!
//! `Vector<T>` is the hardest non-allocator component in this crate (see
//! spec.md §2): elements live in a singly-linked chain of arena-sized
//! chunks, and random access is accelerated by a sparse, lazily-rebuilt
//! "skip table" mapping chunk number to chunk pointer. A chunk is one
//! allocator allocation, so dereffing a chunk reclaims a whole arena of
//! capacity — the vector is deliberately shaped to line up with the
//! allocator's reclamation granularity.
//!
//! Every operation takes `&mut Allocator<M>` explicitly: `Vector<T>` itself
//! holds only the byte offsets and scalar counters spec.md §3.4 describes,
//! never a reference to the backing memory. See `DESIGN.md` for why.

use std::marker::PhantomData;

use crate::allocator::{ARENA_SIZE, Allocator};
use crate::error::{Error, Result};
use crate::memory::MemoryAccess;
use crate::ptr::Ptr;

/// Upper bound on elements packed into one chunk, before the
/// `(ARENA_SIZE - 8) / size_of::<T>()` ceiling kicks in.
pub const TARGET_ELEMS_PER_CHUNK: usize = 64;

/// Maximum number of sampled entries the skip table will ever hold.
pub const SKIP_TABLE_SIZE_LIMIT: usize = 256;

/// On-wire size of one skip-table entry: a `u32` chunk index followed by an
/// `i64` chunk pointer.
const SKIP_ELEM_SIZE: usize = 12;

/// Number of consecutive chunk-chain hops `find_nearest_chunk` will walk
/// before concluding the skip table should be refreshed.
const WALK_DIRTY_THRESHOLD: usize = 5;

/// A chunked, skip-indexed dynamic array of `T`, allocated via an
/// [`Allocator`].
///
/// `T` must be `Copy` plain-old-data whose size fits within one chunk
/// (`size_of::<T>() <= ARENA_SIZE - 8`).
pub struct Vector<T> {
    elems_per_chunk: usize,
    element_count: u32,
    base_chunk: Ptr,
    end_chunk: Ptr,
    skip_table: Ptr,
    skip_entries: i32,
    skip_table_dirty: bool,
    rebuilding: bool,
    _marker: PhantomData<T>,
}

impl<T: Copy> Vector<T> {
    /// Allocates the first chunk and constructs an empty vector.
    ///
    /// Fails with [`Error::ConstructionFailed`] if `size_of::<T>()` doesn't
    /// leave room for at least two elements per chunk, or if the first
    /// chunk allocation fails.
    pub fn new<M: MemoryAccess>(alloc: &mut Allocator<M>) -> Result<Self> {
        let elem_size = size_of::<T>();
        if elem_size == 0 || elem_size > ARENA_SIZE as usize - 8 {
            return Err(Error::ConstructionFailed);
        }

        let elems_per_chunk = TARGET_ELEMS_PER_CHUNK.min((ARENA_SIZE as usize - 8) / elem_size);
        if elems_per_chunk <= 1 {
            return Err(Error::ConstructionFailed);
        }

        let chunk_bytes = 8 + elems_per_chunk * elem_size;
        let first_chunk = alloc.alloc(chunk_bytes)?;
        alloc.write::<i64>(first_chunk, -1);

        let mut vector = Self {
            elems_per_chunk,
            element_count: 0,
            base_chunk: Ptr::new(first_chunk),
            end_chunk: Ptr::new(first_chunk),
            skip_table: Ptr::NONE,
            skip_entries: 0,
            skip_table_dirty: false,
            rebuilding: false,
            _marker: PhantomData,
        };
        // No-op for a one-chunk chain, but run it anyway so behavior stays
        // uniform with every other growth path.
        vector.rebuild_skip_table(alloc)?;
        Ok(vector)
    }

    /// Number of elements currently stored.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.element_count
    }

    /// `true` if the vector holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    /// Number of elements packed into each chunk.
    #[must_use]
    pub const fn elems_per_chunk(&self) -> usize {
        self.elems_per_chunk
    }

    fn chunk_byte_size(&self) -> usize {
        8 + self.elems_per_chunk * size_of::<T>()
    }

    fn slot_offset(chunk: Ptr, in_chunk_index: usize) -> i64 {
        chunk.offset() + 8 + (in_chunk_index * size_of::<T>()) as i64
    }

    /// Appends `value` at the end, allocating a new chunk first if the
    /// current last chunk is full.
    pub fn push<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, value: T) -> Result<()> {
        let in_chunk_index = self.element_count as usize % self.elems_per_chunk;
        if in_chunk_index == 0 && self.element_count > 0 {
            self.new_chunk(alloc)?;
        }
        let offset = Self::slot_offset(self.end_chunk, in_chunk_index);
        alloc.write(offset, value);
        self.element_count += 1;
        Ok(())
    }

    /// Reads the element at logical index `index`.
    pub fn get<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, index: u32) -> Result<T> {
        if index >= self.element_count {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.element_count,
            });
        }
        let (found, chunk, _) = self.find_nearest_chunk(alloc, index)?;
        debug_assert!(found, "index already validated against element_count");
        let in_chunk_index = index as usize % self.elems_per_chunk;
        Ok(alloc.read(Self::slot_offset(chunk, in_chunk_index)))
    }

    /// Overwrites the element at logical index `index`, returning the
    /// previous value.
    pub fn set<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        index: u32,
        value: T,
    ) -> Result<T> {
        if index >= self.element_count {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.element_count,
            });
        }
        let (found, chunk, _) = self.find_nearest_chunk(alloc, index)?;
        debug_assert!(found, "index already validated against element_count");
        let in_chunk_index = index as usize % self.elems_per_chunk;
        let offset = Self::slot_offset(chunk, in_chunk_index);
        let old = alloc.read(offset);
        alloc.write(offset, value);
        Ok(old)
    }

    /// Swaps the elements at logical indices `i` and `j`.
    pub fn swap<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, i: u32, j: u32) -> Result<()> {
        if i >= self.element_count {
            return Err(Error::IndexOutOfBounds {
                index: i,
                len: self.element_count,
            });
        }
        if j >= self.element_count {
            return Err(Error::IndexOutOfBounds {
                index: j,
                len: self.element_count,
            });
        }
        let (_, chunk_i, _) = self.find_nearest_chunk(alloc, i)?;
        let offset_i = Self::slot_offset(chunk_i, i as usize % self.elems_per_chunk);
        let (_, chunk_j, _) = self.find_nearest_chunk(alloc, j)?;
        let offset_j = Self::slot_offset(chunk_j, j as usize % self.elems_per_chunk);

        let vi: T = alloc.read(offset_i);
        let vj: T = alloc.read(offset_j);
        alloc.write(offset_i, vj);
        alloc.write(offset_j, vi);
        Ok(())
    }

    /// Removes and returns the last element.
    ///
    /// If that element was the first (and only) element of a chunk other
    /// than the base chunk, the now-empty trailing chunk is dereffed
    /// (reclaiming its arena if nothing else references it) and
    /// `end_chunk` moves back to the previous chunk.
    pub fn pop<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<T> {
        if self.element_count == 0 {
            return Err(Error::IndexOutOfBounds { index: 0, len: 0 });
        }

        let index = self.element_count - 1;
        let (_, chunk, chunk_idx) = self.find_nearest_chunk(alloc, index)?;
        let in_chunk_index = index as usize % self.elems_per_chunk;
        let offset = Self::slot_offset(chunk, in_chunk_index);
        let value = alloc.read(offset);

        if in_chunk_index == 0 && chunk_idx > 0 {
            let removed_chunk = self.end_chunk;
            let prev_target = index - self.elems_per_chunk as u32;
            let (_, prev_chunk, _) = self.find_nearest_chunk(alloc, prev_target)?;

            alloc.deref(removed_chunk.offset())?;
            alloc.write::<i64>(prev_chunk.offset(), -1);
            self.end_chunk = prev_chunk;
            self.skip_table_dirty = true;
        }

        self.element_count -= 1;
        Ok(value)
    }

    /// Extends the chain (if necessary) so that `length` elements are
    /// addressable, sets `element_count = length`, and rebuilds the skip
    /// table unconditionally.
    ///
    /// Newly exposed slots are **not** zeroed — their contents are
    /// whatever bytes were already in the freshly allocated chunk. This
    /// matches spec.md §9: tests exercise `Set`-after-`Prealloc`, not a
    /// default-fill guarantee.
    pub fn prealloc<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, length: u32) -> Result<()> {
        let chunks_needed = if length == 0 {
            1
        } else {
            (length as usize - 1) / self.elems_per_chunk + 1
        };
        let mut current_chunks = if self.element_count == 0 {
            1
        } else {
            (self.element_count as usize - 1) / self.elems_per_chunk + 1
        };

        while current_chunks < chunks_needed {
            self.new_chunk(alloc)?;
            current_chunks += 1;
        }

        self.element_count = length;
        self.rebuild_skip_table(alloc)?;
        Ok(())
    }

    /// Dereffs the skip table (if any) and every chunk in the chain,
    /// writing `-1` into each chunk's forward pointer before dereffing it
    /// so a stray read never follows a freed link.
    pub fn deallocate<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<()> {
        if self.skip_table.is_some() {
            alloc.deref(self.skip_table.offset())?;
            self.skip_table = Ptr::NONE;
            self.skip_entries = 0;
        }

        let mut cur = self.base_chunk;
        while cur.is_some() {
            let next: i64 = alloc.read(cur.offset());
            alloc.write::<i64>(cur.offset(), -1);
            alloc.deref(cur.offset())?;
            cur = Ptr::new(next);
        }

        self.element_count = 0;
        self.base_chunk = Ptr::NONE;
        self.end_chunk = Ptr::NONE;
        Ok(())
    }

    /// Allocates a fresh chunk, links it onto the tail of the chain, and
    /// marks the skip table dirty.
    fn new_chunk<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<Ptr> {
        let chunk_bytes = self.chunk_byte_size();
        let new_ptr = alloc.alloc(chunk_bytes)?;
        alloc.write::<i64>(new_ptr, -1);
        alloc.write::<i64>(self.end_chunk.offset(), new_ptr);
        self.end_chunk = Ptr::new(new_ptr);
        self.skip_table_dirty = true;
        Ok(self.end_chunk)
    }

    /// Resolves the chunk holding logical index `target_index`.
    ///
    /// Returns `(found, chunk_pointer, chunk_index)`. `chunk_index` is the
    /// chunk *number* (`target_index / elems_per_chunk`), not an in-chunk
    /// slot — callers combine it with `target_index % elems_per_chunk` to
    /// get a byte offset.
    fn find_nearest_chunk<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        target_index: u32,
    ) -> Result<(bool, Ptr, u32)> {
        let target_chunk = target_index as usize / self.elems_per_chunk;

        if target_chunk == 0 {
            return Ok((true, self.base_chunk, 0));
        }

        let end_chunk_number = if self.element_count == 0 {
            0
        } else {
            (self.element_count as usize - 1) / self.elems_per_chunk
        };

        if self.element_count == 0 || target_chunk == end_chunk_number {
            return Ok((true, self.end_chunk, target_chunk as u32));
        }

        if target_index >= self.element_count {
            return Ok((false, self.end_chunk, target_chunk as u32));
        }

        self.maybe_rebuild_skip_table(alloc)?;

        let mut start_chunk = 0usize;
        let mut chunk_ptr = self.base_chunk;

        if self.skip_entries > 1 {
            let guess = (target_chunk * self.skip_entries as usize) / end_chunk_number.max(1);
            let lo = guess.saturating_sub(2);
            let hi = (guess + 2).min(self.skip_entries as usize - 1);
            if let Some((found_chunk, found_ptr)) =
                self.skip_table_binary_search(alloc, lo, hi, target_chunk)
            {
                start_chunk = found_chunk;
                chunk_ptr = Ptr::new(found_ptr);
            }
        }

        let mut steps = 0usize;
        while start_chunk < target_chunk {
            let next: i64 = alloc.read(chunk_ptr.offset());
            chunk_ptr = Ptr::new(next);
            start_chunk += 1;
            steps += 1;
        }

        if steps > WALK_DIRTY_THRESHOLD && (self.skip_entries as usize) < SKIP_TABLE_SIZE_LIMIT {
            self.skip_table_dirty = true;
        }

        Ok((true, chunk_ptr, target_chunk as u32))
    }

    /// Binary-searches the skip table window `[lo, hi]` for the largest
    /// entry whose stored chunk index is `<= target_chunk`.
    fn skip_table_binary_search<M: MemoryAccess>(
        &self,
        alloc: &Allocator<M>,
        lo: usize,
        hi: usize,
        target_chunk: usize,
    ) -> Option<(usize, i64)> {
        let mut lo = lo as isize;
        let mut hi = hi as isize;
        let mut best = None;

        while lo <= hi {
            let mid = (lo + hi) / 2;
            let entry_offset = self.skip_table.offset() + (mid as i64) * SKIP_ELEM_SIZE as i64;
            let (chunk_index, chunk_ptr): (u32, i64) = alloc.read_compound(entry_offset);
            if (chunk_index as usize) <= target_chunk {
                best = Some((chunk_index as usize, chunk_ptr));
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }

        best
    }

    /// Rebuilds the skip table if `skip_table_dirty` is set and a rebuild
    /// isn't already in progress (the reentrancy guard spec.md §5
    /// describes).
    fn maybe_rebuild_skip_table<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<()> {
        if self.rebuilding {
            return Ok(());
        }
        if self.skip_table_dirty {
            self.rebuild_skip_table(alloc)?;
        }
        Ok(())
    }

    /// Samples the chunk chain at roughly uniform stride and writes a
    /// fresh skip table. Too-short chains (`< 4` chunks) simply drop any
    /// existing table. On allocation failure the previous table (if any)
    /// is left untouched.
    fn rebuild_skip_table<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<()> {
        self.rebuilding = true;
        self.skip_table_dirty = false;

        let chunk_total = self.element_count as usize / self.elems_per_chunk;

        if chunk_total < 4 {
            if self.skip_table.is_some() {
                let _ = alloc.deref(self.skip_table.offset());
            }
            self.skip_table = Ptr::NONE;
            self.skip_entries = 0;
            self.rebuilding = false;
            return Ok(());
        }

        let entries = chunk_total.min(SKIP_TABLE_SIZE_LIMIT);
        let table_bytes = entries * SKIP_ELEM_SIZE;
        let stride = (self.element_count as usize / entries).max(1);

        let built = (|| -> Result<(i64, i32)> {
            let new_table = alloc.alloc(table_bytes)?;
            let mut filled = 0i32;
            for i in 0..entries {
                let target = ((i * stride) as u32).min(self.element_count.saturating_sub(1));
                let (found, chunk_ptr, chunk_idx) = self.find_nearest_chunk(alloc, target)?;
                if !found {
                    break;
                }
                let entry_offset = new_table + (i * SKIP_ELEM_SIZE) as i64;
                alloc.write_compound(entry_offset, chunk_idx, chunk_ptr.offset());
                filled += 1;
            }
            Ok((new_table, filled))
        })();

        match built {
            Ok((new_table, filled)) => {
                if self.skip_table.is_some() {
                    let _ = alloc.deref(self.skip_table.offset());
                }
                self.skip_table = Ptr::new(new_table);
                self.skip_entries = filled;
            }
            Err(_) => {
                // Allocation failed: keep the previous (stale but walkable)
                // table, per spec.md §7's "internal-only failures silently
                // keep the previous good state".
            }
        }

        self.rebuilding = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use crate::memory::VecMemory;

    fn new_allocator(mib: i64) -> Allocator<VecMemory> {
        let size = mib * 1024 * 1024;
        Allocator::new(0, size, VecMemory::new(size as usize + 2 * ARENA_SIZE as usize)).unwrap()
    }

    #[test]
    fn test_construction() {
        let mut a = new_allocator(1);
        let v: Vector<u32> = Vector::new(&mut a).unwrap();
        assert_eq!(v.len(), 0);
        assert!(v.is_empty());
    }

    #[test]
    fn test_push_get_small() {
        let mut a = new_allocator(1);
        let mut v: Vector<u64> = Vector::new(&mut a).unwrap();
        for i in 0..10u64 {
            v.push(&mut a, i * 10).unwrap();
        }
        assert_eq!(v.len(), 10);
        for i in 0..10u32 {
            assert_eq!(v.get(&mut a, i).unwrap(), i as u64 * 10);
        }
    }

    #[test]
    fn test_get_out_of_bounds() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        v.push(&mut a, 1).unwrap();
        assert_eq!(
            v.get(&mut a, 5).unwrap_err(),
            Error::IndexOutOfBounds { index: 5, len: 1 }
        );
    }

    #[test]
    fn test_set_returns_previous() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        v.push(&mut a, 100).unwrap();
        let old = v.set(&mut a, 0, 200).unwrap();
        assert_eq!(old, 100);
        assert_eq!(v.get(&mut a, 0).unwrap(), 200);
    }

    #[test]
    fn test_swap() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        v.push(&mut a, 1).unwrap();
        v.push(&mut a, 2).unwrap();
        v.swap(&mut a, 0, 1).unwrap();
        assert_eq!(v.get(&mut a, 0).unwrap(), 2);
        assert_eq!(v.get(&mut a, 1).unwrap(), 1);
    }

    #[test]
    fn test_push_then_pop_roundtrip() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        let before = v.len();
        v.push(&mut a, 42).unwrap();
        let popped = v.pop(&mut a).unwrap();
        assert_eq!(popped, 42);
        assert_eq!(v.len(), before);
    }

    #[test]
    fn test_pop_empty_fails() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        assert!(v.pop(&mut a).is_err());
    }

    #[test]
    fn test_push_across_many_chunks() {
        let mut a = new_allocator(2);
        let mut v: Vector<u64> = Vector::new(&mut a).unwrap();
        let n = (v.elems_per_chunk() * 5 + 3) as u32;
        for i in 0..n {
            v.push(&mut a, i as u64).unwrap();
        }
        assert_eq!(v.len(), n);
        for i in (0..n).step_by(7) {
            assert_eq!(v.get(&mut a, i).unwrap(), i as u64);
        }
        // last element
        assert_eq!(v.get(&mut a, n - 1).unwrap(), (n - 1) as u64);
    }

    #[test]
    fn test_pop_across_chunk_boundary_reclaims_arena() {
        let mut a = new_allocator(2);
        let mut v: Vector<u64> = Vector::new(&mut a).unwrap();
        let epc = v.elems_per_chunk() as u32;
        for i in 0..(epc + 1) {
            v.push(&mut a, i as u64).unwrap();
        }
        let occupied_before = a.state().occupied_arenas;
        // Popping the single element in the second chunk should deref that
        // chunk's arena.
        let popped = v.pop(&mut a).unwrap();
        assert_eq!(popped, epc as u64);
        let occupied_after = a.state().occupied_arenas;
        assert!(occupied_after <= occupied_before);
    }

    #[test]
    fn test_prealloc_then_set() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        v.prealloc(&mut a, 20).unwrap();
        assert_eq!(v.len(), 20);
        for i in 0..20u32 {
            v.set(&mut a, i, i * 2).unwrap();
        }
        for i in 0..20u32 {
            assert_eq!(v.get(&mut a, i).unwrap(), i * 2);
        }
    }

    #[test]
    fn test_deallocate_releases_all_arenas() {
        let mut a = new_allocator(1);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        for i in 0..200u32 {
            v.push(&mut a, i).unwrap();
        }
        v.deallocate(&mut a).unwrap();
        let state = a.state();
        assert_eq!(state.allocated_bytes, 0);
        assert_eq!(state.occupied_arenas, 0);
        assert_eq!(state.total_ref_count, 0);
    }

    #[test]
    fn test_large_round_trip_500k() {
        let mut a = new_allocator(64);
        let mut v: Vector<u32> = Vector::new(&mut a).unwrap();
        for i in 0..500_000u32 {
            v.push(&mut a, i).unwrap();
        }
        let mut push_sum: u64 = 0;
        for i in 0..500_000u32 {
            push_sum += i as u64;
        }
        for i in 0..500_000u32 {
            assert_eq!(v.get(&mut a, i).unwrap(), i);
        }
        let mut get_sum: u64 = 0;
        for i in (0..500_000u32).rev() {
            get_sum += v.pop(&mut a).unwrap() as u64;
            let _ = i;
        }
        assert_eq!(push_sum, get_sum);
        assert_eq!(v.len(), 0);
    }

    #[test]
    fn test_skip_table_built_for_long_chains() {
        let mut a = new_allocator(4);
        let mut v: Vector<u64> = Vector::new(&mut a).unwrap();
        let epc = v.elems_per_chunk();
        for i in 0..(epc * 10) as u32 {
            v.push(&mut a, i as u64).unwrap();
        }
        // Random access should exercise the skip table path.
        for &i in &[0u32, epc as u32 * 3 + 1, epc as u32 * 7, (epc * 10 - 1) as u32] {
            assert_eq!(v.get(&mut a, i).unwrap(), i as u64);
        }
    }
}
