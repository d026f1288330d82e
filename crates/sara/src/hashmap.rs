//! A Robin-Hood open-addressing hash map over 64-bit keys and values,
//! stored entirely inside a [`Vector<Entry>`].
//!
//! The map never inherits a comparer/hasher base type (spec.md §9 calls this
//! out explicitly as a pattern needing re-architecture): it is generic over
//! a [`KeyHasher`] capability passed in at construction, the idiomatic Rust
//! substitute for the source's virtual `GetHash`/`KeyComparer` pair.

use crate::allocator::Allocator;
use crate::error::{Error, Result};
use crate::memory::MemoryAccess;
use crate::vector::Vector;

/// Smallest bucket count the map will ever hold (once non-empty).
pub const MIN_BUCKET_SIZE: usize = 64;

/// Largest bucket count `Resize` will grow to. Not given a numeric value by
/// spec.md (only "cap at `MAX_BUCKET_SIZE`"); chosen generously here since
/// `ResizeNext`'s `count²` schedule for small maps needs headroom before it
/// switches to linear doubling. See `DESIGN.md`.
pub const MAX_BUCKET_SIZE: usize = 1 << 24;

/// Above this bucket count, `ResizeNext` switches from squaring to doubling.
pub const AGGRESSIVE_GROWTH_CEILING: usize = 8192;

/// Maximum fraction of buckets that may be occupied before a grow is
/// triggered.
pub const LOAD_FACTOR: f64 = 0.8;

/// The hash value substituted whenever a [`KeyHasher`] returns `0`, so that
/// `0` can unambiguously mark an empty bucket.
pub const SAFE_HASH: u32 = 0x8000_0000;

/// A pluggable key-hashing strategy.
///
/// This is the capability-based stand-in for the source's virtual
/// `GetHash`: the map holds one `H` and calls it, rather than subclassing.
pub trait KeyHasher {
    /// Hashes `key`. Implementors are not required to avoid returning `0` —
    /// [`TaggedHashMap`] substitutes [`SAFE_HASH`] for any `0` result itself.
    fn hash(&self, key: u64) -> u32;
}

/// The default [`KeyHasher`]: `FxHash` over the key, folded down to 32 bits.
///
/// `FxHasher` is the same hash the teacher crate reaches for to hash
/// selector names (`oxidec::runtime::selector`) — fast on short fixed-size
/// keys, which a `u64` is.
#[derive(Debug, Clone, Copy, Default)]
pub struct FxKeyHasher;

impl KeyHasher for FxKeyHasher {
    fn hash(&self, key: u64) -> u32 {
        use std::hash::Hasher;

        let mut hasher = fxhash::FxHasher::default();
        hasher.write_u64(key);
        hasher.finish() as u32
    }
}

/// One bucket slot: `hash == 0` marks it empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Entry {
    hash: u32,
    key: u64,
    value: u64,
}

impl Entry {
    const EMPTY: Entry = Entry {
        hash: 0,
        key: 0,
        value: 0,
    };
}

/// A Robin-Hood hash map from `u64` keys to `u64` values.
pub struct TaggedHashMap<H> {
    entries: Vector<Entry>,
    hasher: H,
    count: usize,
    count_mod: usize,
    count_used: usize,
    grow_at: usize,
    shrink_at: usize,
    auto_resize: bool,
}

impl<H: KeyHasher> TaggedHashMap<H> {
    /// Builds a map with `initial_size` buckets (rounded up to a power of
    /// two `>= MIN_BUCKET_SIZE`, capped at `MAX_BUCKET_SIZE`) and the given
    /// hashing strategy. `auto_resize` enables the automatic grow/shrink
    /// schedule; when `false`, only explicit [`TaggedHashMap::resize`] calls
    /// change the bucket count.
    pub fn new<M: MemoryAccess>(
        alloc: &mut Allocator<M>,
        hasher: H,
        initial_size: usize,
        auto_resize: bool,
    ) -> Result<Self> {
        let placeholder = Vector::<Entry>::new(alloc)?;
        let mut map = Self {
            entries: placeholder,
            hasher,
            count: 0,
            count_mod: 0,
            count_used: 0,
            grow_at: 0,
            shrink_at: 0,
            auto_resize,
        };
        map.resize(alloc, initial_size, auto_resize)?;
        Ok(map)
    }

    /// Number of non-empty entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count_used
    }

    /// `true` if the map holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count_used == 0
    }

    /// Current bucket count.
    #[must_use]
    pub const fn bucket_count(&self) -> usize {
        self.count
    }

    fn safe_hash(&self, key: u64) -> u32 {
        let h = self.hasher.hash(key);
        if h == 0 { SAFE_HASH } else { h }
    }

    const fn probe_distance(i: usize, hash: u32, count_mod: usize) -> usize {
        i.wrapping_sub((hash as usize) & count_mod) & count_mod
    }

    /// Reads the value associated with `key`, if present.
    pub fn get<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, key: u64) -> Result<Option<u64>> {
        let hash = self.safe_hash(key);
        match self.find_index(alloc, key, hash)? {
            Some(idx) => Ok(Some(self.entries.get(alloc, idx as u32)?.value)),
            None => Ok(None),
        }
    }

    /// `true` if `key` is present.
    pub fn contains_key<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, key: u64) -> Result<bool> {
        Ok(self.get(alloc, key)?.is_some())
    }

    /// Inserts or updates `key -> value`.
    ///
    /// Resizes first if the load factor would be exceeded. If the key
    /// already exists: replaces its value and returns `Ok(true)` when
    /// `can_replace`, otherwise leaves it unchanged and returns `Ok(false)`.
    /// Returns `Ok(true)` for a fresh insert.
    pub fn put<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        key: u64,
        value: u64,
        can_replace: bool,
    ) -> Result<bool> {
        if self.count == 0 || self.count_used >= self.grow_at {
            self.resize_next(alloc)?;
        }

        match self.insert(alloc, key, value, can_replace, true) {
            Err(Error::ProbeExhausted) => {
                // Policy (spec.md §7): retry once after a forced grow.
                self.resize_next(alloc)?;
                self.insert(alloc, key, value, can_replace, true)
            }
            other => other,
        }
    }

    /// Removes `key`, closing the gap by shifting the following run of
    /// displaced entries back by one. Triggers an automatic shrink if
    /// `count_used` falls to `shrink_at` and auto-resizing is enabled.
    pub fn remove<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, key: u64) -> Result<bool> {
        let hash = self.safe_hash(key);
        let Some(mut idx) = self.find_index(alloc, key, hash)? else {
            return Ok(false);
        };

        loop {
            let next_idx = (idx + 1) & self.count_mod;
            let next = self.entries.get(alloc, next_idx as u32)?;
            if next.hash == 0 {
                break;
            }
            if Self::probe_distance(next_idx, next.hash, self.count_mod) == 0 {
                break;
            }
            self.entries.set(alloc, idx as u32, next)?;
            idx = next_idx;
        }
        self.entries.set(alloc, idx as u32, Entry::EMPTY)?;
        self.count_used -= 1;

        if self.auto_resize && self.count_used <= self.shrink_at {
            let shrink_to = self.shrink_at;
            self.resize(alloc, shrink_to, true)?;
        }

        Ok(true)
    }

    /// Materializes every `(key, value)` pair into a fresh `Vector`, walking
    /// the bucket array in storage order.
    pub fn all_entries<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
    ) -> Result<Vector<(u64, u64)>> {
        let mut out = Vector::<(u64, u64)>::new(alloc)?;
        for i in 0..self.count as u32 {
            let e = self.entries.get(alloc, i)?;
            if e.hash != 0 {
                out.push(alloc, (e.key, e.value))?;
            }
        }
        Ok(out)
    }

    /// Empties the map back to zero buckets (still usable — the next `Put`
    /// grows it again).
    pub fn clear<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<()> {
        self.resize(alloc, 0, false)
    }

    /// Dereffs the bucket vector's backing chunks.
    pub fn deallocate<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<()> {
        self.entries.deallocate(alloc)?;
        self.count = 0;
        self.count_mod = 0;
        self.count_used = 0;
        self.grow_at = 0;
        self.shrink_at = 0;
        Ok(())
    }

    /// Finds the bucket index of `key`, given its already-forced hash.
    fn find_index<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        key: u64,
        hash: u32,
    ) -> Result<Option<usize>> {
        if self.count == 0 {
            return Ok(None);
        }
        let mut idx = (hash as usize) & self.count_mod;
        let mut dist = 0usize;
        loop {
            let occupant = self.entries.get(alloc, idx as u32)?;
            if occupant.hash == 0 {
                return Ok(None);
            }
            let occupant_dist = Self::probe_distance(idx, occupant.hash, self.count_mod);
            if dist > occupant_dist {
                return Ok(None);
            }
            if occupant.hash == hash && occupant.key == key {
                return Ok(Some(idx));
            }
            idx = (idx + 1) & self.count_mod;
            dist += 1;
            if dist >= self.count {
                return Ok(None);
            }
        }
    }

    /// The Robin-Hood probe-and-displace insert. `check_duplicates` is
    /// `false` only when re-inserting during a `Resize`, where the source
    /// entries are already known-unique.
    fn insert<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        key: u64,
        value: u64,
        can_replace: bool,
        check_duplicates: bool,
    ) -> Result<bool> {
        let hash = self.safe_hash(key);

        if check_duplicates {
            if let Some(existing) = self.find_index(alloc, key, hash)? {
                if !can_replace {
                    return Ok(false);
                }
                let mut e = self.entries.get(alloc, existing as u32)?;
                e.value = value;
                self.entries.set(alloc, existing as u32, e)?;
                return Ok(true);
            }
        }

        let mut carry = Entry { hash, key, value };
        let mut idx = (hash as usize) & self.count_mod;
        let mut dist = 0usize;

        loop {
            if dist >= self.count {
                return Err(Error::ProbeExhausted);
            }

            let occupant = self.entries.get(alloc, idx as u32)?;
            if occupant.hash == 0 {
                self.entries.set(alloc, idx as u32, carry)?;
                self.count_used += 1;
                return Ok(true);
            }

            let occupant_dist = Self::probe_distance(idx, occupant.hash, self.count_mod);
            if occupant_dist < dist {
                self.entries.set(alloc, idx as u32, carry)?;
                carry = occupant;
                dist = occupant_dist;
            }

            idx = (idx + 1) & self.count_mod;
            dist += 1;
        }
    }

    /// Computes the next bucket count per the aggressive schedule
    /// (spec.md §4.5 / §9): squaring below `AGGRESSIVE_GROWTH_CEILING`,
    /// doubling above it.
    fn resize_next<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>) -> Result<()> {
        let next_size = if self.count == 0 {
            MIN_BUCKET_SIZE
        } else if self.count < AGGRESSIVE_GROWTH_CEILING {
            self.count.saturating_mul(self.count)
        } else {
            self.count.saturating_mul(2)
        };
        self.resize(alloc, next_size, self.auto_resize)
    }

    /// Rebuilds the bucket array at `requested_size` (rounded up to
    /// `MIN_BUCKET_SIZE`, then to a power of two, then capped at
    /// `MAX_BUCKET_SIZE`), re-inserting every live entry from the old
    /// table and dereffing it afterward.
    pub fn resize<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        requested_size: usize,
        auto: bool,
    ) -> Result<()> {
        let mut new_size = requested_size;
        if new_size > 0 && new_size < MIN_BUCKET_SIZE {
            new_size = MIN_BUCKET_SIZE;
        }
        if new_size > 0 {
            new_size = new_size.next_power_of_two().min(MAX_BUCKET_SIZE);
        }

        let mut new_entries = Vector::<Entry>::new(alloc)?;
        if new_size > 0 {
            new_entries.prealloc(alloc, new_size as u32)?;
            // Prealloc leaves slots undefined (spec.md §9); the map's empty
            // sentinel must hold from the start, so every bucket is set
            // explicitly rather than relied upon to already be zero.
            for i in 0..new_size as u32 {
                new_entries.set(alloc, i, Entry::EMPTY)?;
            }
        }

        let old_count = self.count;
        let mut old_entries = std::mem::replace(&mut self.entries, new_entries);

        self.count = new_size;
        self.count_mod = new_size.saturating_sub(1);
        self.count_used = 0;
        if auto {
            self.grow_at = ((new_size as f64) * LOAD_FACTOR).floor() as usize;
            self.shrink_at = new_size >> 2;
        } else {
            self.grow_at = new_size;
            self.shrink_at = 0;
        }
        self.auto_resize = auto;

        for i in 0..old_count as u32 {
            let e = old_entries.get(alloc, i)?;
            if e.hash != 0 {
                self.insert(alloc, e.key, e.value, false, false)?;
            }
        }
        old_entries.deallocate(alloc)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{ARENA_SIZE, Allocator};
    use crate::memory::VecMemory;

    fn new_allocator(mib: i64) -> Allocator<VecMemory> {
        let size = mib * 1024 * 1024;
        Allocator::new(0, size, VecMemory::new(size as usize + 4 * ARENA_SIZE as usize)).unwrap()
    }

    #[test]
    fn test_construction_rounds_bucket_count() {
        let mut a = new_allocator(4);
        let map = TaggedHashMap::new(&mut a, FxKeyHasher, 10, true).unwrap();
        assert_eq!(map.bucket_count(), MIN_BUCKET_SIZE);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_put_get_roundtrip() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        assert!(map.put(&mut a, 42, 1000, true).unwrap());
        assert_eq!(map.get(&mut a, 42).unwrap(), Some(1000));
    }

    #[test]
    fn test_put_no_replace_preserves_value() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        map.put(&mut a, 7, 1, true).unwrap();
        let inserted = map.put(&mut a, 7, 2, false).unwrap();
        assert!(!inserted);
        assert_eq!(map.get(&mut a, 7).unwrap(), Some(1));
    }

    #[test]
    fn test_remove() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        map.put(&mut a, 1, 10, true).unwrap();
        map.put(&mut a, 2, 20, true).unwrap();
        assert!(map.remove(&mut a, 1).unwrap());
        assert_eq!(map.get(&mut a, 1).unwrap(), None);
        assert_eq!(map.get(&mut a, 2).unwrap(), Some(20));
        assert!(!map.remove(&mut a, 1).unwrap());
    }

    #[test]
    fn test_zero_key_uses_safe_hash() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        map.put(&mut a, 0, 999, true).unwrap();
        assert_eq!(map.get(&mut a, 0).unwrap(), Some(999));
    }

    #[test]
    fn test_grows_past_load_factor() {
        let mut a = new_allocator(16);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        for i in 0..200u64 {
            map.put(&mut a, i, i * 2, true).unwrap();
        }
        assert!(map.bucket_count() > 64);
        for i in 0..200u64 {
            assert_eq!(map.get(&mut a, i).unwrap(), Some(i * 2));
        }
    }

    #[test]
    fn test_all_entries() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        map.put(&mut a, 1, 10, true).unwrap();
        map.put(&mut a, 2, 20, true).unwrap();
        map.put(&mut a, 3, 30, true).unwrap();
        let all = map.all_entries(&mut a).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_clear_then_reuse() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
        map.put(&mut a, 1, 10, true).unwrap();
        map.clear(&mut a).unwrap();
        assert_eq!(map.bucket_count(), 0);
        assert_eq!(map.get(&mut a, 1).unwrap(), None);
        map.put(&mut a, 5, 50, true).unwrap();
        assert_eq!(map.get(&mut a, 5).unwrap(), Some(50));
    }

    #[test]
    fn test_deallocate_releases_all_arenas() {
        let mut a = new_allocator(4);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 128, true).unwrap();
        for i in 0..128u64 {
            map.put(&mut a, i, i, true).unwrap();
        }
        map.deallocate(&mut a).unwrap();
        let state = a.state();
        assert_eq!(state.allocated_bytes, 0);
        assert_eq!(state.total_ref_count, 0);
    }

    #[test]
    fn test_stress_put_remove() {
        let mut a = new_allocator(64);
        let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 10_000, true).unwrap();
        map.put(&mut a, 0, 1, true).unwrap();

        // Deterministic pseudo-random sequence in place of an external RNG
        // dependency (out of scope per spec.md §1).
        let mut state: u64 = 0x9E3779B97F4A7C15;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            1 + (state % 1_000_000)
        };

        for i in 0..25_000u64 {
            let k = next();
            assert!(map.put(&mut a, k, i, true).unwrap());
            let k2 = next();
            map.remove(&mut a, k2).unwrap();
        }

        assert_eq!(map.get(&mut a, 0).unwrap(), Some(1));
        assert!(map.len() >= 1000);
    }
}
