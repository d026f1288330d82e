//! The `MemoryAccess` contract: typed reads/writes of plain-old-data at a
//! byte offset, with no bounds checking and no alignment guarantees beyond
//! what the backing store imposes.
//!
//! Everything above this layer (the [`crate::allocator::Allocator`] and the
//! containers built on it) only ever touches memory through this trait. The
//! concrete byte store itself — an embedded-memory simulator, a memory-
//! mapped file, a `Vec<u8>` — is an external collaborator the spec
//! deliberately keeps out of scope; this module ships one minimal
//! implementation, [`VecMemory`], so the crate's own tests have something to
//! run against.
//!
//! # Safety contract
//!
//! Callers must only request offsets that a [`crate::allocator::Allocator`]
//! has already validated. `read`/`write` do not perform bounds checks in
//! release builds — an out-of-range offset is undefined behavior, exactly as
//! spec.md §4.1 specifies ("the core does not catch out-of-range accesses;
//! undefined behavior is a user bug"). `VecMemory`, being a test fixture,
//! additionally asserts bounds in debug builds to catch bugs in this crate's
//! own tests early.

/// Typed read/write access to a byte-addressable backing store.
///
/// Implementors provide native-endianness, alignment-agnostic access to
/// plain-old-data values at an arbitrary byte offset. `T`, `H`, `B` must be
/// `Copy` — the trait is built around `read_unaligned`/`write_unaligned`
/// semantics, so there is no requirement that `offset` be aligned for `T`.
pub trait MemoryAccess {
    /// Reads a `T` out of the backing store at `offset`.
    ///
    /// # Safety contract
    ///
    /// `offset` must have been produced by (or validated against) an
    /// [`crate::allocator::Allocator`] over this same store, and
    /// `offset + size_of::<T>()` must not exceed the store's extent.
    /// Violating this is undefined behavior.
    fn read<T: Copy>(&self, offset: i64) -> T;

    /// Writes `value` into the backing store at `offset`.
    ///
    /// Same safety contract as [`MemoryAccess::read`].
    fn write<T: Copy>(&mut self, offset: i64, value: T);

    /// Writes `head` immediately followed by `body` at `offset`
    /// (`size_of::<H>()` bytes, then `size_of::<B>()` bytes).
    ///
    /// Same safety contract as [`MemoryAccess::read`], sized for
    /// `size_of::<H>() + size_of::<B>()` bytes.
    fn write_compound<H: Copy, B: Copy>(&mut self, offset: i64, head: H, body: B) {
        self.write(offset, head);
        self.write(offset + size_of::<H>() as i64, body);
    }

    /// Reads a `(H, B)` pair written by [`MemoryAccess::write_compound`].
    ///
    /// Same safety contract as [`MemoryAccess::read`].
    fn read_compound<H: Copy, B: Copy>(&self, offset: i64) -> (H, B) {
        let head = self.read(offset);
        let body = self.read(offset + size_of::<H>() as i64);
        (head, body)
    }
}

/// Wraps a [`MemoryAccess`] store so that `location` is treated as
/// `location − base_offset` before delegating.
///
/// Models an embedded memory-mapped region that does not start at byte
/// zero: the wrapped store sees offsets relative to its own start, while
/// callers of `ShiftedMemory` keep using offsets relative to the outer
/// region. The shift is constant for the lifetime of the wrapper, which is
/// what makes this safe to share the way spec.md §5 requires ("the same
/// instance must be passed everywhere, and it must present a consistent
/// view of memory").
pub struct ShiftedMemory<M> {
    inner: M,
    base_offset: i64,
}

impl<M> ShiftedMemory<M> {
    /// Wraps `inner`, shifting every offset by `-base_offset` before
    /// delegating.
    pub const fn new(inner: M, base_offset: i64) -> Self {
        Self { inner, base_offset }
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> M {
        self.inner
    }

    /// Borrows the wrapped store.
    pub const fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: MemoryAccess> MemoryAccess for ShiftedMemory<M> {
    fn read<T: Copy>(&self, offset: i64) -> T {
        self.inner.read(offset - self.base_offset)
    }

    fn write<T: Copy>(&mut self, offset: i64, value: T) {
        self.inner.write(offset - self.base_offset, value);
    }

    fn write_compound<H: Copy, B: Copy>(&mut self, offset: i64, head: H, body: B) {
        self.inner
            .write_compound(offset - self.base_offset, head, body);
    }

    fn read_compound<H: Copy, B: Copy>(&self, offset: i64) -> (H, B) {
        self.inner.read_compound(offset - self.base_offset)
    }
}

/// A `Vec<u8>`-backed [`MemoryAccess`] implementation.
///
/// This is a reference/testing implementation, not a production one: real
/// users of this crate plug in whatever byte-addressable region they
/// actually have (a memory-mapped file, an embedded RAM window, a shared
/// memory segment). `VecMemory` exists so the crate's own unit tests,
/// doctests, and scenario tests have a byte store to exercise the allocator
/// and containers against.
pub struct VecMemory {
    data: Vec<u8>,
}

impl VecMemory {
    /// Creates a zero-filled store of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// The total size of the backing store, in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the store has zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_bounds(&self, offset: i64, size: usize) {
        debug_assert!(offset >= 0, "negative offset {offset}");
        debug_assert!(
            (offset as usize) + size <= self.data.len(),
            "offset {offset} + size {size} exceeds store length {}",
            self.data.len()
        );
    }
}

impl MemoryAccess for VecMemory {
    fn read<T: Copy>(&self, offset: i64) -> T {
        self.check_bounds(offset, size_of::<T>());
        // SAFETY: caller contract (see trait docs) guarantees `offset` was
        // validated by an Allocator over this exact store; the debug-only
        // bounds check above is this fixture's extra sanity net.
        unsafe {
            self.data
                .as_ptr()
                .add(offset as usize)
                .cast::<T>()
                .read_unaligned()
        }
    }

    fn write<T: Copy>(&mut self, offset: i64, value: T) {
        self.check_bounds(offset, size_of::<T>());
        // SAFETY: see `read`.
        unsafe {
            self.data
                .as_mut_ptr()
                .add(offset as usize)
                .cast::<T>()
                .write_unaligned(value);
        }
    }
}
