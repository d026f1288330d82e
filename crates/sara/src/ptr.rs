//! The `-1`-sentinel pointer encoding used throughout the on-disk/in-memory
//! layout of every container.
//!
//! A [`Ptr`] is a signed 64-bit byte offset into the backing store. Negative
//! values are the "invalid/absent" sentinel — `-1` specifically is what
//! every chunk header, skip-table-absent marker, and tree pointer field
//! writes when there is no target. `Ptr` keeps that raw `i64` representation
//! (so that a chunk header or tree node is still just eight bytes read
//! straight off the wire) while giving call sites `Option`-like ergonomics
//! instead of comparing magic numbers by hand.

use std::fmt;

/// A byte offset into the managed memory range, or the "none" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ptr(i64);

impl Default for Ptr {
    /// The default `Ptr` is the `NONE` sentinel, not `Ptr(0)` — offset `0`
    /// is a perfectly valid pointer, so the inner `i64`'s own `Default`
    /// would be wrong here.
    fn default() -> Self {
        Self::NONE
    }
}

impl Ptr {
    /// The sentinel value meaning "no pointer", matching the wire encoding
    /// every chunk header and tree node field uses.
    pub const NONE: Ptr = Ptr(-1);

    /// Wraps a raw byte offset.
    #[must_use]
    pub const fn new(offset: i64) -> Self {
        Ptr(offset)
    }

    /// Returns `true` if this is the "none" sentinel (any negative offset).
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }

    /// Returns `true` if this points somewhere.
    #[must_use]
    pub const fn is_some(self) -> bool {
        !self.is_none()
    }

    /// The raw byte offset.
    #[must_use]
    pub const fn offset(self) -> i64 {
        self.0
    }

    /// Returns the offset as `Some(i64)` unless this is `NONE`.
    #[must_use]
    pub const fn get(self) -> Option<i64> {
        if self.is_none() { None } else { Some(self.0) }
    }
}

impl fmt::Debug for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Ptr::NONE")
        } else {
            write!(f, "Ptr({:#x})", self.0)
        }
    }
}

impl From<i64> for Ptr {
    fn from(offset: i64) -> Self {
        Ptr(offset)
    }
}

impl From<Ptr> for i64 {
    fn from(ptr: Ptr) -> Self {
        ptr.0
    }
}

impl From<Option<i64>> for Ptr {
    fn from(offset: Option<i64>) -> Self {
        match offset {
            Some(o) => Ptr(o),
            None => Ptr::NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sentinel() {
        assert!(Ptr::NONE.is_none());
        assert_eq!(Ptr::NONE.offset(), -1);
        assert_eq!(Ptr::default(), Ptr::NONE);
    }

    #[test]
    fn test_some_pointer() {
        let p = Ptr::new(4096);
        assert!(p.is_some());
        assert_eq!(p.offset(), 4096);
        assert_eq!(p.get(), Some(4096));
    }

    #[test]
    fn test_conversions() {
        let p: Ptr = 128i64.into();
        assert_eq!(p.offset(), 128);
        let raw: i64 = p.into();
        assert_eq!(raw, 128);

        let none: Ptr = None.into();
        assert_eq!(none, Ptr::NONE);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Ptr::NONE), "Ptr::NONE");
        assert_eq!(format!("{:?}", Ptr::new(255)), "Ptr(0xff)");
    }
}
