//! Error types for the `SArA` allocator and its containers.
//!
//! Every fallible operation in this crate returns [`Result<T>`] — nothing
//! panics or aborts on a user-reachable error path. Bugs that the allocator
//! is specified to *not* protect against (double-free, use-after-free,
//! cross-arena pointer arithmetic) remain undefined behavior, as documented
//! on the individual unsafe operations that can trigger them.

use std::fmt;

/// Errors that can occur while allocating, dereferencing, or operating on a
/// container built on top of the arena allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `Alloc` was asked for more bytes than a single arena can ever hold.
    AllocationTooLarge {
        /// The requested allocation size, in bytes.
        requested: usize,
        /// The maximum allocation size (`ARENA_SIZE`).
        max: usize,
    },

    /// No arena had enough free space to satisfy the allocation.
    OutOfMemory {
        /// The requested allocation size, in bytes.
        requested: usize,
    },

    /// A pointer fell outside `[start, limit]` of the managed byte range.
    InvalidPointer {
        /// The offending pointer value.
        ptr: i64,
    },

    /// `Deref` was called on an arena whose `ref_count` was already zero.
    Overfree {
        /// The arena index that was over-freed.
        arena: usize,
    },

    /// `Reference` was called on an arena whose `ref_count` was already
    /// `u16::MAX`.
    RefCountSaturated {
        /// The arena index whose reference count is saturated.
        arena: usize,
    },

    /// An index was out of bounds for a container operation.
    IndexOutOfBounds {
        /// The index that was requested.
        index: u32,
        /// The number of elements the container holds.
        len: u32,
    },

    /// A container's own backing allocation (a chunk, a skip table, a
    /// bucket vector, a tree node) could not be created.
    ConstructionFailed,

    /// A hash map insert exhausted every probe slot, even after a resize.
    ProbeExhausted,

    /// A tree walk (`InsertChild`, `RemoveChild`, sibling traversal) asked
    /// for a child index past the end of the sibling chain.
    ChainTooShort {
        /// The requested index.
        index: u32,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationTooLarge { requested, max } => {
                write!(
                    f,
                    "allocation of {requested} bytes exceeds the arena size ({max} bytes)"
                )
            }
            Error::OutOfMemory { requested } => {
                write!(f, "no arena has {requested} contiguous free bytes")
            }
            Error::InvalidPointer { ptr } => {
                write!(f, "pointer {ptr:#x} is outside the managed byte range")
            }
            Error::Overfree { arena } => {
                write!(f, "arena {arena} was dereferenced with ref_count already zero")
            }
            Error::RefCountSaturated { arena } => {
                write!(f, "arena {arena}'s ref_count is saturated at u16::MAX")
            }
            Error::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Error::ConstructionFailed => {
                write!(f, "backing allocation for an internal structure failed")
            }
            Error::ProbeExhausted => {
                write!(f, "hash map insert exhausted every probe slot after a resize")
            }
            Error::ChainTooShort { index } => {
                write!(f, "sibling chain is shorter than requested index {index}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type used pervasively by fallible operations in this crate.
///
/// This is the Rust-native realization of the "uniform success/value pair"
/// the spec calls `Result` — see `DESIGN.md` for why a native
/// `std::result::Result` was chosen over a bespoke `(bool, value)` struct.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", Error::OutOfMemory { requested: 100 }),
            "no arena has 100 contiguous free bytes"
        );
        assert_eq!(
            format!(
                "{}",
                Error::AllocationTooLarge {
                    requested: 100_000,
                    max: 65535
                }
            ),
            "allocation of 100000 bytes exceeds the arena size (65535 bytes)"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(
            Error::Overfree { arena: 1 },
            Error::Overfree { arena: 1 }
        );
        assert_ne!(
            Error::Overfree { arena: 1 },
            Error::Overfree { arena: 2 }
        );
    }
}
