//! A first-child / next-sibling k-way tree of fixed-size nodes, allocated
//! entirely through an [`Allocator`].
//!
//! Every node is one allocation of `24 + sizeof(T)` bytes: three `i64`
//! pointer fields (`parent`, `first_child`, `next_sibling`), then the
//! payload. A node with no children has `first_child == -1`; the last
//! sibling in a chain has `next_sibling == -1`.

use std::marker::PhantomData;

use crate::allocator::Allocator;
use crate::error::{Error, Result};
use crate::memory::MemoryAccess;
use crate::ptr::Ptr;

const PARENT_OFFSET: i64 = 0;
const FIRST_CHILD_OFFSET: i64 = 8;
const NEXT_SIBLING_OFFSET: i64 = 16;
const BODY_OFFSET: i64 = 24;

/// A first-child / next-sibling tree of `T` payloads.
pub struct Tree<T> {
    root: Ptr,
    _marker: PhantomData<T>,
}

impl<T: Copy> Tree<T> {
    const fn node_size() -> usize {
        24 + size_of::<T>()
    }

    /// Allocates the root node holding `root_value`.
    pub fn new<M: MemoryAccess>(alloc: &mut Allocator<M>, root_value: T) -> Result<Self> {
        let ptr = Self::new_node(alloc, -1, root_value)?;
        Ok(Self {
            root: Ptr::new(ptr),
            _marker: PhantomData,
        })
    }

    /// The root node's pointer.
    #[must_use]
    pub const fn root(&self) -> Ptr {
        self.root
    }

    /// Reads the payload stored at `node`.
    pub fn read_body<M: MemoryAccess>(&self, alloc: &Allocator<M>, node: Ptr) -> T {
        alloc.read(node.offset() + BODY_OFFSET)
    }

    /// Overwrites the payload stored at `node`.
    pub fn write_body<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, node: Ptr, value: T) {
        alloc.write(node.offset() + BODY_OFFSET, value);
    }

    /// `node`'s parent, or `Ptr::NONE` at the root.
    pub fn parent<M: MemoryAccess>(&self, alloc: &Allocator<M>, node: Ptr) -> Ptr {
        Ptr::new(alloc.read(node.offset() + PARENT_OFFSET))
    }

    /// `node`'s first child, or `Ptr::NONE` if it has none.
    pub fn child<M: MemoryAccess>(&self, alloc: &Allocator<M>, node: Ptr) -> Ptr {
        Ptr::new(alloc.read(node.offset() + FIRST_CHILD_OFFSET))
    }

    /// `node`'s next sibling, or `Ptr::NONE` if it is the last in its chain.
    pub fn sibling<M: MemoryAccess>(&self, alloc: &Allocator<M>, node: Ptr) -> Ptr {
        Ptr::new(alloc.read(node.offset() + NEXT_SIBLING_OFFSET))
    }

    /// Lifts [`Tree::sibling`] over a `Result<Ptr>`, so a chain of sibling
    /// lookups short-circuits on either a prior failure or an absent
    /// sibling — the composable form used to walk `Sibling(Sibling(...))`
    /// chains without checking `is_none()` at every step.
    pub fn sibling_r<M: MemoryAccess>(&self, alloc: &Allocator<M>, node: Result<Ptr>) -> Result<Ptr> {
        let node = node?;
        if node.is_none() {
            return Err(Error::InvalidPointer { ptr: node.offset() });
        }
        Ok(self.sibling(alloc, node))
    }

    fn new_node<M: MemoryAccess>(alloc: &mut Allocator<M>, parent: i64, value: T) -> Result<i64> {
        let ptr = alloc.alloc(Self::node_size())?;
        alloc.write::<i64>(ptr + PARENT_OFFSET, parent);
        alloc.write::<i64>(ptr + FIRST_CHILD_OFFSET, -1);
        alloc.write::<i64>(ptr + NEXT_SIBLING_OFFSET, -1);
        alloc.write::<T>(ptr + BODY_OFFSET, value);
        Ok(ptr)
    }

    /// Appends a new last child of `parent` holding `value`. If `parent`
    /// already has a first child, delegates to [`Tree::add_sibling`] on it.
    pub fn add_child<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        parent: Ptr,
        value: T,
    ) -> Result<Ptr> {
        let first_child: i64 = alloc.read(parent.offset() + FIRST_CHILD_OFFSET);
        if first_child >= 0 {
            return self.add_sibling(alloc, Ptr::new(first_child), value);
        }
        let new_ptr = Self::new_node(alloc, parent.offset(), value)?;
        alloc.write::<i64>(parent.offset() + FIRST_CHILD_OFFSET, new_ptr);
        Ok(Ptr::new(new_ptr))
    }

    /// Walks `node`'s sibling chain to its tail and appends a new sibling
    /// holding `value`.
    pub fn add_sibling<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        node: Ptr,
        value: T,
    ) -> Result<Ptr> {
        let parent: i64 = alloc.read(node.offset() + PARENT_OFFSET);
        let mut cur = node.offset();
        loop {
            let next: i64 = alloc.read(cur + NEXT_SIBLING_OFFSET);
            if next < 0 {
                break;
            }
            cur = next;
        }
        let new_ptr = Self::new_node(alloc, parent, value)?;
        alloc.write::<i64>(cur + NEXT_SIBLING_OFFSET, new_ptr);
        Ok(Ptr::new(new_ptr))
    }

    /// Inserts `value` as `parent`'s child at sibling-chain position
    /// `index` (0 = new first child, 1 = right after the old first child,
    /// and so on). Fails with [`Error::ChainTooShort`] if the existing
    /// chain has fewer than `index` nodes.
    pub fn insert_child<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        parent: Ptr,
        index: u32,
        value: T,
    ) -> Result<Ptr> {
        let first_child: i64 = alloc.read(parent.offset() + FIRST_CHILD_OFFSET);

        if first_child < 0 {
            if index != 0 {
                return Err(Error::ChainTooShort { index });
            }
            return self.add_child(alloc, parent, value);
        }

        if index == 0 {
            let new_ptr = Self::new_node(alloc, parent.offset(), value)?;
            alloc.write::<i64>(new_ptr + NEXT_SIBLING_OFFSET, first_child);
            alloc.write::<i64>(parent.offset() + FIRST_CHILD_OFFSET, new_ptr);
            return Ok(Ptr::new(new_ptr));
        }

        let mut count = 1u32;
        let mut predecessor = first_child;
        while count < index {
            let next: i64 = alloc.read(predecessor + NEXT_SIBLING_OFFSET);
            if next < 0 {
                return Err(Error::ChainTooShort { index });
            }
            predecessor = next;
            count += 1;
        }

        let successor: i64 = alloc.read(predecessor + NEXT_SIBLING_OFFSET);
        let new_ptr = Self::new_node(alloc, parent.offset(), value)?;
        alloc.write::<i64>(new_ptr + NEXT_SIBLING_OFFSET, successor);
        alloc.write::<i64>(predecessor + NEXT_SIBLING_OFFSET, new_ptr);
        Ok(Ptr::new(new_ptr))
    }

    /// Removes `parent`'s child at sibling-chain position `index` and
    /// recursively frees the entire removed subtree.
    pub fn remove_child<M: MemoryAccess>(
        &mut self,
        alloc: &mut Allocator<M>,
        parent: Ptr,
        index: u32,
    ) -> Result<()> {
        let first_child: i64 = alloc.read(parent.offset() + FIRST_CHILD_OFFSET);
        if first_child < 0 {
            return Err(Error::ChainTooShort { index });
        }

        let deleted = if index == 0 {
            let next: i64 = alloc.read(first_child + NEXT_SIBLING_OFFSET);
            alloc.write::<i64>(parent.offset() + FIRST_CHILD_OFFSET, next);
            first_child
        } else {
            let mut count = 1u32;
            let mut predecessor = first_child;
            while count < index {
                let next: i64 = alloc.read(predecessor + NEXT_SIBLING_OFFSET);
                if next < 0 {
                    return Err(Error::ChainTooShort { index });
                }
                predecessor = next;
                count += 1;
            }
            let target: i64 = alloc.read(predecessor + NEXT_SIBLING_OFFSET);
            if target < 0 {
                return Err(Error::ChainTooShort { index });
            }
            let after: i64 = alloc.read(target + NEXT_SIBLING_OFFSET);
            alloc.write::<i64>(predecessor + NEXT_SIBLING_OFFSET, after);
            target
        };

        self.delete_node(alloc, deleted)
    }

    /// Walks the sibling chain of `node`'s first child, recursing into
    /// each's first child, dereffing every visited node — including
    /// `node` itself.
    fn delete_node<M: MemoryAccess>(&mut self, alloc: &mut Allocator<M>, node: i64) -> Result<()> {
        let first_child: i64 = alloc.read(node + FIRST_CHILD_OFFSET);
        if first_child >= 0 {
            let mut cur = first_child;
            loop {
                let next: i64 = alloc.read(cur + NEXT_SIBLING_OFFSET);
                self.delete_node(alloc, cur)?;
                if next < 0 {
                    break;
                }
                cur = next;
            }
        }
        alloc.deref(node)
    }
}
