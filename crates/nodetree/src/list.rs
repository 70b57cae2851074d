//! Compact ordered list backing a node's children
//!
//! ## Layout
//!
//! ```text
//! physical: [a][d][c]        (Vec<Option<T>>, may hold holes)
//! logical:  a -> c -> d      (next/prev indices carried by each element)
//! ```
//!
//! Appends go to the physical end and are linked after the logical tail.
//! Removal nils the slot and relinks the neighbours; `remove_and_swap`
//! then moves the last physical element into the hole so the vector stays
//! compact. After that, physical order no longer matches logical order and
//! the list is *dirty*: `get(i)` is only positional again after `sort_list`.
//!
//! Index bookkeeping lives in atomics so that shared readers never observe a
//! torn index. Mutation still requires `&mut self`; this is not a concurrent
//! list.

use crate::error::{Result, TreeError};
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU32, Ordering};

/// Marker for "no index".
pub const NIL: isize = -1;

/// Fixed increment added on every expansion.
pub const GROWTH_INCREMENT: usize = 5;

/// Free slots left before `add` triggers an expansion.
const GROWTH_HEADROOM: usize = 2;

/// Self/next/previous indices of one list element.
#[derive(Debug)]
pub struct Links {
    index: AtomicIsize,
    next: AtomicIsize,
    prev: AtomicIsize,
}

impl Links {
    pub fn new() -> Self {
        Self {
            index: AtomicIsize::new(NIL),
            next: AtomicIsize::new(NIL),
            prev: AtomicIsize::new(NIL),
        }
    }

    /// Physical slot currently holding the element, `NIL` if unlinked.
    pub fn index(&self) -> isize {
        self.index.load(Ordering::Acquire)
    }

    pub fn next(&self) -> isize {
        self.next.load(Ordering::Acquire)
    }

    pub fn prev(&self) -> isize {
        self.prev.load(Ordering::Acquire)
    }

    /// True while the element is stored in some list.
    pub fn is_linked(&self) -> bool {
        self.index() != NIL
    }

    pub(crate) fn set_index(&self, value: isize) {
        self.index.store(value, Ordering::Release);
    }

    pub(crate) fn set_next(&self, value: isize) {
        self.next.store(value, Ordering::Release);
    }

    pub(crate) fn set_prev(&self, value: isize) {
        self.prev.store(value, Ordering::Release);
    }

    pub(crate) fn copy_from(&self, other: &Links) {
        self.set_index(other.index());
        self.set_next(other.next());
        self.set_prev(other.prev());
    }

    pub(crate) fn reset(&self) {
        self.set_index(NIL);
        self.set_next(NIL);
        self.set_prev(NIL);
    }
}

impl Default for Links {
    fn default() -> Self {
        Self::new()
    }
}

/// Elements stored in an [`OrderedList`] carry their own links.
pub trait Linked {
    fn links(&self) -> &Links;
}

/// Growable array with logical order kept in per-element links.
///
/// Not safe for concurrent mutation.
#[derive(Debug)]
pub struct OrderedList<T> {
    items: Vec<Option<T>>,

    /// Occupied slots.
    live: usize,

    /// Adds since the last expansion; scales the next growth step.
    velocity: AtomicU32,

    /// Physical order differs from logical order.
    dirty: AtomicBool,

    first: AtomicIsize,
    last: AtomicIsize,
}

impl<T: Linked> OrderedList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            live: 0,
            velocity: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            first: AtomicIsize::new(NIL),
            last: AtomicIsize::new(NIL),
        }
    }

    /// Number of elements in the list.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Length of the backing vector, holes included.
    pub fn physical_len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn first_index(&self) -> Option<usize> {
        to_position(self.first.load(Ordering::Acquire))
    }

    pub fn last_index(&self) -> Option<usize> {
        to_position(self.last.load(Ordering::Acquire))
    }

    /// Logically first element.
    pub fn first(&self) -> Option<&T> {
        self.first_index().and_then(|index| self.get(index).ok())
    }

    /// Logically last element.
    pub fn last(&self) -> Option<&T> {
        self.last_index().and_then(|index| self.get(index).ok())
    }

    /// Element stored at a physical slot.
    ///
    /// Matches logical order only while the list is not dirty.
    pub fn get(&self, index: usize) -> Result<&T> {
        match self.items.get(index) {
            None => Err(TreeError::InvalidIndex(index)),
            Some(None) => Err(TreeError::EmptyIndex(index)),
            Some(Some(item)) => Ok(item),
        }
    }

    /// Logical successor of the element at `index`.
    pub fn next_of(&self, index: usize) -> Result<Option<&T>> {
        let next = self.get(index)?.links().next();
        match to_position(next) {
            Some(next) => self.get(next).map(Some),
            None => Ok(None),
        }
    }

    /// Logical predecessor of the element at `index`.
    pub fn previous_of(&self, index: usize) -> Result<Option<&T>> {
        let prev = self.get(index)?.links().prev();
        match to_position(prev) {
            Some(prev) => self.get(prev).map(Some),
            None => Ok(None),
        }
    }

    /// Appends `item` after the logical tail and returns its physical index.
    pub fn add(&mut self, item: T) -> usize {
        if self.items.capacity() - self.items.len() <= GROWTH_HEADROOM {
            self.expand();
        }

        let index = self.items.len();
        {
            let links = item.links();
            links.set_index(index as isize);
            links.set_next(NIL);

            let tail = self.last.load(Ordering::Acquire);
            match self.links_at(tail) {
                Some(tail_links) => {
                    tail_links.set_next(index as isize);
                    links.set_prev(tail);
                }
                None => {
                    links.set_prev(NIL);
                    self.first.store(index as isize, Ordering::Release);
                }
            }
        }

        self.items.push(Some(item));
        self.last.store(index as isize, Ordering::Release);
        self.live += 1;
        self.velocity.fetch_add(1, Ordering::Relaxed);
        index
    }

    /// Removes the element at `index`, leaving the slot empty.
    ///
    /// Neighbours are relinked around the hole; the vector is not compacted
    /// unless the slot was the physical tail.
    pub fn remove_index(&mut self, index: usize) -> Result<T> {
        let count = self.items.len();
        if index >= count {
            return Err(TreeError::InvalidIndex(index));
        }

        let item = self.items[index]
            .take()
            .ok_or(TreeError::EmptyIndex(index))?;
        self.live -= 1;

        if index == count - 1 {
            self.items.truncate(index);
        } else {
            self.set_dirty(true);
        }

        if self.live == 0 {
            self.reset_empty();
            item.links().reset();
            return Ok(item);
        }

        let (prev, next) = {
            let links = item.links();
            (links.prev(), links.next())
        };

        match self.links_at(prev) {
            Some(prev_links) => prev_links.set_next(next),
            None => self.first.store(next, Ordering::Release),
        }
        match self.links_at(next) {
            Some(next_links) => next_links.set_prev(prev),
            None => self.last.store(prev, Ordering::Release),
        }

        item.links().reset();
        Ok(item)
    }

    /// Moves the last physical element into the empty slot at `index`,
    /// shrinking the vector by one.
    pub fn swap_index(&mut self, index: usize) -> Result<()> {
        loop {
            let count = self.items.len();
            if count == 0 {
                return Err(TreeError::EmptyList);
            }
            if index >= count {
                return Err(TreeError::InvalidIndex(index));
            }
            if self.items[index].is_some() {
                return Err(TreeError::IndexNotEmpty(index));
            }
            if self.live == 0 {
                self.reset_empty();
                return Ok(());
            }

            let last_index = count - 1;
            let Some(moved) = self.items.pop().flatten() else {
                // Trailing hole: drop it and retry, unless it was the target.
                if index >= last_index {
                    return Ok(());
                }
                continue;
            };

            {
                let links = moved.links();
                links.set_index(index as isize);
                let (prev, next) = (links.prev(), links.next());

                match self.links_at(prev) {
                    Some(prev_links) => prev_links.set_next(index as isize),
                    None => self.first.store(index as isize, Ordering::Release),
                }
                match self.links_at(next) {
                    Some(next_links) => next_links.set_prev(index as isize),
                    None => self.last.store(index as isize, Ordering::Release),
                }
            }

            self.items[index] = Some(moved);
            self.set_dirty(true);
            return Ok(());
        }
    }

    /// Removes the element at `index` and fills the hole from the tail.
    pub fn remove_and_swap(&mut self, index: usize) -> Result<T> {
        let item = self.remove_index(index)?;
        if index < self.items.len() {
            self.swap_index(index)?;
        }
        Ok(item)
    }

    /// Puts `replacement` in the slot at `index`, taking over that slot's
    /// links, and returns the element it displaced.
    pub fn swap_node(&mut self, index: usize, replacement: T) -> Result<T> {
        if self.items.is_empty() {
            return Err(TreeError::EmptyList);
        }

        let slot = self
            .items
            .get_mut(index)
            .ok_or(TreeError::InvalidIndex(index))?;
        let old = slot.take().ok_or(TreeError::EmptyIndex(index))?;

        replacement.links().copy_from(old.links());
        old.links().reset();
        *slot = Some(replacement);
        Ok(old)
    }

    /// Rewrites the backing vector into logical order.
    ///
    /// No-op unless the list is dirty.
    pub fn sort_list(&mut self) {
        if !self.is_dirty() {
            return;
        }
        if self.live == 0 {
            self.reset_empty();
            return;
        }

        let mut sorted = Vec::with_capacity(self.items.capacity());
        let mut next = self.first.load(Ordering::Acquire);
        while let Some(position) = to_position(next) {
            let Some(item) = self.items.get_mut(position).and_then(Option::take) else {
                break;
            };
            next = item.links().next();
            sorted.push(Some(item));
        }

        let count = sorted.len();
        for (index, item) in sorted.iter().flatten().enumerate() {
            let links = item.links();
            links.set_index(index as isize);
            links.set_prev(index as isize - 1);
            links.set_next(if index + 1 < count {
                (index + 1) as isize
            } else {
                NIL
            });
        }

        self.items = sorted;
        self.live = count;
        if count == 0 {
            self.reset_empty();
            return;
        }
        self.first.store(0, Ordering::Release);
        self.last.store(count as isize - 1, Ordering::Release);
        self.set_dirty(false);
    }

    /// Logical-order iterator.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            next: self.first.load(Ordering::Acquire),
        }
    }

    /// Visits elements in logical order until `visit` returns false.
    pub fn each<F>(&self, mut visit: F)
    where
        F: FnMut(&T, usize) -> bool,
    {
        for (index, item) in self.iter().enumerate() {
            if !visit(item, index) {
                return;
            }
        }
    }

    /// Sorts, then clones the elements out in logical order.
    pub fn to_vec(&mut self) -> Vec<T>
    where
        T: Clone,
    {
        self.sort_list();
        self.items.iter().flatten().cloned().collect()
    }

    /// Drops every element, unlinking each one.
    pub fn clear(&mut self) {
        for item in self.items.drain(..).flatten() {
            item.links().reset();
        }
        self.reset_empty();
    }

    fn links_at(&self, index: isize) -> Option<&Links> {
        to_position(index)
            .and_then(|position| self.items.get(position))
            .and_then(Option::as_ref)
            .map(Linked::links)
    }

    fn expand(&mut self) {
        let next = self.next_capacity();
        self.items.reserve_exact(next.saturating_sub(self.items.len()));
        tracing::trace!(capacity = self.items.capacity(), "expanded ordered list");
        self.velocity.store(0, Ordering::Relaxed);
    }

    /// Next capacity: the current one scaled by how many adds happened since
    /// the previous expansion relative to the current length, plus a fixed
    /// increment.
    fn next_capacity(&self) -> usize {
        let current = match self.items.capacity() {
            0 => GROWTH_INCREMENT,
            capacity => capacity,
        };
        let len = self.items.len().max(1);
        let velocity = (self.velocity.load(Ordering::Relaxed) as usize).max(1);
        current + current.saturating_mul(velocity) / len + GROWTH_INCREMENT
    }

    fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    fn reset_empty(&mut self) {
        self.items.clear();
        self.live = 0;
        self.first.store(NIL, Ordering::Release);
        self.last.store(NIL, Ordering::Release);
        self.set_dirty(false);
    }
}

impl<T: Linked> Default for OrderedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator following the next links from the logical head.
pub struct Iter<'a, T> {
    list: &'a OrderedList<T>,
    next: isize,
}

impl<'a, T: Linked> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let position = to_position(self.next)?;
        let item = self.list.items.get(position)?.as_ref()?;
        self.next = item.links().next();
        Some(item)
    }
}

fn to_position(index: isize) -> Option<usize> {
    if index < 0 {
        None
    } else {
        Some(index as usize)
    }
}
