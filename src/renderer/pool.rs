//! Generational resource pool
//!
//! Every GPU-side descriptor the renderer hands out (meshes, materials,
//! joint buffers, textures) lives in a [`Pool`] and is referenced by a typed
//! [`Handle`]. A handle carries the slot's generation at creation time, so a
//! handle kept after its resource was freed is rejected instead of silently
//! aliasing whatever reused the slot.
//!
//! # Example
//!
//! ```ignore
//! let mut pool: Pool<GpuMesh> = Pool::new();
//! let handle = pool.insert(mesh);
//! assert!(pool.get(handle).is_some());
//! let mesh = pool.remove(handle); // GPU buffers drop with `mesh`
//! assert!(pool.get(handle).is_none());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

// ============================================================================
// Handle
// ============================================================================

/// Typed, generation-checked reference into a [`Pool<T>`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Rebuild a handle from its parts. Pools still validate the generation,
    /// so a forged handle can at worst miss.
    #[must_use]
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self::new(index, generation)
    }

    /// Slot index, stable for the handle's lifetime.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packed 64-bit form, handy as a sort or hash key.
    #[must_use]
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

// ============================================================================
// Pool Slot
// ============================================================================

#[derive(Debug)]
enum Entry<T> {
    Occupied(T),
    /// Next free slot, or `NONE`
    Vacant(u32),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

// ============================================================================
// Pool
// ============================================================================

/// Slot storage with a LIFO free list and per-slot generations.
///
/// | Operation | Time Complexity |
/// |-----------|-----------------|
/// | `insert`  | O(1) amortized  |
/// | `remove`  | O(1)            |
/// | `get`     | O(1)            |
/// | `iter`    | O(n)            |
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    len: usize,
}

impl<T> Pool<T> {
    const NONE: u32 = u32::MAX;

    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: Self::NONE,
            len: 0,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: Self::NONE,
            len: 0,
        }
    }

    /// Store `value`, reusing the most recently freed slot if any.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;

        if self.free_head != Self::NONE {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            if let Entry::Vacant(next) = slot.entry {
                self.free_head = next;
            }
            slot.entry = Entry::Occupied(value);
            Handle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Entry::Occupied(value),
            });
            Handle::new(index, 0)
        }
    }

    /// Take the value out, invalidating every copy of `handle`.
    ///
    /// Returns `None` for stale or unknown handles.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || matches!(slot.entry, Entry::Vacant(_)) {
            return None;
        }

        let entry = std::mem::replace(&mut slot.entry, Entry::Vacant(self.free_head));
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = handle.index;
        self.len -= 1;

        match entry {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant(_) => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.slots.get(handle.index as usize) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(value),
            }) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(value),
            }) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live values with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.entry {
                Entry::Occupied(value) => Some((Handle::new(index as u32, slot.generation), value)),
                Entry::Vacant(_) => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| match &mut slot.entry {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant(_) => None,
        })
    }

    /// Drop every value. Outstanding handles become stale.
    pub fn clear(&mut self) {
        let mut next = Self::NONE;
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if matches!(slot.entry, Entry::Occupied(_)) {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.entry = Entry::Vacant(next);
            next = index as u32;
        }
        self.free_head = next;
        self.len = 0;
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut pool: Pool<i32> = Pool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        let c = pool.insert(3);

        assert_eq!(pool.len(), 3);
        assert_eq!(pool.remove(b), Some(2));
        assert_eq!(pool.len(), 2);
        assert!(pool.get(b).is_none());
        assert_eq!(pool.get(a), Some(&1));
        assert_eq!(pool.get(c), Some(&3));
    }

    #[test]
    fn test_stale_handle_rejected_after_slot_reuse() {
        let mut pool: Pool<&str> = Pool::new();
        let old = pool.insert("mesh");
        pool.remove(old);

        let new = pool.insert("material");
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(pool.get(old).is_none());
        assert!(pool.remove(old).is_none());
        assert_eq!(pool.get(new), Some(&"material"));
    }

    #[test]
    fn test_double_remove_is_noop() {
        let mut pool: Pool<i32> = Pool::new();
        let h = pool.insert(5);
        assert!(pool.remove(h).is_some());
        assert!(pool.remove(h).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut pool: Pool<i32> = Pool::new();
        let h0 = pool.insert(0);
        let h1 = pool.insert(1);
        let h2 = pool.insert(2);
        pool.remove(h1);
        pool.remove(h0);
        pool.remove(h2);

        assert_eq!(pool.insert(10).index(), 2);
        assert_eq!(pool.insert(20).index(), 0);
        assert_eq!(pool.insert(30).index(), 1);
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut pool: Pool<i32> = Pool::new();
        pool.insert(1);
        let h = pool.insert(2);
        pool.insert(3);
        pool.remove(h);

        let values: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 3]);
        for v in pool.iter_mut() {
            *v *= 10;
        }
        let values: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10, 30]);
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut pool: Pool<i32> = Pool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        pool.clear();

        assert!(pool.is_empty());
        assert!(pool.get(a).is_none());
        assert!(pool.get(b).is_none());
        let c = pool.insert(3);
        assert_eq!(c.index(), 0);
        assert_ne!(c, a);
    }
}
