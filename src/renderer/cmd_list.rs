//! Growable per-frame command list
//!
//! [`CmdList`] is append-only between `clear` calls. Storage doubles when
//! full and is kept across frames, so a steady-state scene allocates
//! nothing per frame.

use std::cmp::Ordering;

use super::cmd::PrimitiveRenderCmd;

/// Comparator used by [`CmdList::sort`].
pub type CmdComparator<T> = fn(&T, &T) -> Ordering;

/// Ordered, resizable sequence of commands with an optional sort order.
#[derive(Debug, Clone)]
pub struct CmdList<T> {
    items: Vec<T>,
    comparator: Option<CmdComparator<T>>,
}

impl<T> CmdList<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            comparator: None,
        }
    }

    pub fn set_comparator(&mut self, comparator: CmdComparator<T>) {
        self.comparator = Some(comparator);
    }

    #[must_use]
    pub fn with_comparator(mut self, comparator: CmdComparator<T>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Append `item` and return its index. Capacity doubles when full.
    pub fn push_back(&mut self, item: T) -> usize {
        if self.items.len() == self.items.capacity() {
            let grow = self.items.capacity().max(1);
            self.items.reserve_exact(grow);
        }
        self.items.push(item);
        self.items.len() - 1
    }

    /// Stable sort of the occupied range. No-op without a comparator.
    pub fn sort(&mut self) {
        if let Some(cmp) = self.comparator {
            if self.items.len() > 1 {
                self.items.sort_by(cmp);
            }
        }
    }

    /// Forget every command; storage is kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> Default for CmdList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a CmdList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Ascending camera distance, for opaque geometry.
pub fn front_to_back(a: &PrimitiveRenderCmd, b: &PrimitiveRenderCmd) -> Ordering {
    debug_assert!(
        !a.sort_distance.is_nan() && !b.sort_distance.is_nan(),
        "NaN sort distance"
    );
    a.sort_distance.total_cmp(&b.sort_distance)
}

/// Descending camera distance, for blended geometry.
pub fn back_to_front(a: &PrimitiveRenderCmd, b: &PrimitiveRenderCmd) -> Ordering {
    debug_assert!(
        !a.sort_distance.is_nan() && !b.sort_distance.is_nan(),
        "NaN sort distance"
    );
    b.sort_distance.total_cmp(&a.sort_distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_from_capacity_one() {
        let mut list = CmdList::with_capacity(1);
        for i in 0..5 {
            assert_eq!(list.push_back(i * 10), i as usize);
        }
        assert_eq!(list.len(), 5);
        assert!(list.capacity() >= 5);
        assert_eq!(list.as_slice(), &[0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_clear_keeps_storage() {
        let mut list = CmdList::new();
        for i in 0..32 {
            list.push_back(i);
        }
        let capacity = list.capacity();
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.capacity(), capacity);
    }

    #[test]
    fn test_sort_without_comparator_keeps_order() {
        let mut list = CmdList::new();
        for i in [3, 1, 2] {
            list.push_back(i);
        }
        list.sort();
        assert_eq!(list.as_slice(), &[3, 1, 2]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut list: CmdList<(u32, char)> =
            CmdList::new().with_comparator(|a, b| a.0.cmp(&b.0));
        for item in [(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')] {
            list.push_back(item);
        }
        list.sort();
        assert_eq!(list.as_slice(), &[(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }
}
