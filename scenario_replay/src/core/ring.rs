//! Fixed-capacity ring storage with logical (oldest-to-newest) indexing.
//!
//! Every column of every scenario bucket is a `Ring`. Pushing into a full
//! ring physically evicts the oldest element, so the ring contents are
//! exactly the newest `capacity` elements ever pushed.

/// Ring buffer with O(1) push and O(1) logical random access.
///
/// Storage grows lazily up to `capacity`; `head` only moves once the ring
/// is full, so index 0 is always the oldest retained element.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    data: Vec<T>,
    capacity: usize,
    head: usize,
}

impl<T> Ring<T> {
    /// Create an empty ring holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            head: 0,
        }
    }

    /// Push an element, returning the evicted oldest element if full.
    ///
    /// A zero-capacity ring retains nothing and hands the item straight back.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        if self.data.len() < self.capacity {
            self.data.push(item);
            None
        } else {
            let evicted = std::mem::replace(&mut self.data[self.head], item);
            self.head = (self.head + 1) % self.capacity;
            Some(evicted)
        }
    }

    /// Get the element at logical position `idx` (0 = oldest).
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&T> {
        if idx >= self.data.len() {
            return None;
        }
        let actual_idx = (self.head + idx) % self.data.len();
        self.data.get(actual_idx)
    }

    /// Mutable access at logical position `idx`.
    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        if idx >= self.data.len() {
            return None;
        }
        let actual_idx = (self.head + idx) % self.data.len();
        self.data.get_mut(actual_idx)
    }

    /// Newest element.
    pub fn last(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|idx| self.get(idx))
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (front, back) = self.data.split_at(self.head);
        back.iter().chain(front.iter())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every element, keeping the capacity.
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_push_and_get() {
        let mut ring: Ring<i32> = Ring::new(3);

        assert!(ring.push(1).is_none());
        assert!(ring.push(2).is_none());
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.get(0), Some(&1));
        assert_eq!(ring.get(1), Some(&2));
        assert_eq!(ring.get(2), None);
    }

    #[test]
    fn test_ring_overflow_keeps_logical_order() {
        let mut ring: Ring<i32> = Ring::new(3);

        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));

        assert_eq!(ring.len(), 3);
        assert!(ring.is_full());
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.get(0), Some(&3));
        assert_eq!(ring.last(), Some(&5));
    }

    #[test]
    fn test_ring_get_mut() {
        let mut ring: Ring<i32> = Ring::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);

        *ring.get_mut(0).unwrap() = 20;
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![20, 3]);
    }

    #[test]
    fn test_ring_zero_capacity() {
        let mut ring: Ring<i32> = Ring::new(0);
        assert_eq!(ring.push(7), Some(7));
        assert!(ring.is_empty());
        assert!(ring.last().is_none());
    }

    #[test]
    fn test_ring_clear() {
        let mut ring: Ring<i32> = Ring::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 2);
        ring.push(9);
        assert_eq!(ring.get(0), Some(&9));
    }
}
