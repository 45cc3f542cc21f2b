//! Fixed-size, `VecDeque`-backed drop-oldest ring buffer holding arbitrary
//! metric sample points.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn push_past_capacity_drops_the_oldest() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.push(4);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    proptest! {
        /// A ring buffer never exceeds its configured capacity no matter
        /// how many items are pushed.
        #[test]
        fn len_never_exceeds_capacity(capacity in 1usize..50, pushes in 0usize..500) {
            let mut ring = RingBuffer::new(capacity);
            for i in 0..pushes {
                ring.push(i);
            }
            prop_assert!(ring.len() <= capacity);
            prop_assert_eq!(ring.len(), pushes.min(capacity));
        }
    }
}
