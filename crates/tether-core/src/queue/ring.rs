//! Power-of-two circular buffer backing a queue
//!
//! `head` is `None` exactly when the buffer is empty, in which case `tail` is
//! reset to 0. Occupancy is `(tail - head) mod capacity`, with the full
//! buffer distinguished from the empty one by `head` being set.

use crate::error::{Error, Result};

pub(crate) struct Ring<T> {
    slots: Vec<Option<T>>,
    head: Option<usize>,
    tail: usize,
}

impl<T> Ring<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self> {
        debug_assert!(capacity.is_power_of_two());
        Ok(Self {
            slots: allocate(capacity)?,
            head: None,
            tail: 0,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    pub(crate) fn len(&self) -> usize {
        match self.head {
            None => 0,
            Some(head) => match self.tail.wrapping_sub(head) & self.mask() {
                0 => self.capacity(),
                n => n,
            },
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.head == Some(self.tail)
    }

    pub(crate) fn push_back(&mut self, item: T) {
        assert!(!self.is_full(), "push into a full ring");
        debug_assert!(self.slots[self.tail].is_none());
        self.slots[self.tail] = Some(item);
        if self.head.is_none() {
            self.head = Some(self.tail);
        }
        self.tail = (self.tail + 1) & self.mask();
    }

    pub(crate) fn push_front(&mut self, item: T) {
        assert!(!self.is_full(), "push into a full ring");
        match self.head {
            None => self.push_back(item),
            Some(head) => {
                let index = head.wrapping_sub(1) & self.mask();
                debug_assert!(self.slots[index].is_none());
                self.slots[index] = Some(item);
                self.head = Some(index);
            }
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        let item = self.slots[head].take();
        assert!(item.is_some(), "ring head points at an empty slot");

        let next = (head + 1) & self.mask();
        if next == self.tail {
            self.head = None;
            self.tail = 0;
        } else {
            self.head = Some(next);
        }
        item
    }

    pub(crate) fn pop_back(&mut self) -> Option<T> {
        let head = self.head?;
        let last = self.tail.wrapping_sub(1) & self.mask();
        let item = self.slots[last].take();
        assert!(item.is_some(), "ring tail follows an empty slot");

        if last == head {
            self.head = None;
            self.tail = 0;
        } else {
            self.tail = last;
        }
        item
    }

    pub(crate) fn front(&self) -> Option<&T> {
        self.head.and_then(|head| self.slots[head].as_ref())
    }

    /// Move the contents into a buffer of `capacity` slots, oldest first
    pub(crate) fn resize(&mut self, capacity: usize) -> Result<()> {
        debug_assert!(capacity.is_power_of_two());
        let len = self.len();
        assert!(len <= capacity, "resize would drop items");

        let mut slots = allocate(capacity)?;
        let mut index = 0;
        while let Some(item) = self.pop_front() {
            slots[index] = Some(item);
            index += 1;
        }

        self.slots = slots;
        if len == 0 {
            self.head = None;
            self.tail = 0;
        } else {
            self.head = Some(0);
            self.tail = len & (capacity - 1);
        }
        Ok(())
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.pop_front())
    }
}

fn allocate<T>(capacity: usize) -> Result<Vec<Option<T>>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| Error::Exhausted)?;
    slots.resize_with(capacity, || None);
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring_sentinels() {
        let ring: Ring<u32> = Ring::with_capacity(4).unwrap();
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.head, None);
        assert_eq!(ring.tail, 0);
    }

    #[test]
    fn test_fill_and_wrap() {
        let mut ring = Ring::with_capacity(4).unwrap();
        for i in 0..4 {
            ring.push_back(i);
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 4);

        assert_eq!(ring.pop_front(), Some(0));
        assert_eq!(ring.pop_front(), Some(1));
        ring.push_back(4);
        ring.push_back(5);
        assert!(ring.is_full());

        let drained: Vec<_> = ring.drain().collect();
        assert_eq!(drained, vec![2, 3, 4, 5]);
        assert_eq!(ring.head, None);
        assert_eq!(ring.tail, 0);
    }

    #[test]
    fn test_push_front_is_lifo() {
        let mut ring = Ring::with_capacity(8).unwrap();
        ring.push_front('a');
        ring.push_front('b');
        ring.push_front('c');
        assert_eq!(ring.front(), Some(&'c'));
        let drained: Vec<_> = ring.drain().collect();
        assert_eq!(drained, vec!['c', 'b', 'a']);
    }

    #[test]
    fn test_resize_preserves_order_across_wrap() {
        let mut ring = Ring::with_capacity(4).unwrap();
        ring.push_back(1);
        ring.push_back(2);
        ring.pop_front();
        ring.push_back(3);
        ring.push_back(4);
        ring.push_back(5);
        assert!(ring.is_full());

        ring.resize(8).unwrap();
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.len(), 4);
        ring.push_back(6);

        ring.resize(8).unwrap();
        let drained: Vec<_> = ring.drain().collect();
        assert_eq!(drained, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_pop_back_across_wrap() {
        let mut ring = Ring::with_capacity(4).unwrap();
        for i in 0..4 {
            ring.push_back(i);
        }
        ring.pop_front();
        ring.push_back(4);
        assert!(ring.is_full());

        assert_eq!(ring.pop_back(), Some(4));
        assert_eq!(ring.len(), 3);
        ring.push_front(9);
        assert_eq!(ring.pop_back(), Some(3));
        assert_eq!(ring.pop_back(), Some(2));
        assert_eq!(ring.pop_back(), Some(1));
        assert_eq!(ring.pop_back(), Some(9));
        assert_eq!(ring.pop_back(), None);
        assert_eq!(ring.head, None);
        assert_eq!(ring.tail, 0);
    }

    #[test]
    fn test_resize_full_to_same_len() {
        let mut ring = Ring::with_capacity(2).unwrap();
        ring.push_back(1);
        ring.push_back(2);
        ring.resize(2).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.len(), 2);
    }
}
