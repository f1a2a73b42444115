//! Array-backed binary min-heap of scheduled tasks
//!
//! Each task records its own position in the heap, so a task can be removed
//! from any position in O(log n), not only from the top. Entries are ordered
//! by due time and then by insertion sequence, which makes tasks with equal
//! due times fire in the order they were scheduled.

use super::task::{Task, NOT_QUEUED};
use crate::error::{Error, Result};
use crate::handle::Ref;
use crate::time::Timespec;
use std::sync::atomic::Ordering;

/// Default minimum heap capacity
pub const DEFAULT_MIN_CAPACITY: usize = 16;

pub(crate) struct Entry {
    pub(crate) due: Timespec,
    pub(crate) seq: u64,
    pub(crate) task: Ref<Task>,
}

impl Entry {
    fn precedes(&self, other: &Entry) -> bool {
        (self.due, self.seq) < (other.due, other.seq)
    }
}

pub(crate) struct TaskHeap {
    entries: Vec<Entry>,
    min_capacity: usize,
}

impl TaskHeap {
    pub(crate) fn new(min_capacity: usize) -> Self {
        let min_capacity = min_capacity.max(1).next_power_of_two();
        Self {
            entries: Vec::with_capacity(min_capacity),
            min_capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub(crate) fn peek(&self) -> Option<&Entry> {
        self.entries.first()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Insert an entry and return its final index
    ///
    /// On allocation failure the entry is handed back.
    pub(crate) fn push(&mut self, entry: Entry) -> std::result::Result<usize, (Error, Entry)> {
        if let Err(e) = self.grow_if_full() {
            return Err((e, entry));
        }
        let index = self.entries.len();
        entry.task.set_heap_index(index);
        self.entries.push(entry);
        Ok(self.sift_up(index))
    }

    /// Remove and return the earliest entry
    pub(crate) fn pop(&mut self) -> Option<Entry> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.remove(0))
    }

    /// Remove the entry at `index`, restoring heap order around the hole
    pub(crate) fn remove(&mut self, index: usize) -> Entry {
        assert!(index < self.entries.len(), "heap index out of range");
        let last = self.entries.len() - 1;
        self.swap(index, last);
        let removed = self.entries.pop();
        let Some(removed) = removed else {
            unreachable!("non-empty heap yielded nothing");
        };
        removed.task.set_heap_index(NOT_QUEUED);

        if index < self.entries.len() {
            let settled = self.sift_down(index);
            if settled == index {
                self.sift_up(index);
            }
        }
        self.shrink_if_sparse();
        removed
    }

    /// Take every entry out, leaving the heap empty
    pub(crate) fn drain(&mut self) -> Vec<Entry> {
        let entries = std::mem::take(&mut self.entries);
        for entry in &entries {
            entry.task.set_heap_index(NOT_QUEUED);
        }
        entries
    }

    fn grow_if_full(&mut self) -> Result<()> {
        let capacity = self.entries.capacity();
        if self.entries.len() < capacity {
            return Ok(());
        }
        let additional = capacity.max(self.min_capacity);
        self.entries
            .try_reserve_exact(additional)
            .map_err(|_| Error::Exhausted)
    }

    fn shrink_if_sparse(&mut self) {
        let capacity = self.entries.capacity();
        let half = capacity / 2;
        if half >= self.min_capacity && self.entries.len() < capacity / 4 {
            self.entries.shrink_to(half);
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.entries.swap(a, b);
        self.entries[a].task.set_heap_index(a);
        self.entries[b].task.set_heap_index(b);
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.entries[index].precedes(&self.entries[parent]) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) -> usize {
        let len = self.entries.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.entries[left].precedes(&self.entries[smallest]) {
                smallest = left;
            }
            if right < len && self.entries[right].precedes(&self.entries[smallest]) {
                smallest = right;
            }
            if smallest == index {
                return index;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    #[cfg(test)]
    fn assert_valid(&self) {
        for (i, entry) in self.entries.iter().enumerate() {
            assert_eq!(entry.task.heap_index.load(Ordering::Relaxed), i);
            if i > 0 {
                let parent = &self.entries[(i - 1) / 2];
                assert!(!entry.precedes(parent), "heap order violated at {}", i);
            }
        }
    }
}

impl Task {
    fn set_heap_index(&self, index: usize) {
        self.heap_index.store(index, Ordering::Relaxed);
    }
}
