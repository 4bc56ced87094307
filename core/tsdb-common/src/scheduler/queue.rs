//! Task registry and due-time min-heap.
//!
//! The registry owns every live [`Task`], keyed by handle. The heap is an
//! array-backed binary min-heap of handles ordered by due time. Every task
//! stores a backlink to its heap index, and every heap swap repoints the
//! backlinks of the two tasks involved, so a task can be removed from the
//! middle of the heap in O(log n).
//!
//! Ties between equal due times are broken arbitrarily.

use super::task::{Handle, Task};
use crate::clock::Timestamp;
use ahash::AHashMap;

#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    tasks: AHashMap<Handle, Task>,
    heap: Vec<Handle>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `task` and pushes it onto the heap.
    pub(crate) fn insert(&mut self, task: Task) -> Handle {
        let handle = task.handle();
        debug_assert!(!self.tasks.contains_key(&handle), "duplicate handle {}", handle);
        self.tasks.insert(handle, task);
        self.push(handle);
        handle
    }

    /// Number of registered tasks, including the ones being run.
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// `true` when no task is waiting in the heap.
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.tasks.contains_key(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut Task> {
        self.tasks.get_mut(&handle)
    }

    /// Earliest-due queued task.
    pub(crate) fn front(&self) -> Option<&Task> {
        self.heap.first().and_then(|handle| self.tasks.get(handle))
    }

    pub(crate) fn front_due(&self) -> Option<Timestamp> {
        self.front().map(Task::due_time)
    }

    /// Detaches the root of the heap. The task stays registered.
    pub(crate) fn pop_front(&mut self) -> Option<Handle> {
        let last = self.heap.len().checked_sub(1)?;
        self.swap(0, last);
        let handle = self.heap.pop()?;
        self.set_slot(handle, None);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(handle)
    }

    /// Pushes an already registered task back onto the heap.
    pub(crate) fn requeue(&mut self, handle: Handle) {
        debug_assert!(
            self.tasks.get(&handle).is_some_and(|task| !task.is_queued()),
            "requeue of unknown or already queued task {}",
            handle
        );
        self.push(handle);
    }

    /// Removes a queued task from both the heap and the registry.
    ///
    /// The task's slot is treated as due "infinitely in the past": it is
    /// bubbled all the way to the root and then popped. Returns `None` when the
    /// task is unknown or not currently in the heap.
    pub(crate) fn remove_queued(&mut self, handle: Handle) -> Option<Task> {
        let mut index = self.tasks.get(&handle)?.slot()?;
        debug_assert_eq!(self.heap[index], handle, "invalid task backlink");
        while index > 0 {
            let parent = (index - 1) / 2;
            self.swap(index, parent);
            index = parent;
        }
        let popped = self.pop_front();
        debug_assert_eq!(popped, Some(handle));
        self.tasks.remove(&handle)
    }

    /// Drops a task that is not in the heap from the registry.
    pub(crate) fn erase(&mut self, handle: Handle) -> Option<Task> {
        let task = self.tasks.remove(&handle)?;
        debug_assert!(!task.is_queued(), "erased task {} is still queued", handle);
        Some(task)
    }

    /// Empties both structures, returning the discarded tasks.
    pub(crate) fn clear(&mut self) -> Vec<Task> {
        self.heap.clear();
        self.tasks.drain().map(|(_, task)| task).collect()
    }

    fn push(&mut self, handle: Handle) {
        let index = self.heap.len();
        self.heap.push(handle);
        self.set_slot(handle, Some(index));
        self.sift_up(index);
    }

    fn due_at(&self, index: usize) -> Timestamp {
        self.tasks[&self.heap[index]].due_time()
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.due_at(index) >= self.due_at(parent) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.due_at(left) < self.due_at(smallest) {
                smallest = left;
            }
            if right < len && self.due_at(right) < self.due_at(smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    /// Swaps two heap slots and repoints both backlinks.
    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        self.set_slot(self.heap[a], Some(a));
        self.set_slot(self.heap[b], Some(b));
    }

    fn set_slot(&mut self, handle: Handle, slot: Option<usize>) {
        match self.tasks.get_mut(&handle) {
            Some(task) => task.set_slot(slot),
            None => debug_assert!(false, "heap references unregistered task {}", handle),
        }
    }

    /// Full consistency check: bidirectional backlinks and the heap property.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        for (index, handle) in self.heap.iter().enumerate() {
            let task = self
                .tasks
                .get(handle)
                .ok_or_else(|| format!("slot {} references unknown task {}", index, handle))?;
            if task.slot() != Some(index) {
                return Err(format!(
                    "task {} backlink {:?} does not point at slot {}",
                    handle,
                    task.slot(),
                    index
                ));
            }
            if index > 0 && self.due_at((index - 1) / 2) > task.due_time() {
                return Err(format!("heap property violated at slot {}", index));
            }
        }
        for (handle, task) in &self.tasks {
            if let Some(slot) = task.slot() {
                if self.heap.get(slot) != Some(handle) {
                    return Err(format!("task {} claims slot {} it does not own", handle, slot));
                }
            }
        }
        Ok(())
    }
}
