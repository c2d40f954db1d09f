//! Priority queues keyed on numeric deadlines.
//!
//! [`PriorityQueue`] is a binary min-heap of `(payload, priority)` pairs
//! ordered by priority, lower first. The standard library heap is a max-heap
//! over `Ord` keys; deadlines here are `f64` simulation times, so the heap
//! is maintained directly.
//!
//! [`WorkQueues`] is the named set of entity work queues the scheduler and
//! systems share: scheduled systems drain their own queue and may push onto
//! any queue by index from inside an update.

use std::collections::HashMap;

use crate::engine::error::{EcsResult, EmptyQueueError, ScheduleError};
use crate::engine::types::{Entity, QueueIndex};


/// Binary min-heap of `(payload, priority)` pairs.
///
/// Lower priorities pop first. Ties pop in unspecified order. Operations on
/// an empty queue are categorical errors.
pub struct PriorityQueue<P> {
    heap: Vec<(P, f64)>,
}

impl<P> Default for PriorityQueue<P> {
    fn default() -> Self {
        Self { heap: Vec::new() }
    }
}

impl<P> PriorityQueue<P> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes all queued pairs.
    #[inline]
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Pushes a payload with the given priority.
    pub fn push(&mut self, payload: P, priority: f64) {
        self.heap.push((payload, priority));
        self.sift_up(self.heap.len() - 1);
    }

    /// Returns the payload with the smallest priority without removing it.
    ///
    /// ## Errors
    /// `EmptyQueueError` on an empty queue.
    pub fn peek(&self) -> EcsResult<&P> {
        self.heap.first().map(|(p, _)| p).ok_or_else(|| EmptyQueueError.into())
    }

    /// Returns the smallest priority without removing its payload.
    ///
    /// ## Errors
    /// `EmptyQueueError` on an empty queue.
    pub fn top_priority(&self) -> EcsResult<f64> {
        self.heap.first().map(|&(_, d)| d).ok_or_else(|| EmptyQueueError.into())
    }

    /// Removes and returns the pair with the smallest priority.
    ///
    /// ## Errors
    /// `EmptyQueueError` on an empty queue.
    pub fn pop(&mut self) -> EcsResult<(P, f64)> {
        if self.heap.is_empty() {
            return Err(EmptyQueueError.into());
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let out = self.heap.pop().expect("heap length checked above");
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Ok(out)
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].1 < self.heap[parent].1 {
                self.heap.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.heap[left].1 < self.heap[smallest].1 {
                smallest = left;
            }
            if right < len && self.heap[right].1 < self.heap[smallest].1 {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.heap.swap(index, smallest);
            index = smallest;
        }
    }
}

/// Named set of `(entity, deadline)` work queues.
///
/// ## Purpose
/// Each scheduled system owns one queue by name; the scheduler drains queues
/// in deadline order, and any system may push follow-up work onto any queue
/// by index from inside `update_entity`.
pub struct WorkQueues {
    queues: Vec<PriorityQueue<Entity>>,
    by_name: HashMap<String, QueueIndex>,
}

impl Default for WorkQueues {
    fn default() -> Self {
        Self { queues: Vec::new(), by_name: HashMap::new() }
    }
}

impl WorkQueues {
    /// Creates an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new queue under `name`.
    ///
    /// ## Errors
    /// `ScheduleError::DuplicateQueue` if the name is taken.
    pub fn create(&mut self, name: &str) -> EcsResult<QueueIndex> {
        if self.by_name.contains_key(name) {
            return Err(ScheduleError::DuplicateQueue { name: name.to_string() }.into());
        }
        let index = self.queues.len() as QueueIndex;
        self.by_name.insert(name.to_string(), index);
        self.queues.push(PriorityQueue::new());
        Ok(index)
    }

    /// Returns the index registered under `name`, if any.
    pub fn index_by_name(&self, name: &str) -> Option<QueueIndex> {
        self.by_name.get(name).copied()
    }

    /// Pushes `(entity, deadline)` onto the queue at `index`.
    ///
    /// ## Errors
    /// `ScheduleError::UnknownQueue` for an unregistered index.
    pub fn schedule(&mut self, index: QueueIndex, entity: Entity, deadline: f64) -> EcsResult<()> {
        let queue = self
            .queues
            .get_mut(index as usize)
            .ok_or(ScheduleError::UnknownQueue { index })?;
        queue.push(entity, deadline);
        Ok(())
    }

    /// Smallest deadline queued at `index`, or `None` when empty.
    pub fn next_deadline(&self, index: QueueIndex) -> Option<f64> {
        let queue = self.queues.get(index as usize)?;
        if queue.is_empty() {
            None
        } else {
            queue.top_priority().ok()
        }
    }

    /// Pops the head of the queue at `index`.
    ///
    /// ## Errors
    /// `UnknownQueue` for an unregistered index, `EmptyQueueError` on an
    /// empty queue.
    pub fn pop(&mut self, index: QueueIndex) -> EcsResult<(Entity, f64)> {
        let queue = self
            .queues
            .get_mut(index as usize)
            .ok_or(ScheduleError::UnknownQueue { index })?;
        queue.pop()
    }

    /// Number of registered queues.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Returns `true` if no queue has been registered.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
