//! Priority queue backing the scheduler's ready list.
//!
//! Lower numeric priority dequeues first; ties are broken by insertion
//! order (a monotonic sequence number), so the queue is a stable min-queue
//! over `(priority, seq)`.

use std::cmp::Ordering;
use std::collections::VecDeque;

/// Anything that can sit in a [`PriorityQueue`] must expose a stable key so
/// the queue can support `remove` without a linear key comparison living
/// outside the queue itself.
pub trait QueueKey {
    /// The key used for `remove`. Typically a task id.
    fn queue_key(&self) -> &str;
}

#[derive(Debug, Clone)]
struct Entry<T> {
    priority: i64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Stable min-priority queue over `(priority, insertion order)`.
///
/// # Examples
///
/// ```
/// use subagent_core::domain::models::queue::{PriorityQueue, QueueKey};
///
/// struct Item(&'static str);
/// impl QueueKey for Item {
///     fn queue_key(&self) -> &str { self.0 }
/// }
///
/// let mut queue = PriorityQueue::new();
/// queue.enqueue(Item("low"), 10);
/// queue.enqueue(Item("high"), 1);
///
/// assert_eq!(queue.dequeue().unwrap().0, "high");
/// assert_eq!(queue.dequeue().unwrap().0, "low");
/// ```
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    items: VecDeque<Entry<T>>,
    next_seq: u64,
}

impl<T> PriorityQueue<T> {
    /// Creates an empty queue.
    #[allow(clippy::missing_const_for_fn)]
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Inserts `item` with the given `priority` (lower dequeues first).
    pub fn enqueue(&mut self, item: T, priority: i64) {
        let entry = Entry {
            priority,
            seq: self.next_seq,
            item,
        };
        self.next_seq += 1;

        let position = self
            .items
            .iter()
            .position(|existing| entry < *existing)
            .unwrap_or(self.items.len());

        self.items.insert(position, entry);
    }

    /// Removes and returns the lowest-priority-value item.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front().map(|entry| entry.item)
    }

    /// Returns a reference to the head item without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front().map(|entry| &entry.item)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates items in dequeue order without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|entry| &entry.item)
    }
}

impl<T: QueueKey> PriorityQueue<T> {
    /// Removes the item whose [`QueueKey::queue_key`] equals `key`.
    ///
    /// Returns `true` if an item was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        if let Some(pos) = self.items.iter().position(|entry| entry.item.queue_key() == key) {
            self.items.remove(pos);
            true
        } else {
            false
        }
    }

    /// True if an item with the given key is currently queued.
    pub fn contains(&self, key: &str) -> bool {
        self.items.iter().any(|entry| entry.item.queue_key() == key)
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Task(&'static str);

    impl QueueKey for Task {
        fn queue_key(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn new_queue_is_empty() {
        let queue: PriorityQueue<Task> = PriorityQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn lower_priority_value_dequeues_first() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Task("low"), 10);
        queue.enqueue(Task("high"), 1);
        queue.enqueue(Task("medium"), 5);

        assert_eq!(queue.dequeue(), Some(Task("high")));
        assert_eq!(queue.dequeue(), Some(Task("medium")));
        assert_eq!(queue.dequeue(), Some(Task("low")));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Task("first"), 5);
        queue.enqueue(Task("second"), 5);
        queue.enqueue(Task("third"), 5);

        assert_eq!(queue.dequeue(), Some(Task("first")));
        assert_eq!(queue.dequeue(), Some(Task("second")));
        assert_eq!(queue.dequeue(), Some(Task("third")));
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Task("item"), 5);

        assert_eq!(queue.peek(), Some(&Task("item")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_by_key() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Task("a"), 5);
        queue.enqueue(Task("b"), 1);
        queue.enqueue(Task("c"), 5);

        assert!(queue.remove("b"));
        assert!(!queue.remove("b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(), Some(Task("a")));
        assert_eq!(queue.dequeue(), Some(Task("c")));
    }

    #[test]
    fn contains_reflects_presence() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Task("a"), 5);
        assert!(queue.contains("a"));
        assert!(!queue.contains("b"));
        queue.dequeue();
        assert!(!queue.contains("a"));
    }

    #[test]
    fn priority_and_fifo_mixed() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(Task("P10-A"), 10);
        queue.enqueue(Task("P5-A"), 5);
        queue.enqueue(Task("P10-B"), 10);
        queue.enqueue(Task("P1-A"), 1);
        queue.enqueue(Task("P5-B"), 5);

        assert_eq!(queue.dequeue(), Some(Task("P1-A")));
        assert_eq!(queue.dequeue(), Some(Task("P5-A")));
        assert_eq!(queue.dequeue(), Some(Task("P5-B")));
        assert_eq!(queue.dequeue(), Some(Task("P10-A")));
        assert_eq!(queue.dequeue(), Some(Task("P10-B")));
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Labeled(String);

    impl QueueKey for Labeled {
        fn queue_key(&self) -> &str {
            &self.0
        }
    }

    use proptest::prelude::*;

    proptest! {
        /// Dequeue order is non-decreasing in priority for any insertion
        /// sequence, regardless of how the priorities were interleaved.
        #[test]
        fn proptest_dequeue_order_is_sorted_by_priority(priorities in prop::collection::vec(-100i64..100i64, 0..50)) {
            let mut queue = PriorityQueue::new();
            for (i, priority) in priorities.iter().enumerate() {
                queue.enqueue(Labeled(i.to_string()), *priority);
            }

            let mut dequeued_priorities = Vec::with_capacity(priorities.len());
            while let Some(label) = queue.dequeue() {
                let original_index: usize = label.0.parse().unwrap();
                dequeued_priorities.push(priorities[original_index]);
            }

            prop_assert_eq!(dequeued_priorities.len(), priorities.len());
            let mut expected = priorities;
            expected.sort_unstable();
            prop_assert_eq!(dequeued_priorities, expected);
        }

        /// Ties at the same priority come out in the order they were
        /// enqueued, regardless of how many items share that priority.
        #[test]
        fn proptest_equal_priority_ties_are_fifo(
            priority in -10i64..10i64,
            count in 0usize..20usize,
        ) {
            let mut queue = PriorityQueue::new();
            let labels: Vec<String> = (0..count).map(|i| i.to_string()).collect();
            for label in &labels {
                queue.enqueue(Labeled(label.clone()), priority);
            }

            let mut observed = Vec::new();
            while let Some(item) = queue.dequeue() {
                observed.push(item.0);
            }
            prop_assert_eq!(observed, labels);
        }

        /// `len`/`is_empty` stay consistent with the number of enqueues and
        /// the queue drains to empty after that many dequeues.
        #[test]
        fn proptest_len_tracks_enqueue_and_dequeue(n in 0usize..30usize) {
            let mut queue = PriorityQueue::new();
            for i in 0..n {
                #[allow(clippy::cast_possible_wrap)]
                queue.enqueue(Labeled(i.to_string()), (i % 7) as i64);
            }
            prop_assert_eq!(queue.len(), n);
            prop_assert_eq!(queue.is_empty(), n == 0);

            let mut popped = 0;
            while queue.dequeue().is_some() {
                popped += 1;
            }
            prop_assert_eq!(popped, n);
            prop_assert!(queue.is_empty());
        }
    }
}
