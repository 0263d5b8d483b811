//! Ordering disciplines for [`Queue`](super::Queue).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;

/// Storage and retrieval order of a queue.
pub trait Discipline<T> {
    /// Store an item.
    fn push(&mut self, item: T);

    /// Remove the next item in this discipline's order.
    fn pop(&mut self) -> Option<T>;

    /// The item `pop` would return next.
    fn peek(&self) -> Option<&T>;

    /// Number of stored items.
    fn len(&self) -> usize;

    /// Whether nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First in, first out.
pub struct Fifo<T> {
    items: VecDeque<T>,
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> Discipline<T> for Fifo<T> {
    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Last in, first out.
pub struct Lifo<T> {
    items: Vec<T>,
}

impl<T> Default for Lifo<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Discipline<T> for Lifo<T> {
    fn push(&mut self, item: T) {
        self.items.push(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Heap entry ordered lowest priority value first, then by insertion.
struct Prioritized<P, V> {
    item: (P, V),
    seq: u64,
}

impl<P: Ord, V> PartialEq for Prioritized<P, V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P: Ord, V> Eq for Prioritized<P, V> {}

impl<P: Ord, V> PartialOrd for Prioritized<P, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P: Ord, V> Ord for Prioritized<P, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for the max-heap: smaller priority and earlier seq win.
        other
            .item
            .0
            .cmp(&self.item.0)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// `(priority, value)` pairs, lowest priority first and FIFO among equals.
pub struct PriorityOrder<P, V> {
    heap: BinaryHeap<Prioritized<P, V>>,
    next_seq: u64,
}

impl<P: Ord, V> Default for PriorityOrder<P, V> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<P: Ord, V> Discipline<(P, V)> for PriorityOrder<P, V> {
    fn push(&mut self, item: (P, V)) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Prioritized { item, seq });
    }

    fn pop(&mut self) -> Option<(P, V)> {
        self.heap.pop().map(|entry| entry.item)
    }

    fn peek(&self) -> Option<&(P, V)> {
        self.heap.peek().map(|entry| &entry.item)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

impl<T> fmt::Debug for Fifo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fifo").field("len", &self.items.len()).finish()
    }
}

impl<T> fmt::Debug for Lifo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifo").field("len", &self.items.len()).finish()
    }
}

impl<P, V> fmt::Debug for PriorityOrder<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityOrder")
            .field("len", &self.heap.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut q = PriorityOrder::default();
        q.push((3, "low"));
        q.push((0, "critical"));
        q.push((2, "normal"));
        q.push((1, "high"));

        assert_eq!(q.pop(), Some((0, "critical")));
        assert_eq!(q.pop(), Some((1, "high")));
        assert_eq!(q.pop(), Some((2, "normal")));
        assert_eq!(q.pop(), Some((3, "low")));
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = PriorityOrder::default();
        q.push((5, "a"));
        q.push((5, "b"));
        q.push((1, "urgent"));
        q.push((5, "c"));

        assert_eq!(q.peek(), Some(&(1, "urgent")));
        assert_eq!(q.pop(), Some((1, "urgent")));
        assert_eq!(q.pop(), Some((5, "a")));
        assert_eq!(q.pop(), Some((5, "b")));
        assert_eq!(q.pop(), Some((5, "c")));
    }

    #[test]
    fn test_lifo_and_fifo_order() {
        let mut fifo = Fifo::default();
        let mut lifo = Lifo::default();
        for i in 1..=3 {
            fifo.push(i);
            lifo.push(i);
        }
        assert_eq!(fifo.peek(), Some(&1));
        assert_eq!(lifo.peek(), Some(&3));
        assert_eq!((fifo.pop(), lifo.pop()), (Some(1), Some(3)));
        assert_eq!(fifo.len(), 2);
    }

    #[test]
    fn test_empty_discipline() {
        let mut q = PriorityOrder::<u8, String>::default();
        assert!(q.pop().is_none());
        assert!(q.is_empty());
    }
}
