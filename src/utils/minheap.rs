use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Smallest-first heap. Coloring collects the registers taken by neighbors
/// into one to find the lowest free register.
pub struct MinHeap<T: Ord>(BinaryHeap<Reverse<T>>);

impl<T: Ord> MinHeap<T> {
  pub fn new() -> Self {
    MinHeap(BinaryHeap::new())
  }

  pub fn push(&mut self, item: T) {
    self.0.push(Reverse(item));
  }

  pub fn pop(&mut self) -> Option<T> {
    self.0.pop().map(|Reverse(v)| v)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<T: Ord> Default for MinHeap<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl MinHeap<u32> {
  /// Smallest value not in the heap. Drains the heap up to that value.
  pub fn find_smallest_absent(&mut self) -> u32 {
    let mut next = 0;
    while let Some(v) = self.pop() {
      match v.cmp(&next) {
        // a duplicate of a value already counted
        Ordering::Less => continue,
        Ordering::Equal => next += 1,
        Ordering::Greater => break,
      }
    }
    next
  }
}

impl<T: Ord> FromIterator<T> for MinHeap<T> {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    MinHeap(iter.into_iter().map(Reverse).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pops_smallest_first() {
    let mut heap = MinHeap::new();
    heap.push(5);
    heap.push(2);
    heap.push(9);
    assert_eq!(heap.len(), 3);
    assert_eq!(heap.pop(), Some(2));
    assert_eq!(heap.pop(), Some(5));
    assert_eq!(heap.pop(), Some(9));
    assert!(heap.is_empty());
  }

  #[test]
  fn gap_in_the_middle() {
    let mut heap = [4u32, 0, 1, 3].into_iter().collect::<MinHeap<_>>();
    assert_eq!(heap.find_smallest_absent(), 2);
  }

  #[test]
  fn no_gap_means_one_past_the_end() {
    let mut heap = [2u32, 1, 0].into_iter().collect::<MinHeap<_>>();
    assert_eq!(heap.find_smallest_absent(), 3);
    assert_eq!(MinHeap::<u32>::new().find_smallest_absent(), 0);
  }

  #[test]
  fn duplicates_are_skipped() {
    let mut heap = [0u32, 0, 1, 1, 3].into_iter().collect::<MinHeap<_>>();
    assert_eq!(heap.find_smallest_absent(), 2);
  }
}
