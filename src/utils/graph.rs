use std::collections::{BTreeMap, BTreeSet};

/// Undirected graph structure:
/// every node maps to the ordered set of nodes connected to it.
/// Ordered containers keep iteration, and so every decision made from it,
/// deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Graph<T: Ord>(BTreeMap<T, BTreeSet<T>>);

impl<T: Ord + Clone + Copy> Graph<T> {
  pub fn new() -> Self {
    Graph(BTreeMap::new())
  }

  /// Return the neighbors of a node
  ///
  /// # Return
  /// If the node does not exist, return None
  /// If there is no neighbor for this node, return an empty set
  pub fn neighbors(&self, node: &T) -> Option<&BTreeSet<T>> {
    self.0.get(node)
  }

  pub fn contains(&self, node: &T) -> bool {
    self.0.contains_key(node)
  }

  /// All nodes, in increasing order
  pub fn nodes(&self) -> impl Iterator<Item = &T> {
    self.0.keys()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Number of neighbors, 0 for absent nodes
  pub fn degree(&self, node: &T) -> usize {
    self.0.get(node).map_or(0, |n| n.len())
  }

  pub fn has_edge(&self, node1: &T, node2: &T) -> bool {
    self.0.get(node1).map_or(false, |n| n.contains(node2))
  }

  /// Idempotently add a node into the graph
  pub fn add_node(&mut self, node: T) {
    self.0.entry(node).or_default();
  }

  /// Add edges between a node and its neighbors
  pub fn add_graph_edges(&mut self, node: T, neighbors: &BTreeSet<T>) {
    for neigh in neighbors {
      self.add_graph_edge(node, *neigh);
    }
  }

  /// Add an edge between two nodes, i.e. node1 and node2.
  /// Self loops are ignored.
  pub fn add_graph_edge(&mut self, node1: T, node2: T) {
    if node1 == node2 {
      self.add_node(node1);
      return;
    }
    self.0.entry(node1).or_default().insert(node2);
    self.0.entry(node2).or_default().insert(node1);
  }

  pub fn remove_node(&mut self, node: T) {
    if let Some(neighbors) = self.0.remove(&node) {
      for neigh in neighbors {
        if let Some(set) = self.0.get_mut(&neigh) {
          set.remove(&node);
        }
      }
    }
  }

  /// Merge `absorb` into `keep`: `keep` gains every neighbor of `absorb`,
  /// and `absorb` leaves the graph.
  pub fn merge(&mut self, keep: T, absorb: T) {
    let neighbors = self.0.get(&absorb).cloned().unwrap_or_default();
    self.remove_node(absorb);
    self.add_node(keep);
    for neigh in neighbors {
      if neigh != keep {
        self.add_graph_edge(keep, neigh);
      }
    }
  }
}
