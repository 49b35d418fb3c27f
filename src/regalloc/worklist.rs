//! Node and move bookkeeping of the allocator loop.
//!
//! Every non-precolored node is in exactly one of the simplify, freeze or
//! spill worklists, on the select stack, or coalesced into another node.
//! Every move is in exactly one of the five move states.

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use strum_macros::AsRefStr;

use super::interference::{MoveId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum NodeState {
  /// Not classified yet
  Initial,
  Precolored,
  Simplify,
  Freeze,
  Spill,
  /// Removed from the graph, waiting for a color
  Stack,
  Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MoveState {
  /// Not considered yet, or enabled again
  Worklist,
  /// Considered, not safe to coalesce yet
  Active,
  Coalesced,
  /// Endpoints interfere, never coalescable
  Constrained,
  /// Given up on
  Frozen,
}

#[derive(Debug, Clone)]
pub struct Worklists {
  state: Vec<NodeState>,
  simplify: VecDeque<NodeId>,
  freeze: BTreeSet<NodeId>,
  spill: BTreeSet<NodeId>,
  stack: Vec<NodeId>,

  move_state: Vec<MoveState>,
  /// Moves in `MoveState::Worklist`, in the order they are tried
  pending: BTreeSet<MoveId>,
}

impl Worklists {
  pub fn new(precolored: impl Iterator<Item = bool>, num_moves: usize) -> Self {
    Worklists {
      state: precolored
        .map(|p| {
          if p {
            NodeState::Precolored
          } else {
            NodeState::Initial
          }
        })
        .collect(),
      simplify: VecDeque::new(),
      freeze: BTreeSet::new(),
      spill: BTreeSet::new(),
      stack: vec![],
      move_state: vec![MoveState::Worklist; num_moves],
      pending: (0..num_moves).collect(),
    }
  }

  #[inline]
  pub fn state(&self, node: NodeId) -> NodeState {
    self.state[node]
  }

  #[inline]
  pub fn move_state(&self, mv: MoveId) -> MoveState {
    self.move_state[mv]
  }

  pub fn move_states(&self) -> &[MoveState] {
    &self.move_state
  }

  /// Put a node that is not on any list yet on one.
  pub fn place(&mut self, node: NodeId, state: NodeState) {
    debug_assert_eq!(self.state[node], NodeState::Initial);
    self.push(node, state);
  }

  /// Move a node from whatever list it is on to the list of `state`.
  pub fn transfer(&mut self, node: NodeId, state: NodeState) {
    match self.state[node] {
      NodeState::Simplify => self.simplify.retain(|n| *n != node),
      NodeState::Freeze => {
        self.freeze.remove(&node);
      }
      NodeState::Spill => {
        self.spill.remove(&node);
      }
      NodeState::Stack => self.stack.retain(|n| *n != node),
      NodeState::Initial | NodeState::Precolored | NodeState::Coalesced => {}
    }
    log::trace!("node {} {} -> {}", node, self.state[node].as_ref(), state.as_ref());
    self.push(node, state);
  }

  fn push(&mut self, node: NodeId, state: NodeState) {
    match state {
      NodeState::Simplify => self.simplify.push_back(node),
      NodeState::Freeze => {
        self.freeze.insert(node);
      }
      NodeState::Spill => {
        self.spill.insert(node);
      }
      NodeState::Stack => self.stack.push(node),
      NodeState::Initial | NodeState::Precolored | NodeState::Coalesced => {}
    }
    self.state[node] = state;
  }

  /// Move the first simplify node onto the select stack.
  pub fn pop_simplify(&mut self) -> Option<NodeId> {
    let node = self.simplify.pop_front()?;
    log::trace!("node {} simplify -> stack", node);
    self.push(node, NodeState::Stack);
    Some(node)
  }

  pub fn first_freeze(&self) -> Option<NodeId> {
    self.freeze.iter().next().copied()
  }

  pub fn spill_candidates(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.spill.iter().copied()
  }

  pub fn is_done(&self) -> bool {
    self.simplify.is_empty()
      && self.pending.is_empty()
      && self.freeze.is_empty()
      && self.spill.is_empty()
  }

  pub fn has_simplify(&self) -> bool {
    !self.simplify.is_empty()
  }

  pub fn has_freeze(&self) -> bool {
    !self.freeze.is_empty()
  }

  pub fn has_pending_moves(&self) -> bool {
    !self.pending.is_empty()
  }

  pub fn stack(&self) -> &[NodeId] {
    &self.stack
  }

  /// Take the next move waiting for a coalescing decision.
  pub fn pop_pending_move(&mut self) -> Option<MoveId> {
    let mv = self.pending.iter().next().copied()?;
    self.pending.remove(&mv);
    Some(mv)
  }

  pub fn set_move_state(&mut self, mv: MoveId, state: MoveState) {
    if state == MoveState::Worklist {
      self.pending.insert(mv);
    } else {
      self.pending.remove(&mv);
    }
    log::trace!("move {} {} -> {}", mv, self.move_state[mv].as_ref(), state.as_ref());
    self.move_state[mv] = state;
  }

  /// Number of moves currently in `state`.
  pub fn count_moves(&self, state: MoveState) -> usize {
    self.move_state.iter().filter(|s| **s == state).count()
  }

  /// Structural consistency: the lists and the per-node state agree, and no
  /// node sits on two lists.
  pub fn check_membership(&self) -> Result<(), String> {
    let mut seen = vec![0usize; self.state.len()];
    let lists: [(NodeState, Vec<NodeId>); 4] = [
      (NodeState::Simplify, self.simplify.iter().copied().collect()),
      (NodeState::Freeze, self.freeze.iter().copied().collect()),
      (NodeState::Spill, self.spill.iter().copied().collect()),
      (NodeState::Stack, self.stack.clone()),
    ];
    for (state, nodes) in lists.iter() {
      for node in nodes {
        seen[*node] += 1;
        if self.state[*node] != *state {
          return Err(format!(
            "node {} is on the {} list but marked {}",
            node,
            state.as_ref(),
            self.state[*node].as_ref()
          ));
        }
      }
    }
    for (node, count) in seen.iter().enumerate() {
      let listed = matches!(
        self.state[node],
        NodeState::Simplify | NodeState::Freeze | NodeState::Spill | NodeState::Stack
      );
      if *count != usize::from(listed) {
        return Err(format!("node {} is on {} lists", node, count));
      }
    }
    for (mv, state) in self.move_state.iter().enumerate() {
      if (*state == MoveState::Worklist) != self.pending.contains(&mv) {
        return Err(format!("move {} pending list disagrees with {}", mv, state.as_ref()));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transfer_keeps_lists_disjoint() {
    let mut lists = Worklists::new([true, false, false, false].into_iter(), 1);
    lists.place(1, NodeState::Simplify);
    lists.place(2, NodeState::Freeze);
    lists.place(3, NodeState::Spill);
    assert!(lists.check_membership().is_ok());

    lists.transfer(3, NodeState::Freeze);
    lists.transfer(2, NodeState::Simplify);
    assert_eq!(lists.state(3), NodeState::Freeze);
    assert_eq!(lists.first_freeze(), Some(3));
    assert_eq!(lists.pop_simplify(), Some(1));
    assert_eq!(lists.stack(), &[1]);
    assert_eq!(lists.state(1), NodeState::Stack);
    assert!(lists.check_membership().is_ok());
    assert_eq!(lists.state(0), NodeState::Precolored);
  }

  #[test]
  fn moves_leave_the_pending_set() {
    let mut lists = Worklists::new([false, false].into_iter(), 2);
    lists.place(0, NodeState::Freeze);
    lists.place(1, NodeState::Freeze);
    assert_eq!(lists.pop_pending_move(), Some(0));
    lists.set_move_state(0, MoveState::Active);
    lists.set_move_state(1, MoveState::Frozen);
    assert!(!lists.has_pending_moves());
    lists.set_move_state(0, MoveState::Worklist);
    assert!(lists.has_pending_moves());
    assert_eq!(lists.count_moves(MoveState::Frozen), 1);
    assert!(lists.check_membership().is_ok());
  }

  #[test]
  fn membership_check_catches_strays() {
    let mut lists = Worklists::new([false].into_iter(), 0);
    lists.place(0, NodeState::Simplify);
    lists.spill.insert(0);
    assert!(lists.check_membership().is_err());
  }
}
