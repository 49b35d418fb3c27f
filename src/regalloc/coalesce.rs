/// Implements the conservative move coalescing of the register allocator
use super::{
  interference::{Move, NodeId},
  worklist::{MoveState, NodeState},
  Allocator,
};

impl Allocator<'_> {
  /// Decide on one pending move: coalesce it, or find it constrained, or
  /// leave it active until a neighbor gets simplified.
  pub(super) fn coalesce(&mut self) {
    let mv = match self.lists.pop_pending_move() {
      Some(mv) => mv,
      None => return,
    };
    let Move { dst, src } = self.graph.moves()[mv];
    let (x, y) = (self.get_alias(dst), self.get_alias(src));

    // a precolored endpoint is always the one that survives
    let (u, v) = if self.graph.is_precolored(y) {
      (y, x)
    } else {
      (x, y)
    };

    if u == v {
      self.lists.set_move_state(mv, MoveState::Coalesced);
      self.add_worklist(u);
    } else if self.graph.is_precolored(v) || self.graph.has_edge(u, v) {
      log::debug!(
        "move {} <- {} is constrained",
        self.graph.temp(dst),
        self.graph.temp(src)
      );
      self.lists.set_move_state(mv, MoveState::Constrained);
      self.add_worklist(u);
      self.add_worklist(v);
    } else if (self.graph.is_precolored(u) && self.george(u, v))
      || (!self.graph.is_precolored(u) && self.briggs(u, v))
    {
      log::debug!(
        "coalesce {} into {}",
        self.graph.temp(v),
        self.graph.temp(u)
      );
      self.lists.set_move_state(mv, MoveState::Coalesced);
      self.combine(u, v);
      self.add_worklist(u);
    } else {
      self.lists.set_move_state(mv, MoveState::Active);
    }
  }

  /// A node without moves left and with few neighbors can be simplified.
  fn add_worklist(&mut self, node: NodeId) {
    if self.lists.state(node) == NodeState::Freeze
      && !self.is_move_related(node)
      && self.graph.degree(node) < self.graph.k()
    {
      self.lists.transfer(node, NodeState::Simplify);
    }
  }

  /// Briggs: the merged node has fewer than K significant neighbors.
  fn briggs(&self, u: NodeId, v: NodeId) -> bool {
    let mut neighbors = self.graph.neighbors(u).collect::<Vec<_>>();
    neighbors.extend(self.graph.neighbors(v));
    neighbors.sort_unstable();
    neighbors.dedup();

    let significant = neighbors
      .into_iter()
      .filter(|n| self.graph.is_significant(*n))
      .count();
    significant < self.graph.k()
  }

  /// George: every neighbor of `v` is insignificant, precolored, or already
  /// interferes with the precolored `u`.
  fn george(&self, u: NodeId, v: NodeId) -> bool {
    self.graph.neighbors(v).all(|t| {
      self.graph.degree(t) < self.graph.k()
        || self.graph.is_precolored(t)
        || self.graph.has_edge(t, u)
    })
  }

  /// Merge `v` into `u`.
  fn combine(&mut self, u: NodeId, v: NodeId) {
    self.lists.transfer(v, NodeState::Coalesced);
    self.alias[v] = u;

    let former = self.graph.neighbors(v).collect::<Vec<_>>();
    self.graph.merge(u, v);
    self.enable_moves(&[v]);

    // neighbors shared by u and v lost one edge
    for t in former {
      self.relieve(t);
    }

    if self.lists.state(u) == NodeState::Freeze && self.graph.degree(u) >= self.graph.k() {
      self.lists.transfer(u, NodeState::Spill);
    }
  }
}
