use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, ensure, Result};
use serde::Serialize;

use crate::{
  args::AllocConfig,
  flowgraph::FlowGraph,
  frame::Frame,
  registers::Machine,
  temp::{Color, Temp},
};

use super::{
  interference::{InterferenceGraph, Move, MoveId, NodeId},
  liveness::Liveness,
  worklist::{MoveState, NodeState, Worklists},
};

/// The allocator is responsible for deciding which temps share a register,
/// and in which order temps get their colors.
/// There is one allocator per procedure and round.
pub struct Allocator<'a> {
  /// The working interference graph, nodes leave it as they are simplified.
  pub(super) graph: InterferenceGraph,
  pub(super) config: &'a AllocConfig,
  pub(super) lists: Worklists,
  /// Representative of each coalesced node, itself for the others.
  pub(super) alias: Vec<NodeId>,
  /// Nodes pushed on the stack despite a high degree.
  spill_selected: BTreeSet<NodeId>,
}

/// How many moves ended up in each final state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoveCounts {
  pub coalesced: usize,
  pub constrained: usize,
  pub frozen: usize,
}

/// The outcome of one allocation round.
#[derive(Debug, Clone)]
pub struct Round {
  /// The color of every temp of the procedure
  pub colors: BTreeMap<Temp, Color>,
  /// Temps that received a spill color, in coloring order
  pub spilled: Vec<Temp>,
  /// `(dst, src)` of every coalesced move
  pub coalesced: Vec<(Temp, Temp)>,
  pub moves: MoveCounts,
  pub move_states: Vec<MoveState>,
  /// The interference graph as built, before the allocator consumed it.
  pub graph: InterferenceGraph,
}

/// Run one round of iterated register coalescing on a procedure.
///
/// Temps in `no_spill` are never chosen for spilling unless nothing else is
/// left. New spill slots come out of `frame`.
pub fn allocate_round(
  flow: &FlowGraph,
  liveness: &Liveness,
  machine: &Machine,
  config: &AllocConfig,
  no_spill: &BTreeSet<Temp>,
  frame: &mut Frame,
) -> Result<Round> {
  // the allocator loop destroys its graph, coloring needs the original
  let pristine = InterferenceGraph::build(flow, liveness, machine, config, no_spill);
  let mut allocator = Allocator::new(pristine.clone(), config);

  allocator.make_worklist()?;
  allocator.run()?;
  let coloring = allocator.assign_colors(&pristine, frame)?;

  let colors = coloring
    .colors
    .iter()
    .enumerate()
    .map(|(node, color)| (pristine.temp(node), *color))
    .collect::<BTreeMap<_, _>>();
  let spilled = coloring
    .spilled
    .iter()
    .map(|node| pristine.temp(*node))
    .collect::<Vec<_>>();
  let coalesced = pristine
    .moves()
    .iter()
    .enumerate()
    .filter(|(id, mv)| {
      allocator.lists.move_state(*id) == MoveState::Coalesced && mv.dst != mv.src
    })
    .map(|(_, mv)| (pristine.temp(mv.dst), pristine.temp(mv.src)))
    .collect::<Vec<_>>();
  let moves = MoveCounts {
    coalesced: allocator.lists.count_moves(MoveState::Coalesced),
    constrained: allocator.lists.count_moves(MoveState::Constrained),
    frozen: allocator.lists.count_moves(MoveState::Frozen),
  };

  log::info!(
    "round done: {} temps, {} spilled, moves {} coalesced / {} constrained / {} frozen",
    colors.len(),
    spilled.len(),
    moves.coalesced,
    moves.constrained,
    moves.frozen
  );

  Ok(Round {
    colors,
    spilled,
    coalesced,
    moves,
    move_states: allocator.lists.move_states().to_vec(),
    graph: pristine,
  })
}

impl<'a> Allocator<'a> {
  pub(super) fn new(graph: InterferenceGraph, config: &'a AllocConfig) -> Self {
    let lists = Worklists::new(
      (0..graph.len()).map(|n| graph.is_precolored(n)),
      graph.moves().len(),
    );
    let alias = (0..graph.len()).collect();
    Allocator {
      graph,
      config,
      lists,
      alias,
      spill_selected: BTreeSet::new(),
    }
  }

  /// Classify every non-precolored node.
  pub(super) fn make_worklist(&mut self) -> Result<()> {
    if !self.config.coalescing {
      for mv in 0..self.graph.moves().len() {
        self.lists.set_move_state(mv, MoveState::Frozen);
      }
    }

    let k = self.graph.k();
    for node in 0..self.graph.len() {
      if self.graph.is_precolored(node) {
        continue;
      }
      let state = if self.graph.degree(node) >= k {
        NodeState::Spill
      } else if self.is_move_related(node) {
        NodeState::Freeze
      } else {
        NodeState::Simplify
      };
      self.lists.place(node, state);
    }
    self.check_invariants()
  }

  /// The main loop, each step in strict priority order.
  pub(super) fn run(&mut self) -> Result<()> {
    while !self.lists.is_done() {
      if self.lists.has_simplify() {
        self.simplify();
      } else if self.lists.has_pending_moves() {
        self.coalesce();
      } else if self.lists.has_freeze() {
        self.freeze();
      } else {
        self.select_spill();
      }
      self.check_invariants()?;
    }
    Ok(())
  }

  /// Moves of a node that may still be coalesced.
  pub(super) fn node_moves(&self, node: NodeId) -> Vec<MoveId> {
    self
      .graph
      .move_list(node)
      .iter()
      .copied()
      .filter(|mv| {
        matches!(
          self.lists.move_state(*mv),
          MoveState::Worklist | MoveState::Active
        )
      })
      .collect()
  }

  pub(super) fn is_move_related(&self, node: NodeId) -> bool {
    !self.node_moves(node).is_empty()
  }

  /// Follow coalescing to the representative of a node.
  pub(super) fn get_alias(&self, node: NodeId) -> NodeId {
    let mut node = node;
    while self.lists.state(node) == NodeState::Coalesced {
      node = self.alias[node];
    }
    node
  }

  fn simplify(&mut self) {
    let node = match self.lists.pop_simplify() {
      Some(node) => node,
      None => return,
    };
    log::debug!("simplify {}", self.graph.temp(node));

    let neighbors = self.graph.neighbors(node).collect::<Vec<_>>();
    self.graph.remove_node(node);
    for neigh in neighbors {
      self.relieve(neigh);
    }
  }

  /// A neighbor of `node` left the graph. Once a spill candidate drops below
  /// K neighbors its moves, and those of its neighbors, may be coalescable.
  pub(super) fn relieve(&mut self, node: NodeId) {
    if self.lists.state(node) != NodeState::Spill || self.graph.degree(node) >= self.graph.k() {
      return;
    }

    let mut nodes = vec![node];
    nodes.extend(self.graph.neighbors(node));
    self.enable_moves(&nodes);

    if self.is_move_related(node) {
      self.lists.transfer(node, NodeState::Freeze);
    } else {
      self.lists.transfer(node, NodeState::Simplify);
    }
  }

  pub(super) fn enable_moves(&mut self, nodes: &[NodeId]) {
    for node in nodes {
      for mv in self.node_moves(*node) {
        if self.lists.move_state(mv) == MoveState::Active {
          self.lists.set_move_state(mv, MoveState::Worklist);
        }
      }
    }
  }

  fn freeze(&mut self) {
    let node = match self.lists.first_freeze() {
      Some(node) => node,
      None => return,
    };
    log::debug!("freeze {}", self.graph.temp(node));
    self.lists.transfer(node, NodeState::Simplify);
    self.freeze_moves(node);
  }

  /// Give up on every move of `node`. Partners left without moves and with a
  /// low degree become simplifiable.
  fn freeze_moves(&mut self, node: NodeId) {
    let node = self.get_alias(node);
    for mv in self.node_moves(node) {
      let Move { dst, src } = self.graph.moves()[mv];
      let (x, y) = (self.get_alias(dst), self.get_alias(src));
      let other = if y == node { x } else { y };

      self.lists.set_move_state(mv, MoveState::Frozen);
      if self.lists.state(other) == NodeState::Freeze
        && !self.is_move_related(other)
        && self.graph.degree(other) < self.graph.k()
      {
        self.lists.transfer(other, NodeState::Simplify);
      }
    }
  }

  /// Pick the spill candidate that is cheapest per neighbor and push it on,
  /// hoping it still finds a color.
  fn select_spill(&mut self) {
    let ratio = |node: NodeId| self.graph.spill_cost(node) / self.graph.degree(node).max(1) as f64;
    let node = self
      .lists
      .spill_candidates()
      .min_by(|a, b| ratio(*a).total_cmp(&ratio(*b)));
    let node = match node {
      Some(node) => node,
      None => return,
    };

    log::debug!(
      "potential spill {} (cost {}, degree {})",
      self.graph.temp(node),
      self.graph.spill_cost(node),
      self.graph.degree(node)
    );
    self.lists.transfer(node, NodeState::Simplify);
    self.spill_selected.insert(node);
    self.freeze_moves(node);
  }

  /// Validate the worklists against the graph, when asked to.
  pub(super) fn check_invariants(&self) -> Result<()> {
    if !self.config.check_invariants {
      return Ok(());
    }
    self
      .lists
      .check_membership()
      .map_err(|e| anyhow!("Allocator worklists are inconsistent: {}", e))?;

    let k = self.graph.k();
    for node in 0..self.graph.len() {
      let temp = self.graph.temp(node);
      let degree = self.graph.degree(node);
      match self.lists.state(node) {
        NodeState::Initial => return Err(anyhow!("Temp {} was never classified", temp)),
        NodeState::Precolored => {}
        NodeState::Simplify => {
          ensure!(
            !self.is_move_related(node),
            "Temp {} is simplifiable but move related",
            temp
          );
          ensure!(
            degree < k || self.spill_selected.contains(&node),
            "Temp {} is simplifiable with degree {}",
            temp,
            degree
          );
        }
        NodeState::Freeze => {
          ensure!(degree < k, "Temp {} is freezable with degree {}", temp, degree);
          ensure!(
            self.is_move_related(node),
            "Temp {} is freezable without moves",
            temp
          );
        }
        NodeState::Spill => {
          ensure!(degree >= k, "Temp {} is a spill candidate with degree {}", temp, degree)
        }
        NodeState::Stack | NodeState::Coalesced => {
          ensure!(
            !self.graph.contains(node),
            "Temp {} left the worklists but is still in the graph",
            temp
          )
        }
      }
    }
    Ok(())
  }
}
