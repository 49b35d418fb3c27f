// select stack + pristine interference graph -> a color for every temp

use std::collections::BTreeSet;

use anyhow::{bail, ensure, Result};

use crate::{frame::Frame, temp::Color, utils::MinHeap};

use super::{
  interference::{InterferenceGraph, Move, NodeId},
  worklist::{MoveState, NodeState},
  Allocator,
};

pub(super) struct Coloring {
  /// Color of each node of the pristine graph
  pub colors: Vec<Color>,
  /// Nodes that ended up in a stack slot, in coloring order
  pub spilled: Vec<NodeId>,
}

impl Allocator<'_> {
  /// Implements the coloring pass.
  ///
  /// Nodes are colored in the reverse order they were simplified. A node
  /// stands for itself and every node coalesced into it, so its forbidden
  /// colors are the colors of all their neighbors in the pristine graph. It
  /// gets the lowest free register, else a stack slot of this round no
  /// neighbor uses, else a brand new slot.
  pub(super) fn assign_colors(
    &self,
    pristine: &InterferenceGraph,
    frame: &mut Frame,
  ) -> Result<Coloring> {
    let n = pristine.len();
    let k = pristine.k() as u32;
    let mut colors = (0..n).map(|node| pristine.precolor(node)).collect::<Vec<_>>();

    let mut members = vec![vec![]; n];
    for node in 0..n {
      members[self.get_alias(node)].push(node);
    }

    let mut round_slots: Vec<u32> = vec![];
    let mut spilled = vec![];

    for &node in self.lists.stack().iter().rev() {
      ensure!(
        node < n && pristine.contains(node),
        "Node {} on the select stack is not in the interference graph",
        node
      );
      ensure!(
        colors[node].is_none(),
        "Temp {} is colored twice",
        pristine.temp(node)
      );

      let mut forbidden = BTreeSet::new();
      for &member in &members[node] {
        for neigh in pristine.neighbors(member) {
          if let Some(color) = colors[self.get_alias(neigh)] {
            forbidden.insert(color);
          }
        }
      }

      let lowest = forbidden
        .iter()
        .filter_map(|c| c.as_reg().copied())
        .collect::<MinHeap<u32>>()
        .find_smallest_absent();
      let preferred = if self.config.move_preference {
        self.preferred_register(pristine, node, &members[node], &colors, &forbidden)
      } else {
        None
      };

      let color = match preferred {
        Some(reg) => Color::Reg(reg),
        None if lowest < k => Color::Reg(lowest),
        None => {
          let reuse = round_slots
            .iter()
            .copied()
            .find(|slot| !forbidden.contains(&Color::Spill(*slot)));
          let slot = match reuse {
            Some(slot) => slot,
            None => {
              let slot = frame.alloc_slot();
              round_slots.push(slot);
              slot
            }
          };
          spilled.extend(members[node].iter().copied());
          Color::Spill(slot)
        }
      };
      log::debug!("color {} with {}", pristine.temp(node), color);
      colors[node] = Some(color);
    }

    // coalesced nodes share the color of their representative
    for node in 0..n {
      if self.lists.state(node) == NodeState::Coalesced {
        colors[node] = colors[self.get_alias(node)];
      }
    }

    let mut result = Vec::with_capacity(n);
    for (node, color) in colors.into_iter().enumerate() {
      match color {
        Some(color) => result.push(color),
        None => bail!("Temp {} was never colored", pristine.temp(node)),
      }
    }

    Self::verify(pristine, &result)?;
    Ok(Coloring {
      colors: result,
      spilled,
    })
  }

  /// A free register some uncoalesced move partner already got, so that the
  /// move turns into a no-op.
  fn preferred_register(
    &self,
    pristine: &InterferenceGraph,
    node: NodeId,
    members: &[NodeId],
    colors: &[Option<Color>],
    forbidden: &BTreeSet<Color>,
  ) -> Option<u32> {
    for &member in members {
      for &mv in pristine.move_list(member) {
        if self.lists.move_state(mv) == MoveState::Coalesced {
          continue;
        }
        let Move { dst, src } = pristine.moves()[mv];
        let (x, y) = (self.get_alias(dst), self.get_alias(src));
        let partner = if x == node { y } else { x };
        if partner == node {
          continue;
        }
        if let Some(Color::Reg(reg)) = colors[partner] {
          if !forbidden.contains(&Color::Reg(reg)) {
            return Some(reg);
          }
        }
      }
    }
    None
  }

  /// No two interfering temps share a color.
  fn verify(pristine: &InterferenceGraph, colors: &[Color]) -> Result<()> {
    for a in 0..pristine.len() {
      for b in pristine.neighbors(a) {
        if a < b && colors[a] == colors[b] {
          bail!(
            "Temps {} and {} interfere but were both given {}",
            pristine.temp(a),
            pristine.temp(b),
            colors[a]
          );
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use crate::args::AllocConfig;
  use crate::asm::Instr;
  use crate::context::Context;
  use crate::flowgraph::FlowGraph;
  use crate::frame::Frame;
  use crate::regalloc::allocate_round;
  use crate::regalloc::liveness::Liveness;
  use crate::temp::Color;

  #[test]
  fn spilled_temps_share_a_slot_when_they_do_not_interfere() {
    // two independent K+1 cliques, one after the other, with K = 1
    let mut ctx = Context::with_registers(1);
    let (a, b, c, d) = (
      ctx.named_temp("a"),
      ctx.named_temp("b"),
      ctx.named_temp("c"),
      ctx.named_temp("d"),
    );
    let instrs = vec![
      Instr::oper("def", vec![a], vec![]),
      Instr::oper("def", vec![b], vec![]),
      Instr::oper("use", vec![], vec![a, b]),
      Instr::oper("def", vec![c], vec![]),
      Instr::oper("def", vec![d], vec![]),
      Instr::oper("use", vec![], vec![c, d]),
    ];
    let flow = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&flow);
    let mut frame = Frame::new(&ctx.machine);
    let config = AllocConfig {
      check_invariants: true,
      ..AllocConfig::default()
    };
    let round = allocate_round(
      &flow,
      &live,
      &ctx.machine,
      &config,
      &BTreeSet::new(),
      &mut frame,
    )
    .unwrap();
    assert_eq!(round.spilled.len(), 2);
    assert_eq!(frame.slot_count(), 1);
    for t in &round.spilled {
      assert_eq!(round.colors[t], Color::Spill(0));
    }
  }

  #[test]
  fn slots_of_earlier_rounds_are_not_reused() {
    let mut ctx = Context::with_registers(1);
    let (a, b) = (ctx.named_temp("a"), ctx.named_temp("b"));
    let instrs = vec![
      Instr::oper("def", vec![a], vec![]),
      Instr::oper("def", vec![b], vec![]),
      Instr::oper("use", vec![], vec![a, b]),
    ];
    let flow = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&flow);
    let mut frame = Frame::new(&ctx.machine);
    frame.alloc_slot();
    let round = allocate_round(
      &flow,
      &live,
      &ctx.machine,
      &AllocConfig::default(),
      &BTreeSet::new(),
      &mut frame,
    )
    .unwrap();
    assert_eq!(round.colors[&round.spilled[0]], Color::Spill(1));
  }
}
