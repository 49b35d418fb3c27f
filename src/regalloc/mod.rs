// The module builds the interference graph of a procedure, performs register
// allocation by iterated register coalescing, and rewrites spills until every
// temp has a color.
mod allocation;
mod coalesce;
mod coloring;
mod interference;
mod liveness;
mod spill;
mod worklist;

pub use allocation::{allocate_round, Allocator, MoveCounts, Round};
pub use interference::{InterferenceGraph, Move, MoveId, NodeId};
pub use liveness::Liveness;
pub use spill::rewrite_spills;
pub use worklist::MoveState;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

use crate::{
  args::AllocConfig,
  asm::{Instr, Procedure},
  context::Context,
  flowgraph::FlowGraph,
  frame::Frame,
  temp::{Color, Temp},
};

/// A procedure after register allocation.
#[derive(Debug, Clone)]
pub struct Allocation {
  /// The body with spill code inserted
  pub procedure: Procedure,
  /// The color of every temp of the original and the rewritten body
  pub colors: BTreeMap<Temp, Color>,
  /// Every temp that was given a stack slot, over all rounds
  pub spilled: Vec<Temp>,
  pub rounds: usize,
  pub frame: Frame,
  /// The last, successful round
  pub last_round: Round,
}

impl Allocation {
  /// Registers of the pool the procedure writes to that its caller expects
  /// to be preserved.
  pub fn callee_saved_used(&self, ctx: &Context) -> Vec<u32> {
    let mut used = self
      .procedure
      .body
      .iter()
      .flat_map(|instr| instr.defined())
      .filter_map(|t| self.colors.get(&t).and_then(|c| c.as_reg().copied()))
      .filter(|r| ctx.machine.is_callee_saved(*r))
      .collect::<Vec<_>>();
    used.sort_unstable();
    used.dedup();
    used
  }
}

/// Allocate registers for a procedure, spilling and retrying until a round
/// needs no new stack slot.
///
/// Every round spills only temps of the previous body, which the rewrite
/// replaces by fresh unspillable ones. A round that still has to spill one of
/// those can make no progress and fails, as does running past `max_rounds`.
pub fn allocate(ctx: &mut Context, proc: &Procedure, config: &AllocConfig) -> Result<Allocation> {
  let mut body: Vec<Instr> = proc.body.clone();
  let mut frame = Frame::new(&ctx.machine);
  let mut no_spill = BTreeSet::new();
  let mut spilled_colors = BTreeMap::new();
  let mut spilled_all = vec![];

  for round_no in 1..=config.max_rounds {
    let flow = FlowGraph::build(&body)?;
    let liveness = Liveness::from_flowgraph(&flow);
    let round = allocate_round(&flow, &liveness, &ctx.machine, config, &no_spill, &mut frame)?;
    log::info!(
      "{}: round {} spilled {} temps",
      proc.name,
      round_no,
      round.spilled.len()
    );

    if round.spilled.is_empty() {
      let mut colors = round.colors.clone();
      colors.extend(spilled_colors);
      return Ok(Allocation {
        procedure: Procedure {
          name: proc.name.clone(),
          body,
        },
        colors,
        spilled: spilled_all,
        rounds: round_no,
        frame,
        last_round: round,
      });
    }

    if let Some(t) = round.spilled.iter().find(|t| no_spill.contains(*t)) {
      bail!(
        "Allocation of {} failed: {} was introduced by spill code and still has to be spilled",
        proc.name,
        ctx.name_of(*t)
      );
    }
    if round_no == config.max_rounds {
      break;
    }

    let mut slots = BTreeMap::new();
    for t in &round.spilled {
      if let Color::Spill(slot) = round.colors[t] {
        slots.insert(*t, slot);
        spilled_colors.insert(*t, Color::Spill(slot));
      }
    }
    spilled_all.extend(round.spilled.iter().copied());
    body = rewrite_spills(ctx, &body, &slots, &frame, &mut no_spill)?;
  }

  bail!(
    "Allocation of {} did not converge after {} rounds",
    proc.name,
    config.max_rounds
  )
}
