// FlowGraph -> liveness analysis -> live-in / live-out per node

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::{
  context::Context,
  flowgraph::{FlowGraph, FlowNodeRef},
  temp::Temp,
};

/// The liveness analysis result of a procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
  /// The live-in temps of each flow node, indexed by node
  live_in: Vec<BTreeSet<Temp>>,
  /// The live-out temps of each flow node, indexed by node
  live_out: Vec<BTreeSet<Temp>>,
  /// Number of sweeps over the graph until nothing changed
  passes: usize,
}

impl Liveness {
  /// Backward may-liveness, iterated to a fixpoint:
  ///
  /// live_out(n) = U live_in(s) for s in succ(n)
  /// live_in(n)  = use(n) U (live_out(n) - def(n))
  ///
  /// Sets only ever grow, so the iteration stops once a sweep changes nothing.
  pub fn from_flowgraph(graph: &FlowGraph) -> Self {
    let n = graph.len();
    let mut live_in = vec![BTreeSet::new(); n];
    let mut live_out = vec![BTreeSet::new(); n];
    let mut passes = 0;

    let mut not_saturated = true;
    while not_saturated {
      not_saturated = false;
      passes += 1;

      // reverse order converges faster for a backward problem
      for idx in (0..n).rev() {
        let node = graph.node(idx);

        let mut out = BTreeSet::new();
        for &succ in node.successors() {
          out.extend(live_in[succ].iter().copied());
        }

        let mut new_in = node.uses().clone();
        new_in.extend(out.difference(node.defines()).copied());

        if out.len() != live_out[idx].len() || new_in.len() != live_in[idx].len() {
          not_saturated = true;
          live_out[idx] = out;
          live_in[idx] = new_in;
        }
      }
    }

    log::debug!("liveness of {} nodes settled after {} passes", n, passes);
    Liveness {
      live_in,
      live_out,
      passes,
    }
  }

  pub fn live_out(&self, node: FlowNodeRef) -> &BTreeSet<Temp> {
    &self.live_out[node]
  }

  pub fn live_in(&self, node: FlowNodeRef) -> &BTreeSet<Temp> {
    &self.live_in[node]
  }

  #[inline]
  pub fn passes(&self) -> usize {
    self.passes
  }

  fn short_list(set: &BTreeSet<Temp>, ctx: &Context) -> String {
    let names = set.iter().map(|t| ctx.name_of(*t)).collect::<Vec<_>>();
    format!("[{}]", names.join(", "))
  }

  /// Text dump, one line per flow node.
  pub fn dump(&self, graph: &FlowGraph, ctx: &Context) -> String {
    let mut out = String::new();
    for (idx, node) in graph.nodes().iter().enumerate() {
      let instr = node.instr().format(&|t| ctx.name_of(t));
      let _ = writeln!(
        out,
        "{:>4}: {:<32} in: {} out: {}",
        idx,
        instr.trim(),
        Self::short_list(self.live_in(idx), ctx),
        Self::short_list(self.live_out(idx), ctx)
      );
    }
    out
  }

  fn dot_label(&self, graph: &FlowGraph, ctx: &Context, idx: FlowNodeRef) -> String {
    let instr = graph.node(idx).instr().format(&|t| ctx.name_of(t));
    format!(
      "{}\\n{}: {}\\n{}",
      Self::short_list(self.live_in(idx), ctx),
      idx,
      instr.trim().replace('"', "\\\""),
      Self::short_list(self.live_out(idx), ctx)
    )
  }

  /// Graphviz rendering of the flow graph annotated with liveness.
  pub fn dot_string(&self, graph: &FlowGraph, ctx: &Context, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"Flow graph\" {{");
    let _ = writeln!(out, "labelloc=\"t\";");
    let _ = writeln!(out, "label=\"{}\";", name);
    let _ = writeln!(out, "  graph [size=\"6.5, 9\", ratio=fill];");
    for (idx, node) in graph.nodes().iter().enumerate() {
      let _ = writeln!(
        out,
        "  \"{}\" [style=\"setlinewidth(3)\", color={}]",
        self.dot_label(graph, ctx, idx),
        if node.is_move() { "green" } else { "blue" }
      );
    }
    for (idx, node) in graph.nodes().iter().enumerate() {
      for &succ in node.successors() {
        let _ = writeln!(
          out,
          "  \"{}\" -> \"{}\" [arrowhead = normal];",
          self.dot_label(graph, ctx, idx),
          self.dot_label(graph, ctx, succ)
        );
      }
    }
    let _ = writeln!(out, "}}");
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asm::Instr;
  use crate::temp::Label;

  fn t(i: u32) -> Temp {
    Temp(i)
  }

  fn set(temps: &[u32]) -> BTreeSet<Temp> {
    temps.iter().map(|i| Temp(*i)).collect()
  }

  #[test]
  fn straight_line() {
    // 0: a <- ...
    // 1: b <- a
    // 2: c <- a + b
    // 3: ret c
    let instrs = vec![
      Instr::oper("def a", vec![t(1)], vec![]),
      Instr::mov("mov", t(2), t(1)),
      Instr::oper("add", vec![t(3)], vec![t(1), t(2)]),
      Instr::jump("ret", vec![t(3)], vec![]),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&fg);

    assert_eq!(live.live_out(0), &set(&[1]));
    assert_eq!(live.live_out(1), &set(&[1, 2]));
    assert_eq!(live.live_out(2), &set(&[3]));
    assert!(live.live_out(3).is_empty());
    assert!(live.live_in(0).is_empty());
    assert_eq!(live.live_in(3), &set(&[3]));
  }

  #[test]
  fn loop_carries_liveness_around_back_edge() {
    // 0: i <- 0
    // 1: top:
    // 2: i <- i + 1
    // 3: if i goto top else out
    // 4: out:
    // 5: ret x
    let instrs = vec![
      Instr::oper("zero", vec![t(1)], vec![]),
      Instr::label("top"),
      Instr::oper("inc", vec![t(1)], vec![t(1)]),
      Instr::jump("br", vec![t(1)], vec![Label::new("top"), Label::new("out")]),
      Instr::label("out"),
      Instr::jump("ret", vec![t(2)], vec![]),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&fg);

    // x is used at the end and never defined, so live everywhere
    assert_eq!(live.live_out(3), &set(&[1, 2]));
    assert_eq!(live.live_in(1), &set(&[1, 2]));
    assert_eq!(live.live_out(0), &set(&[1, 2]));
    assert_eq!(live.live_in(0), &set(&[2]));
  }

  #[test]
  fn dead_definition_is_not_live() {
    let instrs = vec![
      Instr::oper("def", vec![t(1)], vec![]),
      Instr::jump("ret", vec![], vec![]),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&fg);
    assert!(live.live_out(0).is_empty());
  }

  #[test]
  fn rebuild_is_idempotent() {
    let instrs = vec![
      Instr::label("top"),
      Instr::oper("a", vec![t(1)], vec![t(2)]),
      Instr::mov("m", t(2), t(1)),
      Instr::jump("br", vec![t(2)], vec![Label::new("top"), Label::new("end")]),
      Instr::label("end"),
      Instr::jump("ret", vec![t(1)], vec![]),
    ];
    let first = Liveness::from_flowgraph(&FlowGraph::build(&instrs).unwrap());
    let second = Liveness::from_flowgraph(&FlowGraph::build(&instrs).unwrap());
    assert_eq!(first, second);
    assert_eq!(format!("{:?}", first), format!("{:?}", second));
  }

  #[test]
  fn passes_are_bounded() {
    // a long chain of copies inside a loop, iterated in the worst direction
    let n = 20;
    let mut instrs = vec![Instr::label("top")];
    for i in 0..n {
      instrs.push(Instr::mov("m", t(i + 1), t(i)));
    }
    instrs.push(Instr::jump(
      "br",
      vec![t(n)],
      vec![Label::new("top"), Label::new("end")],
    ));
    instrs.push(Instr::label("end"));
    instrs.push(Instr::jump("ret", vec![], vec![]));

    let fg = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&fg);
    let temps = fg.temps().len();
    assert!(live.passes() <= fg.len() * temps + 1);
    assert_eq!(live.live_in(0), &set(&[0]));
  }

  #[test]
  fn dumps_mention_every_node() {
    let mut ctx = Context::with_registers(2);
    let a = ctx.named_temp("a");
    let instrs = vec![
      Instr::oper("def `d0", vec![a], vec![]),
      Instr::jump("ret `s0", vec![a], vec![]),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    let live = Liveness::from_flowgraph(&fg);
    let dump = live.dump(&fg, &ctx);
    assert_eq!(dump.lines().count(), 2);
    assert!(dump.contains("def a"));
    let dot = live.dot_string(&fg, &ctx, "p");
    assert!(dot.starts_with("digraph"));
    assert_eq!(dot.matches(" -> ").count(), 1);
  }
}
