//! Control flow graph over single instructions.
// Vec<Instr> -> FlowGraph (one node per instruction, def/use/move per node)

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use anyhow::{bail, Result};

use crate::asm::Instr;
use crate::context::Context;
use crate::temp::{Label, Temp};

pub type FlowNodeRef = usize; // we use index to refer to the node

/// One node of the flow graph, wraps exactly one instruction.
#[derive(Debug, Clone)]
pub struct FlowNode {
  /// The instruction this node stands for
  instr: Instr,
  /// The temps defined in this instruction
  defines: BTreeSet<Temp>,
  /// The temps used in this instruction
  uses: BTreeSet<Temp>,
  /// Control successors, in jump target order
  succs: Vec<FlowNodeRef>,
  preds: Vec<FlowNodeRef>,
  /// Static loop nesting depth of this node
  loop_depth: u32,
}

impl FlowNode {
  pub fn instr(&self) -> &Instr {
    &self.instr
  }

  pub fn defines(&self) -> &BTreeSet<Temp> {
    &self.defines
  }

  pub fn uses(&self) -> &BTreeSet<Temp> {
    &self.uses
  }

  pub fn is_move(&self) -> bool {
    self.instr.is_move()
  }

  pub fn successors(&self) -> &[FlowNodeRef] {
    &self.succs
  }

  pub fn predecessors(&self) -> &[FlowNodeRef] {
    &self.preds
  }

  pub fn loop_depth(&self) -> u32 {
    self.loop_depth
  }
}

/// The flow graph of one procedure body. Nodes are in instruction order.
#[derive(Debug, Clone)]
pub struct FlowGraph {
  nodes: Vec<FlowNode>,
}

impl FlowGraph {
  /// Build the flow graph of an instruction list. Unreachable instructions
  /// stay in the graph. Jumping to a label that is not defined exactly once
  /// is an error.
  pub fn build(instrs: &[Instr]) -> Result<Self> {
    let label_to_index = Self::build_label_to_index(instrs)?;

    let mut nodes = Vec::with_capacity(instrs.len());
    for (idx, instr) in instrs.iter().enumerate() {
      let succs = match instr.jumps() {
        Some(targets) => {
          let mut succs = Vec::with_capacity(targets.len());
          for target in targets {
            match label_to_index.get(target) {
              Some(t) => {
                if !succs.contains(t) {
                  succs.push(*t)
                }
              }
              None => bail!("Jump target {} at instruction {} is not defined", target, idx),
            }
          }
          succs
        }
        None if idx + 1 < instrs.len() => vec![idx + 1],
        None => vec![],
      };

      nodes.push(FlowNode {
        instr: instr.clone(),
        defines: instr.defined().into_iter().collect(),
        uses: instr.used().into_iter().collect(),
        succs,
        preds: vec![],
        loop_depth: 0,
      });
    }

    for idx in 0..nodes.len() {
      for succ in nodes[idx].succs.clone() {
        nodes[succ].preds.push(idx);
      }
    }

    let mut graph = FlowGraph { nodes };
    graph.compute_loop_depths();
    log::trace!("flow graph with {} nodes", graph.nodes.len());
    Ok(graph)
  }

  fn build_label_to_index(instrs: &[Instr]) -> Result<HashMap<Label, FlowNodeRef>> {
    let mut label_to_index = HashMap::new();
    for (idx, instr) in instrs.iter().enumerate() {
      if let Instr::Label { label } = instr {
        if label_to_index.insert(label.clone(), idx).is_some() {
          bail!("Label {} is defined more than once", label);
        }
      }
    }
    Ok(label_to_index)
  }

  /// A backward edge `i -> j` (j <= i) closes a loop over `j..=i`. The depth
  /// of a node is the number of such spans it lies in.
  fn compute_loop_depths(&mut self) {
    let mut spans = vec![];
    for (idx, node) in self.nodes.iter().enumerate() {
      for &succ in &node.succs {
        if succ <= idx {
          spans.push((succ, idx));
        }
      }
    }
    for (start, end) in spans {
      for node in &mut self.nodes[start..=end] {
        node.loop_depth += 1;
      }
    }
  }

  pub fn nodes(&self) -> &[FlowNode] {
    &self.nodes
  }

  pub fn node(&self, idx: FlowNodeRef) -> &FlowNode {
    &self.nodes[idx]
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// One line per node: the instruction, its successors and loop depth.
  pub fn dump(&self, ctx: &Context) -> String {
    let mut out = String::new();
    for (idx, node) in self.nodes.iter().enumerate() {
      let succs = node
        .succs
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
      let _ = write!(
        out,
        "{:>4}: {:<32} -> [{}]",
        idx,
        node.instr.format(&|t| ctx.name_of(t)).trim(),
        succs
      );
      if node.loop_depth > 0 {
        let _ = write!(out, " depth {}", node.loop_depth);
      }
      if node.is_move() {
        out.push_str(" (move)");
      }
      out.push('\n');
    }
    out
  }

  /// Every temp that is defined or used somewhere, in increasing order.
  pub fn temps(&self) -> BTreeSet<Temp> {
    self
      .nodes
      .iter()
      .flat_map(|n| n.defines.iter().chain(n.uses.iter()).copied())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn t(i: u32) -> Temp {
    Temp(i)
  }

  #[test]
  fn straight_line_falls_through() {
    let instrs = vec![
      Instr::oper("a", vec![t(1)], vec![]),
      Instr::mov("m", t(2), t(1)),
      Instr::oper("b", vec![], vec![t(2)]),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    assert_eq!(fg.node(0).successors(), &[1]);
    assert_eq!(fg.node(1).successors(), &[2]);
    assert!(fg.node(2).successors().is_empty());
    assert!(fg.node(1).is_move());
    assert_eq!(fg.node(2).predecessors(), &[1]);
    assert_eq!(fg.temps().into_iter().collect::<Vec<_>>(), vec![t(1), t(2)]);
  }

  #[test]
  fn jumps_replace_fall_through() {
    let instrs = vec![
      Instr::label("top"),
      Instr::oper("a", vec![t(1)], vec![t(1)]),
      Instr::jump("br", vec![t(1)], vec![Label::new("top"), Label::new("out")]),
      Instr::oper("dead", vec![t(3)], vec![]),
      Instr::label("out"),
      Instr::jump("ret", vec![], vec![]),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    assert_eq!(fg.node(2).successors(), &[0, 4]);
    // unreachable code is kept, it still falls through
    assert_eq!(fg.node(3).successors(), &[4]);
    assert!(fg.node(3).predecessors().is_empty());
    assert!(fg.node(5).successors().is_empty());
  }

  #[test]
  fn loop_depth_follows_back_edges() {
    let instrs = vec![
      Instr::oper("init", vec![t(1)], vec![]),
      Instr::label("outer"),
      Instr::label("inner"),
      Instr::oper("body", vec![t(1)], vec![t(1)]),
      Instr::jump("j", vec![t(1)], vec![Label::new("inner"), Label::new("next")]),
      Instr::label("next"),
      Instr::jump("j", vec![t(1)], vec![Label::new("outer"), Label::new("done")]),
      Instr::label("done"),
    ];
    let fg = FlowGraph::build(&instrs).unwrap();
    let depths = fg.nodes().iter().map(|n| n.loop_depth()).collect::<Vec<_>>();
    assert_eq!(depths, vec![0, 1, 2, 2, 2, 1, 1, 0]);
  }

  #[test]
  fn undefined_label_is_fatal() {
    let instrs = vec![Instr::jump("j", vec![], vec![Label::new("nowhere")])];
    let err = FlowGraph::build(&instrs).unwrap_err();
    assert!(err.to_string().contains("nowhere"));
  }

  #[test]
  fn dump_lists_successors() {
    let mut ctx = Context::with_registers(2);
    let a = ctx.named_temp("a");
    let instrs = vec![
      Instr::label("top"),
      Instr::jump("br `s0", vec![a], vec![Label::new("top"), Label::new("out")]),
      Instr::label("out"),
    ];
    let dump = FlowGraph::build(&instrs).unwrap().dump(&ctx);
    let lines = dump.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("br a"));
    assert!(lines[1].contains("-> [0, 2] depth 1"));
    assert!(lines[2].ends_with("-> []"));
  }

  #[test]
  fn duplicate_label_is_fatal() {
    let instrs = vec![Instr::label("a"), Instr::label("a")];
    assert!(FlowGraph::build(&instrs).is_err());
  }
}
