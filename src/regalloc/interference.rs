// FlowGraph + Liveness -> interference graph + move list

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;

use lazy_static::lazy_static;

use crate::{
  args::{AllocConfig, SpillCostModel},
  context::Context,
  flowgraph::FlowGraph,
  registers::Machine,
  temp::{Color, Temp},
  utils::Graph,
};

use super::{liveness::Liveness, worklist::MoveState};

/// Index of a temp in the graph's arena.
pub type NodeId = usize;
/// Index of a move in the graph's move list.
pub type MoveId = usize;

/// A move instruction `dst <- src` between two graph nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Move {
  pub dst: NodeId,
  pub src: NodeId,
}

lazy_static! {
  /// Fill colors of the x86-64 registers in graphviz dumps.
  static ref REGISTER_PALETTE: HashMap<&'static str, &'static str> = [
    ("rax", "gray"),
    ("rbx", "hotpink"),
    ("rcx", "mediumpurple"),
    ("rdx", "salmon"),
    ("rdi", "beige"),
    ("rsi", "brown"),
    ("rsp", "orange"),
    ("rbp", "gold"),
    ("r8", "yellow"),
    ("r9", "darkgreen"),
    ("r10", "green"),
    ("r11", "cyan"),
    ("r12", "blueviolet"),
    ("r13", "skyblue"),
    ("r14", "magenta"),
    ("r15", "turquoise"),
  ]
  .into_iter()
  .collect();

  /// Colors for registers of machines without a palette entry, by index.
  static ref INDEX_PALETTE: Vec<&'static str> = vec![
    "gray", "hotpink", "mediumpurple", "salmon", "beige", "brown", "gold", "yellow",
    "darkgreen", "cyan", "blueviolet", "skyblue", "magenta", "turquoise",
  ];
}

/// Represent the interference graph built from abstract assembly.
///
/// Temps live in an arena: node `i` stands for `temps[i]`, and nodes are
/// numbered in increasing temp order. Adjacency, move lists and costs are all
/// indexed by node.
#[derive(Debug, Clone)]
pub struct InterferenceGraph {
  temps: Vec<Temp>,
  index: HashMap<Temp, NodeId>,
  graph: Graph<NodeId>,
  moves: Vec<Move>,
  /// Moves each node takes part in
  move_list: Vec<BTreeSet<MoveId>>,
  spill_cost: Vec<f64>,
  precolor: Vec<Option<Color>>,
  k: usize,
}

impl InterferenceGraph {
  /// Build the interference graph from the liveness analysis result.
  ///
  /// Temps in `no_spill` get an infinite spill cost, as do precolored temps.
  pub fn build(
    flow: &FlowGraph,
    liveness: &Liveness,
    machine: &Machine,
    config: &AllocConfig,
    no_spill: &BTreeSet<Temp>,
  ) -> Self {
    let temps = flow.temps().into_iter().collect::<Vec<_>>();
    let index = temps
      .iter()
      .enumerate()
      .map(|(i, t)| (*t, i))
      .collect::<HashMap<_, _>>();

    let mut graph = Graph::new();
    for node in 0..temps.len() {
      graph.add_node(node);
    }

    let mut moves = vec![];
    let mut seen_moves = BTreeSet::new();
    let mut move_list = vec![BTreeSet::new(); temps.len()];

    for (n, node) in flow.nodes().iter().enumerate() {
      let live_out = liveness.live_out(n);
      if node.is_move() {
        let dst = index[&node.instr().defined()[0]];
        let src = index[&node.instr().used()[0]];

        // the same pair in either direction is one move
        if seen_moves.insert((dst.min(src), dst.max(src))) {
          let id = moves.len();
          moves.push(Move { dst, src });
          move_list[dst].insert(id);
          move_list[src].insert(id);
        }

        for t in live_out {
          let t = index[t];
          if t != src && t != dst {
            graph.add_graph_edge(t, dst);
          }
        }
      } else {
        for d in node.defines() {
          let d = index[d];
          for t in live_out {
            let t = index[t];
            if t != d {
              graph.add_graph_edge(d, t);
            }
          }
        }
      }
    }

    let precolor = temps.iter().map(|t| machine.precolor(*t)).collect::<Vec<_>>();
    let spill_cost = Self::spill_costs(flow, &temps, &index, config.spill_cost)
      .into_iter()
      .enumerate()
      .map(|(i, cost)| {
        if precolor[i].is_some() || no_spill.contains(&temps[i]) {
          f64::INFINITY
        } else {
          cost
        }
      })
      .collect();

    log::debug!(
      "interference graph: {} nodes, {} moves",
      temps.len(),
      moves.len()
    );

    InterferenceGraph {
      temps,
      index,
      graph,
      moves,
      move_list,
      spill_cost,
      precolor,
      k: machine.k(),
    }
  }

  /// Estimated cost of keeping each temp in memory, indexed by node.
  fn spill_costs(
    flow: &FlowGraph,
    temps: &[Temp],
    index: &HashMap<Temp, NodeId>,
    model: SpillCostModel,
  ) -> Vec<f64> {
    match model {
      SpillCostModel::Constant => vec![1.0; temps.len()],
      SpillCostModel::LoopDepth => {
        let mut cost = vec![0.0; temps.len()];
        for node in flow.nodes() {
          let weight = 10f64.powi(node.loop_depth() as i32);
          for t in node.defines().iter().chain(node.uses().iter()) {
            cost[index[t]] += weight;
          }
        }
        cost
      }
    }
  }

  /// Number of physical registers.
  #[inline]
  pub fn k(&self) -> usize {
    self.k
  }

  /// Number of nodes ever in the graph, removed ones included.
  pub fn len(&self) -> usize {
    self.temps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.temps.is_empty()
  }

  pub fn temp(&self, node: NodeId) -> Temp {
    self.temps[node]
  }

  pub fn node_of(&self, temp: Temp) -> Option<NodeId> {
    self.index.get(&temp).copied()
  }

  /// Nodes still in the graph.
  pub fn contains(&self, node: NodeId) -> bool {
    self.graph.contains(&node)
  }

  pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    self.graph.neighbors(&node).into_iter().flatten().copied()
  }

  pub fn degree(&self, node: NodeId) -> usize {
    self.graph.degree(&node)
  }

  pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
    self.graph.has_edge(&a, &b)
  }

  /// Precolored nodes and nodes of degree >= K constrain their neighbors.
  pub fn is_significant(&self, node: NodeId) -> bool {
    self.is_precolored(node) || self.degree(node) >= self.k
  }

  pub fn is_precolored(&self, node: NodeId) -> bool {
    self.precolor[node].is_some()
  }

  pub fn precolor(&self, node: NodeId) -> Option<Color> {
    self.precolor[node]
  }

  pub fn moves(&self) -> &[Move] {
    &self.moves
  }

  pub fn move_list(&self, node: NodeId) -> &BTreeSet<MoveId> {
    &self.move_list[node]
  }

  pub fn spill_cost(&self, node: NodeId) -> f64 {
    self.spill_cost[node]
  }

  pub fn remove_node(&mut self, node: NodeId) {
    self.graph.remove_node(node);
  }

  /// Merge `absorb` into `keep`: neighbors, moves and spill cost.
  pub fn merge(&mut self, keep: NodeId, absorb: NodeId) {
    self.graph.merge(keep, absorb);
    let absorbed = self.move_list[absorb].clone();
    self.move_list[keep].extend(absorbed);
    self.spill_cost[keep] += self.spill_cost[absorb];
  }

  /// Number of edges between nodes still in the graph.
  pub fn edge_count(&self) -> usize {
    self.graph.nodes().map(|n| self.graph.degree(n)).sum::<usize>() / 2
  }

  fn color_name(&self, ctx: &Context, color: Option<&Color>) -> String {
    match color {
      Some(Color::Reg(r)) => ctx.machine.register_name(*r),
      Some(Color::Spill(s)) => format!("spill{}", s),
      None => "?".to_string(),
    }
  }

  /// Text rendering: one line per node with its degree, color and neighbors,
  /// then every move with its final state.
  pub fn dump(
    &self,
    ctx: &Context,
    colors: &BTreeMap<Temp, Color>,
    move_states: Option<&[MoveState]>,
  ) -> String {
    let mut out = String::new();
    for node in self.graph.nodes() {
      let temp = self.temps[*node];
      let _ = write!(
        out,
        "{} (degree {}) : {} ->",
        ctx.name_of(temp),
        self.degree(*node),
        self.color_name(ctx, colors.get(&temp))
      );
      for neigh in self.neighbors(*node) {
        let neigh = self.temps[neigh];
        let _ = write!(
          out,
          " {}:{}",
          ctx.name_of(neigh),
          self.color_name(ctx, colors.get(&neigh))
        );
      }
      out.push('\n');
    }
    for (id, mv) in self.moves.iter().enumerate() {
      let _ = write!(
        out,
        "move {} <- {}",
        ctx.name_of(self.temps[mv.dst]),
        ctx.name_of(self.temps[mv.src])
      );
      if let Some(states) = move_states {
        let _ = write!(out, " [{}]", states[id].as_ref());
      }
      out.push('\n');
    }
    out
  }

  fn dot_fill(ctx: &Context, reg: u32) -> &'static str {
    let name = ctx.machine.register_name(reg);
    REGISTER_PALETTE
      .get(name.trim_start_matches('%'))
      .copied()
      .unwrap_or_else(|| INDEX_PALETTE[reg as usize % INDEX_PALETTE.len()])
  }

  /// Graphviz rendering. Register colored nodes are filled with the color of
  /// their register, the others are outlined green when they have fewer than
  /// K neighbors and red otherwise. Moves are dashed green edges.
  pub fn dot_string(&self, ctx: &Context, colors: &BTreeMap<Temp, Color>, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "graph \"Interference\" {{");
    let _ = writeln!(out, "labelloc=\"t\";");
    let _ = writeln!(out, "label=\"{}\";", name);
    let _ = writeln!(out, "  graph [size=\"6.5, 9\", ratio=fill];");

    for node in self.graph.nodes() {
      let temp = self.temps[*node];
      let label = ctx.name_of(temp);
      match colors.get(&temp) {
        Some(Color::Reg(r)) => {
          let _ = writeln!(
            out,
            "  \"{}\" [style=filled, fillcolor={}, label=\"{}\\n{}\"];",
            label,
            Self::dot_fill(ctx, *r),
            label,
            ctx.machine.register_name(*r)
          );
        }
        other => {
          let outline = if self.degree(*node) < self.k {
            "green"
          } else {
            "red"
          };
          let _ = writeln!(
            out,
            "  \"{}\" [style=\"setlinewidth(3)\", color={}, label=\"{}\\n{}\"];",
            label,
            outline,
            label,
            self.color_name(ctx, other)
          );
        }
      }
    }

    for node in self.graph.nodes() {
      for neigh in self.neighbors(*node) {
        if *node < neigh {
          let _ = writeln!(
            out,
            "  \"{}\" -- \"{}\";",
            ctx.name_of(self.temps[*node]),
            ctx.name_of(self.temps[neigh])
          );
        }
      }
    }
    for mv in &self.moves {
      if mv.dst != mv.src {
        let _ = writeln!(
          out,
          "  \"{}\" -- \"{}\" [style=dashed, color=green];",
          ctx.name_of(self.temps[mv.dst]),
          ctx.name_of(self.temps[mv.src])
        );
      }
    }
    let _ = writeln!(out, "}}");
    out
  }
}
