//! Output of allocated procedures
//! Assembly text with registers filled in, a JSON report, and the debug dumps.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::prelude::*;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use serde::Serialize;

use crate::args::Config;
use crate::asm::Instr;
use crate::context::Context;
use crate::flowgraph::FlowGraph;
use crate::regalloc::{Allocation, Liveness, MoveCounts};
use crate::temp::{Color, Temp};

/// Operand text of a colored temp: a register name or a frame slot.
fn operand(ctx: &Context, alloc: &Allocation, temp: Temp) -> String {
  match alloc.colors.get(&temp) {
    Some(Color::Reg(r)) => ctx.machine.register_name(*r),
    Some(Color::Spill(s)) => alloc.frame.slot_operand(*s),
    None => ctx.name_of(temp),
  }
}

/// A move between two temps of the same color does nothing.
fn is_redundant(alloc: &Allocation, instr: &Instr) -> bool {
  match instr {
    Instr::Move { dst, src, .. } => {
      alloc.colors.get(dst).is_some() && alloc.colors.get(dst) == alloc.colors.get(src)
    }
    _ => false,
  }
}

/// Render one procedure with every temp replaced by its location.
pub fn render_procedure(ctx: &Context, alloc: &Allocation) -> Result<String> {
  let proc = &alloc.procedure;
  for instr in &proc.body {
    for t in instr.defined().into_iter().chain(instr.used()) {
      if !alloc.colors.contains_key(&t) {
        bail!("{} in {} has no color", ctx.name_of(t), proc.name);
      }
    }
  }

  let mut out = String::new();
  writeln!(out, ".globl {}", proc.name)?;
  writeln!(out, "{}:", proc.name)?;
  writeln!(
    out,
    "\t# {} spill slots, {} bytes",
    alloc.frame.slot_count(),
    alloc.frame.size()
  )?;
  for instr in proc.body.iter().filter(|i| !is_redundant(alloc, i)) {
    writeln!(out, "{}", instr.format(&|t| operand(ctx, alloc, t)))?;
  }
  Ok(out)
}

/// Return the assembly of all procedures as a string.
pub fn return_asm(ctx: &Context, allocs: &[Allocation]) -> Result<String> {
  let mut out = String::new();
  for alloc in allocs {
    out.push_str(&render_procedure(ctx, alloc)?);
    out.push('\n');
  }
  Ok(out)
}

/// Emit the assembly to `<filename>.s`.
pub fn emit_asm(filename: &str, ctx: &Context, allocs: &[Allocation]) -> Result<()> {
  let path = format!("{}.s", filename);
  let mut file = File::create(&path).with_context(|| format!("Couldn't create {}", path))?;
  write!(file, "{}", return_asm(ctx, allocs)?)?;
  Ok(())
}

/// The temp to color map of a procedure, one temp per line. Precolored temps
/// are left out.
pub fn color_map(ctx: &Context, alloc: &Allocation) -> String {
  let mut out = format!("{}:\n", alloc.procedure.name);
  for (temp, color) in &alloc.colors {
    if ctx.machine.is_precolored(*temp) {
      continue;
    }
    let _ = writeln!(
      out,
      "  {} -> {}{}",
      ctx.name_of(*temp),
      operand(ctx, alloc, *temp),
      if color.is_spill() { " (spilled)" } else { "" }
    );
  }
  out
}

/// What `-e json` prints for a procedure.
#[derive(Debug, Serialize)]
pub struct ProcedureReport {
  pub name: String,
  pub rounds: usize,
  pub spill_slots: u32,
  pub frame_size: u32,
  pub spilled: Vec<String>,
  pub colors: BTreeMap<String, String>,
  pub moves: MoveCounts,
  pub callee_saved: Vec<String>,
}

impl ProcedureReport {
  pub fn new(ctx: &Context, alloc: &Allocation) -> Self {
    let colors = alloc
      .colors
      .keys()
      .filter(|t| !ctx.machine.is_precolored(**t))
      .map(|t| (ctx.name_of(*t), operand(ctx, alloc, *t)))
      .collect();
    ProcedureReport {
      name: alloc.procedure.name.clone(),
      rounds: alloc.rounds,
      spill_slots: alloc.frame.slot_count(),
      frame_size: alloc.frame.size(),
      spilled: alloc.spilled.iter().map(|t| ctx.name_of(*t)).collect(),
      colors,
      moves: alloc.last_round.moves,
      callee_saved: alloc
        .callee_saved_used(ctx)
        .into_iter()
        .map(|r| ctx.machine.register_name(r))
        .collect(),
    }
  }
}

/// Return the allocation report of all procedures as pretty printed JSON.
pub fn return_json(ctx: &Context, allocs: &[Allocation]) -> Result<String> {
  let reports = allocs
    .iter()
    .map(|alloc| ProcedureReport::new(ctx, alloc))
    .collect::<Vec<_>>();
  Ok(serde_json::to_string_pretty(&reports)?)
}

/// Emit the report to `<filename>.json`.
pub fn emit_json(filename: &str, ctx: &Context, allocs: &[Allocation]) -> Result<()> {
  let path = format!("{}.json", filename);
  let mut file = File::create(&path).with_context(|| format!("Couldn't create {}", path))?;
  writeln!(file, "{}", return_json(ctx, allocs)?)?;
  Ok(())
}

/// Print the dumps asked for on the command line, and write the graphviz
/// files when `--dot` is given. Everything is computed on the final body.
pub fn dump_procedure(cfg: &Config, ctx: &Context, alloc: &Allocation) -> Result<()> {
  let proc = &alloc.procedure;
  let flow = FlowGraph::build(&proc.body)?;
  let liveness = Liveness::from_flowgraph(&flow);
  let round = &alloc.last_round;

  if cfg.dump_flow {
    println!("Flow graph of {}:", proc.name);
    print!("{}", flow.dump(ctx));
  }
  if cfg.dump_liveness {
    println!(
      "Liveness of {} ({} passes):",
      proc.name,
      liveness.passes()
    );
    print!("{}", liveness.dump(&flow, ctx));
  }
  if cfg.dump_igraph {
    println!(
      "Interference graph of {} ({} edges):",
      proc.name,
      round.graph.edge_count()
    );
    print!(
      "{}",
      round
        .graph
        .dump(ctx, &alloc.colors, Some(&round.move_states[..]))
    );
  }

  if let Some(dir) = &cfg.dot_dir {
    let dir = Path::new(dir);
    fs::create_dir_all(dir).with_context(|| format!("Couldn't create {}", dir.display()))?;
    let flow_path = dir.join(format!("{}.flow.dot", proc.name));
    fs::write(&flow_path, liveness.dot_string(&flow, ctx, &proc.name))
      .with_context(|| format!("Couldn't write {}", flow_path.display()))?;
    let igraph_path = dir.join(format!("{}.igraph.dot", proc.name));
    fs::write(
      &igraph_path,
      round.graph.dot_string(ctx, &alloc.colors, &proc.name),
    )
    .with_context(|| format!("Couldn't write {}", igraph_path.display()))?;
    log::info!("wrote {} and {}", flow_path.display(), igraph_path.display());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::args::AllocConfig;
  use crate::elaboration::elab_program;
  use crate::parse::parser::parse_string;
  use crate::regalloc::allocate;

  fn allocated(ctx: &mut Context, source: &str) -> Allocation {
    let proc = elab_program(parse_string(source).unwrap(), ctx)
      .unwrap()
      .remove(0);
    allocate(ctx, &proc, &AllocConfig::default()).unwrap()
  }

  #[test]
  fn coalesced_moves_disappear_from_the_output() {
    let mut ctx = Context::x86_64();
    let alloc = allocated(
      &mut ctx,
      "proc id {
        move x <- %rdi
        oper \"addq $1, `d0\" def(x) use(x)
        move %rax <- x
        oper \"ret\" use(%rax) jump()
      }",
    );
    let text = render_procedure(&ctx, &alloc).unwrap();
    assert!(text.starts_with(".globl id\nid:\n"));
    assert!(text.contains("\taddq $1, %"));
    assert!(text.contains("\tret"));
    let moves = text.lines().filter(|l| l.contains("movq")).count();
    let kept = alloc
      .procedure
      .body
      .iter()
      .filter(|i| i.is_move() && !is_redundant(&alloc, i))
      .count();
    assert_eq!(moves, kept);
    assert!(kept < 2);
  }

  #[test]
  fn report_lists_spills_and_moves() {
    let mut ctx = Context::with_registers(2);
    let alloc = allocated(
      &mut ctx,
      "proc tri {
        oper \"def `d0\" def(a)
        oper \"def `d0\" def(b)
        oper \"def `d0\" def(c)
        oper \"use `s0 `s1\" use(b, c)
        oper \"use `s0\" use(a) jump()
      }",
    );
    let json = return_json(&ctx, std::slice::from_ref(&alloc)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let report = &value[0];
    assert_eq!(report["name"], "tri");
    assert_eq!(report["rounds"], 2);
    assert_eq!(report["spill_slots"], 1);
    assert_eq!(report["frame_size"], 8);
    assert_eq!(report["spilled"][0], "a");
    assert_eq!(report["colors"]["a"], "-8(%fp)");
    assert_eq!(report["moves"]["coalesced"], 0);

    let map = color_map(&ctx, &alloc);
    assert!(map.contains("  a -> -8(%fp) (spilled)"));
    assert!(!map.contains("%r0 ->"));
  }
}
