//! Register allocation for abstract assembly
//! Iterated register coalescing over a flow graph, with spill rewriting.

#[macro_use]
extern crate lalrpop_util;

lalrpop_mod!(#[allow(clippy::all, unused_imports)] pub assem);

pub mod args;
pub mod asm;
pub mod ast;
pub mod context;
pub mod elaboration;
pub mod emit;
pub mod flowgraph;
pub mod frame;
pub mod lex;
pub mod parse;
pub mod regalloc;
pub mod registers;
pub mod temp;
pub mod utils;

use anyhow::Result;
use wasm_bindgen::prelude::*;

use crate::args::AllocConfig;
use crate::context::Context;
use crate::parse::parser;
use crate::regalloc::Allocation;

/// Parse a source file (or the given text), then allocate every procedure
/// in it.
pub fn allocate_source(
  ctx: &mut Context,
  file_name: &str,
  file_str: Option<String>,
  config: &AllocConfig,
) -> Result<Vec<Allocation>> {
  let program = parser::parse(file_name, file_str)?;
  let procs = elaboration::elab_program(program, ctx)?;
  let mut allocs = Vec::with_capacity(procs.len());
  for proc in &procs {
    allocs.push(regalloc::allocate(ctx, proc, config)?);
  }
  Ok(allocs)
}

/// Allocate registers for `source` and return the resulting assembly. With
/// `k == 0` the x86-64 register file is used, a synthetic one with `k`
/// registers otherwise.
#[wasm_bindgen]
pub fn allocate_assembly(source: &str, k: u32) -> String {
  match allocate_assembly_inner(source, k) {
    Ok(asm) => asm,
    Err(e) => e.to_string(),
  }
}

fn allocate_assembly_inner(source: &str, k: u32) -> Result<String> {
  let mut ctx = if k == 0 {
    Context::x86_64()
  } else {
    Context::with_registers(k as usize)
  };
  let allocs = allocate_source(
    &mut ctx,
    "",
    Some(source.to_string()),
    &AllocConfig::default(),
  )?;
  emit::return_asm(&ctx, &allocs)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn assembly_in_assembly_out() {
    let asm = allocate_assembly(
      "proc f {
        oper \"def `d0\" def(a)
        oper \"ret `s0\" use(a) jump()
      }",
      2,
    );
    assert!(asm.contains("f:\n"));
    assert!(asm.contains("\tdef %r0\n"));
    assert!(asm.contains("\tret %r0\n"));
  }

  #[test]
  fn errors_come_back_as_text() {
    let msg = allocate_assembly("proc f { oper \"j\" jump(nowhere) }", 2);
    assert!(msg.contains("nowhere"));
  }
}
