//! Elaboration: surface AST -> procedures over temps.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

use crate::asm::{Instr, Procedure};
use crate::ast::{Program, SurfaceLine, SurfaceOperand, SurfaceProc};
use crate::context::Context;
use crate::temp::{Label, Temp};

/// Elaborate every procedure of a program. Temps of different procedures are
/// distinct even when they share a name.
pub fn elab_program(program: Program, ctx: &mut Context) -> Result<Vec<Procedure>> {
  program
    .into_iter()
    .map(|proc| elab_proc(proc, ctx))
    .collect()
}

fn elab_proc(proc: SurfaceProc, ctx: &mut Context) -> Result<Procedure> {
  let mut scope: HashMap<String, Temp> = HashMap::new();
  let mut body = Vec::with_capacity(proc.lines.len());

  for line in proc.lines {
    let instr = match line {
      SurfaceLine::Label(name) => Instr::Label {
        label: Label::new(name),
      },
      SurfaceLine::Move { assem, dst, src } => Instr::Move {
        assem: assem.unwrap_or_else(|| ctx.machine.move_template.clone()),
        dst: resolve(&dst, &mut scope, ctx, &proc.name)?,
        src: resolve(&src, &mut scope, ctx, &proc.name)?,
      },
      SurfaceLine::Oper {
        assem,
        defs,
        uses,
        jumps,
      } => Instr::Oper {
        assem,
        dst: defs
          .iter()
          .map(|d| resolve(d, &mut scope, ctx, &proc.name))
          .collect::<Result<_>>()?,
        src: uses
          .iter()
          .map(|u| resolve(u, &mut scope, ctx, &proc.name))
          .collect::<Result<_>>()?,
        jump: jumps.map(|js| js.into_iter().map(Label::new).collect()),
      },
    };
    body.push(instr);
  }

  Ok(Procedure {
    name: proc.name,
    body,
  })
}

fn resolve(
  operand: &SurfaceOperand,
  scope: &mut HashMap<String, Temp>,
  ctx: &mut Context,
  proc_name: &str,
) -> Result<Temp> {
  match operand {
    SurfaceOperand::Reg(name) => {
      if ctx.machine.is_reserved(name) {
        bail!(
          "Register %{} in {} is reserved on machine {}",
          name,
          proc_name,
          ctx.machine.name()
        );
      }
      ctx.machine.register_named(name).ok_or_else(|| {
        anyhow!(
          "Unknown register %{} in {} for machine {}",
          name,
          proc_name,
          ctx.machine.name()
        )
      })
    }
    SurfaceOperand::Temp(name) => {
      if let Some(temp) = scope.get(name) {
        return Ok(*temp);
      }
      let temp = ctx.named_temp(name);
      scope.insert(name.clone(), temp);
      Ok(temp)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse::parser::parse_string;

  #[test]
  fn names_and_registers_resolve() {
    let mut ctx = Context::with_registers(2);
    let program = parse_string("proc p { move x <- %r1 oper \"add\" def(y) use(x, y) }").unwrap();
    let procs = elab_program(program, &mut ctx).unwrap();
    let body = &procs[0].body;

    let r1 = ctx.machine.registers()[1];
    assert_eq!(body[0], Instr::mov("mov `d0, `s0", Temp(2), r1));
    assert_eq!(body[1].used(), vec![Temp(2), Temp(3)]);
    assert_eq!(body[1].defined(), vec![Temp(3)]);
    assert_eq!(ctx.name_of(Temp(3)), "y");
  }

  #[test]
  fn procedures_do_not_share_temps() {
    let mut ctx = Context::with_registers(2);
    let program = parse_string("proc a { oper \"x\" def(t) } proc b { oper \"x\" def(t) }").unwrap();
    let procs = elab_program(program, &mut ctx).unwrap();
    assert_ne!(procs[0].body[0].defined(), procs[1].body[0].defined());
  }

  #[test]
  fn unknown_register_is_an_error() {
    let mut ctx = Context::with_registers(2);
    let program = parse_string("proc p { move x <- %rax }").unwrap();
    let err = elab_program(program, &mut ctx).unwrap_err();
    assert!(err.to_string().contains("Unknown register %rax"));
  }

  #[test]
  fn reserved_registers_are_refused() {
    let mut ctx = Context::x86_64();
    let program = parse_string("proc p { oper \"push `s0\" use(%rbp) }").unwrap();
    let err = elab_program(program, &mut ctx).unwrap_err();
    assert!(err.to_string().contains("Register %rbp in p is reserved"));

    let mut ctx = Context::with_registers(2);
    let program = parse_string("proc p { move x <- %fp }").unwrap();
    assert!(elab_program(program, &mut ctx).is_err());
  }
}
