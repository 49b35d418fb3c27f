//! Abstract Assembly Type
//!
//! Instruction selection hands the allocator a list of these. An instruction
//! is opaque text plus the temps it reads and writes; `` `d0 ``, `` `s1 `` and
//! `` `j0 `` in the text refer to the i-th destination, source and jump target.

use std::fmt::{Display, Error, Formatter};

use crate::temp::{Label, Temp};

/// Abstract Assembly Instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
  Oper {
    assem: String,
    dst: Vec<Temp>,
    src: Vec<Temp>,
    /// `None` falls through to the next instruction, `Some` transfers control
    /// to exactly these labels (an empty list leaves the procedure).
    jump: Option<Vec<Label>>,
  },
  Move {
    assem: String,
    dst: Temp,
    src: Temp,
  },
  Label {
    label: Label,
  },
}

/// The instruction body of one procedure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Procedure {
  pub name: String,
  pub body: Vec<Instr>,
}

impl Instr {
  pub fn oper(assem: &str, dst: Vec<Temp>, src: Vec<Temp>) -> Self {
    Instr::Oper {
      assem: assem.to_string(),
      dst,
      src,
      jump: None,
    }
  }

  pub fn jump(assem: &str, src: Vec<Temp>, targets: Vec<Label>) -> Self {
    Instr::Oper {
      assem: assem.to_string(),
      dst: vec![],
      src,
      jump: Some(targets),
    }
  }

  pub fn mov(assem: &str, dst: Temp, src: Temp) -> Self {
    Instr::Move {
      assem: assem.to_string(),
      dst,
      src,
    }
  }

  pub fn label(name: &str) -> Self {
    Instr::Label {
      label: Label::new(name),
    }
  }

  /// Temps written by this instruction.
  pub fn defined(&self) -> Vec<Temp> {
    match self {
      Instr::Oper { dst, .. } => dst.clone(),
      Instr::Move { dst, .. } => vec![*dst],
      Instr::Label { .. } => vec![],
    }
  }

  /// Temps read by this instruction.
  pub fn used(&self) -> Vec<Temp> {
    match self {
      Instr::Oper { src, .. } => src.clone(),
      Instr::Move { src, .. } => vec![*src],
      Instr::Label { .. } => vec![],
    }
  }

  pub fn is_move(&self) -> bool {
    matches!(self, Instr::Move { .. })
  }

  pub fn jumps(&self) -> Option<&Vec<Label>> {
    match self {
      Instr::Oper { jump, .. } => jump.as_ref(),
      _ => None,
    }
  }

  /// Replace every read of `from` with `to`.
  pub fn rewrite_use(&mut self, from: Temp, to: Temp) {
    match self {
      Instr::Oper { src, .. } => src.iter_mut().filter(|s| **s == from).for_each(|s| *s = to),
      Instr::Move { src, .. } => {
        if *src == from {
          *src = to;
        }
      }
      Instr::Label { .. } => {}
    }
  }

  /// Replace every write of `from` with `to`.
  pub fn rewrite_def(&mut self, from: Temp, to: Temp) {
    match self {
      Instr::Oper { dst, .. } => dst.iter_mut().filter(|d| **d == from).for_each(|d| *d = to),
      Instr::Move { dst, .. } => {
        if *dst == from {
          *dst = to;
        }
      }
      Instr::Label { .. } => {}
    }
  }

  /// Render the instruction text, with each operand placeholder replaced by
  /// whatever `operand` returns for that temp.
  pub fn format(&self, operand: &dyn Fn(Temp) -> String) -> String {
    match self {
      Instr::Oper {
        assem,
        dst,
        src,
        jump,
      } => {
        let targets = jump.as_deref().unwrap_or(&[]);
        format!("\t{}", substitute(assem, dst, src, targets, operand))
      }
      Instr::Move { assem, dst, src } => {
        format!("\t{}", substitute(assem, &[*dst], &[*src], &[], operand))
      }
      Instr::Label { label } => format!("{}:", label),
    }
  }
}

/// Expand the `` `dN `` / `` `sN `` / `` `jN `` placeholders of an assem template.
/// Placeholders pointing past the operand lists are kept as they are.
fn substitute(
  assem: &str,
  dst: &[Temp],
  src: &[Temp],
  jump: &[Label],
  operand: &dyn Fn(Temp) -> String,
) -> String {
  let mut out = String::with_capacity(assem.len());
  let mut chars = assem.chars().peekable();
  while let Some(c) = chars.next() {
    if c != '`' {
      out.push(c);
      continue;
    }
    let kind = match chars.peek() {
      Some(k @ ('d' | 's' | 'j')) => *k,
      _ => {
        out.push(c);
        continue;
      }
    };
    chars.next();
    let mut digits = String::new();
    while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
      digits.push(*d);
      chars.next();
    }
    let replacement = digits.parse::<usize>().ok().and_then(|i| match kind {
      'd' => dst.get(i).map(|t| operand(*t)),
      's' => src.get(i).map(|t| operand(*t)),
      _ => jump.get(i).map(|l| l.to_string()),
    });
    match replacement {
      Some(r) => out.push_str(&r),
      None => {
        out.push('`');
        out.push(kind);
        out.push_str(&digits);
      }
    }
  }
  out
}

impl Display for Instr {
  fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
    write!(fmt, "{}", self.format(&|t| t.to_string()))
  }
}

impl Display for Procedure {
  fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
    writeln!(fmt, "{}:", self.name)?;
    for instr in &self.body {
      writeln!(fmt, "{}", instr)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn def_and_use_sets() {
    let add = Instr::oper("addq `s1, `d0", vec![Temp(1)], vec![Temp(1), Temp(2)]);
    assert_eq!(add.defined(), vec![Temp(1)]);
    assert_eq!(add.used(), vec![Temp(1), Temp(2)]);
    assert!(!add.is_move());

    let mv = Instr::mov("mov `d0, `s0", Temp(3), Temp(4));
    assert!(mv.is_move());
    assert_eq!(mv.defined(), vec![Temp(3)]);
    assert_eq!(mv.used(), vec![Temp(4)]);
    assert!(Instr::label("L0").defined().is_empty());
  }

  #[test]
  fn format_substitutes_placeholders() {
    let cj = Instr::jump("cmp `s0, `s1; jl `j1", vec![Temp(1), Temp(2)], vec![
      Label::new("a"),
      Label::new("b"),
    ]);
    assert_eq!(cj.to_string(), "\tcmp T1, T2; jl b");

    let odd = Instr::oper("x `s7 `q", vec![], vec![Temp(0)]);
    assert_eq!(odd.to_string(), "\tx `s7 `q");
  }

  #[test]
  fn rewrite_only_touches_one_side() {
    let mut add = Instr::oper("addq `s1, `d0", vec![Temp(1)], vec![Temp(1), Temp(2)]);
    add.rewrite_use(Temp(1), Temp(9));
    assert_eq!(add.used(), vec![Temp(9), Temp(2)]);
    assert_eq!(add.defined(), vec![Temp(1)]);
    add.rewrite_def(Temp(1), Temp(8));
    assert_eq!(add.defined(), vec![Temp(8)]);
  }
}
