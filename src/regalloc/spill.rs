// spilled temps + frame slots -> instructions with loads and stores

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

use crate::{asm::Instr, context::Context, frame::Frame, temp::Temp};

/// Rewrite a body so that spilled temps live in their frame slots.
///
/// Each instruction touching a spilled temp gets a fresh temp of its own in
/// its place: loaded from the slot right before when the instruction reads
/// it, stored back right after when it writes it. The fresh temps are added to
/// `no_spill`, their live ranges cannot get any shorter.
pub fn rewrite_spills(
  ctx: &mut Context,
  body: &[Instr],
  slots: &BTreeMap<Temp, u32>,
  frame: &Frame,
  no_spill: &mut BTreeSet<Temp>,
) -> Result<Vec<Instr>> {
  let mut rewritten = Vec::with_capacity(body.len());
  for instr in body {
    let used = instr.used();
    let defined = instr.defined();
    let touched = used
      .iter()
      .chain(defined.iter())
      .filter(|t| slots.contains_key(*t))
      .copied()
      .collect::<BTreeSet<_>>();

    if touched.is_empty() {
      rewritten.push(instr.clone());
      continue;
    }

    let mut instr = instr.clone();
    let mut stores = vec![];
    for spilled in touched {
      let operand = frame.slot_operand(slots[&spilled]);
      let fresh = ctx.temp();
      no_spill.insert(fresh);

      if used.contains(&spilled) {
        let load = ctx.machine.load_template.replace("{slot}", &operand);
        rewritten.push(Instr::oper(&load, vec![fresh], vec![]));
        instr.rewrite_use(spilled, fresh);
      }
      if defined.contains(&spilled) {
        if instr.jumps().is_some() {
          bail!(
            "Cannot spill {}: it is defined by a control transfer `{}`",
            spilled,
            instr.to_string().trim()
          );
        }
        let store = ctx.machine.store_template.replace("{slot}", &operand);
        stores.push(Instr::oper(&store, vec![], vec![fresh]));
        instr.rewrite_def(spilled, fresh);
      }
      log::debug!("spill {} through {} at {}", spilled, fresh, operand);
    }
    rewritten.push(instr);
    rewritten.extend(stores);
  }
  Ok(rewritten)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::temp::Label;

  #[test]
  fn uses_are_loaded_and_defs_stored() {
    let mut ctx = Context::with_registers(2);
    let (a, b) = (ctx.named_temp("a"), ctx.named_temp("b"));
    let mut frame = Frame::new(&ctx.machine);
    let slot = frame.alloc_slot();
    let body = vec![
      Instr::oper("def `d0", vec![a], vec![]),
      Instr::oper("add `s0, `d0", vec![a], vec![a, b]),
      Instr::jump("ret `s0", vec![a], vec![]),
    ];
    let slots = BTreeMap::from([(a, slot)]);
    let mut no_spill = BTreeSet::new();
    let out = rewrite_spills(&mut ctx, &body, &slots, &frame, &mut no_spill).unwrap();

    let text = out.iter().map(|i| i.to_string()).collect::<Vec<_>>();
    assert_eq!(
      text,
      vec![
        "\tdef T4",
        "\tst -8(%fp), T4",
        "\tld T5, -8(%fp)",
        "\tadd T5, T5",
        "\tst -8(%fp), T5",
        "\tld T6, -8(%fp)",
        "\tret T6",
      ]
    );
    assert_eq!(no_spill.len(), 3);
    // the read of b stays untouched
    assert_eq!(out[3].used(), vec![Temp(5), b]);
    assert!(out.iter().all(|i| !i.used().contains(&a) && !i.defined().contains(&a)));
  }

  #[test]
  fn instructions_without_spilled_temps_are_kept() {
    let mut ctx = Context::with_registers(2);
    let (a, b) = (ctx.named_temp("a"), ctx.named_temp("b"));
    let frame = Frame::new(&ctx.machine);
    let body = vec![Instr::label("L"), Instr::mov("mov `d0, `s0", b, a)];
    let out =
      rewrite_spills(&mut ctx, &body, &BTreeMap::new(), &frame, &mut BTreeSet::new()).unwrap();
    assert_eq!(out, body);
  }

  #[test]
  fn spilled_jump_definition_is_an_error() {
    let mut ctx = Context::with_registers(2);
    let a = ctx.named_temp("a");
    let frame = Frame::new(&ctx.machine);
    let body = vec![
      Instr::Oper {
        assem: "call".to_string(),
        dst: vec![a],
        src: vec![],
        jump: Some(vec![Label::new("L")]),
      },
      Instr::label("L"),
    ];
    let slots = BTreeMap::from([(a, 0)]);
    assert!(rewrite_spills(&mut ctx, &body, &slots, &frame, &mut BTreeSet::new()).is_err());
  }
}
