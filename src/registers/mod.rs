//! Target machine description: the pool of allocatable registers.
pub(crate) mod consts;
pub(crate) mod reg;

use std::collections::HashMap;

use crate::temp::{Color, Temp, TempFactory};

use self::consts::{ALLOC_POOL_REGS, FRAME_POINTER, RESERVED_REGS, STACK_ELEM_SIZE};

/// The physical register file the allocator colors with.
///
/// Every allocatable register is represented by a precolored temp, created
/// before any other temp of the compilation unit. `K` is the pool size.
#[derive(Debug, Clone)]
pub struct Machine {
  name: String,
  /// Precolored temps, `registers[i]` has color `Reg(i)`
  registers: Vec<Temp>,
  reg_names: Vec<String>,
  /// Registers that exist on the machine but are not in the pool
  reserved: Vec<String>,
  callee_saved: Vec<bool>,
  index: HashMap<Temp, u32>,
  /// Register the spill slots are addressed from, e.g. `%rbp`
  pub frame_pointer: String,
  pub word_size: u32,
  /// Template for register to register copies.
  pub move_template: String,
  /// Spill code templates, `{slot}` stands for the frame slot operand
  pub load_template: String,
  pub store_template: String,
}

impl Machine {
  fn new(
    name: &str,
    reg_names: Vec<String>,
    reserved: Vec<String>,
    callee_saved: Vec<bool>,
    frame_pointer: String,
    templates: [&str; 3],
    temps: &mut TempFactory,
  ) -> Self {
    let [move_template, load_template, store_template] = templates;
    let registers = reg_names.iter().map(|_| temps.temp()).collect::<Vec<_>>();
    let index = registers
      .iter()
      .enumerate()
      .map(|(i, t)| (*t, i as u32))
      .collect();
    Machine {
      name: name.to_string(),
      registers,
      reg_names,
      reserved,
      callee_saved,
      index,
      frame_pointer,
      word_size: STACK_ELEM_SIZE,
      move_template: move_template.to_string(),
      load_template: load_template.to_string(),
      store_template: store_template.to_string(),
    }
  }

  /// The x86_64 allocation pool.
  pub fn x86_64(temps: &mut TempFactory) -> Self {
    Self::new(
      "x86-64",
      ALLOC_POOL_REGS
        .iter()
        .map(|r| r.as_ref().to_string())
        .collect(),
      RESERVED_REGS
        .iter()
        .map(|r| r.as_ref().to_string())
        .collect(),
      ALLOC_POOL_REGS
        .iter()
        .map(|r| r.is_callee_saved())
        .collect(),
      FRAME_POINTER.to_string(),
      ["movq `s0, `d0", "movq {slot}, `d0", "movq `s0, {slot}"],
      temps,
    )
  }

  /// A made up machine with `k` registers named `r0` .. `r{k-1}`.
  pub fn with_registers(k: usize, temps: &mut TempFactory) -> Self {
    Self::new(
      &format!("synthetic-{}", k),
      (0..k).map(|i| format!("r{}", i)).collect(),
      vec!["fp".to_string()],
      vec![false; k],
      "%fp".to_string(),
      ["mov `d0, `s0", "ld `d0, {slot}", "st {slot}, `s0"],
      temps,
    )
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Number of allocatable registers.
  #[inline]
  pub fn k(&self) -> usize {
    self.registers.len()
  }

  pub fn registers(&self) -> &[Temp] {
    &self.registers
  }

  /// The fixed color of a precolored temp
  pub fn precolor(&self, temp: Temp) -> Option<Color> {
    self.index.get(&temp).map(|i| Color::Reg(*i))
  }

  pub fn is_precolored(&self, temp: Temp) -> bool {
    self.index.contains_key(&temp)
  }

  /// Look up a register by its name, with or without the leading `%`.
  pub fn register_named(&self, name: &str) -> Option<Temp> {
    let name = name.strip_prefix('%').unwrap_or(name);
    self
      .reg_names
      .iter()
      .position(|n| n == name)
      .map(|i| self.registers[i])
  }

  /// A register of the machine that is kept out of allocation, like the
  /// frame pointer.
  pub fn is_reserved(&self, name: &str) -> bool {
    let name = name.strip_prefix('%').unwrap_or(name);
    self.reserved.iter().any(|n| n == name)
  }

  /// Assembly name of the register with color `Reg(index)`, e.g. `%rax`.
  pub fn register_name(&self, index: u32) -> String {
    format!("%{}", self.reg_names[index as usize])
  }

  pub fn is_callee_saved(&self, index: u32) -> bool {
    self.callee_saved[index as usize]
  }
}
