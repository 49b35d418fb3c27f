//! Compilation unit context: owns the machine and the temp counter.

use std::collections::HashMap;

use crate::registers::Machine;
use crate::temp::{Temp, TempFactory};

/// Shared state of one compilation unit. Temps of every procedure of the unit
/// come out of the same counter, so they never collide.
#[derive(Debug, Clone)]
pub struct Context {
  pub machine: Machine,
  temps: TempFactory,
  /// Source names of temps, used for dumps only
  names: HashMap<Temp, String>,
}

impl Context {
  fn with_machine(build: impl FnOnce(&mut TempFactory) -> Machine) -> Self {
    let mut temps = TempFactory::new();
    let machine = build(&mut temps);
    Context {
      machine,
      temps,
      names: HashMap::new(),
    }
  }

  pub fn x86_64() -> Self {
    Self::with_machine(Machine::x86_64)
  }

  pub fn with_registers(k: usize) -> Self {
    Self::with_machine(|temps| Machine::with_registers(k, temps))
  }

  /// Create a new anonymous temp in this context.
  pub fn temp(&mut self) -> Temp {
    self.temps.temp()
  }

  /// Create a new temp remembering the name it had in the source.
  pub fn named_temp(&mut self, name: &str) -> Temp {
    let temp = self.temps.temp();
    self.names.insert(temp, name.to_string());
    temp
  }

  /// Printable name of a temp: the register name for precolored temps, the
  /// source name if there is one, `T<n>` otherwise.
  pub fn name_of(&self, temp: Temp) -> String {
    if let Some(color) = self.machine.precolor(temp) {
      return self.machine.register_name(*color.as_reg().unwrap_or(&0));
    }
    match self.names.get(&temp) {
      Some(name) => name.clone(),
      None => temp.to_string(),
    }
  }
}
