//! Temps, labels and colors shared by every allocation phase.

use std::fmt::{Display, Error, Formatter};

use enum_as_inner::EnumAsInner;
use serde::Serialize;

/// An abstract register. Two temps are the same register iff their ids match.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Temp(pub u32);

/// Label in the abstract assembly, a jump target.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
  pub fn new(name: impl Into<String>) -> Self {
    Label(name.into())
  }
}

/// What a temp is finally mapped to: an index into the machine's register
/// pool, or a stack slot of the procedure's frame.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, EnumAsInner, Serialize)]
pub enum Color {
  Reg(u32),
  Spill(u32),
}

/// Counter for creating new temps. There is one per compilation unit, it is
/// never shared between units.
#[derive(Debug, Clone, Default)]
pub struct TempFactory {
  next: u32,
}

impl TempFactory {
  pub fn new() -> Self {
    TempFactory { next: 0 }
  }

  /// Create a new temp.
  pub fn temp(&mut self) -> Temp {
    let result = self.next;
    self.next += 1;
    Temp(result)
  }
}

impl Display for Temp {
  fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
    write!(fmt, "T{}", self.0)
  }
}

impl Display for Label {
  fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
    write!(fmt, "{}", self.0)
  }
}

impl Display for Color {
  fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
    match self {
      Color::Reg(r) => write!(fmt, "r{}", r),
      Color::Spill(s) => write!(fmt, "spill{}", s),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn factory_hands_out_distinct_temps() {
    let mut temps = TempFactory::new();
    let a = temps.temp();
    let b = temps.temp();
    assert_ne!(a, b);
    assert_eq!(temps.temp(), Temp(2));
  }

  #[test]
  fn color_accessors() {
    assert_eq!(Color::Reg(3).as_reg(), Some(&3));
    assert!(Color::Spill(0).is_spill());
    assert_eq!(Color::Spill(2).to_string(), "spill2");
  }
}
