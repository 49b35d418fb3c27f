use std::fmt;

use strum_macros::AsRefStr;

/// General purpose registers of x86_64. The allocator always hands out the
/// full 64-bit register.
#[allow(clippy::upper_case_acronyms)]
#[derive(Eq, PartialEq, Debug, Copy, Clone, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum X86_64Register {
  RAX,
  RBX,
  RCX,
  RDX,
  RSI,
  RDI,
  RBP,
  RSP,
  R8,
  R9,
  R10,
  R11,
  R12,
  R13,
  R14,
  R15,
}

impl X86_64Register {
  pub const fn is_callee_saved(&self) -> bool {
    matches!(
      self,
      X86_64Register::RBX
        | X86_64Register::RBP
        | X86_64Register::R12
        | X86_64Register::R13
        | X86_64Register::R14
        | X86_64Register::R15
    )
  }
}

impl fmt::Display for X86_64Register {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "%{}", self.as_ref())
  }
}
