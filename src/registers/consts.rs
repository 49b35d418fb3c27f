use crate::registers::reg::X86_64Register;

// R11 is kept out of the pool as the scratch register for spill code, RSP and
// RBP hold the frame.
pub const REG_ALLOC_POOL_SIZE: usize = 13;
pub const ALLOC_POOL_REGS: [X86_64Register; REG_ALLOC_POOL_SIZE] = [
  X86_64Register::RAX,
  X86_64Register::RDI,
  X86_64Register::RSI,
  X86_64Register::RDX,
  X86_64Register::RCX,
  X86_64Register::R8,
  X86_64Register::R9,
  X86_64Register::R10,
  X86_64Register::RBX,
  X86_64Register::R12,
  X86_64Register::R13,
  X86_64Register::R14,
  X86_64Register::R15,
];

pub const FRAME_POINTER: X86_64Register = X86_64Register::RBP;

/// Named registers the allocator never hands out.
pub const RESERVED_REGS: [X86_64Register; 3] = [
  X86_64Register::RSP,
  X86_64Register::RBP,
  X86_64Register::R11,
];

pub const STACK_ELEM_SIZE: u32 = 8;
