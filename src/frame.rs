//! Stack frame of a procedure, as far as the allocator is concerned: the spill
//! slots below the frame pointer.

use serde::Serialize;

use crate::registers::Machine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
  frame_pointer: String,
  word_size: u32,
  /// Number of slots handed out so far
  slots: u32,
}

impl Frame {
  pub fn new(machine: &Machine) -> Self {
    Frame {
      frame_pointer: machine.frame_pointer.clone(),
      word_size: machine.word_size,
      slots: 0,
    }
  }

  /// A fresh word sized slot.
  pub fn alloc_slot(&mut self) -> u32 {
    let slot = self.slots;
    self.slots += 1;
    slot
  }

  /// Memory operand of a slot, e.g. `-16(%rbp)` for slot 1
  pub fn slot_operand(&self, slot: u32) -> String {
    let offset = -((self.word_size * (slot + 1)) as i64);
    format!("{}({})", offset, self.frame_pointer)
  }

  pub fn slot_count(&self) -> u32 {
    self.slots
  }

  /// Bytes of stack used by spill slots.
  pub fn size(&self) -> u32 {
    self.slots * self.word_size
  }
}
