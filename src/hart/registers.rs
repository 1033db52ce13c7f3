use std::fmt;

use itertools::Itertools;

/// Integer register file
///
/// One write port with a one-step latency: a write scheduled during
/// a step is held pending and lands when the step is clocked, so it
/// is visible to reads from the next step. x0 always reads zero.
/// The file remembers which registers have been written since it
/// was made or last reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    registers: [u32; 32],
    pending: Option<(u8, u32)>,
    written: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new([0; 32])
    }
}

impl Registers {
    /// Make a register file with the given reset values (the value
    /// given for x0 is ignored)
    pub fn new(mut values: [u32; 32]) -> Self {
        values[0] = 0;
        Self {
            registers: values,
            pending: None,
            written: 0,
        }
    }

    /// Read register x{which}. Indices above 31 use the low five bits.
    pub fn read(&self, which: u8) -> u32 {
        self.registers[usize::from(which & 0x1f)]
    }

    /// Schedule a write to x{which}, to land on the next clock. A
    /// second write scheduled in the same step replaces the first.
    pub fn schedule_write(&mut self, which: u8, value: u32) {
        self.pending = Some((which & 0x1f, value));
    }

    /// The write that will land on the next clock, if any
    pub fn pending(&self) -> Option<(u8, u32)> {
        self.pending
    }

    /// Apply the pending write. Writes to x0 are discarded and do not
    /// count as written.
    pub fn clock(&mut self) {
        if let Some((which, value)) = self.pending.take() {
            if which != 0 {
                self.registers[usize::from(which)] = value;
                self.written |= 1 << which;
            }
        }
    }

    /// Drop any write that has not landed yet and forget which
    /// registers were written. Register values are kept.
    pub fn reset(&mut self) {
        self.pending = None;
        self.written = 0;
    }

    /// Bitmask with bit n set if xn has been written
    pub fn written_mask(&self) -> u32 {
        self.written
    }

    pub fn was_written(&self, which: u8) -> bool {
        which < 32 && self.written & (1 << which) != 0
    }

    /// Indices of the registers written so far, in order
    pub fn written(&self) -> Vec<u8> {
        (0..32).filter(|&n| self.was_written(n)).collect()
    }

    pub fn values(&self) -> &[u32; 32] {
        &self.registers
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let non_zero = self
            .registers
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value != 0)
            .map(|(n, value)| format!("x{n}: 0x{value:08x}"))
            .join(", ");
        write!(f, "Non-zero registers {{ {non_zero} }}")
    }
}
