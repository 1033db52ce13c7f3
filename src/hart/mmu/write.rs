//! MMU write engine
//!
//! Splits a (byte address, width, value) request into one to three
//! lane-masked cell writes. The first beat is written in the step the
//! request is accepted; the rest follow one per step, with ready low
//! until the engine is back in IDLE.

use std::fmt;

use super::{is_peripheral, WriteRequest, UART_ADDRESS};
use crate::hart::memory::{Lanes, Memory, Wordsize};
use crate::uart::Uart;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    /// Second byte of an unaligned half still to write
    HalfUnaligned,
    /// Upper half of an aligned word still to write
    Word,
    /// Middle and last bytes of an unaligned word still to write
    WordUnaligned,
    /// Last byte of an unaligned word still to write
    WordUnalignedFish,
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WriteState::Idle => "IDLE",
            WriteState::HalfUnaligned => "HALF_UNALIGNED",
            WriteState::Word => "WORD",
            WriteState::WordUnaligned => "WORD_UNALIGNED",
            WriteState::WordUnalignedFish => "WORD_UNALIGNED_FISH",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct WriteEngine {
    state: WriteState,
    /// Cell the next beat goes to
    next_cell: usize,
    /// Bytes not yet written, lowest first
    carry: u32,
}

impl Default for WriteEngine {
    fn default() -> Self {
        Self {
            state: WriteState::Idle,
            next_cell: 0,
            carry: 0,
        }
    }
}

impl WriteEngine {
    pub fn state(&self) -> WriteState {
        self.state
    }

    pub fn ready(&self) -> bool {
        self.state == WriteState::Idle
    }

    /// Advance one step. Returns true if a new request was accepted.
    pub fn step<U: Uart>(
        &mut self,
        memory: &mut Memory,
        uart: &mut U,
        request: Option<WriteRequest>,
    ) -> bool {
        match self.state {
            WriteState::Idle => {
                if let Some(request) = request {
                    self.accept(memory, uart, request);
                    return true;
                }
            }
            WriteState::HalfUnaligned => {
                memory.write(self.next_cell, self.carry as u16, Lanes::Low);
                self.state = WriteState::Idle;
            }
            WriteState::Word => {
                memory.write(self.next_cell, self.carry as u16, Lanes::Both);
                self.state = WriteState::Idle;
            }
            WriteState::WordUnaligned => {
                memory.write(self.next_cell, self.carry as u16, Lanes::Both);
                self.carry >>= 16;
                self.next_cell = self.next_cell.wrapping_add(1);
                self.state = WriteState::WordUnalignedFish;
            }
            WriteState::WordUnalignedFish => {
                memory.write(self.next_cell, self.carry as u16, Lanes::Low);
                self.state = WriteState::Idle;
            }
        }
        false
    }

    fn accept<U: Uart>(&mut self, memory: &mut Memory, uart: &mut U, request: WriteRequest) {
        let WriteRequest { addr, width, value } = request;
        log::trace!("mmu write 0x{addr:08x} ({width}) <- 0x{value:08x}");

        if is_peripheral(addr) {
            if addr == UART_ADDRESS && width == Wordsize::Byte {
                uart.write(value as u8);
            } else {
                log::warn!("dropping {width} write to unmapped peripheral address 0x{addr:08x}");
            }
            return;
        }

        let cell = (addr >> 1) as usize;
        let odd = addr & 1 != 0;
        self.next_cell = cell.wrapping_add(1);
        match width {
            Wordsize::Byte => {
                let byte = value & 0xff;
                let lanes = if odd { Lanes::High } else { Lanes::Low };
                memory.write(cell, (byte | byte << 8) as u16, lanes);
            }
            Wordsize::Halfword if odd => {
                memory.write(cell, (value << 8) as u16, Lanes::High);
                self.carry = (value >> 8) & 0xff;
                self.state = WriteState::HalfUnaligned;
            }
            Wordsize::Halfword => {
                memory.write(cell, value as u16, Lanes::Both);
            }
            Wordsize::Word if odd => {
                memory.write(cell, (value << 8) as u16, Lanes::High);
                self.carry = value >> 8;
                self.state = WriteState::WordUnaligned;
            }
            Wordsize::Word => {
                memory.write(cell, value as u16, Lanes::Both);
                self.carry = value >> 16;
                self.state = WriteState::Word;
            }
        }
    }
}
