//! Memory-access controller
//!
//! The MMU owns the backing memory and the UART, and gives the hart
//! byte, half-word and word access at any byte address over the
//! 16-bit cells. Reads and writes are handled by two independent
//! engines, each with at most one request in flight:
//!
//! * the read engine ([read]) issues one cell read per step and
//!   reassembles the result;
//! * the write engine ([write]) splits a write into lane-masked cell
//!   writes.
//!
//! Both are stepped together by [Mmu::step], with the requests the
//! hart presents during that step. The hart looks at the engines'
//! outputs (`ready`, `response`) before presenting requests, so it
//! always sees the values registered at the end of the previous step.
//!
//! Byte addresses with bit 16 set select the peripheral region. The
//! only peripheral is the UART, at [UART_ADDRESS], which is accessed
//! with byte loads and stores.

use std::fmt;

use self::read::{ReadEngine, ReadState};
use self::write::{WriteEngine, WriteState};
use super::memory::{Memory, Wordsize};
use crate::uart::Uart;

pub mod read;
pub mod write;

/// Address of the UART data register
pub const UART_ADDRESS: u32 = 0x0001_0000;

/// Address bit selecting the peripheral region
pub const PERIPHERAL_BIT: u32 = 0x0001_0000;

pub fn is_peripheral(addr: u32) -> bool {
    addr & PERIPHERAL_BIT != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub addr: u32,
    pub width: Wordsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub addr: u32,
    pub width: Wordsize,
    pub value: u32,
}

#[derive(Debug)]
pub struct Mmu<U: Uart> {
    memory: Memory,
    uart: U,
    read: ReadEngine,
    write: WriteEngine,
}

impl<U: Uart> Mmu<U> {
    pub fn new(memory: Memory, uart: U) -> Self {
        Self {
            memory,
            uart,
            read: ReadEngine::default(),
            write: WriteEngine::default(),
        }
    }

    pub fn read_ready(&self) -> bool {
        self.read.ready()
    }

    pub fn read_response(&self, request: ReadRequest) -> Option<u32> {
        self.read.response(request)
    }

    pub fn write_ready(&self) -> bool {
        self.write.ready()
    }

    pub fn read_state(&self) -> ReadState {
        self.read.state()
    }

    pub fn write_state(&self) -> WriteState {
        self.write.state()
    }

    /// Advance both engines by one step. The read port samples memory
    /// before this step's write lands.
    pub fn step(&mut self, read: Option<ReadRequest>, write: Option<WriteRequest>) {
        self.read.step(&self.memory, &mut self.uart, read);
        if self.write.step(&mut self.memory, &mut self.uart, write) {
            self.read.invalidate();
        }
    }

    /// Return both engines to IDLE, abandoning anything in flight.
    /// Memory is left as it is.
    pub fn reset(&mut self) {
        self.read = ReadEngine::default();
        self.write = WriteEngine::default();
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }
}

impl<U: Uart> fmt::Display for Mmu<U> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "mmu read {} write {}",
            self.read.state(),
            self.write.state()
        )
    }
}
