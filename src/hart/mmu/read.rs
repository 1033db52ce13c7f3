//! MMU read engine
//!
//! Turns a (byte address, width) request into one to three cell
//! reads on a synchronous read port and reassembles the bytes
//! little-endian. The port has one step of latency: the data for the
//! cell address presented in step N is available in step N+1, so the
//! engine issues the next beat's address in the same step the current
//! beat's data arrives.
//!
//! | request         | beats | response visible after acceptance |
//! |-----------------|-------|-----------------------------------|
//! | byte            | 1     | 2 steps                           |
//! | aligned half    | 1     | 2 steps                           |
//! | unaligned half  | 2     | 3 steps                           |
//! | aligned word    | 2     | 3 steps                           |
//! | unaligned word  | 3     | 4 steps                           |

use std::fmt;

use super::{is_peripheral, ReadRequest, UART_ADDRESS};
use crate::hart::memory::{Memory, Wordsize};
use crate::uart::Uart;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Idle,
    /// First cell address presented, waiting for its data
    Pipe,
    /// Single-beat access, data arriving
    Collect,
    /// First of several beats arriving
    Collect0,
    /// Second beat arriving
    Collect1,
    /// Third beat of an unaligned word arriving
    Collect2,
}

impl fmt::Display for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ReadState::Idle => "IDLE",
            ReadState::Pipe => "PIPE",
            ReadState::Collect => "COLLECT",
            ReadState::Collect0 => "COLLECT0",
            ReadState::Collect1 => "COLLECT1",
            ReadState::Collect2 => "COLLECT2",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ReadEngine {
    state: ReadState,
    request: ReadRequest,
    value: u32,
    valid: bool,
    port_addr: usize,
    port_data: u16,
}

impl Default for ReadEngine {
    fn default() -> Self {
        Self {
            state: ReadState::Idle,
            request: ReadRequest {
                addr: 0,
                width: Wordsize::Byte,
            },
            value: 0,
            valid: false,
            port_addr: 0,
            port_data: 0,
        }
    }
}

impl ReadEngine {
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Whether a new request would be accepted this step
    pub fn ready(&self) -> bool {
        self.state == ReadState::Idle
    }

    /// The response to request, if the engine holds a valid result
    /// for exactly that request
    pub fn response(&self, request: ReadRequest) -> Option<u32> {
        (self.valid && self.request == request).then_some(self.value)
    }

    /// Whether request can be answered from the retained result
    /// without going to memory. Peripheral reads have side effects, so
    /// they are never served this way.
    fn is_cached(&self, request: ReadRequest) -> bool {
        self.valid && self.request == request && !is_peripheral(request.addr)
    }

    /// Forget the retained result (memory is about to change)
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Advance one step. The port data for next step is sampled from
    /// memory before anything else in the MMU changes it.
    pub fn step<U: Uart>(&mut self, memory: &Memory, uart: &mut U, request: Option<ReadRequest>) {
        let sampled = memory.read(self.port_addr);
        let data = u32::from(self.port_data);

        match self.state {
            ReadState::Idle => {
                if let Some(request) = request {
                    if !self.is_cached(request) {
                        log::trace!("mmu read 0x{:08x} ({})", request.addr, request.width);
                        self.request = request;
                        self.valid = false;
                        self.port_addr = (request.addr >> 1) as usize;
                        self.state = ReadState::Pipe;
                    }
                }
            }
            ReadState::Pipe => {
                self.port_addr = self.port_addr.wrapping_add(1);
                let odd = self.request.addr & 1 != 0;
                self.state = match self.request.width {
                    _ if is_peripheral(self.request.addr) => ReadState::Collect,
                    Wordsize::Word => ReadState::Collect0,
                    Wordsize::Halfword if odd => ReadState::Collect0,
                    _ => ReadState::Collect,
                };
            }
            ReadState::Collect => {
                self.value = if is_peripheral(self.request.addr) {
                    self.read_peripheral(uart)
                } else {
                    match self.request.width {
                        Wordsize::Byte if self.request.addr & 1 != 0 => data >> 8,
                        Wordsize::Byte => data & 0xff,
                        _ => data,
                    }
                };
                self.finish();
            }
            ReadState::Collect0 => {
                self.value = data;
                self.port_addr = self.port_addr.wrapping_add(1);
                self.state = ReadState::Collect1;
            }
            ReadState::Collect1 => {
                let odd = self.request.addr & 1 != 0;
                match self.request.width {
                    Wordsize::Word if odd => {
                        self.value = (self.value >> 8) & 0xff | data << 8;
                        self.state = ReadState::Collect2;
                    }
                    Wordsize::Word => {
                        self.value |= data << 16;
                        self.finish();
                    }
                    _ => {
                        self.value = (self.value >> 8) & 0xff | (data & 0xff) << 8;
                        self.finish();
                    }
                }
            }
            ReadState::Collect2 => {
                self.value |= (data & 0xff) << 24;
                self.finish();
            }
        }

        self.port_data = sampled;
    }

    fn finish(&mut self) {
        self.valid = true;
        self.state = ReadState::Idle;
    }

    fn read_peripheral<U: Uart>(&self, uart: &mut U) -> u32 {
        if self.request.addr == UART_ADDRESS && self.request.width == Wordsize::Byte {
            let byte = uart.peek().unwrap_or(0);
            uart.ack();
            u32::from(byte)
        } else {
            log::warn!(
                "ignoring {} read from unmapped peripheral address 0x{:08x}",
                self.request.width,
                self.request.addr
            );
            0
        }
    }
}
