use std::fmt;

use thiserror::Error;

use self::alu::{AluOp, Condition};
use self::memory::{Memory, Wordsize};
use self::mmu::{Mmu, ReadRequest, WriteRequest};
use self::registers::Registers;
use crate::config::{ConfigError, HartConfig};
use crate::decode::{decode, Instr, Itype};
use crate::image::{BootImage, ImageError};
use crate::opcodes::*;
use crate::uart::{BufferedUart, Uart};
use crate::utils::sign_extend;

pub mod alu;
pub mod memory;
pub mod mmu;
pub mod registers;

#[cfg(test)]
mod tests;

/// Fault codes, as reported on the debug surface
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    #[default]
    Unset,
    IllegalInstruction,
    PcMisaligned,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FaultCode::Unset => "UNSET",
            FaultCode::IllegalInstruction => "ILLEGAL_INSTRUCTION",
            FaultCode::PcMisaligned => "PC_MISALIGNED",
        };
        write!(f, "{name}")
    }
}

/// A fatal fault. Once latched, the hart does nothing more until it
/// is reset.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The instruction word could not be executed (unknown opcode,
    /// undefined funct3/funct7, or a blank word)
    #[error("illegal instruction 0x{insn:08x}")]
    IllegalInstruction { insn: u32 },
    /// The pc would have left a four-byte boundary
    #[error("misaligned pc 0x{target:08x}")]
    PcMisaligned { target: u32 },
}

impl Fault {
    pub fn code(&self) -> FaultCode {
        match self {
            Fault::IllegalInstruction { .. } => FaultCode::IllegalInstruction,
            Fault::PcMisaligned { .. } => FaultCode::PcMisaligned,
        }
    }

    /// The latched instruction word. Only illegal instruction faults
    /// latch one.
    pub fn instruction(&self) -> u32 {
        match self {
            Fault::IllegalInstruction { insn } => *insn,
            Fault::PcMisaligned { .. } => 0,
        }
    }
}

/// Run state after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Faulted(Fault),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("hart still running after {0} cycles")]
    CycleLimit(u64),
}

#[derive(Debug, Error)]
pub enum HartError {
    #[error("invalid hart configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid boot image: {0}")]
    Image(#[from] ImageError),
}

/// Load widths, with the extension applied to the loaded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWidth {
    W,
    H,
    HU,
    B,
    BU,
}

impl LoadWidth {
    pub fn from_funct3(funct3: u32) -> Option<Self> {
        let width = match funct3 {
            FUNCT3_W => LoadWidth::W,
            FUNCT3_H => LoadWidth::H,
            FUNCT3_HU => LoadWidth::HU,
            FUNCT3_B => LoadWidth::B,
            FUNCT3_BU => LoadWidth::BU,
            _ => return None,
        };
        Some(width)
    }

    pub fn wordsize(&self) -> Wordsize {
        match self {
            LoadWidth::W => Wordsize::Word,
            LoadWidth::H | LoadWidth::HU => Wordsize::Halfword,
            LoadWidth::B | LoadWidth::BU => Wordsize::Byte,
        }
    }

    pub fn extend(&self, value: u32) -> u32 {
        match self {
            LoadWidth::W => value,
            LoadWidth::H => sign_extend(value, 15),
            LoadWidth::HU => value & 0xffff,
            LoadWidth::B => sign_extend(value, 7),
            LoadWidth::BU => value & 0xff,
        }
    }
}

fn store_width(funct3: u32) -> Option<Wordsize> {
    match funct3 {
        FUNCT3_B => Some(Wordsize::Byte),
        FUNCT3_H => Some(Wordsize::Halfword),
        FUNCT3_W => Some(Wordsize::Word),
        _ => None,
    }
}

/// A load between decode and write-back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Load {
    pub addr: u32,
    pub width: LoadWidth,
    pub rd: u8,
}

impl Load {
    fn request(&self) -> ReadRequest {
        ReadRequest {
            addr: self.addr,
            width: self.width.wordsize(),
        }
    }
}

/// Hart execution states. Each step the hart does the work of its
/// current state and picks the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Apply any pending write-back and issue the fetch at pc
    FetchRequest,
    /// Wait for the fetched word
    FetchWait,
    /// Decode the fetched word and dispatch on its opcode
    Decode,
    /// Present the load until the read engine takes it
    LoadWait(Load),
    /// Wait for the load data, extend it and write it back
    LoadResolve(Load),
    AluImm {
        op: AluOp,
        rd: u8,
        rs1: u8,
        imm: u32,
    },
    AluReg {
        op: AluOp,
        rd: u8,
        rs1: u8,
        rs2: u8,
    },
    /// Present the store until the write engine takes it
    StoreWait(WriteRequest),
    /// Wait for the write engine to finish
    StoreResolve,
    BranchResolve {
        cond: Condition,
        rs1: u8,
        rs2: u8,
        offset: u32,
    },
    JalrResolve(Itype),
    Faulted,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            State::FetchRequest => write!(f, "FETCH_REQUEST"),
            State::FetchWait => write!(f, "FETCH_WAIT"),
            State::Decode => write!(f, "DECODE"),
            State::LoadWait(_) => write!(f, "LOAD_WAIT"),
            State::LoadResolve(load) => write!(f, "LOAD_RESOLVE_{:?}", load.width),
            State::AluImm { .. } => write!(f, "ALU_IMM"),
            State::AluReg { .. } => write!(f, "ALU_REG"),
            State::StoreWait(_) => write!(f, "STORE_WAIT"),
            State::StoreResolve => write!(f, "STORE_RESOLVE"),
            State::BranchResolve { .. } => write!(f, "BRANCH_RESOLVE"),
            State::JalrResolve(_) => write!(f, "JALR_RESOLVE"),
            State::Faulted => write!(f, "FAULTED"),
        }
    }
}

/// Cycle-stepped RV32I hardware thread
///
/// The hart is a state machine clocked by [Hart::step]. Each step it
/// looks at the MMU outputs registered at the end of the previous
/// step, decides what to present to the MMU this step, and then the
/// MMU and the register file are clocked together. Most instructions
/// take several steps: one or more to fetch, one to decode, and
/// usually one more to execute or to wait on memory.
///
/// The environment is as small as it gets:
///
/// * there is one hart, with no privilege levels and no trap
///   vectors. Both faults (illegal instruction and misaligned pc) are
///   fatal, and latch the hart in FAULTED until reset.
/// * ECALL and EBREAK do not trap; they write a marker value to x1
///   and carry on.
/// * memory is a single block of 16-bit cells starting at address 0,
///   and the UART is the only peripheral.
///
/// The UART implementation is a type parameter, fixed at
/// construction.
#[derive(Debug)]
pub struct Hart<U: Uart = BufferedUart> {
    pc: u32,
    instr: u32,
    registers: Registers,
    mmu: Mmu<U>,
    state: State,
    fault: Option<Fault>,
    cycles: u64,
    retired: u64,
}

/// A word is treated as erased memory (and faults) if its low half is
/// zero or every bit is set. The low-half test deliberately covers
/// more than the all-zero word; opcode 0 is illegal either way.
fn is_blank(insn: u32) -> bool {
    insn & 0xffff == 0 || insn == u32::MAX
}

impl Hart<BufferedUart> {
    /// Make a hart whose UART is an in-memory buffer
    pub fn new(config: &HartConfig, image: &BootImage) -> Result<Self, HartError> {
        Self::with_uart(config, image, BufferedUart::new())
    }
}

impl<U: Uart> Hart<U> {
    pub fn with_uart(config: &HartConfig, image: &BootImage, uart: U) -> Result<Self, HartError> {
        config.validate()?;
        let memory = Memory::from_cells(image.to_cells(config.memory_cells())?);
        log::info!(
            "hart with {} bytes of memory, {} byte image",
            config.memory_size(),
            image.len()
        );
        Ok(Self {
            pc: 0,
            instr: 0,
            registers: Registers::new(config.register_values()),
            mmu: Mmu::new(memory, uart),
            state: State::FetchRequest,
            fault: None,
            cycles: 0,
            retired: 0,
        })
    }

    /// Return to the power-on state: pc 0, every state machine idle,
    /// no fault, no registers marked written. Memory and register
    /// contents are kept.
    pub fn reset(&mut self) {
        log::debug!("reset (pc was 0x{:08x}, state {})", self.pc, self.state);
        self.pc = 0;
        self.instr = 0;
        self.state = State::FetchRequest;
        self.fault = None;
        self.registers.reset();
        self.mmu.reset();
        self.cycles = 0;
        self.retired = 0;
    }

    /// Advance by one clock step
    pub fn step(&mut self) -> Status {
        if self.state == State::Faulted {
            return self.status();
        }
        self.cycles += 1;

        let mut read = None;
        let mut write = None;
        let state = self.state;
        let next = match state {
            State::FetchRequest => {
                if self.pc % 4 != 0 {
                    self.enter_fault(Fault::PcMisaligned { target: self.pc })
                } else if self.mmu.read_ready() {
                    read = Some(self.fetch_request());
                    State::FetchWait
                } else {
                    State::FetchRequest
                }
            }
            State::FetchWait => match self.mmu.read_response(self.fetch_request()) {
                Some(insn) => {
                    self.instr = insn;
                    if is_blank(insn) {
                        self.enter_fault(Fault::IllegalInstruction { insn })
                    } else {
                        State::Decode
                    }
                }
                None => State::FetchWait,
            },
            State::Decode => self.dispatch(),
            State::LoadWait(load) => {
                if self.mmu.read_ready() {
                    read = Some(load.request());
                    State::LoadResolve(load)
                } else {
                    State::LoadWait(load)
                }
            }
            State::LoadResolve(load) => match self.mmu.read_response(load.request()) {
                Some(value) => {
                    self.registers
                        .schedule_write(load.rd, load.width.extend(value));
                    State::FetchRequest
                }
                None => State::LoadResolve(load),
            },
            State::AluImm { op, rd, rs1, imm } => {
                let result = op.execute(self.x(rs1), imm);
                self.registers.schedule_write(rd, result);
                State::FetchRequest
            }
            State::AluReg { op, rd, rs1, rs2 } => {
                let result = op.execute(self.x(rs1), self.x(rs2));
                self.registers.schedule_write(rd, result);
                State::FetchRequest
            }
            State::StoreWait(request) => {
                if self.mmu.write_ready() {
                    write = Some(request);
                    State::StoreResolve
                } else {
                    State::StoreWait(request)
                }
            }
            State::StoreResolve => {
                if self.mmu.write_ready() {
                    State::FetchRequest
                } else {
                    State::StoreResolve
                }
            }
            State::BranchResolve {
                cond,
                rs1,
                rs2,
                offset,
            } => {
                if cond.holds(self.x(rs1), self.x(rs2)) {
                    self.jump(self.pc.wrapping_add(offset), None)
                } else {
                    self.pc = self.pc.wrapping_add(4);
                    State::FetchRequest
                }
            }
            State::JalrResolve(i) => {
                let target = self.x(i.rs1).wrapping_add(i.imm) & !1;
                self.jump(target, Some(i.rd))
            }
            State::Faulted => State::Faulted,
        };

        self.mmu.step(read, write);
        self.registers.clock();
        if next == State::FetchRequest && state != State::FetchRequest {
            self.retired += 1;
        }
        self.state = next;
        self.status()
    }

    /// Step until the current instruction completes (the hart is
    /// back in FETCH_REQUEST) or the hart faults
    pub fn step_instruction(&mut self) -> Status {
        loop {
            let status = self.step();
            if matches!(status, Status::Faulted(_)) || self.state == State::FetchRequest {
                return status;
            }
        }
    }

    /// Step until the hart faults, for at most max_cycles steps
    pub fn run(&mut self, max_cycles: u64) -> Result<Fault, RunError> {
        for _ in 0..max_cycles {
            if let Status::Faulted(fault) = self.step() {
                return Ok(fault);
            }
        }
        match self.status() {
            Status::Faulted(fault) => Ok(fault),
            Status::Running => Err(RunError::CycleLimit(max_cycles)),
        }
    }

    fn fetch_request(&self) -> ReadRequest {
        ReadRequest {
            addr: self.pc,
            width: Wordsize::Word,
        }
    }

    fn enter_fault(&mut self, fault: Fault) -> State {
        log::debug!("fault at pc 0x{:08x}: {fault}", self.pc);
        self.fault = Some(fault);
        State::Faulted
    }

    fn illegal(&mut self) -> State {
        self.enter_fault(Fault::IllegalInstruction { insn: self.instr })
    }

    /// Move pc to target, linking pc+4 into rd if given. A target
    /// off a four-byte boundary faults instead, leaving pc and rd
    /// alone.
    fn jump(&mut self, target: u32, link: Option<u8>) -> State {
        if target % 4 != 0 {
            return self.enter_fault(Fault::PcMisaligned { target });
        }
        if let Some(rd) = link {
            self.registers.schedule_write(rd, self.pc.wrapping_add(4));
        }
        self.pc = target;
        State::FetchRequest
    }

    /// Decode the latched instruction and pick the next state. Unless
    /// the instruction redirects it, pc moves on by four here.
    fn dispatch(&mut self) -> State {
        let insn = self.instr;
        let Ok(instr) = decode(insn) else {
            return self.illegal();
        };
        log::trace!("0x{:08x}: 0x{insn:08x} {instr:?}", self.pc);

        let next_pc = self.pc.wrapping_add(4);
        let next = match instr {
            Instr::Load(i) => {
                let Some(width) = LoadWidth::from_funct3(i.funct3) else {
                    return self.illegal();
                };
                State::LoadWait(Load {
                    addr: self.x(i.rs1).wrapping_add(i.imm),
                    width,
                    rd: i.rd,
                })
            }
            Instr::MiscMem(i) => {
                if i.funct3 != FUNCT3_FENCE {
                    return self.illegal();
                }
                State::FetchRequest
            }
            Instr::OpImm(i) => {
                let Some(op) = AluOp::from_op_imm(i.funct3, i.imm11_5()) else {
                    return self.illegal();
                };
                State::AluImm {
                    op,
                    rd: i.rd,
                    rs1: i.rs1,
                    imm: i.imm,
                }
            }
            Instr::Op(r) => {
                let Some(op) = AluOp::from_op(r.funct3, r.funct7) else {
                    return self.illegal();
                };
                State::AluReg {
                    op,
                    rd: r.rd,
                    rs1: r.rs1,
                    rs2: r.rs2,
                }
            }
            Instr::Lui(u) => {
                self.registers.schedule_write(u.rd, u.imm << 12);
                State::FetchRequest
            }
            Instr::Auipc(u) => {
                self.registers
                    .schedule_write(u.rd, (u.imm << 12).wrapping_add(self.pc));
                State::FetchRequest
            }
            Instr::Store(s) => {
                let Some(width) = store_width(s.funct3) else {
                    return self.illegal();
                };
                State::StoreWait(WriteRequest {
                    addr: self.x(s.rs1).wrapping_add(s.imm),
                    width,
                    value: self.x(s.rs2),
                })
            }
            Instr::Branch(b) => {
                let Some(cond) = Condition::from_funct3(b.funct3) else {
                    return self.illegal();
                };
                // pc is needed to form the target, so it stays put
                return State::BranchResolve {
                    cond,
                    rs1: b.rs1,
                    rs2: b.rs2,
                    offset: b.imm,
                };
            }
            Instr::Jalr(i) => return State::JalrResolve(i),
            Instr::Jal(j) => return self.jump(self.pc.wrapping_add(j.imm), Some(j.rd)),
            Instr::System(i) => {
                if i.funct3 != FUNCT3_PRIV {
                    return self.illegal();
                }
                let marker = match i.raw_imm() {
                    IMM_ECALL => ECALL_SENTINEL,
                    IMM_EBREAK => EBREAK_SENTINEL,
                    _ => return self.illegal(),
                };
                self.registers.schedule_write(1, marker);
                State::FetchRequest
            }
        };
        self.pc = next_pc;
        next
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Value of register xn
    pub fn x(&self, n: u8) -> u32 {
        self.registers.read(n)
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Registers written since reset, in index order
    pub fn written(&self) -> Vec<u8> {
        self.registers.written()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn status(&self) -> Status {
        match self.fault {
            Some(fault) if self.state == State::Faulted => Status::Faulted(fault),
            _ => Status::Running,
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    pub fn fault_code(&self) -> FaultCode {
        self.fault.map_or(FaultCode::Unset, |fault| fault.code())
    }

    /// Instruction word latched by the fault, or zero
    pub fn fault_instruction(&self) -> u32 {
        self.fault.map_or(0, |fault| fault.instruction())
    }

    /// The most recently fetched instruction word
    pub fn instruction(&self) -> u32 {
        self.instr
    }

    /// Steps taken since reset (steps while faulted are not counted)
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Instructions completed since reset
    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn memory(&self) -> &Memory {
        self.mmu.memory()
    }

    pub fn mmu(&self) -> &Mmu<U> {
        &self.mmu
    }

    pub fn uart(&self) -> &U {
        self.mmu.uart()
    }

    pub fn uart_mut(&mut self) -> &mut U {
        self.mmu.uart_mut()
    }
}

impl<U: Uart> fmt::Display for Hart<U> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "pc: 0x{:08x} insn: 0x{:08x} state: {} ({}) cycles: {} retired: {}",
            self.pc, self.instr, self.state, self.mmu, self.cycles, self.retired
        )?;
        if let Some(fault) = self.fault {
            writeln!(f, "fault: {} ({fault})", fault.code())?;
        }
        write!(f, "{}", self.registers)
    }
}
