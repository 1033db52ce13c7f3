//! RV32I instruction decoder
//!
//! Decoding is a pure function of the instruction word. The opcode
//! (bits 6:0) picks one of the six base layouts (R, I, S, B, U, J),
//! and the layout's fields are pulled out of fixed bit ranges. Split
//! immediates are reassembled low bits first, then sign-extended, so
//! the immediates held in the layout structs are ready to add to a
//! register or the pc.
//!
//! Nothing here checks funct3/funct7; that is left to the hart, which
//! knows which combinations it implements.

use thiserror::Error;

use crate::opcodes::*;
use crate::utils::{extract_field, sign_extend};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("got invalid or unimplemented opcode 0x{0:x}")]
    InvalidOpcode(u32),
}

/// The six base instruction layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rtype {
    pub rd: u8,
    pub funct3: u32,
    pub rs1: u8,
    pub rs2: u8,
    pub funct7: u32,
}

/// I-type layout. The immediate is sign-extended from bit 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Itype {
    pub rd: u8,
    pub funct3: u32,
    pub rs1: u8,
    pub imm: u32,
}

impl Itype {
    /// The 12-bit immediate as encoded, without sign extension
    pub fn raw_imm(&self) -> u32 {
        extract_field(self.imm, 11, 0)
    }

    /// For the shift-by-immediate instructions, the shift amount
    /// lives in imm[4:0]
    pub fn shamt(&self) -> u32 {
        extract_field(self.imm, 4, 0)
    }

    /// For the shift-by-immediate instructions, imm[11:5] plays the
    /// part of funct7
    pub fn imm11_5(&self) -> u32 {
        extract_field(self.imm, 11, 5)
    }
}

/// S- and B-type layouts share their register and funct3 fields; only
/// the immediate shuffle differs. The immediate is sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SBtype {
    pub funct3: u32,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: u32,
}

/// U- and J-type layouts. For U-type the immediate is the raw 20-bit
/// field (not shifted); for J-type it is the sign-extended byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UJtype {
    pub rd: u8,
    pub imm: u32,
}

/// A decoded instruction, grouped by major opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Load(Itype),
    MiscMem(Itype),
    OpImm(Itype),
    Auipc(UJtype),
    Store(SBtype),
    Op(Rtype),
    Lui(UJtype),
    Branch(SBtype),
    Jalr(Itype),
    Jal(UJtype),
    System(Itype),
}

impl Instr {
    pub fn format(&self) -> Format {
        match self {
            Instr::Op(_) => Format::R,
            Instr::Load(_)
            | Instr::MiscMem(_)
            | Instr::OpImm(_)
            | Instr::Jalr(_)
            | Instr::System(_) => Format::I,
            Instr::Store(_) => Format::S,
            Instr::Branch(_) => Format::B,
            Instr::Auipc(_) | Instr::Lui(_) => Format::U,
            Instr::Jal(_) => Format::J,
        }
    }
}

/// Look up the layout used by an opcode
pub fn format_of(opcode: u32) -> Option<Format> {
    match opcode {
        OP => Some(Format::R),
        OP_LOAD | OP_MISC_MEM | OP_IMM | OP_JALR | OP_SYSTEM => Some(Format::I),
        OP_STORE => Some(Format::S),
        OP_BRANCH => Some(Format::B),
        OP_AUIPC | OP_LUI => Some(Format::U),
        OP_JAL => Some(Format::J),
        _ => None,
    }
}

/// Decode an instruction word
pub fn decode(instr: u32) -> Result<Instr, DecodeError> {
    let opcode = opcode(instr);
    let decoded = match opcode {
        OP_LOAD => Instr::Load(decode_itype(instr)),
        OP_MISC_MEM => Instr::MiscMem(decode_itype(instr)),
        OP_IMM => Instr::OpImm(decode_itype(instr)),
        OP_AUIPC => Instr::Auipc(decode_utype(instr)),
        OP_STORE => Instr::Store(decode_stype(instr)),
        OP => Instr::Op(decode_rtype(instr)),
        OP_LUI => Instr::Lui(decode_utype(instr)),
        OP_BRANCH => Instr::Branch(decode_btype(instr)),
        OP_JALR => Instr::Jalr(decode_itype(instr)),
        OP_JAL => Instr::Jal(decode_jtype(instr)),
        OP_SYSTEM => Instr::System(decode_itype(instr)),
        _ => return Err(DecodeError::InvalidOpcode(opcode)),
    };
    Ok(decoded)
}

pub fn decode_rtype(instr: u32) -> Rtype {
    Rtype {
        rd: rd(instr),
        funct3: funct3(instr),
        rs1: rs1(instr),
        rs2: rs2(instr),
        funct7: funct7(instr),
    }
}

pub fn decode_itype(instr: u32) -> Itype {
    Itype {
        rd: rd(instr),
        funct3: funct3(instr),
        rs1: rs1(instr),
        imm: sign_extend(imm_itype(instr), 11),
    }
}

pub fn decode_stype(instr: u32) -> SBtype {
    SBtype {
        funct3: funct3(instr),
        rs1: rs1(instr),
        rs2: rs2(instr),
        imm: sign_extend(imm_stype(instr), 11),
    }
}

pub fn decode_btype(instr: u32) -> SBtype {
    SBtype {
        funct3: funct3(instr),
        rs1: rs1(instr),
        rs2: rs2(instr),
        imm: sign_extend(imm_btype(instr), 12),
    }
}

pub fn decode_utype(instr: u32) -> UJtype {
    UJtype {
        rd: rd(instr),
        imm: imm_utype(instr),
    }
}

pub fn decode_jtype(instr: u32) -> UJtype {
    UJtype {
        rd: rd(instr),
        imm: sign_extend(imm_jtype(instr), 20),
    }
}

/// Makes a function called field_name which gets that field from a
/// 32-bit instruction. Specify the output type using field_type
/// (generally picked to be the smallest type which will fit the
/// field). The function will extract instr[end:start] (verilog
/// notation).
macro_rules! make_field_getter {
    ($field_name:ident, $field_type:ty, $end:expr, $start:expr) => {
        /// Get the field from the instruction (bits instr[end:start]
        /// in verilog notation).
        pub fn $field_name(instr: u32) -> $field_type {
            extract_field(instr, $end, $start) as $field_type
        }
    };
}

make_field_getter!(opcode, u32, 6, 0);
make_field_getter!(rd, u8, 11, 7);
make_field_getter!(funct3, u32, 14, 12);
make_field_getter!(rs1, u8, 19, 15);
make_field_getter!(rs2, u8, 24, 20);
make_field_getter!(funct7, u32, 31, 25);
make_field_getter!(imm_utype, u32, 31, 12);
make_field_getter!(imm_itype, u32, 31, 20);

/// Get the immediate field in an S-type instruction
fn imm_stype(instr: u32) -> u32 {
    let imm11_5 = extract_field(instr, 31, 25);
    let imm4_0 = extract_field(instr, 11, 7);
    (imm11_5 << 5) | imm4_0
}

/// Get the immediate field in a B-type instruction
fn imm_btype(instr: u32) -> u32 {
    let imm12 = extract_field(instr, 31, 31);
    let imm11 = extract_field(instr, 7, 7);
    let imm10_5 = extract_field(instr, 30, 25);
    let imm4_1 = extract_field(instr, 11, 8);
    (imm12 << 12) | (imm11 << 11) | (imm10_5 << 5) | (imm4_1 << 1)
}

/// Get the jal instruction offset field from an instruction
fn imm_jtype(instr: u32) -> u32 {
    let imm20 = extract_field(instr, 31, 31);
    let imm19_12 = extract_field(instr, 19, 12);
    let imm11 = extract_field(instr, 20, 20);
    let imm10_1 = extract_field(instr, 30, 21);
    (imm20 << 20) | (imm19_12 << 12) | (imm11 << 11) | (imm10_1 << 1)
}
