//! Integer ALU and branch comparator
//!
//! Decoding picks the operation from funct3/funct7 (or funct3 and
//! imm[11:5] for OP-IMM), rejecting combinations RV32I does not
//! define. Execution is then a pure function of the operation and
//! its two operands.

use std::fmt;

use crate::opcodes::*;
use crate::utils::interpret_u32_as_signed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

impl AluOp {
    /// Operation for an OP-IMM instruction. The shift-by-immediate
    /// instructions carry a funct7 in imm[11:5]; only SRAI may set a
    /// bit there.
    pub fn from_op_imm(funct3: u32, imm11_5: u32) -> Option<Self> {
        let op = match funct3 {
            FUNCT3_ADDI => AluOp::Add,
            FUNCT3_SLTI => AluOp::Slt,
            FUNCT3_SLTIU => AluOp::Sltu,
            FUNCT3_XORI => AluOp::Xor,
            FUNCT3_ORI => AluOp::Or,
            FUNCT3_ANDI => AluOp::And,
            FUNCT3_SLLI if imm11_5 == 0 => AluOp::Sll,
            FUNCT3_SRLI if imm11_5 == 0 => AluOp::Srl,
            FUNCT3_SRAI if imm11_5 == FUNCT7_SRA => AluOp::Sra,
            _ => return None,
        };
        Some(op)
    }

    /// Operation for an OP instruction
    pub fn from_op(funct3: u32, funct7: u32) -> Option<Self> {
        let op = match (funct7, funct3) {
            (0, FUNCT3_ADD) => AluOp::Add,
            (FUNCT7_SUB, FUNCT3_SUB) => AluOp::Sub,
            (0, FUNCT3_SLL) => AluOp::Sll,
            (0, FUNCT3_SLT) => AluOp::Slt,
            (0, FUNCT3_SLTU) => AluOp::Sltu,
            (0, FUNCT3_XOR) => AluOp::Xor,
            (0, FUNCT3_SRL) => AluOp::Srl,
            (FUNCT7_SRA, FUNCT3_SRA) => AluOp::Sra,
            (0, FUNCT3_OR) => AluOp::Or,
            (0, FUNCT3_AND) => AluOp::And,
            _ => return None,
        };
        Some(op)
    }

    /// Compute the result. Shifts use the low five bits of b;
    /// arithmetic wraps modulo 2^32.
    pub fn execute(&self, a: u32, b: u32) -> u32 {
        let shamt = b & 0x1f;
        match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::Sll => a << shamt,
            AluOp::Slt => u32::from(interpret_u32_as_signed(a) < interpret_u32_as_signed(b)),
            AluOp::Sltu => u32::from(a < b),
            AluOp::Xor => a ^ b,
            AluOp::Srl => a >> shamt,
            AluOp::Sra => (interpret_u32_as_signed(a) >> shamt) as u32,
            AluOp::Or => a | b,
            AluOp::And => a & b,
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Sll => "sll",
            AluOp::Slt => "slt",
            AluOp::Sltu => "sltu",
            AluOp::Xor => "xor",
            AluOp::Srl => "srl",
            AluOp::Sra => "sra",
            AluOp::Or => "or",
            AluOp::And => "and",
        };
        write!(f, "{name}")
    }
}

/// Conditional branch comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

impl Condition {
    pub fn from_funct3(funct3: u32) -> Option<Self> {
        let cond = match funct3 {
            FUNCT3_BEQ => Condition::Eq,
            FUNCT3_BNE => Condition::Ne,
            FUNCT3_BLT => Condition::Lt,
            FUNCT3_BGE => Condition::Ge,
            FUNCT3_BLTU => Condition::Ltu,
            FUNCT3_BGEU => Condition::Geu,
            _ => return None,
        };
        Some(cond)
    }

    /// Whether the branch is taken for operands a (rs1) and b (rs2)
    pub fn holds(&self, a: u32, b: u32) -> bool {
        let (sa, sb) = (interpret_u32_as_signed(a), interpret_u32_as_signed(b));
        match self {
            Condition::Eq => a == b,
            Condition::Ne => a != b,
            Condition::Lt => sa < sb,
            Condition::Ge => sa >= sb,
            Condition::Ltu => a < b,
            Condition::Geu => a >= b,
        }
    }
}
