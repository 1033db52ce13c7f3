//! RV32I instruction encoder
//!
//! The inverse of the decoder: the functions here pack fields into
//! instruction words, and the per-mnemonic macros turn an
//! assembly-like line into a word. The macros take register names
//! (`x0`-`x31` or ABI names like `sp`, `a0`) and use `?` on name
//! lookup, so they can only be used inside functions returning
//! `Result<_, &'static str>`:
//!
//! ```
//! use sae::{addi, jalr};
//! fn program() -> Result<Vec<u32>, &'static str> {
//!     Ok(vec![addi!(a0, zero, 3), jalr!(zero, ra, 0)])
//! }
//! assert_eq!(program().unwrap(), vec![0x0030_0513, 0x0000_8067]);
//! ```

use crate::utils::{extract_field, interpret_i32_as_unsigned};

pub use crate::opcodes::*;

/// Make an I-type instruction. The immediate is truncated to its
/// low 12 bits.
pub fn itype(imm: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    extract_field(imm, 11, 0) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
}

/// Make an U- or J-type instruction (if you are making
/// a J-type instruction, make sure to construct the
/// immediate field correctly using jtype_imm_field)
pub fn ujtype(imm: u32, rd: u32, opcode: u32) -> u32 {
    extract_field(imm, 19, 0) << 12 | rd << 7 | opcode
}

/// Make an R-, S- or B-type instruction. These instructions
/// have the same number of fields of the same size. The meaning
/// of a and b is:
///
/// R-type: a = funct7, b = rd
/// S-type: a = imm[11:5], b = imm[4:0]
/// B-type: a = imm[12|10:5], b = imm[4:1|11]
pub fn rstype(a: u32, rs2: u32, rs1: u32, funct3: u32, b: u32, opcode: u32) -> u32 {
    a << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | b << 7 | opcode
}

/// Convert a RISC-V register name (e.g. x3 or sp) to the register
/// number (e.g. 3 or 2)
pub fn reg_num(reg_name: &str) -> Result<u32, &'static str> {
    const ABI_NAMES: [&str; 32] = [
        "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3",
        "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
        "t3", "t4", "t5", "t6",
    ];
    if reg_name == "fp" {
        return Ok(8);
    }
    if let Some(n) = ABI_NAMES.iter().position(|&name| name == reg_name) {
        return Ok(n as u32);
    }
    let digits = reg_name
        .strip_prefix('x')
        .ok_or("register name must begin with x or be an ABI name")?;
    if digits.is_empty() || digits.len() > 2 || (digits.len() == 2 && digits.starts_with('0')) {
        return Err("register number must be one or two digits");
    }
    let n = digits
        .parse::<u32>()
        .map_err(|_| "register number must be decimal")?;
    if n < 32 {
        Ok(n)
    } else {
        Err("register number must be less than 32")
    }
}

/// The shift-by-immediate instructions use I-type,
/// but with a special encoding of the immediate that
/// uses the lower 5 bits for the shift amount (shamt)
/// and the upper 7 bits to distinguish between arithmetical
/// and logical right shift
pub fn shifts_imm_field(shamt: u32, upper: u32) -> u32 {
    let shamt = extract_field(shamt, 4, 0);
    (upper << 5) | shamt
}

/// Takes an immediate and shuffles it into the
/// format required for the 20-bit field of the
/// U-type instruction (making it J-type)
pub fn jtype_imm_field(imm: i32) -> u32 {
    let imm = interpret_i32_as_unsigned(imm);
    let imm20 = extract_field(imm, 20, 20);
    let imm19_12 = extract_field(imm, 19, 12);
    let imm11 = extract_field(imm, 11, 11);
    let imm10_1 = extract_field(imm, 10, 1);
    (imm20 << 19) | (imm10_1 << 9) | (imm11 << 8) | imm19_12
}

/// Returns (a, b) suitable for use with rstype for
/// the conditional branch instructions (btype)
pub fn btype_imm_fields(imm: i32) -> (u32, u32) {
    let imm = interpret_i32_as_unsigned(imm);
    let imm12 = extract_field(imm, 12, 12);
    let imm11 = extract_field(imm, 11, 11);
    let imm10_5 = extract_field(imm, 10, 5);
    let imm4_1 = extract_field(imm, 4, 1);
    let a = (imm12 << 6) | imm10_5;
    let b = (imm4_1 << 1) | imm11;
    (a, b)
}

/// Returns (a, b) suitable for use with rstype for
/// the store instructions (stype)
pub fn stype_imm_fields(imm: i32) -> (u32, u32) {
    let imm = interpret_i32_as_unsigned(imm);
    (extract_field(imm, 11, 5), extract_field(imm, 4, 0))
}

/// I-type instruction from register names
pub fn itype_named(
    rd: &str,
    rs1: &str,
    imm: i32,
    funct3: u32,
    opcode: u32,
) -> Result<u32, &'static str> {
    Ok(itype(
        interpret_i32_as_unsigned(imm),
        reg_num(rs1)?,
        funct3,
        reg_num(rd)?,
        opcode,
    ))
}

/// Shift-by-immediate instruction from register names
pub fn shift_named(
    rd: &str,
    rs1: &str,
    shamt: u32,
    upper: u32,
    funct3: u32,
) -> Result<u32, &'static str> {
    if shamt > 31 {
        return Err("shift amount must be less than 32");
    }
    Ok(itype(
        shifts_imm_field(shamt, upper),
        reg_num(rs1)?,
        funct3,
        reg_num(rd)?,
        OP_IMM,
    ))
}

/// R-type instruction from register names
pub fn rtype_named(
    rd: &str,
    rs1: &str,
    rs2: &str,
    funct7: u32,
    funct3: u32,
) -> Result<u32, &'static str> {
    Ok(rstype(funct7, reg_num(rs2)?, reg_num(rs1)?, funct3, reg_num(rd)?, OP))
}

/// S-type instruction from register names
pub fn stype_named(rs2: &str, rs1: &str, imm: i32, funct3: u32) -> Result<u32, &'static str> {
    let (a, b) = stype_imm_fields(imm);
    Ok(rstype(a, reg_num(rs2)?, reg_num(rs1)?, funct3, b, OP_STORE))
}

/// B-type instruction from register names
pub fn btype_named(rs1: &str, rs2: &str, imm: i32, funct3: u32) -> Result<u32, &'static str> {
    let (a, b) = btype_imm_fields(imm);
    Ok(rstype(a, reg_num(rs2)?, reg_num(rs1)?, funct3, b, OP_BRANCH))
}

/// U-type instruction from a register name. The immediate is
/// already the upper 20 bits that will be loaded; it is not shifted.
pub fn utype_named(rd: &str, imm: i32, opcode: u32) -> Result<u32, &'static str> {
    Ok(ujtype(interpret_i32_as_unsigned(imm), reg_num(rd)?, opcode))
}

/// J-type instruction from a register name
pub fn jtype_named(rd: &str, imm: i32) -> Result<u32, &'static str> {
    Ok(ujtype(jtype_imm_field(imm), reg_num(rd)?, OP_JAL))
}

// === RV32I ===
// (Instruction listing is in chapter 19 of RISC-V specification)

#[macro_export]
macro_rules! lui {
    ($rd:tt, $imm:expr) => {
        $crate::encode::utype_named(stringify!($rd), $imm, $crate::opcodes::OP_LUI)?
    };
}

#[macro_export]
macro_rules! auipc {
    ($rd:tt, $imm:expr) => {
        $crate::encode::utype_named(stringify!($rd), $imm, $crate::opcodes::OP_AUIPC)?
    };
}

#[macro_export]
macro_rules! jal {
    ($rd:tt, $imm:expr) => {
        $crate::encode::jtype_named(stringify!($rd), $imm)?
    };
}

#[macro_export]
macro_rules! jalr {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, 0, $crate::opcodes::OP_JALR)?
    };
}

// Conditional branches

#[macro_export]
macro_rules! beq {
    ($rs1:tt, $rs2:tt, $imm:expr) => {
        $crate::encode::btype_named(stringify!($rs1), stringify!($rs2), $imm, $crate::opcodes::FUNCT3_BEQ)?
    };
}

#[macro_export]
macro_rules! bne {
    ($rs1:tt, $rs2:tt, $imm:expr) => {
        $crate::encode::btype_named(stringify!($rs1), stringify!($rs2), $imm, $crate::opcodes::FUNCT3_BNE)?
    };
}

#[macro_export]
macro_rules! blt {
    ($rs1:tt, $rs2:tt, $imm:expr) => {
        $crate::encode::btype_named(stringify!($rs1), stringify!($rs2), $imm, $crate::opcodes::FUNCT3_BLT)?
    };
}

#[macro_export]
macro_rules! bge {
    ($rs1:tt, $rs2:tt, $imm:expr) => {
        $crate::encode::btype_named(stringify!($rs1), stringify!($rs2), $imm, $crate::opcodes::FUNCT3_BGE)?
    };
}

#[macro_export]
macro_rules! bltu {
    ($rs1:tt, $rs2:tt, $imm:expr) => {
        $crate::encode::btype_named(stringify!($rs1), stringify!($rs2), $imm, $crate::opcodes::FUNCT3_BLTU)?
    };
}

#[macro_export]
macro_rules! bgeu {
    ($rs1:tt, $rs2:tt, $imm:expr) => {
        $crate::encode::btype_named(stringify!($rs1), stringify!($rs2), $imm, $crate::opcodes::FUNCT3_BGEU)?
    };
}

// Loads

#[macro_export]
macro_rules! lb {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_B, $crate::opcodes::OP_LOAD)?
    };
}

#[macro_export]
macro_rules! lh {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_H, $crate::opcodes::OP_LOAD)?
    };
}

#[macro_export]
macro_rules! lw {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_W, $crate::opcodes::OP_LOAD)?
    };
}

#[macro_export]
macro_rules! lbu {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_BU, $crate::opcodes::OP_LOAD)?
    };
}

#[macro_export]
macro_rules! lhu {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_HU, $crate::opcodes::OP_LOAD)?
    };
}

// Stores

#[macro_export]
macro_rules! sb {
    ($rs2:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::stype_named(stringify!($rs2), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_B)?
    };
}

#[macro_export]
macro_rules! sh {
    ($rs2:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::stype_named(stringify!($rs2), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_H)?
    };
}

#[macro_export]
macro_rules! sw {
    ($rs2:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::stype_named(stringify!($rs2), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_W)?
    };
}

// Integer register-immediate instructions

#[macro_export]
macro_rules! addi {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_ADDI, $crate::opcodes::OP_IMM)?
    };
}

#[macro_export]
macro_rules! slti {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_SLTI, $crate::opcodes::OP_IMM)?
    };
}

#[macro_export]
macro_rules! sltiu {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_SLTIU, $crate::opcodes::OP_IMM)?
    };
}

#[macro_export]
macro_rules! xori {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_XORI, $crate::opcodes::OP_IMM)?
    };
}

#[macro_export]
macro_rules! ori {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_ORI, $crate::opcodes::OP_IMM)?
    };
}

#[macro_export]
macro_rules! andi {
    ($rd:tt, $rs1:tt, $imm:expr) => {
        $crate::encode::itype_named(stringify!($rd), stringify!($rs1), $imm, $crate::opcodes::FUNCT3_ANDI, $crate::opcodes::OP_IMM)?
    };
}

// Shift-by-immediate instructions

#[macro_export]
macro_rules! slli {
    ($rd:tt, $rs1:tt, $shamt:expr) => {
        $crate::encode::shift_named(stringify!($rd), stringify!($rs1), $shamt, 0, $crate::opcodes::FUNCT3_SLLI)?
    };
}

#[macro_export]
macro_rules! srli {
    ($rd:tt, $rs1:tt, $shamt:expr) => {
        $crate::encode::shift_named(stringify!($rd), stringify!($rs1), $shamt, 0, $crate::opcodes::FUNCT3_SRLI)?
    };
}

#[macro_export]
macro_rules! srai {
    ($rd:tt, $rs1:tt, $shamt:expr) => {
        $crate::encode::shift_named(stringify!($rd), stringify!($rs1), $shamt, $crate::opcodes::FUNCT7_SRA, $crate::opcodes::FUNCT3_SRAI)?
    };
}

// Integer register-register instructions

#[macro_export]
macro_rules! add {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_ADD)?
    };
}

#[macro_export]
macro_rules! sub {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), $crate::opcodes::FUNCT7_SUB, $crate::opcodes::FUNCT3_SUB)?
    };
}

#[macro_export]
macro_rules! sll {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_SLL)?
    };
}

#[macro_export]
macro_rules! slt {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_SLT)?
    };
}

#[macro_export]
macro_rules! sltu {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_SLTU)?
    };
}

#[macro_export]
macro_rules! xor {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_XOR)?
    };
}

#[macro_export]
macro_rules! srl {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_SRL)?
    };
}

#[macro_export]
macro_rules! sra {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), $crate::opcodes::FUNCT7_SRA, $crate::opcodes::FUNCT3_SRA)?
    };
}

#[macro_export]
macro_rules! or {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_OR)?
    };
}

#[macro_export]
macro_rules! and {
    ($rd:tt, $rs1:tt, $rs2:tt) => {
        $crate::encode::rtype_named(stringify!($rd), stringify!($rs1), stringify!($rs2), 0, $crate::opcodes::FUNCT3_AND)?
    };
}

// Fences and system instructions

/// `fence iorw, iorw`
#[macro_export]
macro_rules! fence {
    () => {
        $crate::encode::itype(0x0ff, 0, $crate::opcodes::FUNCT3_FENCE, 0, $crate::opcodes::OP_MISC_MEM)
    };
}

#[macro_export]
macro_rules! ecall {
    () => {
        $crate::encode::itype($crate::opcodes::IMM_ECALL, 0, $crate::opcodes::FUNCT3_PRIV, 0, $crate::opcodes::OP_SYSTEM)
    };
}

#[macro_export]
macro_rules! ebreak {
    () => {
        $crate::encode::itype($crate::opcodes::IMM_EBREAK, 0, $crate::opcodes::FUNCT3_PRIV, 0, $crate::opcodes::OP_SYSTEM)
    };
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::decode::{decode, Instr};

    #[test]
    fn check_register_names() {
        assert_eq!(reg_num("x0"), Ok(0));
        assert_eq!(reg_num("x31"), Ok(31));
        assert_eq!(reg_num("zero"), Ok(0));
        assert_eq!(reg_num("ra"), Ok(1));
        assert_eq!(reg_num("sp"), Ok(2));
        assert_eq!(reg_num("fp"), Ok(8));
        assert_eq!(reg_num("s0"), Ok(8));
        assert_eq!(reg_num("a0"), Ok(10));
        assert_eq!(reg_num("t6"), Ok(31));
        assert!(reg_num("x32").is_err());
        assert!(reg_num("x01").is_err());
        assert!(reg_num("y1").is_err());
        assert!(reg_num("x").is_err());
    }

    #[test]
    fn check_known_encodings() -> Result<(), &'static str> {
        assert_eq!(add!(a0, a1, a2), 0x00c5_8533);
        assert_eq!(sra!(x1, x0, x0), 0x4000_50b3);
        assert_eq!(srai!(a0, a1, 0b01010), 0x40a5_d513);
        assert_eq!(jalr!(zero, ra, 0), 0x0000_8067);
        assert_eq!(lb!(a0, x0, 0), 0x0000_0503);
        assert_eq!(ebreak!(), 0x0010_0073);
        assert_eq!(ecall!(), 0x0000_0073);
        assert_eq!(sb!(a1, a0, 4), 0x00b5_0223);
        assert_eq!(jal!(a1, 0x0012_3456), 0xc562_35ef);
        assert_eq!(jal!(zero, 0x0012_3456), 0xc562_306f);
        assert_eq!(addi!(a1, zero, 0x123), 0x1230_0593);
        assert_eq!(lui!(a1, 1), 0x0000_15b7);
        Ok(())
    }

    #[test]
    fn check_negative_immediates() -> Result<(), &'static str> {
        assert_eq!(addi!(x1, x2, -23), 0xfe91_0093);
        assert_eq!(sw!(x2, x1, -4), 0xfe20_ae23);
        assert_eq!(beq!(x7, x23, -8), 0xff73_8ce3);
        Ok(())
    }

    #[test]
    fn check_branch_offset_survives_decode() -> Result<(), &'static str> {
        for offset in [-4096, -8, 4, 2044, 4094] {
            let Ok(Instr::Branch(b)) = decode(bne!(x1, x2, offset)) else {
                return Err("expected a branch");
            };
            assert_eq!(b.imm, offset as u32);
        }
        Ok(())
    }

    #[test]
    fn check_jump_offset_survives_decode() -> Result<(), &'static str> {
        for offset in [-1048576, -4, 8, 0x7fffe] {
            let Ok(Instr::Jal(j)) = decode(jal!(ra, offset)) else {
                return Err("expected a jal");
            };
            assert_eq!(j.imm, offset as u32);
            assert_eq!(j.rd, 1);
        }
        Ok(())
    }

    #[test]
    fn check_shift_amount_range() {
        assert!(shift_named("x1", "x1", 32, 0, FUNCT3_SLLI).is_err());
    }
}
