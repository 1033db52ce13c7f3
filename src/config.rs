//! Hart construction parameters
//!
//! A [HartConfig] is built with chained setters and checked with
//! [HartConfig::validate] before a hart is made from it:
//!
//! ```
//! use sae::config::HartConfig;
//! let config = HartConfig::default().memory_bytes(4096).reg(10, 7);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.register_values()[2], 4096);
//! ```

use thiserror::Error;

use crate::encode::reg_num;

/// Largest backing memory. Byte addresses at and above this select
/// the peripheral region.
pub const MAX_MEMORY_BYTES: usize = 0x1_0000;

pub const DEFAULT_MEMORY_BYTES: usize = 8192;

/// Initial return address. Not a multiple of four, so a program whose
/// entry function returns with `ret` ends in PC_MISALIGNED.
pub const DEFAULT_RETURN_ADDRESS: u32 = 0xffff_ffff;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("memory size must not be zero")]
    EmptyMemory,
    #[error("memory size {0} is not a whole number of 16-bit cells")]
    OddMemory(usize),
    #[error("memory size {0} exceeds the 64 KiB limit")]
    MemoryTooLarge(usize),
    #[error("register index {0} exceeds 31")]
    InvalidRegister(u8),
    #[error("register initialiser '{0}' should look like xN=VALUE")]
    InvalidRegInit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HartConfig {
    memory_bytes: usize,
    reg_inits: Vec<(u8, u32)>,
}

impl Default for HartConfig {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_BYTES,
            reg_inits: Vec::new(),
        }
    }
}

impl HartConfig {
    /// Size of the backing memory in bytes
    pub fn memory_bytes(mut self, memory_bytes: usize) -> Self {
        self.memory_bytes = memory_bytes;
        self
    }

    /// Set the reset value of register x{index}. Later calls for the
    /// same register win. Setting x0 has no effect.
    pub fn reg(mut self, index: u8, value: u32) -> Self {
        self.reg_inits.push((index, value));
        self
    }

    pub fn memory_size(&self) -> usize {
        self.memory_bytes
    }

    /// Number of 16-bit cells in the backing memory
    pub fn memory_cells(&self) -> usize {
        self.memory_bytes / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_bytes == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        if self.memory_bytes % 2 != 0 {
            return Err(ConfigError::OddMemory(self.memory_bytes));
        }
        if self.memory_bytes > MAX_MEMORY_BYTES {
            return Err(ConfigError::MemoryTooLarge(self.memory_bytes));
        }
        if let Some(&(index, _)) = self.reg_inits.iter().find(|(index, _)| *index > 31) {
            return Err(ConfigError::InvalidRegister(index));
        }
        Ok(())
    }

    /// The value every register takes at construction. By default
    /// ra (x1) holds an invalid return address and sp (x2) points at
    /// the top of memory; everything else is zero.
    pub fn register_values(&self) -> [u32; 32] {
        let mut values = [0; 32];
        values[1] = DEFAULT_RETURN_ADDRESS;
        values[2] = self.memory_bytes as u32;
        for &(index, value) in &self.reg_inits {
            if (1..32).contains(&index) {
                values[index as usize] = value;
            }
        }
        values
    }
}

/// Parse a register initialiser of the form `xN=VALUE` or
/// `abi=VALUE` (e.g. `a0=0x10`). The value may be decimal or `0x`
/// hexadecimal.
pub fn parse_reg_init(text: &str) -> Result<(u8, u32), ConfigError> {
    let invalid = || ConfigError::InvalidRegInit(text.to_string());
    let (name, value) = text.split_once('=').ok_or_else(invalid)?;
    let index = reg_num(name.trim()).map_err(|_| invalid())?;
    let value = value.trim();
    let value = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse::<u32>(),
    }
    .map_err(|_| invalid())?;
    Ok((index as u8, value))
}
