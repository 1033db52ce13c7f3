#![forbid(unsafe_code)]

//! Cycle-stepped RV32I hart over a 16-bit granule memory
//!
//! The [Hart] executes one clock step per call to [Hart::step],
//! talking to memory through an MMU that splits byte, halfword and
//! word accesses at any alignment into accesses on 16-bit cells.
//! Bit 16 of an address selects the peripheral region, holding a
//! single byte-wide UART at 0x1_0000.
//!
//! ```
//! use sae::{BootImage, Fault, Hart, HartConfig};
//! use sae::{addi, jalr};
//!
//! fn main() -> Result<(), &'static str> {
//!     let program = [addi!(a0, zero, 42), jalr!(zero, ra, 0)];
//!     let image = BootImage::from_words(&program);
//!     let mut hart = Hart::new(&HartConfig::default(), &image).unwrap();
//!
//!     // Returning from the entry point jumps to the default x1 and faults
//!     let fault = hart.run(1000).unwrap();
//!     assert_eq!(fault, Fault::PcMisaligned { target: 0xffff_fffe });
//!     assert_eq!(hart.x(10), 42);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decode;
#[macro_use]
pub mod encode;
pub mod hart;
pub mod image;
pub mod opcodes;
pub mod uart;
pub mod utils;

pub use config::{ConfigError, HartConfig};
pub use hart::{Fault, FaultCode, Hart, HartError, RunError, State, Status};
pub use image::{BootImage, ImageError};
pub use uart::{BufferedUart, ChannelUart, Uart};
