//! SAMD21-specific HAL for the sdboot bootloader
//!
//! Implements the `sdboot-hal` traits on ATSAMD21 parts:
//!
//! - [`nvm::Samd21Nvm`] - NVMCTRL row erase / manual page write
//! - [`crc::DsuCrc`] - DSU CRC32 engine with the RAM-source erratum workaround
//! - [`storage::SdStorage`] - Flag files and images on a FAT formatted SD card
//! - [`launch::CortexMLauncher`] - Hand-off through the application vector table
//! - [`system::Samd21System`] - Busy-wait delays, reset, peripheral teardown
//!
//! # Features
//!
//! - `defmt` - Enable debug formatting support

#![no_std]

pub mod crc;
pub mod launch;
pub mod nvm;
pub mod storage;
pub mod system;

pub use crc::DsuCrc;
pub use launch::CortexMLauncher;
pub use nvm::Samd21Nvm;
pub use storage::{FixedTime, SdImage, SdStorage};
pub use system::{reset_sercom, CycleDelay, Samd21System};

// Re-export the PAC so the firmware names the same peripheral types
pub use atsamd_hal::pac;
