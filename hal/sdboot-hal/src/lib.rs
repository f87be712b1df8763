//! sdboot Hardware Abstraction Layer
//!
//! This crate defines the collaborator traits the update engine drives.
//! Chip-specific crates (SAMD21, host simulators) implement them so the
//! same update logic runs on the target and in host tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  sdboot-firmware (board bring-up)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  sdboot-core (update engine, boot)      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  sdboot-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  sdboot-hal-samd21                      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`nvm::NvmController`] - Row erase / page write on program memory
//! - [`crc::CrcEngine`] - CRC32 primitive with source-kind sequencing
//! - [`storage::SlotStorage`], [`storage::ImageStream`] - Flag files and images
//! - [`system::System`] - Delays, reset, peripheral teardown
//! - [`launch::AppLauncher`] - Non-returning hand-off to the application

#![no_std]
#![deny(unsafe_code)]

pub mod crc;
pub mod launch;
pub mod nvm;
pub mod storage;
pub mod system;

// Re-export key traits at crate root for convenience
pub use crc::{CrcEngine, CrcError, CrcSource, SourceKind};
pub use launch::AppLauncher;
pub use nvm::{NvmController, NvmError, NvmParameters, ERASED_BYTE};
pub use storage::{ImageStream, SlotStorage, StorageError};
pub use system::System;
