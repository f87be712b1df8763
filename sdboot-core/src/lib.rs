//! Board-agnostic update engine for the sdboot bootloader
//!
//! This crate contains all bootloader logic that does not depend on a
//! specific chip:
//!
//! - Row geometry and image planning
//! - NVM programmer (erase/verify/program sequencing)
//! - Integrity verifier (streaming CRC32 with source-kind sequencing)
//! - Slot selection from flag files
//! - Update orchestrator
//! - Boot sequence and launch policy
//! - Configuration types

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod config;
pub mod geometry;
pub mod programmer;
pub mod slot;
pub mod update;
pub mod verify;

#[cfg(test)]
mod testing;

pub use boot::{BootDecision, BootError, BootReport, Bootloader, VectorTable};
pub use config::{BootConfig, ConfigError, LaunchPolicy, SlotConfig};
pub use geometry::{ImagePlan, RowGeometry};
pub use programmer::{EraseCheckError, NvmProgrammer, ProgramError};
pub use slot::{select_pending_slot, Slot};
pub use update::{run_update_if_pending, UpdateError, UpdateOutcome, UpdateReport};
pub use verify::{Crc32, ImageVerifier, SoftwareCrc};

#[cfg(feature = "defmt")]
pub(crate) use defmt as log;

#[cfg(not(feature = "defmt"))]
pub(crate) mod log {
    macro_rules! trace {
        ( $( $x:expr ),* $(,)? ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use trace;
    macro_rules! debug {
        ( $( $x:expr ),* $(,)? ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use debug;
    macro_rules! info {
        ( $( $x:expr ),* $(,)? ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use info;
    macro_rules! warner {
        ( $( $x:expr ),* $(,)? ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use warner as warn;
    macro_rules! error {
        ( $( $x:expr ),* $(,)? ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use error;
}
