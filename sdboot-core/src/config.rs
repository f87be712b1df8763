//! Boot configuration
//!
//! Board-agnostic settings for the update engine and boot sequence. The
//! firmware builds a [`BootConfig`] from values compiled in from `boot.toml`;
//! [`BootConfig::default`] carries the reference layout.

use sdboot_hal::NvmParameters;

use crate::geometry::RowGeometry;
use crate::slot::Slot;

/// Start of the application region
pub const DEFAULT_APP_BASE: u32 = 0x0001_2000;

/// Pages per erasable row
pub const DEFAULT_PAGES_PER_ROW: u32 = 4;

/// Capacity of the row buffer
pub const MAX_ROW_SIZE: usize = 4096;

/// Upper bound on pages per row (one bit per page in the write mask)
pub const MAX_PAGES_PER_ROW: u32 = 32;

/// Delay before restarting after a storage mount failure
pub const MOUNT_RETRY_DELAY_MS: u32 = 5000;

/// Delay before the hand-off so pending log output drains
pub const EXIT_DELAY_MS: u32 = 100;

/// Flag/image file pair of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotConfig {
    /// Marker file whose presence means "update pending"
    pub flag: &'static str,
    /// Image file programmed when the flag is present
    pub image: &'static str,
}

/// What to do with the application after an update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LaunchPolicy {
    /// Launch the application whatever the update outcome
    #[default]
    Always,
    /// Halt instead of launching when a failed update touched NVM
    RequireVerified,
}

/// Configuration validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Controller reported a zero page size
    ZeroPageSize,
    /// Pages per row is zero or above [`MAX_PAGES_PER_ROW`]
    PagesPerRow,
    /// Row does not fit the row buffer
    RowTooLarge,
    /// Application base is not on a row boundary
    BaseNotAligned,
    /// Application base lies outside program memory
    BaseOutOfRange,
}

/// Bootloader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    /// Address of the application vector table
    pub app_base: u32,
    /// Pages per erasable row
    pub pages_per_row: u32,
    /// Slot "A" (takes priority)
    pub slot_a: SlotConfig,
    /// Slot "B"
    pub slot_b: SlotConfig,
    /// Delay before restarting after a mount failure (ms)
    pub mount_retry_delay_ms: u32,
    /// Delay before jumping to the application (ms)
    pub exit_delay_ms: u32,
    /// Launch decision after an update attempt
    pub launch_policy: LaunchPolicy,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            app_base: DEFAULT_APP_BASE,
            pages_per_row: DEFAULT_PAGES_PER_ROW,
            slot_a: SlotConfig {
                flag: "FlagA.txt",
                image: "TestA.bin",
            },
            slot_b: SlotConfig {
                flag: "FlagB.txt",
                image: "TestB.bin",
            },
            mount_retry_delay_ms: MOUNT_RETRY_DELAY_MS,
            exit_delay_ms: EXIT_DELAY_MS,
            launch_policy: LaunchPolicy::Always,
        }
    }
}

impl BootConfig {
    /// Files belonging to `slot`
    pub fn slot(&self, slot: Slot) -> &SlotConfig {
        match slot {
            Slot::A => &self.slot_a,
            Slot::B => &self.slot_b,
        }
    }

    /// Validate against the controller parameters and derive the row geometry
    pub fn geometry(&self, params: NvmParameters) -> Result<RowGeometry, ConfigError> {
        if params.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.pages_per_row == 0 || self.pages_per_row > MAX_PAGES_PER_ROW {
            return Err(ConfigError::PagesPerRow);
        }

        let row_size = params.page_size as u64 * self.pages_per_row as u64;
        if row_size > MAX_ROW_SIZE as u64 {
            return Err(ConfigError::RowTooLarge);
        }

        let geometry = RowGeometry::new(params.page_size, self.pages_per_row);
        if !geometry.is_row_aligned(self.app_base) {
            return Err(ConfigError::BaseNotAligned);
        }
        if self.app_base >= params.flash_size() {
            return Err(ConfigError::BaseOutOfRange);
        }

        Ok(geometry)
    }
}
