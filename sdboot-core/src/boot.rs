//! Boot sequence
//!
//! Mount storage, run a pending update, then hand off to the application.
//! There is no path that stays in the bootloader except a restart after a
//! mount failure, or a halt when [`LaunchPolicy::RequireVerified`] rejects
//! a failed update.

use sdboot_hal::{
    AppLauncher, CrcEngine, NvmController, NvmError, SlotStorage, StorageError, System,
};

use crate::config::{BootConfig, LaunchPolicy};
use crate::log;
use crate::update::{run_update_if_pending, UpdateOutcome};

/// Fatal boot errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// Storage could not be mounted; the system restarts
    Mount(StorageError),
}

/// Final decision of the boot sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    /// Jump to the application
    Launch,
    /// Park the CPU
    Halt,
}

/// First two words of the application image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VectorTable {
    pub initial_sp: u32,
    pub reset_vector: u32,
}

impl VectorTable {
    /// Read the table at `base`
    pub fn read<N: NvmController + ?Sized>(nvm: &N, base: u32) -> Result<Self, NvmError> {
        Ok(Self {
            initial_sp: nvm.read_word(base)?,
            reset_vector: nvm.read_word(base + 4)?,
        })
    }

    /// Both words read as erased program memory
    pub fn is_blank(&self) -> bool {
        self.initial_sp == u32::MAX && self.reset_vector == u32::MAX
    }
}

impl LaunchPolicy {
    /// Launch decision for an update outcome
    pub fn decide(&self, outcome: &UpdateOutcome) -> BootDecision {
        match (self, outcome) {
            (LaunchPolicy::Always, _) => BootDecision::Launch,
            (LaunchPolicy::RequireVerified, UpdateOutcome::Failed { report, .. })
                if report.touched_nvm() =>
            {
                BootDecision::Halt
            }
            (LaunchPolicy::RequireVerified, _) => BootDecision::Launch,
        }
    }
}

/// Everything the boot sequence learned before the hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootReport {
    pub outcome: UpdateOutcome,
    /// `None` if program memory could not be read at the application base
    pub vector_table: Option<VectorTable>,
    pub decision: BootDecision,
}

/// Bootloader state: storage, program memory and CRC engine
pub struct Bootloader<S, N, C> {
    storage: S,
    nvm: N,
    crc: C,
    config: BootConfig,
}

impl<S, N, C> Bootloader<S, N, C>
where
    S: SlotStorage,
    N: NvmController,
    C: CrcEngine,
{
    pub fn new(storage: S, nvm: N, crc: C, config: BootConfig) -> Self {
        Self {
            storage,
            nvm,
            crc,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn nvm(&self) -> &N {
        &self.nvm
    }

    /// Mount storage, run any pending update and decide whether to launch
    pub fn prepare(&mut self) -> Result<BootReport, BootError> {
        log::info!("Entered bootloader");

        self.storage.mount().map_err(|e| {
            log::error!("Storage mount failed: {}", e);
            BootError::Mount(e)
        })?;

        let outcome =
            run_update_if_pending(&mut self.storage, &mut self.nvm, &mut self.crc, &self.config);

        let vector_table = match VectorTable::read(&self.nvm, self.config.app_base) {
            Ok(table) => {
                if table.is_blank() {
                    log::warn!(
                        "Application region at {=u32:#x} is blank",
                        self.config.app_base
                    );
                }
                Some(table)
            }
            Err(e) => {
                log::warn!("Could not read application vector table: {}", e);
                None
            }
        };

        let decision = self.config.launch_policy.decide(&outcome);
        if decision == BootDecision::Halt {
            log::error!("Update failed after modifying NVM, refusing to launch");
        }

        Ok(BootReport {
            outcome,
            vector_table,
            decision,
        })
    }

    /// Run the whole boot sequence
    pub fn run<Y, L>(mut self, system: &mut Y, launcher: L) -> !
    where
        Y: System,
        L: AppLauncher,
    {
        let report = match self.prepare() {
            Ok(report) => report,
            Err(BootError::Mount(_)) => {
                log::error!("Restarting in {} ms", self.config.mount_retry_delay_ms);
                system.delay_ms(self.config.mount_retry_delay_ms);
                system.reset();
            }
        };

        match report.decision {
            BootDecision::Halt => {
                system.deinit_peripherals();
                system.halt();
            }
            BootDecision::Launch => {
                log::info!(
                    "Exiting bootloader, jumping to application at {=u32:#x}",
                    self.config.app_base
                );
                system.delay_ms(self.config.exit_delay_ms);
                system.deinit_peripherals();
                launcher.launch(self.config.app_base);
            }
        }
    }
}
