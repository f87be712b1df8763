//! Jump to the application image

use cortex_m::peripheral::{NVIC, SCB, SYST};
use sdboot_hal::AppLauncher;

/// Hands the core over to the application through its vector table
pub struct CortexMLauncher {
    scb: SCB,
    syst: SYST,
    nvic: NVIC,
}

impl CortexMLauncher {
    pub fn new(scb: SCB, syst: SYST, nvic: NVIC) -> Self {
        Self { scb, syst, nvic }
    }
}

impl AppLauncher for CortexMLauncher {
    fn launch(mut self, app_base: u32) -> ! {
        cortex_m::interrupt::disable();

        self.syst.disable_interrupt();
        self.syst.disable_counter();

        // SAFETY: interrupts are masked globally; clearing every enable and
        // pending bit leaves the NVIC in its reset state for the application.
        // The Cortex-M0+ has a single 32-line bank.
        unsafe {
            self.nvic.icer[0].write(u32::MAX);
            self.nvic.icpr[0].write(u32::MAX);
            self.scb.vtor.write(app_base);
        }
        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        // SAFETY: `app_base` holds the application's vector table: word 0
        // is loaded into MSP, word 1 is the reset handler. Nothing owned by
        // the bootloader is used past this point.
        unsafe {
            cortex_m::interrupt::enable();
            cortex_m::asm::bootload(app_base as *const u32)
        }
    }
}
