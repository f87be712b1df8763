//! System services: delays, reset and teardown

use atsamd_hal::pac::sercom0::RegisterBlock as SercomRegisters;
use cortex_m::peripheral::SCB;
use embedded_hal::delay::DelayNs;
use sdboot_hal::System;

/// Busy-wait delay calibrated to the core clock
#[derive(Debug, Clone, Copy)]
pub struct CycleDelay {
    core_hz: u32,
}

impl CycleDelay {
    pub fn new(core_hz: u32) -> Self {
        Self { core_hz }
    }
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.core_hz as u64).div_ceil(1_000_000_000);
        cortex_m::asm::delay(cycles.min(u32::MAX as u64) as u32);
    }

    fn delay_ms(&mut self, ms: u32) {
        let per_ms = self.core_hz / 1000;
        for _ in 0..ms {
            cortex_m::asm::delay(per_ms);
        }
    }
}

/// Put a SERCOM back into its reset state
pub fn reset_sercom(sercom: &SercomRegisters) {
    let spi = sercom.spi();
    spi.ctrla().modify(|_, w| w.swrst().set_bit());
    while spi.syncbusy().read().swrst().bit_is_set() {}
}

/// SAMD21 system control
///
/// `teardown` resets whatever the board brought up for the bootloader
/// (the SD card SERCOM) right before the hand-off.
pub struct Samd21System<F> {
    delay: CycleDelay,
    teardown: F,
}

impl<F: FnMut()> Samd21System<F> {
    pub fn new(core_hz: u32, teardown: F) -> Self {
        Self {
            delay: CycleDelay::new(core_hz),
            teardown,
        }
    }
}

impl<F: FnMut()> System for Samd21System<F> {
    fn delay_ms(&mut self, ms: u32) {
        DelayNs::delay_ms(&mut self.delay, ms);
    }

    fn reset(&mut self) -> ! {
        SCB::sys_reset()
    }

    fn deinit_peripherals(&mut self) {
        (self.teardown)();
    }

    fn halt(&mut self) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}
