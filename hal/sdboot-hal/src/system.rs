//! System control abstractions

/// Core system services used by the boot sequence
pub trait System {
    /// Busy-wait for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Perform a full hardware reset
    fn reset(&mut self) -> !;

    /// Tear down every peripheral the bootloader brought up
    ///
    /// Called right before the hand-off. After this returns, no bootloader
    /// owned interrupt source may fire.
    fn deinit_peripherals(&mut self);

    /// Park the CPU without launching anything
    fn halt(&mut self) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}
