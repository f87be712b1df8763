//! Application hand-off

/// Transfers control to the application image
///
/// The image starts with a vector table: word 0 is the initial stack
/// pointer, word 1 the reset vector.
pub trait AppLauncher {
    /// Jump to the application whose vector table sits at `app_base`
    ///
    /// Peripherals owned by the bootloader must already be torn down. There
    /// is no error path: a blank or corrupt table faults inside the
    /// application, not here.
    fn launch(self, app_base: u32) -> !;
}
