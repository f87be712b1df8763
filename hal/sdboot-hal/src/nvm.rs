//! Non-volatile program memory abstractions
//!
//! NVM is organized in rows (smallest erasable unit) made of pages
//! (smallest programmable unit). Implementations expose the raw controller
//! commands; alignment and erase-before-write bookkeeping live in the
//! programmer that drives them.

/// Value every byte of an erased row reads as
pub const ERASED_BYTE: u8 = 0xFF;

/// Parameters reported by the NVM controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NvmParameters {
    /// Size of one page in bytes
    pub page_size: u32,
    /// Total number of pages in the main array
    pub page_count: u32,
}

impl NvmParameters {
    /// Total size of the main array in bytes
    pub fn flash_size(&self) -> u32 {
        self.page_size.saturating_mul(self.page_count)
    }
}

/// Errors from NVM controller operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvmError {
    /// Address is not aligned to the required row/page boundary
    Alignment,
    /// Address range lies outside the main array
    OutOfRange,
    /// Target region is lock protected
    Locked,
    /// Controller rejected the command (invalid command or address)
    Program,
    /// Controller reported a hardware error during the operation
    Hardware,
}

/// NVM controller
///
/// Addresses are absolute bus addresses. Implementations perform the
/// requested command and report controller status; they do not check that
/// a page was erased before it is written.
pub trait NvmController {
    /// Query page size and page count from the hardware
    fn parameters(&self) -> NvmParameters;

    /// Erase the row starting at `addr`
    fn erase_row(&mut self, addr: u32) -> Result<(), NvmError>;

    /// Program one page starting at `addr`
    ///
    /// `data` holds at most one page; shorter data leaves the remaining page
    /// bytes erased.
    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), NvmError>;

    /// Borrow `len` bytes of program memory starting at `addr`
    ///
    /// Program memory is memory mapped, so this is a view, not a copy.
    fn view(&self, addr: u32, len: usize) -> Result<&[u8], NvmError>;

    /// Read a single raw byte of program memory
    fn read_byte(&self, addr: u32) -> Result<u8, NvmError> {
        self.view(addr, 1).map(|bytes| bytes[0])
    }

    /// Read a little-endian word of program memory
    fn read_word(&self, addr: u32) -> Result<u32, NvmError> {
        let bytes = self.view(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl<T: NvmController + ?Sized> NvmController for &mut T {
    fn parameters(&self) -> NvmParameters {
        (**self).parameters()
    }

    fn erase_row(&mut self, addr: u32) -> Result<(), NvmError> {
        (**self).erase_row(addr)
    }

    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), NvmError> {
        (**self).write_page(addr, data)
    }

    fn view(&self, addr: u32, len: usize) -> Result<&[u8], NvmError> {
        (**self).view(addr, len)
    }

    fn read_byte(&self, addr: u32) -> Result<u8, NvmError> {
        (**self).read_byte(addr)
    }
}
