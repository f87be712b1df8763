//! NVMCTRL program memory controller
//!
//! The SAMD21 erases by row (4 pages) and writes by page through a page
//! buffer mapped over the flash address space. The controller runs in
//! manual write mode: the page buffer is cleared, filled with halfword
//! writes, and committed with an explicit write-page command.

use atsamd_hal::pac::Nvmctrl;
use sdboot_hal::{NvmController, NvmError, NvmParameters, ERASED_BYTE};

/// Pages per erase row on every SAMD21 part
pub const PAGES_PER_ROW: u32 = 4;

/// SAMD21 NVM controller
pub struct Samd21Nvm {
    nvmctrl: Nvmctrl,
    params: NvmParameters,
}

impl Samd21Nvm {
    /// Take the controller and switch it to manual page writes
    pub fn new(nvmctrl: Nvmctrl) -> Self {
        let param = nvmctrl.param().read();
        let params = NvmParameters {
            page_size: 8 << param.psz().bits(),
            page_count: param.nvmp().bits() as u32,
        };
        nvmctrl.ctrlb().modify(|_, w| w.manw().set_bit());
        Self { nvmctrl, params }
    }

    /// Release the peripheral
    pub fn free(self) -> Nvmctrl {
        self.nvmctrl
    }

    fn wait_ready(&self) {
        while self.nvmctrl.intflag().read().ready().bit_is_clear() {}
    }

    fn clear_status(&self) {
        self.nvmctrl
            .status()
            .write(|w| w.proge().set_bit().locke().set_bit().nvme().set_bit());
    }

    /// Map STATUS error bits of the last command
    fn status(&self) -> Result<(), NvmError> {
        let status = self.nvmctrl.status().read();
        if status.locke().bit_is_set() {
            Err(NvmError::Locked)
        } else if status.proge().bit_is_set() {
            Err(NvmError::Program)
        } else if status.nvme().bit_is_set() {
            Err(NvmError::Hardware)
        } else {
            Ok(())
        }
    }

    fn check_range(&self, addr: u32, len: u32) -> Result<(), NvmError> {
        match addr.checked_add(len) {
            Some(end) if end <= self.params.flash_size() => Ok(()),
            _ => Err(NvmError::OutOfRange),
        }
    }
}

impl NvmController for Samd21Nvm {
    fn parameters(&self) -> NvmParameters {
        self.params
    }

    fn erase_row(&mut self, addr: u32) -> Result<(), NvmError> {
        let row_size = self.params.page_size * PAGES_PER_ROW;
        if addr % row_size != 0 {
            return Err(NvmError::Alignment);
        }
        self.check_range(addr, row_size)?;

        self.wait_ready();
        self.clear_status();
        // ADDR takes a halfword address for the erase command
        // SAFETY: any value below the flash size is a valid row address
        self.nvmctrl
            .addr()
            .write(|w| unsafe { w.addr().bits(addr >> 1) });
        self.nvmctrl
            .ctrla()
            .write(|w| w.cmdex().key().cmd().er());
        self.wait_ready();
        self.status()
    }

    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), NvmError> {
        let page_size = self.params.page_size;
        if addr % page_size != 0 {
            return Err(NvmError::Alignment);
        }
        if data.len() > page_size as usize {
            return Err(NvmError::Program);
        }
        self.check_range(addr, page_size)?;

        self.wait_ready();
        self.clear_status();
        self.nvmctrl
            .ctrla()
            .write(|w| w.cmdex().key().cmd().pbc());
        self.wait_ready();

        // The page buffer only accepts 16 and 32 bit writes
        let base = addr as *mut u16;
        for (i, pair) in data.chunks(2).enumerate() {
            let halfword = u16::from_le_bytes([pair[0], *pair.get(1).unwrap_or(&ERASED_BYTE)]);
            // SAFETY: the target lies inside the checked page; writes to
            // flash addresses land in the page buffer
            unsafe { core::ptr::write_volatile(base.add(i), halfword) };
        }

        self.nvmctrl
            .ctrla()
            .write(|w| w.cmdex().key().cmd().wp());
        self.wait_ready();
        self.status()
    }

    fn read_byte(&self, addr: u32) -> Result<u8, NvmError> {
        if addr == 0 {
            return Err(NvmError::OutOfRange);
        }
        self.check_range(addr, 1)?;
        // SAFETY: checked to lie inside memory-mapped program memory
        Ok(unsafe { core::ptr::read_volatile(addr as *const u8) })
    }

    fn view(&self, addr: u32, len: usize) -> Result<&[u8], NvmError> {
        if addr == 0 && len > 0 {
            // Never hand out a slice at the null address
            return Err(NvmError::OutOfRange);
        }
        self.check_range(addr, len as u32)?;
        if len == 0 {
            return Ok(&[]);
        }
        // SAFETY: program memory is memory mapped and the range was checked
        // against the flash size. The borrow of `self` keeps writes through
        // this controller from overlapping the view.
        Ok(unsafe { core::slice::from_raw_parts(addr as *const u8, len) })
    }
}
