//! NVM programmer
//!
//! Drives an [`NvmController`] over the application region with row
//! granularity erases and page granularity writes. The programmer keeps
//! track of the row erased last and of the pages already written in it, so
//! a write that would break the erase-before-program rule is rejected before
//! it reaches the controller. It never re-reads memory to check this.

use core::ops::Range;

use sdboot_hal::{NvmController, NvmError, ERASED_BYTE};

use crate::geometry::RowGeometry;
use crate::log;

/// Page programming failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramError {
    /// Address is not on a page boundary
    Alignment,
    /// Page lies outside the application region
    OutOfRange,
    /// More data than one page
    Oversized,
    /// Page's row was not erased (and verified) in this session
    RowNotErased,
    /// Page was already written since its row was erased
    PageAlreadyWritten,
    /// Controller failed on a properly erased page
    Hardware(NvmError),
}

/// Erase verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseCheckError {
    /// A byte did not read back as the erase sentinel
    Dirty { addr: u32, value: u8 },
    /// Row could not be read
    Nvm(NvmError),
}

/// Row currently open for programming
#[derive(Debug, Clone, Copy)]
struct OpenRow {
    addr: u32,
    /// One bit per page already written
    written: u32,
}

/// Erase/program sequencer over the application region
pub struct NvmProgrammer<N> {
    nvm: N,
    geometry: RowGeometry,
    region: Range<u32>,
    open: Option<OpenRow>,
}

impl<N: NvmController> NvmProgrammer<N> {
    /// Create a programmer restricted to `region`
    pub fn new(nvm: N, geometry: RowGeometry, region: Range<u32>) -> Self {
        Self {
            nvm,
            geometry,
            region,
            open: None,
        }
    }

    /// Borrow the controller (for reads)
    pub fn nvm(&self) -> &N {
        &self.nvm
    }

    /// Erase the row at `addr`
    ///
    /// On success the row becomes the open row; on failure no row is open.
    pub fn erase_row(&mut self, addr: u32) -> Result<(), NvmError> {
        self.open = None;

        if !self.geometry.is_row_aligned(addr) {
            return Err(NvmError::Alignment);
        }
        if !self.contains(addr, self.geometry.row_size()) {
            return Err(NvmError::OutOfRange);
        }

        self.nvm.erase_row(addr)?;
        self.open = Some(OpenRow { addr, written: 0 });
        log::trace!("Erased row at {=u32:#x}", addr);
        Ok(())
    }

    /// Check that every byte of the row at `addr` reads as erased
    ///
    /// A dirty row is closed, so nothing can be programmed into it.
    pub fn verify_erased(&mut self, addr: u32) -> Result<(), EraseCheckError> {
        let row_size = self.geometry.row_size();
        for byte_addr in addr..addr + row_size {
            let value = self.nvm.read_byte(byte_addr).map_err(EraseCheckError::Nvm)?;
            if value != ERASED_BYTE {
                self.open = None;
                return Err(EraseCheckError::Dirty {
                    addr: byte_addr,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Program one page at `addr` with `data` (at most one page)
    pub fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), ProgramError> {
        let page_size = self.geometry.page_size();
        if !self.geometry.is_page_aligned(addr) {
            return Err(ProgramError::Alignment);
        }
        if data.len() > page_size as usize {
            return Err(ProgramError::Oversized);
        }
        if !self.contains(addr, page_size) {
            return Err(ProgramError::OutOfRange);
        }

        let row_size = self.geometry.row_size();
        let open = match self.open.as_mut() {
            Some(open) if (open.addr..open.addr + row_size).contains(&addr) => open,
            _ => return Err(ProgramError::RowNotErased),
        };

        let bit = 1u32 << ((addr - open.addr) / page_size);
        if open.written & bit != 0 {
            return Err(ProgramError::PageAlreadyWritten);
        }
        open.written |= bit;

        self.nvm
            .write_page(addr, data)
            .map_err(ProgramError::Hardware)?;
        log::debug!("Programmed page at {=u32:#x}", addr);
        Ok(())
    }

    fn contains(&self, addr: u32, len: u32) -> bool {
        addr >= self.region.start
            && (addr as u64 + len as u64) <= self.region.end as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimNvm;

    const BASE: u32 = 0x400;

    fn programmer(nvm: &mut SimNvm) -> NvmProgrammer<&mut SimNvm> {
        NvmProgrammer::new(nvm, RowGeometry::new(64, 4), BASE..0x2000)
    }

    #[test]
    fn test_erase_then_program() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        prog.verify_erased(BASE).unwrap();
        prog.program_page(BASE + 64, &[0x12; 64]).unwrap();

        assert_eq!(nvm.bytes(BASE, 64), &[0xFF; 64][..]);
        assert_eq!(nvm.bytes(BASE + 64, 64), &[0x12; 64][..]);
    }

    #[test]
    fn test_erase_rejects_unaligned_row() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        assert_eq!(prog.erase_row(BASE + 64), Err(NvmError::Alignment));
        assert!(nvm.erases.is_empty());
    }

    #[test]
    fn test_erase_never_touches_bootloader_region() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        assert_eq!(prog.erase_row(0), Err(NvmError::OutOfRange));
        assert!(nvm.erases.is_empty());
    }

    #[test]
    fn test_program_rejects_unaligned_page() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        assert_eq!(
            prog.program_page(BASE + 1, &[0; 4]),
            Err(ProgramError::Alignment)
        );
    }

    #[test]
    fn test_program_before_erase_is_flagged() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        assert_eq!(
            prog.program_page(BASE, &[0; 64]),
            Err(ProgramError::RowNotErased)
        );
        assert!(nvm.writes.is_empty());
    }

    #[test]
    fn test_program_outside_open_row_is_flagged() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        assert_eq!(
            prog.program_page(BASE + 256, &[0; 64]),
            Err(ProgramError::RowNotErased)
        );
    }

    #[test]
    fn test_page_written_once_per_erase() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        prog.program_page(BASE, &[1; 64]).unwrap();
        assert_eq!(
            prog.program_page(BASE, &[2; 64]),
            Err(ProgramError::PageAlreadyWritten)
        );

        // A fresh erase opens the page again
        prog.erase_row(BASE).unwrap();
        prog.program_page(BASE, &[2; 64]).unwrap();
    }

    #[test]
    fn test_hardware_failure_is_distinct() {
        let mut nvm = SimNvm::new(64, 128, 4);
        nvm.fail_write_at = Some(BASE);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        assert_eq!(
            prog.program_page(BASE, &[0; 64]),
            Err(ProgramError::Hardware(NvmError::Hardware))
        );
    }

    #[test]
    fn test_oversized_page_data() {
        let mut nvm = SimNvm::new(64, 128, 4);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        assert_eq!(
            prog.program_page(BASE, &[0; 65]),
            Err(ProgramError::Oversized)
        );
    }

    #[test]
    fn test_verify_reports_first_dirty_byte() {
        let mut nvm = SimNvm::new(64, 128, 4);
        nvm.stuck_byte = Some((BASE + 70, 0x7F));
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        assert_eq!(
            prog.verify_erased(BASE),
            Err(EraseCheckError::Dirty {
                addr: BASE + 70,
                value: 0x7F
            })
        );
        // Dirty row is closed
        assert_eq!(
            prog.program_page(BASE, &[0; 64]),
            Err(ProgramError::RowNotErased)
        );
    }

    #[test]
    fn test_failed_erase_closes_row() {
        let mut nvm = SimNvm::new(64, 128, 4);
        nvm.fail_erase_at = Some(BASE + 256);
        let mut prog = programmer(&mut nvm);

        prog.erase_row(BASE).unwrap();
        assert_eq!(prog.erase_row(BASE + 256), Err(NvmError::Hardware));
        assert_eq!(
            prog.program_page(BASE, &[0; 64]),
            Err(ProgramError::RowNotErased)
        );
    }
}
