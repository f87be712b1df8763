//! Update orchestrator
//!
//! Selects the pending slot, then walks the image row by row:
//!
//! 1. erase the row and check every byte reads as erased
//! 2. read the row's image bytes into the row buffer
//! 3. program the pages holding image bytes (final page padded with 0xFF)
//! 4. checksum the image bytes from the buffer and from NVM
//!
//! The final row is always processed, carrying `len mod row_size` bytes.
//! I/O failures stop the update at the failing row. A checksum mismatch
//! does not stop it; it becomes the terminal outcome once every row is
//! written.

use sdboot_hal::{
    CrcEngine, CrcError, ImageStream, NvmController, NvmError, SlotStorage, StorageError,
    ERASED_BYTE,
};

use crate::config::{BootConfig, ConfigError, MAX_ROW_SIZE};
use crate::geometry::RowGeometry;
use crate::log;
use crate::programmer::{EraseCheckError, NvmProgrammer, ProgramError};
use crate::slot::{select_pending_slot, Slot};
use crate::verify::ImageVerifier;

/// Reasons an update attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// Configuration does not fit the NVM parameters
    Config(ConfigError),
    /// Image file named by the flag could not be opened
    SourceOpen(StorageError),
    /// Image does not fit the application region
    ImageTooLarge { len: u32, capacity: u32 },
    /// Controller failed to erase a row
    Erase { row: u32, addr: u32, cause: NvmError },
    /// Row did not read back erased
    EraseVerify { row: u32, addr: u32, value: u8 },
    /// Image stream ended early or failed
    SourceRead {
        row: u32,
        expected: u32,
        read: u32,
        cause: Option<StorageError>,
    },
    /// Page programming failed
    Program {
        row: u32,
        addr: u32,
        cause: ProgramError,
    },
    /// CRC engine failed
    Crc(CrcError),
    /// Programmed image does not match the source image
    ChecksumMismatch {
        source: u32,
        nvm: u32,
        first_row: Option<u32>,
    },
}

impl UpdateError {
    /// Programmed content was checked and found wrong
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            UpdateError::EraseVerify { .. } | UpdateError::ChecksumMismatch { .. }
        )
    }

    /// A storage, controller or CRC engine operation failed
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            UpdateError::SourceOpen(_)
                | UpdateError::Erase { .. }
                | UpdateError::SourceRead { .. }
                | UpdateError::Program { .. }
                | UpdateError::Crc(_)
        )
    }
}

/// Progress and checksums of one update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateReport {
    pub slot: Slot,
    pub image_len: u32,
    pub full_rows: u32,
    pub remainder: u32,
    /// Erase commands issued, including one that failed
    pub rows_attempted: u32,
    pub rows_erased: u32,
    pub pages_programmed: u32,
    pub bytes_programmed: u32,
    pub source_crc: u32,
    pub nvm_crc: u32,
    pub first_mismatch_row: Option<u32>,
}

impl UpdateReport {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            image_len: 0,
            full_rows: 0,
            remainder: 0,
            rows_attempted: 0,
            rows_erased: 0,
            pages_programmed: 0,
            bytes_programmed: 0,
            source_crc: 0,
            nvm_crc: 0,
            first_mismatch_row: None,
        }
    }

    /// Whether the attempt may have changed NVM contents
    ///
    /// A failed erase counts: the row is left in an unknown state.
    pub fn touched_nvm(&self) -> bool {
        self.rows_attempted > 0
    }
}

/// Result of [`run_update_if_pending`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateOutcome {
    /// No flag present; NVM untouched
    NoUpdatePending,
    /// Image programmed and checksums match
    Updated(UpdateReport),
    /// Attempt failed
    Failed {
        report: UpdateReport,
        error: UpdateError,
    },
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }

    pub fn report(&self) -> Option<&UpdateReport> {
        match self {
            UpdateOutcome::NoUpdatePending => None,
            UpdateOutcome::Updated(report) | UpdateOutcome::Failed { report, .. } => Some(report),
        }
    }

    pub fn error(&self) -> Option<&UpdateError> {
        match self {
            UpdateOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Program the pending image, if any
pub fn run_update_if_pending<S, N, C>(
    storage: &mut S,
    nvm: &mut N,
    crc: &mut C,
    config: &BootConfig,
) -> UpdateOutcome
where
    S: SlotStorage,
    N: NvmController,
    C: CrcEngine,
{
    let Some(slot) = select_pending_slot(storage, config) else {
        log::info!("No update pending");
        return UpdateOutcome::NoUpdatePending;
    };

    let mut report = UpdateReport::new(slot);
    match program_image(storage, nvm, crc, config, slot, &mut report) {
        Ok(()) => {
            log::info!(
                "Update from slot {=str} complete: {} bytes, crc {=u32:#x}",
                slot.label(),
                report.image_len,
                report.source_crc
            );
            UpdateOutcome::Updated(report)
        }
        Err(error) => {
            log::error!("Update from slot {=str} failed: {}", slot.label(), error);
            UpdateOutcome::Failed { report, error }
        }
    }
}

fn program_image<S, N, C>(
    storage: &mut S,
    nvm: &mut N,
    crc: &mut C,
    config: &BootConfig,
    slot: Slot,
    report: &mut UpdateReport,
) -> Result<(), UpdateError>
where
    S: SlotStorage,
    N: NvmController,
    C: CrcEngine,
{
    let params = nvm.parameters();
    log::info!(
        "NVM info: {} pages of {} bytes",
        params.page_count,
        params.page_size
    );
    let geometry = config.geometry(params).map_err(UpdateError::Config)?;

    let image_name = config.slot(slot).image;
    let mut image = storage
        .open_image(image_name)
        .map_err(UpdateError::SourceOpen)?;

    let len = image.len();
    let plan = geometry.plan(len);
    report.image_len = len;
    report.full_rows = plan.full_rows;
    report.remainder = plan.remainder;

    let region_end = params.flash_size();
    let capacity = region_end - config.app_base;
    if plan.data_span(&geometry) > capacity as u64 {
        return Err(UpdateError::ImageTooLarge { len, capacity });
    }
    log::info!(
        "Programming {=str}: {} bytes, {} full rows + {} bytes",
        image_name,
        len,
        plan.full_rows,
        plan.remainder
    );

    let mut buffer: heapless::Vec<u8, MAX_ROW_SIZE> = heapless::Vec::new();
    buffer
        .resize(geometry.row_size() as usize, ERASED_BYTE)
        .map_err(|_| UpdateError::Config(ConfigError::RowTooLarge))?;

    let mut writer = RowWriter {
        programmer: NvmProgrammer::new(nvm, geometry, config.app_base..region_end),
        crc,
        verifier: ImageVerifier::new(),
        buffer: &mut buffer,
        geometry,
        base: config.app_base,
        report,
    };

    for row in 0..plan.full_rows {
        writer.write_row(&mut image, row, geometry.row_size())?;
    }
    // An empty final row past the end of the region is skipped
    let tail_end = geometry.row_addr(config.app_base, plan.full_rows) as u64
        + geometry.row_size() as u64;
    if plan.remainder > 0 || tail_end <= region_end as u64 {
        writer.write_row(&mut image, plan.full_rows, plan.remainder)?;
    } else {
        log::debug!("Image fills the application region");
    }

    let verdict = writer.verifier.verdict();
    writer.report.source_crc = verdict.source;
    writer.report.nvm_crc = verdict.nvm;
    writer.report.first_mismatch_row = verdict.first_mismatch_row;
    log::info!(
        "CRC source: {=u32:#x} CRC NVM: {=u32:#x}",
        verdict.source,
        verdict.nvm
    );

    if !verdict.is_match() {
        return Err(UpdateError::ChecksumMismatch {
            source: verdict.source,
            nvm: verdict.nvm,
            first_row: verdict.first_mismatch_row,
        });
    }
    Ok(())
}

/// State threaded through the per-row loop
struct RowWriter<'a, N, C> {
    programmer: NvmProgrammer<N>,
    crc: &'a mut C,
    verifier: ImageVerifier,
    buffer: &'a mut [u8],
    geometry: RowGeometry,
    base: u32,
    report: &'a mut UpdateReport,
}

impl<N: NvmController, C: CrcEngine> RowWriter<'_, N, C> {
    /// Erase, verify, fill, program and checksum one row holding `len`
    /// image bytes
    fn write_row<I: ImageStream>(
        &mut self,
        image: &mut I,
        row: u32,
        len: u32,
    ) -> Result<(), UpdateError> {
        let addr = self.geometry.row_addr(self.base, row);

        self.report.rows_attempted += 1;
        self.programmer
            .erase_row(addr)
            .map_err(|cause| UpdateError::Erase { row, addr, cause })?;
        self.report.rows_erased += 1;

        self.programmer
            .verify_erased(addr)
            .map_err(|e| match e {
                EraseCheckError::Dirty { addr, value } => {
                    UpdateError::EraseVerify { row, addr, value }
                }
                EraseCheckError::Nvm(cause) => UpdateError::Erase { row, addr, cause },
            })?;

        let real = len as usize;
        self.buffer.fill(ERASED_BYTE);
        let read = read_full(image, &mut self.buffer[..real]).map_err(|(read, cause)| {
            UpdateError::SourceRead {
                row,
                expected: len,
                read: read as u32,
                cause: Some(cause),
            }
        })?;
        if read < real {
            return Err(UpdateError::SourceRead {
                row,
                expected: len,
                read: read as u32,
                cause: None,
            });
        }

        let page_size = self.geometry.page_size();
        for page in 0..self.geometry.pages_for(len) {
            let page_addr = addr + page * page_size;
            let start = (page * page_size) as usize;
            let data = &self.buffer[start..start + page_size as usize];
            self.programmer
                .program_page(page_addr, data)
                .map_err(|cause| UpdateError::Program {
                    row,
                    addr: page_addr,
                    cause,
                })?;
            self.report.pages_programmed += 1;
        }
        self.report.bytes_programmed += len;

        let programmed = self
            .programmer
            .nvm()
            .view(addr, real)
            .map_err(|cause| UpdateError::Program {
                row,
                addr,
                cause: ProgramError::Hardware(cause),
            })?;
        self.verifier
            .record_row(&mut *self.crc, row, &self.buffer[..real], programmed)
            .map_err(UpdateError::Crc)?;

        log::info!(
            "Write to NVM succeeded at row address {=u32:#x} ({} bytes)",
            addr,
            len
        );
        Ok(())
    }
}

/// Read until `buf` is full or the stream ends
///
/// On error, returns the bytes already read along with the cause.
fn read_full<I: ImageStream>(
    image: &mut I,
    buf: &mut [u8],
) -> Result<usize, (usize, StorageError)> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = image
            .read(&mut buf[filled..])
            .map_err(|e| (filled, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
