//! Host-side fakes for the HAL traits

use std::panic::{self, AssertUnwindSafe};

use sdboot_hal::{
    AppLauncher, CrcEngine, CrcError, CrcSource, ImageStream, NvmController, NvmError,
    NvmParameters, SlotStorage, SourceKind, StorageError, System, ERASED_BYTE,
};

use crate::verify::SoftwareCrc;

/// Deterministic, non-repeating-looking image contents
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

/// Simulated program memory starting at address 0
///
/// Writing ANDs data into memory like real NOR cells, so programming an
/// unerased page silently corrupts it.
pub struct SimNvm {
    params: NvmParameters,
    row_size: u32,
    memory: Vec<u8>,
    /// Addresses of every erase command, in order
    pub erases: Vec<u32>,
    /// Addresses of every page write command, in order
    pub writes: Vec<u32>,
    /// Erase at this address reports a controller error
    pub fail_erase_at: Option<u32>,
    /// Byte at this address does not erase (stays at the given value)
    pub stuck_byte: Option<(u32, u8)>,
    /// Page write at this address reports a controller error
    pub fail_write_at: Option<u32>,
    /// Byte at this address reads back flipped after programming
    pub flip_after_write: Option<u32>,
}

impl SimNvm {
    pub fn new(page_size: u32, page_count: u32, pages_per_row: u32) -> Self {
        let size = (page_size * page_count) as usize;
        Self {
            params: NvmParameters {
                page_size,
                page_count,
            },
            row_size: page_size * pages_per_row,
            // Old firmware left behind
            memory: vec![0x5A; size],
            erases: Vec::new(),
            writes: Vec::new(),
            fail_erase_at: None,
            stuck_byte: None,
            fail_write_at: None,
            flip_after_write: None,
        }
    }

    /// Total erase and write commands issued
    pub fn mutations(&self) -> usize {
        self.erases.len() + self.writes.len()
    }

    /// Raw memory contents
    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        &self.memory[addr as usize..addr as usize + len]
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), NvmError> {
        if addr as usize + len > self.memory.len() {
            return Err(NvmError::OutOfRange);
        }
        Ok(())
    }
}

impl NvmController for SimNvm {
    fn parameters(&self) -> NvmParameters {
        self.params
    }

    fn erase_row(&mut self, addr: u32) -> Result<(), NvmError> {
        if addr % self.row_size != 0 {
            return Err(NvmError::Alignment);
        }
        self.check_range(addr, self.row_size as usize)?;
        self.erases.push(addr);
        if self.fail_erase_at == Some(addr) {
            return Err(NvmError::Hardware);
        }

        let start = addr as usize;
        self.memory[start..start + self.row_size as usize].fill(ERASED_BYTE);
        if let Some((stuck, value)) = self.stuck_byte {
            if (addr..addr + self.row_size).contains(&stuck) {
                self.memory[stuck as usize] = value;
            }
        }
        Ok(())
    }

    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), NvmError> {
        if addr % self.params.page_size != 0 {
            return Err(NvmError::Alignment);
        }
        if data.len() > self.params.page_size as usize {
            return Err(NvmError::Program);
        }
        self.check_range(addr, data.len())?;
        self.writes.push(addr);
        if self.fail_write_at == Some(addr) {
            return Err(NvmError::Hardware);
        }

        let start = addr as usize;
        for (cell, byte) in self.memory[start..start + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        if let Some(flip) = self.flip_after_write {
            if (addr..addr + data.len() as u32).contains(&flip) {
                self.memory[flip as usize] ^= 0x01;
            }
        }
        Ok(())
    }

    fn view(&self, addr: u32, len: usize) -> Result<&[u8], NvmError> {
        self.check_range(addr, len)?;
        Ok(self.bytes(addr, len))
    }
}

/// In-memory removable storage
pub struct MemStorage {
    pub flags: Vec<String>,
    pub images: Vec<(String, Vec<u8>)>,
    pub deleted: Vec<String>,
    /// Largest chunk a single read returns
    pub max_read: usize,
    /// `mount` fails
    pub fail_mount: bool,
    /// `delete_flag` fails
    pub fail_delete: bool,
    /// Stream ends after this many bytes while still reporting the full length
    pub truncate_at: Option<usize>,
    /// Reads fail once the stream reaches this offset
    pub fail_read_at: Option<usize>,
    pub mounted: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            flags: Vec::new(),
            images: Vec::new(),
            deleted: Vec::new(),
            max_read: 512,
            fail_mount: false,
            fail_delete: false,
            truncate_at: None,
            fail_read_at: None,
            mounted: false,
        }
    }

    pub fn with_flag(mut self, name: &str) -> Self {
        self.flags.push(name.into());
        self
    }

    pub fn with_image(mut self, name: &str, data: Vec<u8>) -> Self {
        self.images.push((name.into(), data));
        self
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|flag| flag == name)
    }
}

impl SlotStorage for MemStorage {
    type Image<'s> = MemImage<'s>;

    fn mount(&mut self) -> Result<(), StorageError> {
        if self.fail_mount {
            return Err(StorageError::Mount);
        }
        self.mounted = true;
        Ok(())
    }

    fn flag_exists(&mut self, name: &str) -> bool {
        self.has_flag(name)
    }

    fn delete_flag(&mut self, name: &str) -> Result<(), StorageError> {
        if self.fail_delete {
            return Err(StorageError::Device);
        }
        let before = self.flags.len();
        self.flags.retain(|flag| flag != name);
        if self.flags.len() == before {
            return Err(StorageError::NotFound);
        }
        self.deleted.push(name.into());
        Ok(())
    }

    fn open_image(&mut self, name: &str) -> Result<MemImage<'_>, StorageError> {
        let (_, data) = self
            .images
            .iter()
            .find(|(image, _)| image == name)
            .ok_or(StorageError::NotFound)?;
        let available = self.truncate_at.unwrap_or(data.len()).min(data.len());
        Ok(MemImage {
            data: &data[..available],
            len: data.len() as u32,
            max_read: self.max_read,
            offset: 0,
            fail_at: self.fail_read_at,
        })
    }
}

/// Image stream over an in-memory buffer
pub struct MemImage<'s> {
    data: &'s [u8],
    len: u32,
    max_read: usize,
    offset: usize,
    fail_at: Option<usize>,
}

impl ImageStream for MemImage<'_> {
    fn len(&self) -> u32 {
        self.len
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut n = buf.len().min(self.max_read).min(self.data.len());
        if let Some(fail_at) = self.fail_at {
            if self.offset >= fail_at {
                return Err(StorageError::Device);
            }
            n = n.min(fail_at - self.offset);
        }
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        self.offset += n;
        Ok(n)
    }
}

/// Observable CRC engine activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcEvent {
    Errata(bool),
    Update(SourceKind, usize),
}

/// Software CRC engine that records every call
pub struct RecordingCrc {
    inner: SoftwareCrc,
    pub events: Vec<CrcEvent>,
    pub errata_active: bool,
    /// Updates over RAM computed while the workaround was off
    pub unprotected_ram_updates: usize,
    pub fail: bool,
}

impl RecordingCrc {
    pub fn new() -> Self {
        Self {
            inner: SoftwareCrc,
            events: Vec::new(),
            errata_active: false,
            unprotected_ram_updates: 0,
            fail: false,
        }
    }
}

impl CrcEngine for RecordingCrc {
    fn ram_errata(&mut self, active: bool) {
        self.errata_active = active;
        self.events.push(CrcEvent::Errata(active));
    }

    fn update(&mut self, crc: u32, source: CrcSource<'_>) -> Result<u32, CrcError> {
        self.events
            .push(CrcEvent::Update(source.kind(), source.bytes().len()));
        if source.kind() == SourceKind::Ram && !self.errata_active {
            self.unprotected_ram_updates += 1;
        }
        if self.fail {
            return Err(CrcError::BusError);
        }
        self.inner.update(crc, source)
    }
}

/// How a non-returning boot path ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Reset,
    Halt,
    Launch(u32),
}

/// Non-terminal system calls, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysEvent {
    Delay(u32),
    Deinit,
}

/// System whose terminal calls unwind with a [`Terminal`] payload
#[derive(Default)]
pub struct MockSystem {
    pub events: Vec<SysEvent>,
}

impl System for MockSystem {
    fn delay_ms(&mut self, ms: u32) {
        self.events.push(SysEvent::Delay(ms));
    }

    fn reset(&mut self) -> ! {
        panic::panic_any(Terminal::Reset)
    }

    fn deinit_peripherals(&mut self) {
        self.events.push(SysEvent::Deinit);
    }

    fn halt(&mut self) -> ! {
        panic::panic_any(Terminal::Halt)
    }
}

pub struct MockLauncher;

impl AppLauncher for MockLauncher {
    fn launch(self, app_base: u32) -> ! {
        panic::panic_any(Terminal::Launch(app_base))
    }
}

/// Run a diverging boot path and report how it ended
pub fn run_to_end<F: FnOnce()>(f: F) -> Terminal {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => panic!("boot path returned"),
        Err(payload) => match payload.downcast::<Terminal>() {
            Ok(terminal) => *terminal,
            Err(_) => panic!("boot path panicked"),
        },
    }
}
