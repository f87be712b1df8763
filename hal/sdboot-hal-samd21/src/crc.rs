//! DSU CRC32 engine
//!
//! The Device Service Unit computes IEEE 802.3 CRC32 over word-aligned
//! memory ranges. Slices that do not start or end on a word boundary get
//! their unaligned head and tail folded in software, so any slice yields
//! the standard checksum.
//!
//! Errata: computing over SRAM returns wrong results unless an
//! undocumented bus-matrix bit is toggled around the computation. The
//! engine exposes this through [`CrcEngine::ram_errata`].

use atsamd_hal::pac::{Dsu, Pac1};
use sdboot_hal::{CrcEngine, CrcError, CrcSource};

/// Undocumented bus-matrix register touched by the RAM-source workaround
const ERRATA_REG: *mut u32 = 0x4100_7058 as *mut u32;
/// Cleared before a RAM-source computation
const ERRATA_CLEAR_MASK: u32 = 0x0003_0000;
/// Set again afterwards
const ERRATA_RESTORE_MASK: u32 = 0x0002_0000;

/// PAC1 write-protect bit of the DSU
const PAC1_DSU: u32 = 1 << 1;

/// Polls of STATUSA before giving up on a computation
const DONE_POLL_LIMIT: u32 = 4_000_000;

/// Hardware CRC32 through the DSU
pub struct DsuCrc {
    dsu: Dsu,
}

impl DsuCrc {
    /// Take the DSU and lift its PAC1 write protection
    pub fn new(dsu: Dsu, pac1: &Pac1) -> Self {
        // SAFETY: only the DSU protection bit is cleared
        pac1.wpclr().write(|w| unsafe { w.bits(PAC1_DSU) });
        Self { dsu }
    }

    /// Release the peripheral
    pub fn free(self) -> Dsu {
        self.dsu
    }

    /// Run the DSU over a word-aligned slice
    fn hardware(&mut self, crc: u32, words: &[u8]) -> Result<u32, CrcError> {
        let dsu = &self.dsu;
        dsu.statusa()
            .write(|w| w.done().set_bit().berr().set_bit());
        // SAFETY: ADDR/LENGTH take the word-aligned start and byte length;
        // the low AMOD bits stay zero (range mode). DATA takes the seed.
        unsafe {
            dsu.addr().write(|w| w.bits(words.as_ptr() as u32));
            dsu.length().write(|w| w.bits(words.len() as u32));
            dsu.data().write(|w| w.bits(!crc));
        }
        dsu.ctrl().write(|w| w.crc().set_bit());

        let mut polls = 0;
        let status = loop {
            let status = dsu.statusa().read();
            if status.done().bit_is_set() {
                break status;
            }
            polls += 1;
            if polls == DONE_POLL_LIMIT {
                return Err(CrcError::Timeout);
            }
        };
        if status.berr().bit_is_set() {
            return Err(CrcError::BusError);
        }
        Ok(!dsu.data().read().bits())
    }
}

/// Continue `crc` over `bytes` in software
fn software(crc: u32, bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return crc;
    }
    let mut hasher = crc32fast::Hasher::new_with_initial(crc);
    hasher.update(bytes);
    hasher.finalize()
}

impl CrcEngine for DsuCrc {
    fn ram_errata(&mut self, active: bool) {
        // SAFETY: read-modify-write of a fixed bus-matrix register; only the
        // documented workaround bits change
        unsafe {
            let value = core::ptr::read_volatile(ERRATA_REG);
            let value = if active {
                value & !ERRATA_CLEAR_MASK
            } else {
                value | ERRATA_RESTORE_MASK
            };
            core::ptr::write_volatile(ERRATA_REG, value);
        }
    }

    fn update(&mut self, crc: u32, source: CrcSource<'_>) -> Result<u32, CrcError> {
        let bytes = source.bytes();
        let misalign = bytes.as_ptr() as usize % 4;
        let head_len = ((4 - misalign) % 4).min(bytes.len());
        let (head, rest) = bytes.split_at(head_len);
        let (words, tail) = rest.split_at(rest.len() & !3);

        let mut crc = software(crc, head);
        if !words.is_empty() {
            crc = self.hardware(crc, words)?;
        }
        Ok(software(crc, tail))
    }
}
