//! Integrity verification
//!
//! A [`Crc32`] accumulator is fed the same image bytes twice: once from the
//! row buffer in RAM and once from program memory after the row is written.
//! Both sides go through [`continue_crc`], so the RAM-source workaround is
//! applied identically for every chunk.

use sdboot_hal::{CrcEngine, CrcError, CrcSource, SourceKind};

use crate::log;

/// Continue `crc` over `source`, bracketing RAM sources with the erratum
/// workaround
pub fn continue_crc<E: CrcEngine + ?Sized>(
    engine: &mut E,
    crc: u32,
    source: CrcSource<'_>,
) -> Result<u32, CrcError> {
    match source.kind() {
        SourceKind::Ram => {
            engine.ram_errata(true);
            let result = engine.update(crc, source);
            engine.ram_errata(false);
            result
        }
        SourceKind::Nvm => engine.update(crc, source),
    }
}

/// One-shot checksum of `source`
pub fn checksum<E: CrcEngine + ?Sized>(
    engine: &mut E,
    source: CrcSource<'_>,
) -> Result<u32, CrcError> {
    continue_crc(engine, 0, source)
}

/// Running CRC32 over a chunked byte sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc32 {
    value: u32,
}

impl Crc32 {
    /// Accumulator over zero bytes
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Checksum of everything fed so far
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Append one chunk
    pub fn feed<E: CrcEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        source: CrcSource<'_>,
    ) -> Result<(), CrcError> {
        self.value = continue_crc(engine, self.value, source)?;
        Ok(())
    }
}

/// Result of comparing source and programmed checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Verdict {
    /// Checksum over the image bytes read from storage
    pub source: u32,
    /// Checksum over the same bytes read back from NVM
    pub nvm: u32,
    /// First row where the running checksums diverged
    pub first_mismatch_row: Option<u32>,
}

impl Verdict {
    /// Whether both checksums agree
    pub fn is_match(&self) -> bool {
        self.source == self.nvm
    }
}

/// Paired source/NVM accumulators with per-row divergence tracking
#[derive(Debug, Clone, Default)]
pub struct ImageVerifier {
    source: Crc32,
    nvm: Crc32,
    first_mismatch_row: Option<u32>,
}

impl ImageVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one row: `ram` is the buffered source data, `nvm` the
    /// programmed bytes read back, both restricted to the real image bytes
    pub fn record_row<E: CrcEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        row: u32,
        ram: &[u8],
        nvm: &[u8],
    ) -> Result<(), CrcError> {
        self.source.feed(engine, CrcSource::Ram(ram))?;
        self.nvm.feed(engine, CrcSource::Nvm(nvm))?;

        if self.first_mismatch_row.is_none() && self.source != self.nvm {
            log::warn!(
                "Row {}: checksum diverged (source {=u32:#x}, nvm {=u32:#x})",
                row,
                self.source.value(),
                self.nvm.value()
            );
            self.first_mismatch_row = Some(row);
        }
        Ok(())
    }

    /// Current comparison
    pub fn verdict(&self) -> Verdict {
        Verdict {
            source: self.source.value(),
            nvm: self.nvm.value(),
            first_mismatch_row: self.first_mismatch_row,
        }
    }
}

/// Table-driven software CRC32
///
/// Used on the host, and by hardware engines for bytes the peripheral
/// cannot reach.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrc;

impl CrcEngine for SoftwareCrc {
    fn update(&mut self, crc: u32, source: CrcSource<'_>) -> Result<u32, CrcError> {
        let mut hasher = crc32fast::Hasher::new_with_initial(crc);
        hasher.update(source.bytes());
        Ok(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pattern, CrcEvent, RecordingCrc};
    use proptest::prelude::*;

    #[test]
    fn test_check_value() {
        let crc = checksum(&mut SoftwareCrc, CrcSource::Ram(b"123456789")).unwrap();
        assert_eq!(crc, 0xCBF4_3926);
    }

    #[test]
    fn test_empty_input_is_zero() {
        let mut acc = Crc32::new();
        acc.feed(&mut SoftwareCrc, CrcSource::Nvm(&[])).unwrap();
        assert_eq!(acc.value(), 0);
    }

    #[test]
    fn test_source_kind_does_not_change_value() {
        let data = pattern(300);
        let ram = checksum(&mut SoftwareCrc, CrcSource::Ram(&data)).unwrap();
        let nvm = checksum(&mut SoftwareCrc, CrcSource::Nvm(&data)).unwrap();
        assert_eq!(ram, nvm);
    }

    #[test]
    fn test_errata_brackets_ram_only() {
        let mut engine = RecordingCrc::new();
        let data = pattern(16);

        let mut acc = Crc32::new();
        acc.feed(&mut engine, CrcSource::Ram(&data)).unwrap();
        acc.feed(&mut engine, CrcSource::Nvm(&data)).unwrap();

        assert_eq!(
            engine.events,
            vec![
                CrcEvent::Errata(true),
                CrcEvent::Update(SourceKind::Ram, 16),
                CrcEvent::Errata(false),
                CrcEvent::Update(SourceKind::Nvm, 16),
            ]
        );
        assert_eq!(engine.unprotected_ram_updates, 0);
    }

    #[test]
    fn test_errata_released_on_engine_failure() {
        let mut engine = RecordingCrc::new();
        engine.fail = true;

        let mut acc = Crc32::new();
        assert_eq!(
            acc.feed(&mut engine, CrcSource::Ram(&[1, 2, 3])),
            Err(CrcError::BusError)
        );
        assert!(!engine.errata_active);
    }

    #[test]
    fn test_verifier_tracks_first_divergent_row() {
        let mut verifier = ImageVerifier::new();
        let good = pattern(64);
        let mut bad = good.clone();
        bad[10] ^= 0xFF;

        verifier.record_row(&mut SoftwareCrc, 0, &good, &good).unwrap();
        verifier.record_row(&mut SoftwareCrc, 1, &good, &bad).unwrap();
        verifier.record_row(&mut SoftwareCrc, 2, &good, &good).unwrap();

        let verdict = verifier.verdict();
        assert!(!verdict.is_match());
        assert_eq!(verdict.first_mismatch_row, Some(1));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_checksum(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            cuts in proptest::collection::vec(any::<usize>(), 0..8),
        ) {
            let whole = checksum(&mut SoftwareCrc, CrcSource::Ram(&data)).unwrap();

            let mut bounds: Vec<usize> = cuts
                .iter()
                .map(|cut| if data.is_empty() { 0 } else { cut % (data.len() + 1) })
                .collect();
            bounds.push(0);
            bounds.push(data.len());
            bounds.sort_unstable();

            let mut acc = Crc32::new();
            for window in bounds.windows(2) {
                acc.feed(&mut SoftwareCrc, CrcSource::Nvm(&data[window[0]..window[1]])).unwrap();
            }
            prop_assert_eq!(acc.value(), whole);
        }
    }
}
