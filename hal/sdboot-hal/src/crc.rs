//! CRC32 engine abstraction
//!
//! The checksum is a standard CRC-32 (IEEE 802.3) that can be continued
//! across calls: feeding `a` then `b` yields the same value as feeding
//! `a ++ b` at once. A value of `0` stands for "no bytes seen yet".

/// Where the bytes being checksummed live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceKind {
    /// Data buffered in SRAM
    Ram,
    /// Data read in place from program memory
    Nvm,
}

/// Bytes to checksum, tagged with where they live
#[derive(Debug, Clone, Copy)]
pub enum CrcSource<'a> {
    /// SRAM-resident bytes (e.g. the row buffer)
    Ram(&'a [u8]),
    /// NVM-resident bytes (a view into program memory)
    Nvm(&'a [u8]),
}

impl<'a> CrcSource<'a> {
    /// The source-kind tag
    pub fn kind(&self) -> SourceKind {
        match self {
            CrcSource::Ram(_) => SourceKind::Ram,
            CrcSource::Nvm(_) => SourceKind::Nvm,
        }
    }

    /// The underlying bytes
    pub fn bytes(&self) -> &'a [u8] {
        match *self {
            CrcSource::Ram(bytes) | CrcSource::Nvm(bytes) => bytes,
        }
    }
}

/// Errors from the CRC engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrcError {
    /// Bus error while the engine was reading the source
    BusError,
    /// Engine did not report completion
    Timeout,
}

/// CRC32 engine
pub trait CrcEngine {
    /// Apply or release the RAM-source silicon workaround
    ///
    /// Some parts compute a wrong checksum over SRAM unless a control bit is
    /// changed right before the computation and restored right after. Callers
    /// bracket every [`CrcSource::Ram`] update with `ram_errata(true)` /
    /// `ram_errata(false)`. Engines without such an erratum keep the default.
    fn ram_errata(&mut self, _active: bool) {}

    /// Continue `crc` over the bytes of `source`
    fn update(&mut self, crc: u32, source: CrcSource<'_>) -> Result<u32, CrcError>;
}

impl<T: CrcEngine + ?Sized> CrcEngine for &mut T {
    fn ram_errata(&mut self, active: bool) {
        (**self).ram_errata(active)
    }

    fn update(&mut self, crc: u32, source: CrcSource<'_>) -> Result<u32, CrcError> {
        (**self).update(crc, source)
    }
}
