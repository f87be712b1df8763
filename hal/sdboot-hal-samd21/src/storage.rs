//! Slot storage on a FAT formatted SD card
//!
//! Wraps an `embedded-sdmmc` volume manager. Only the root directory of the
//! first volume is used; flag and image names are 8.3 short names.

use embedded_sdmmc::{
    BlockDevice, Error, Mode, RawDirectory, RawFile, TimeSource, Timestamp, VolumeIdx,
    VolumeManager,
};
use sdboot_hal::{ImageStream, SlotStorage, StorageError};

/// Map filesystem errors onto the storage error kinds
fn storage_error<E: core::fmt::Debug>(error: Error<E>) -> StorageError {
    match error {
        Error::DeviceError(_) => StorageError::Device,
        Error::NotFound => StorageError::NotFound,
        Error::FilenameError(_) => StorageError::InvalidName,
        _ => StorageError::Filesystem,
    }
}

/// Timestamp source for a board without a calendar clock
///
/// The bootloader only deletes files, so directory timestamps never change.
pub struct FixedTime;

impl TimeSource for FixedTime {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 56,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// SD card slot storage
pub struct SdStorage<D: BlockDevice, T: TimeSource> {
    volumes: VolumeManager<D, T>,
    root: Option<RawDirectory>,
}

impl<D: BlockDevice, T: TimeSource> SdStorage<D, T> {
    pub fn new(device: D, time: T) -> Self {
        Self {
            volumes: VolumeManager::new(device, time),
            root: None,
        }
    }

    fn root(&self) -> Result<RawDirectory, StorageError> {
        self.root.ok_or(StorageError::NotMounted)
    }
}

impl<D: BlockDevice, T: TimeSource> SlotStorage for SdStorage<D, T> {
    type Image<'s>
        = SdImage<'s, D, T>
    where
        Self: 's;

    fn mount(&mut self) -> Result<(), StorageError> {
        if self.root.is_some() {
            return Ok(());
        }
        let volume = self
            .volumes
            .open_raw_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Mount)?;
        let root = self
            .volumes
            .open_root_dir(volume)
            .map_err(|_| StorageError::Mount)?;
        self.root = Some(root);
        Ok(())
    }

    fn flag_exists(&mut self, name: &str) -> bool {
        match self.root() {
            Ok(root) => self.volumes.find_directory_entry(root, name).is_ok(),
            Err(_) => false,
        }
    }

    fn delete_flag(&mut self, name: &str) -> Result<(), StorageError> {
        let root = self.root()?;
        self.volumes
            .delete_file_in_dir(root, name)
            .map_err(storage_error)
    }

    fn open_image(&mut self, name: &str) -> Result<SdImage<'_, D, T>, StorageError> {
        let root = self.root()?;
        let file = self
            .volumes
            .open_file_in_dir(root, name, Mode::ReadOnly)
            .map_err(storage_error)?;
        let len = match self.volumes.file_length(file) {
            Ok(len) => len,
            Err(e) => {
                let _ = self.volumes.close_file(file);
                return Err(storage_error(e));
            }
        };
        Ok(SdImage {
            volumes: &mut self.volumes,
            file,
            len,
        })
    }
}

/// Open image file; closed when dropped
pub struct SdImage<'s, D: BlockDevice, T: TimeSource> {
    volumes: &'s mut VolumeManager<D, T>,
    file: RawFile,
    len: u32,
}

impl<D: BlockDevice, T: TimeSource> ImageStream for SdImage<'_, D, T> {
    fn len(&self) -> u32 {
        self.len
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.volumes.read(self.file, &mut buf[filled..]) {
                Ok(0) | Err(Error::EndOfFile) => break,
                Ok(n) => filled += n,
                Err(e) => return Err(storage_error(e)),
            }
        }
        Ok(filled)
    }
}

impl<D: BlockDevice, T: TimeSource> Drop for SdImage<'_, D, T> {
    fn drop(&mut self) {
        let _ = self.volumes.close_file(self.file);
    }
}
