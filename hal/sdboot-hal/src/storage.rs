//! Removable storage abstractions
//!
//! The bootloader only needs to test for and delete small marker files
//! ("flags") and to stream an image file front to back.

/// Errors from storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Card did not initialize or carries no readable filesystem
    Mount,
    /// Storage used before a successful mount
    NotMounted,
    /// File not found
    NotFound,
    /// Name cannot be represented on the filesystem
    InvalidName,
    /// Underlying block device reported an error
    Device,
    /// Filesystem structures are inconsistent
    Filesystem,
}

/// Forward-only byte stream over one image file
pub trait ImageStream {
    /// Total length of the image in bytes
    fn len(&self) -> u32;

    /// Whether the image is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `buf.len()` bytes
    ///
    /// Returns fewer bytes than requested only at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;
}

/// Storage holding slot flags and firmware images
pub trait SlotStorage {
    /// Open image handle; borrows the storage while alive
    type Image<'s>: ImageStream
    where
        Self: 's;

    /// Bring up the card and mount its filesystem
    fn mount(&mut self) -> Result<(), StorageError>;

    /// Check whether a flag file exists
    fn flag_exists(&mut self, name: &str) -> bool;

    /// Delete a flag file
    fn delete_flag(&mut self, name: &str) -> Result<(), StorageError>;

    /// Open an image file for sequential reading
    fn open_image(&mut self, name: &str) -> Result<Self::Image<'_>, StorageError>;
}
