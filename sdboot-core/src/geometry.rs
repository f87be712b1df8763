//! Row/page geometry and image planning
//!
//! Program memory erases by row and writes by page. An image of length `L`
//! is laid out as `floor(L / row_size)` full rows followed by one final row
//! holding the `L mod row_size` remaining bytes. The final row is always
//! processed, even when it carries no bytes.

/// Erase/program granularity of the application region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RowGeometry {
    page_size: u32,
    pages_per_row: u32,
}

impl RowGeometry {
    /// Create a geometry; both values must be non-zero
    ///
    /// Use [`crate::BootConfig::geometry`] to build a validated instance.
    pub const fn new(page_size: u32, pages_per_row: u32) -> Self {
        Self {
            page_size,
            pages_per_row,
        }
    }

    /// Page size in bytes
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Row size in bytes
    pub fn row_size(&self) -> u32 {
        self.page_size * self.pages_per_row
    }

    /// Number of complete rows in `len` bytes
    pub fn full_rows(&self, len: u32) -> u32 {
        len / self.row_size()
    }

    /// Bytes left over after the complete rows
    pub fn remainder(&self, len: u32) -> u32 {
        len % self.row_size()
    }

    /// Pages needed to hold `bytes` bytes
    pub fn pages_for(&self, bytes: u32) -> u32 {
        bytes.div_ceil(self.page_size)
    }

    /// Address of row `index` counted from `base`
    pub fn row_addr(&self, base: u32, index: u32) -> u32 {
        base + index * self.row_size()
    }

    /// Whether `addr` sits on a row boundary
    pub fn is_row_aligned(&self, addr: u32) -> bool {
        addr % self.row_size() == 0
    }

    /// Whether `addr` sits on a page boundary
    pub fn is_page_aligned(&self, addr: u32) -> bool {
        addr % self.page_size == 0
    }

    /// Lay out an image of `len` bytes
    pub fn plan(&self, len: u32) -> ImagePlan {
        let remainder = self.remainder(len);
        ImagePlan {
            full_rows: self.full_rows(len),
            remainder,
            tail_pages: self.pages_for(remainder),
        }
    }
}

/// Row layout of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImagePlan {
    /// Rows completely filled with image bytes
    pub full_rows: u32,
    /// Image bytes in the final row
    pub remainder: u32,
    /// Pages programmed in the final row
    pub tail_pages: u32,
}

impl ImagePlan {
    /// Rows processed, including the final row
    pub fn rows(&self) -> u32 {
        self.full_rows + 1
    }

    /// Rows holding at least one image byte
    pub fn data_rows(&self) -> u32 {
        self.full_rows + u32::from(self.remainder > 0)
    }

    /// Bytes of NVM needed to hold the image
    pub fn data_span(&self, geometry: &RowGeometry) -> u64 {
        self.data_rows() as u64 * geometry.row_size() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GEOMETRY: RowGeometry = RowGeometry::new(256, 4);
    const ROW: u32 = 1024;

    #[test]
    fn test_row_size() {
        assert_eq!(GEOMETRY.row_size(), ROW);
    }

    #[test]
    fn test_plan_empty_image() {
        let plan = GEOMETRY.plan(0);
        assert_eq!(plan.full_rows, 0);
        assert_eq!(plan.remainder, 0);
        assert_eq!(plan.tail_pages, 0);
        assert_eq!(plan.rows(), 1);
        assert_eq!(plan.data_rows(), 0);
        assert_eq!(plan.data_span(&GEOMETRY), 0);
    }

    #[test]
    fn test_plan_exact_row() {
        let plan = GEOMETRY.plan(ROW);
        assert_eq!(plan.full_rows, 1);
        assert_eq!(plan.remainder, 0);
        assert_eq!(plan.tail_pages, 0);
        assert_eq!(plan.rows(), 2);
        assert_eq!(plan.data_rows(), 1);
        assert_eq!(plan.data_span(&GEOMETRY), ROW as u64);
    }

    #[test]
    fn test_plan_one_past_row() {
        let plan = GEOMETRY.plan(ROW + 1);
        assert_eq!(plan.full_rows, 1);
        assert_eq!(plan.remainder, 1);
        assert_eq!(plan.tail_pages, 1);
    }

    #[test]
    fn test_plan_one_short_of_three_rows() {
        let plan = GEOMETRY.plan(3 * ROW - 1);
        assert_eq!(plan.full_rows, 2);
        assert_eq!(plan.remainder, ROW - 1);
        assert_eq!(plan.tail_pages, 4);
    }

    #[test]
    fn test_plan_1000_bytes() {
        let plan = GEOMETRY.plan(1000);
        assert_eq!(plan.full_rows, 0);
        assert_eq!(plan.remainder, 1000);
        assert_eq!(plan.tail_pages, 4);
        assert_eq!(plan.data_span(&GEOMETRY), 1024);
    }

    #[test]
    fn test_alignment() {
        assert!(GEOMETRY.is_row_aligned(0x12000));
        assert!(!GEOMETRY.is_row_aligned(0x12100));
        assert!(GEOMETRY.is_page_aligned(0x12100));
        assert!(!GEOMETRY.is_page_aligned(0x12101));
    }

    #[test]
    fn test_row_addr() {
        assert_eq!(GEOMETRY.row_addr(0x12000, 0), 0x12000);
        assert_eq!(GEOMETRY.row_addr(0x12000, 3), 0x12C00);
    }

    proptest! {
        #[test]
        fn prop_plan_covers_image(
            len in 0u32..1_000_000,
            page_shift in 3u32..12,
            pages_per_row in 1u32..=8,
        ) {
            let geometry = RowGeometry::new(1 << page_shift, pages_per_row);
            let plan = geometry.plan(len);
            let row = geometry.row_size();

            prop_assert_eq!(plan.full_rows, len / row);
            prop_assert_eq!(plan.full_rows * row + plan.remainder, len);
            prop_assert!(plan.remainder < row);
            prop_assert!(plan.tail_pages <= pages_per_row);
            prop_assert!(plan.tail_pages * geometry.page_size() >= plan.remainder);
            if plan.tail_pages > 0 {
                prop_assert!((plan.tail_pages - 1) * geometry.page_size() < plan.remainder);
            }
        }
    }
}
