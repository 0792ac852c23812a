/// Container signatures and +3 sector addressing

/// Format constants
pub mod constants;
/// Sector addressing for the fixed geometry
pub mod geometry;

pub use constants::*;
pub use geometry::{
    block_to_sector, byte_offset, image_offset, linear_to_physical, physical_to_linear,
    sector_to_block, track_bounds, track_index, PhysicalSector,
};

/// Container a disk information block announces
///
/// Only the extended container can describe the +3 layout; a standard
/// container is recognised so it can be reported, not loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskImageFormat {
    /// "MV - CPCEMU" container with one size for every track
    StandardDSK,
    /// "EXTENDED CPC DSK" container with a track size table
    ExtendedDSK,
}

impl DiskImageFormat {
    /// Identify the container from the start of a disk information block
    ///
    /// The whole signature including its line breaks must match.
    pub fn detect(block: &[u8]) -> Option<Self> {
        [Self::ExtendedDSK, Self::StandardDSK]
            .into_iter()
            .find(|format| block.starts_with(format.signature()))
    }

    /// Signature written at offset 0
    pub fn signature(&self) -> &'static [u8] {
        match self {
            DiskImageFormat::StandardDSK => STANDARD_DSK_SIGNATURE,
            DiskImageFormat::ExtendedDSK => EXTENDED_DSK_SIGNATURE,
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            DiskImageFormat::StandardDSK => "Standard DSK",
            DiskImageFormat::ExtendedDSK => "Extended DSK",
        }
    }

    /// Can images in this container be loaded and saved?
    pub fn is_supported(&self) -> bool {
        matches!(self, DiskImageFormat::ExtendedDSK)
    }
}
