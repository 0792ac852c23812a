/// Disk information block

use crate::error::{DskError, Result};
use crate::format::constants::*;
use crate::format::DiskImageFormat;

/// The 256-byte disk information block at the start of every image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskHeader {
    /// Container type detected from the signature
    pub(crate) format: DiskImageFormat,
    /// Creator tag (at most 14 bytes)
    pub(crate) creator: String,
    /// Tracks per side
    pub(crate) num_tracks: u8,
    /// Number of sides
    pub(crate) num_sides: u8,
    /// Bytes of sector data per track
    pub(crate) track_size: u16,
}

impl DiskHeader {
    /// Header describing the standard +3 geometry
    pub fn standard() -> Self {
        Self {
            format: DiskImageFormat::ExtendedDSK,
            creator: String::from_utf8_lossy(CREATOR_SIGNATURE).into_owned(),
            num_tracks: TRACKS_PER_SIDE as u8,
            num_sides: SIDES_PER_DISK as u8,
            track_size: TRACK_SIZE as u16,
        }
    }

    /// Container type
    pub fn format(&self) -> DiskImageFormat {
        self.format
    }

    /// Creator tag
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Replace the creator tag, truncated to the field width
    pub fn set_creator(&mut self, creator: &str) {
        let mut tag = String::new();
        for ch in creator.chars() {
            if tag.len() + ch.len_utf8() > CREATOR_LENGTH {
                break;
            }
            tag.push(ch);
        }
        self.creator = tag;
    }

    /// Tracks per side
    pub fn num_tracks(&self) -> u8 {
        self.num_tracks
    }

    /// Number of sides
    pub fn num_sides(&self) -> u8 {
        self.num_sides
    }

    /// Declared track data size in bytes
    pub fn track_size(&self) -> u16 {
        self.track_size
    }

    /// Number of track buffers the header describes
    pub fn track_count(&self) -> usize {
        self.num_tracks as usize * self.num_sides as usize
    }

    /// Parse a disk information block
    ///
    /// Only the container framing is checked here; geometry is checked by
    /// [`DiskHeader::geometry_problems`].
    pub fn parse(block: &[u8]) -> Result<Self> {
        if block.len() < DISK_INFO_BLOCK_SIZE {
            return Err(DskError::parse(
                block.len(),
                "Disk info block truncated",
            ));
        }

        let format = DiskImageFormat::detect(block)
            .ok_or_else(|| DskError::invalid_format("Unknown DSK signature"))?;

        let creator_field =
            &block[DISK_INFO_CREATOR_OFFSET..DISK_INFO_CREATOR_OFFSET + CREATOR_LENGTH];
        let creator_len = creator_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(CREATOR_LENGTH);
        let creator = String::from_utf8_lossy(&creator_field[..creator_len])
            .trim_end()
            .to_string();

        let num_tracks = block[DISK_INFO_TRACK_COUNT_OFFSET];
        let num_sides = block[DISK_INFO_SIDE_COUNT_OFFSET];
        let mut track_size = u16::from_le_bytes([
            block[DISK_INFO_TRACK_SIZE_OFFSET],
            block[DISK_INFO_TRACK_SIZE_OFFSET + 1],
        ]);

        // Other tools leave 0x32 zero in extended images and rely on the table
        if track_size == 0 && format == DiskImageFormat::ExtendedDSK {
            let units = block[DISK_INFO_EXT_TRACK_SIZE_OFFSET] as usize;
            track_size = (units * 256).saturating_sub(TRACK_INFO_BLOCK_SIZE) as u16;
        }

        log::debug!(
            "Disk info: {} creator='{}' tracks={} sides={} track_size={}",
            format.name(),
            creator,
            num_tracks,
            num_sides,
            track_size
        );

        Ok(Self {
            format,
            creator,
            num_tracks,
            num_sides,
            track_size,
        })
    }

    /// Serialize as an Extended DSK disk information block
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut block = vec![0u8; DISK_INFO_BLOCK_SIZE];

        block[..EXTENDED_DSK_SIGNATURE.len()].copy_from_slice(EXTENDED_DSK_SIGNATURE);

        let creator = self.creator.as_bytes();
        let creator_len = creator.len().min(CREATOR_LENGTH);
        block[DISK_INFO_CREATOR_OFFSET..DISK_INFO_CREATOR_OFFSET + creator_len]
            .copy_from_slice(&creator[..creator_len]);

        block[DISK_INFO_TRACK_COUNT_OFFSET] = self.num_tracks;
        block[DISK_INFO_SIDE_COUNT_OFFSET] = self.num_sides;

        let track_size = self.track_size.to_le_bytes();
        block[DISK_INFO_TRACK_SIZE_OFFSET] = track_size[0];
        block[DISK_INFO_TRACK_SIZE_OFFSET + 1] = track_size[1];

        // Track size table, in 256-byte units including the track info block
        let units = (TRACK_INFO_BLOCK_SIZE + self.track_size as usize).div_ceil(256) as u8;
        for i in 0..self.track_count() {
            let offset = DISK_INFO_EXT_TRACK_SIZE_OFFSET + i;
            if offset < block.len() {
                block[offset] = units;
            }
        }

        block
    }

    /// Differences between this header and the fixed +3 geometry
    pub fn geometry_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !self.format.is_supported() {
            problems.push(format!("unsupported container: {}", self.format.name()));
        }
        if self.num_tracks as usize != TRACKS_PER_SIDE {
            problems.push(format!(
                "invalid track count: expected {}, got {}",
                TRACKS_PER_SIDE, self.num_tracks
            ));
        }
        if self.num_sides as usize != SIDES_PER_DISK {
            problems.push(format!(
                "invalid side count: expected {}, got {}",
                SIDES_PER_DISK, self.num_sides
            ));
        }
        if self.track_size as usize != TRACK_SIZE {
            problems.push(format!(
                "invalid track size: expected {}, got {}",
                TRACK_SIZE, self.track_size
            ));
        }

        problems
    }
}

impl Default for DiskHeader {
    fn default() -> Self {
        Self::standard()
    }
}
