/// Track information block and sector records

use crate::error::{DskError, Result};
use crate::format::constants::*;

/// One 8-byte sector information record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorInfo {
    /// Cylinder from the sector ID field
    pub track: u8,
    /// Head from the sector ID field
    pub side: u8,
    /// Sector ID (1-based on +3 disks)
    pub id: u8,
    /// FDC size code
    pub size_code: u8,
    /// FDC status register 1
    pub st1: u8,
    /// FDC status register 2
    pub st2: u8,
    /// Stored data length
    pub data_length: u16,
}

impl SectorInfo {
    /// Standard record for a sector index on a track
    pub fn standard(track: u8, side: u8, index: u8) -> Self {
        Self {
            track,
            side,
            id: FIRST_SECTOR_ID + index,
            size_code: SECTOR_SIZE_CODE,
            st1: 0,
            st2: 0,
            data_length: BYTES_PER_SECTOR as u16,
        }
    }

    fn parse(record: &[u8]) -> Self {
        Self {
            track: record[0],
            side: record[1],
            id: record[2],
            size_code: record[3],
            st1: record[4],
            st2: record[5],
            data_length: u16::from_le_bytes([record[6], record[7]]),
        }
    }

    fn write(&self, record: &mut [u8]) {
        record[0] = self.track;
        record[1] = self.side;
        record[2] = self.id;
        record[3] = self.size_code;
        record[4] = self.st1;
        record[5] = self.st2;
        record[6..8].copy_from_slice(&self.data_length.to_le_bytes());
    }

    /// Bytes of sector data this record accounts for
    pub fn stored_size(&self) -> usize {
        if self.data_length > 0 {
            self.data_length as usize
        } else {
            fdc_size_to_bytes(self.size_code)
        }
    }
}

/// The 256-byte block preceding each track's sector data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track number
    pub track: u8,
    /// Side number
    pub side: u8,
    /// Sector size code for the track
    pub size_code: u8,
    /// GAP#3 length
    pub gap3_length: u8,
    /// Filler byte used when formatting
    pub filler_byte: u8,
    /// Sector records in physical order
    pub sectors: Vec<SectorInfo>,
}

impl TrackInfo {
    /// Track information for a freshly formatted +3 track
    pub fn standard(track: u8, side: u8) -> Self {
        Self {
            track,
            side,
            size_code: SECTOR_SIZE_CODE,
            gap3_length: GAP3_LENGTH,
            filler_byte: FILLER_BYTE,
            sectors: (0..SECTORS_PER_TRACK as u8)
                .map(|i| SectorInfo::standard(track, side, i))
                .collect(),
        }
    }

    /// Parse a track information block
    pub fn parse(block: &[u8], offset: usize) -> Result<Self> {
        if block.len() < TRACK_INFO_BLOCK_SIZE {
            return Err(DskError::parse(offset, "Track info block truncated"));
        }
        if !block.starts_with(TRACK_INFO_MARKER) {
            return Err(DskError::parse(offset, "Invalid track marker"));
        }

        let num_sectors = block[0x15] as usize;
        let max_records = (TRACK_INFO_BLOCK_SIZE - 0x18) / SECTOR_INFO_SIZE;
        if num_sectors > max_records {
            return Err(DskError::parse(
                offset + 0x15,
                format!("Too many sectors in track: {}", num_sectors),
            ));
        }

        let sectors = (0..num_sectors)
            .map(|i| {
                let start = 0x18 + i * SECTOR_INFO_SIZE;
                SectorInfo::parse(&block[start..start + SECTOR_INFO_SIZE])
            })
            .collect();

        Ok(Self {
            track: block[0x10],
            side: block[0x11],
            size_code: block[0x14],
            gap3_length: block[0x16],
            filler_byte: block[0x17],
            sectors,
        })
    }

    /// Serialize the track information block
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut block = vec![0u8; TRACK_INFO_BLOCK_SIZE];

        block[..TRACK_INFO_MARKER.len()].copy_from_slice(TRACK_INFO_MARKER);
        block[0x10] = self.track;
        block[0x11] = self.side;
        block[0x14] = self.size_code;
        block[0x15] = self.sectors.len() as u8;
        block[0x16] = self.gap3_length;
        block[0x17] = self.filler_byte;

        for (i, sector) in self.sectors.iter().enumerate() {
            let start = 0x18 + i * SECTOR_INFO_SIZE;
            if start + SECTOR_INFO_SIZE > block.len() {
                break;
            }
            sector.write(&mut block[start..start + SECTOR_INFO_SIZE]);
        }

        block
    }

    /// Total sector data bytes following this block
    pub fn data_size(&self) -> usize {
        self.sectors.iter().map(SectorInfo::stored_size).sum()
    }

    /// Differences between this track layout and a standard +3 track
    pub fn layout_problems(&self, track: u8, side: u8) -> Vec<String> {
        let mut problems = Vec::new();

        if self.track != track || self.side != side {
            problems.push(format!(
                "track info names track {} side {}, expected track {} side {}",
                self.track, self.side, track, side
            ));
        }
        if self.sectors.len() != SECTORS_PER_TRACK {
            problems.push(format!(
                "track {}: expected {} sectors, found {}",
                track,
                SECTORS_PER_TRACK,
                self.sectors.len()
            ));
        }
        for sector in &self.sectors {
            if sector.stored_size() != BYTES_PER_SECTOR {
                problems.push(format!(
                    "track {} sector {:#04X}: size {} bytes, expected {}",
                    track,
                    sector.id,
                    sector.stored_size(),
                    BYTES_PER_SECTOR
                ));
            }
        }

        problems
    }

    /// Physical positions of the sectors ordered by sector ID
    ///
    /// The image stores each track buffer in ID order, so interleaved
    /// tracks are reordered on load.
    pub fn id_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.sectors.len()).collect();
        order.sort_by_key(|&i| self.sectors[i].id);
        order
    }
}
