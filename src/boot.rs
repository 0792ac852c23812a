/// Boot sector handling
///
/// The first sector of a +3 disk optionally carries a disk specification
/// record and Z80 boot code. The +3 ROM only boots a disk whose boot
/// sector bytes sum to 3 modulo 256; byte 15 is reserved as the fix-up.

use crate::error::{DskError, Result};
use crate::format::constants::*;

/// Offset of the checksum fix-up byte
pub const BOOT_CHECKSUM_OFFSET: usize = 15;

/// Offset where boot code starts
pub const BOOT_CODE_OFFSET: usize = 16;

/// Longest boot code that fits in the sector
pub const MAX_BOOT_CODE: usize = BYTES_PER_SECTOR - BOOT_CODE_OFFSET;

/// Checksum a bootable sector must have
pub const BOOT_CHECKSUM: u8 = 3;

/// The 10-byte disk specification record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpecification {
    /// Format type (0 = +3 single sided)
    pub format: u8,
    /// Sidedness (0 = single)
    pub sidedness: u8,
    /// Tracks per side
    pub tracks: u8,
    /// Sectors per track
    pub sectors: u8,
    /// log2(sector size) - 7
    pub sector_size_code: u8,
    /// Reserved tracks before the directory
    pub reserved_tracks: u8,
    /// log2(block size) - 7
    pub block_shift: u8,
    /// Directory blocks
    pub directory_blocks: u8,
    /// Read/write gap length
    pub gap_rw: u8,
    /// Format gap length
    pub gap_format: u8,
}

impl DiskSpecification {
    /// Record describing this library's layout
    pub fn standard() -> Self {
        Self {
            format: 0,
            sidedness: 0,
            tracks: TRACKS_PER_SIDE as u8,
            sectors: SECTORS_PER_TRACK as u8,
            sector_size_code: SECTOR_SIZE_CODE,
            reserved_tracks: 0,
            block_shift: (BLOCK_SIZE / RECORD_SIZE).trailing_zeros() as u8,
            directory_blocks: DIRECTORY_BLOCKS as u8,
            gap_rw: 0x2A,
            gap_format: GAP3_LENGTH,
        }
    }

    /// Encode into the first 10 bytes of a sector
    pub fn write(&self, sector: &mut [u8]) {
        sector[..10].copy_from_slice(&[
            self.format,
            self.sidedness,
            self.tracks,
            self.sectors,
            self.sector_size_code,
            self.reserved_tracks,
            self.block_shift,
            self.directory_blocks,
            self.gap_rw,
            self.gap_format,
        ]);
    }

    /// Decode from the first 10 bytes of a sector
    pub fn parse(sector: &[u8]) -> Option<Self> {
        if sector.len() < 10 {
            return None;
        }
        Some(Self {
            format: sector[0],
            sidedness: sector[1],
            tracks: sector[2],
            sectors: sector[3],
            sector_size_code: sector[4],
            reserved_tracks: sector[5],
            block_shift: sector[6],
            directory_blocks: sector[7],
            gap_rw: sector[8],
            gap_format: sector[9],
        })
    }
}

/// The 512-byte boot sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    data: Vec<u8>,
}

impl BootSector {
    /// Freshly formatted sector: all filler, not bootable
    pub fn blank() -> Self {
        Self {
            data: vec![FILLER_BYTE; BYTES_PER_SECTOR],
        }
    }

    /// Bootable sector holding a specification record and boot code
    pub fn with_code(code: &[u8]) -> Result<Self> {
        if code.len() > MAX_BOOT_CODE {
            return Err(DskError::FileTooLarge {
                size: code.len(),
                max: MAX_BOOT_CODE,
            });
        }

        let mut data = vec![0u8; BYTES_PER_SECTOR];
        DiskSpecification::standard().write(&mut data);
        data[BOOT_CODE_OFFSET..BOOT_CODE_OFFSET + code.len()].copy_from_slice(code);

        let mut sector = Self { data };
        sector.fix_checksum();
        Ok(sector)
    }

    /// Wrap raw sector bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() != BYTES_PER_SECTOR {
            return Err(DskError::invalid_format(format!(
                "boot sector must be {} bytes, got {}",
                BYTES_PER_SECTOR,
                data.len()
            )));
        }
        Ok(Self {
            data: data.to_vec(),
        })
    }

    /// Raw sector bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Sum of all bytes modulo 256
    pub fn checksum(&self) -> u8 {
        self.data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
    }

    /// Would the +3 ROM boot from this sector?
    pub fn is_bootable(&self) -> bool {
        self.checksum() == BOOT_CHECKSUM
    }

    /// Sector still holds only the format filler
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == FILLER_BYTE)
    }

    /// Adjust byte 15 so the sector checksums to 3
    pub fn fix_checksum(&mut self) {
        self.data[BOOT_CHECKSUM_OFFSET] = 0;
        let sum = self.checksum();
        self.data[BOOT_CHECKSUM_OFFSET] = BOOT_CHECKSUM.wrapping_sub(sum);
    }

    /// Disk specification record, unless the sector is blank
    pub fn specification(&self) -> Option<DiskSpecification> {
        if self.is_blank() {
            None
        } else {
            DiskSpecification::parse(&self.data)
        }
    }

    /// Boot code area
    pub fn code(&self) -> &[u8] {
        &self.data[BOOT_CODE_OFFSET..]
    }
}

impl Default for BootSector {
    fn default() -> Self {
        Self::blank()
    }
}
