/// Physical/linear sector addressing for the fixed +3 geometry
///
/// Every function validates its inputs against the geometry constants and
/// fails with a range error; nothing is clamped.

use crate::error::{DskError, Result};
use crate::format::constants::*;

/// Physical coordinates of a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalSector {
    /// Track number (0-based)
    pub track: u8,
    /// Sector index within the track (0-based, not the sector ID)
    pub sector: u8,
    /// Side number
    pub side: u8,
}

impl PhysicalSector {
    /// Create a new physical address
    pub fn new(track: u8, sector: u8, side: u8) -> Self {
        Self {
            track,
            sector,
            side,
        }
    }

    /// Convert to a linear sector index
    pub fn linear(&self) -> Result<usize> {
        physical_to_linear(self.track, self.sector, self.side)
    }
}

fn check_track_side(track: u8, side: u8) -> Result<()> {
    if side as usize >= SIDES_PER_DISK {
        return Err(DskError::InvalidSide {
            side,
            max: (SIDES_PER_DISK - 1) as u8,
        });
    }
    if track as usize >= TRACKS_PER_SIDE {
        return Err(DskError::InvalidTrack {
            side,
            track,
            max: (TRACKS_PER_SIDE - 1) as u8,
        });
    }
    Ok(())
}

fn check_sector(track: u8, sector: u8) -> Result<()> {
    if sector as usize >= SECTORS_PER_TRACK {
        return Err(DskError::InvalidSector {
            track,
            sector,
            max: (SECTORS_PER_TRACK - 1) as u8,
        });
    }
    Ok(())
}

/// Convert physical coordinates to a linear sector index
pub fn physical_to_linear(track: u8, sector: u8, side: u8) -> Result<usize> {
    check_track_side(track, side)?;
    check_sector(track, sector)?;

    Ok(side as usize * TRACKS_PER_SIDE * SECTORS_PER_TRACK
        + track as usize * SECTORS_PER_TRACK
        + sector as usize)
}

/// Convert a linear sector index back to physical coordinates
pub fn linear_to_physical(linear: usize) -> Result<PhysicalSector> {
    if linear >= TOTAL_SECTORS {
        return Err(DskError::out_of_range("sector", linear, TOTAL_SECTORS));
    }

    let sectors_per_side = TRACKS_PER_SIDE * SECTORS_PER_TRACK;
    let side = linear / sectors_per_side;
    let remainder = linear % sectors_per_side;

    Ok(PhysicalSector {
        track: (remainder / SECTORS_PER_TRACK) as u8,
        sector: (remainder % SECTORS_PER_TRACK) as u8,
        side: side as u8,
    })
}

/// First and last linear sector of a track (inclusive)
pub fn track_bounds(track: u8, side: u8) -> Result<(usize, usize)> {
    let first = physical_to_linear(track, 0, side)?;
    Ok((first, first + SECTORS_PER_TRACK - 1))
}

/// Index of the track buffer holding a track
pub fn track_index(track: u8, side: u8) -> Result<usize> {
    check_track_side(track, side)?;
    Ok(side as usize * TRACKS_PER_SIDE + track as usize)
}

/// Byte offset of a sector within the concatenated sector data of the disk
pub fn byte_offset(track: u8, sector: u8, side: u8) -> Result<u64> {
    let linear = physical_to_linear(track, sector, side)?;
    Ok((linear * BYTES_PER_SECTOR) as u64)
}

/// Byte offset of a sector within the serialized DSK image
///
/// Accounts for the disk info block and one track info block per track.
pub fn image_offset(track: u8, sector: u8, side: u8) -> Result<u64> {
    let index = track_index(track, side)?;
    check_sector(track, sector)?;

    Ok((DISK_INFO_BLOCK_SIZE
        + index * (TRACK_INFO_BLOCK_SIZE + TRACK_SIZE)
        + TRACK_INFO_BLOCK_SIZE
        + sector as usize * BYTES_PER_SECTOR) as u64)
}

/// First linear sector of an allocation block
pub fn block_to_sector(block: usize) -> Result<usize> {
    if block >= TOTAL_BLOCKS {
        return Err(DskError::out_of_range("block", block, TOTAL_BLOCKS));
    }
    Ok(block * SECTORS_PER_BLOCK)
}

/// Allocation block containing a linear sector
pub fn sector_to_block(linear: usize) -> Result<usize> {
    if linear >= TOTAL_SECTORS {
        return Err(DskError::out_of_range("sector", linear, TOTAL_SECTORS));
    }
    Ok(linear / SECTORS_PER_BLOCK)
}
