/// DSK container and +3DOS filesystem constants

/// Extended DSK format signature
pub const EXTENDED_DSK_SIGNATURE: &[u8] = b"EXTENDED CPC DSK File\r\nDisk-Info\r\n";

/// Standard DSK format signature (recognised, never written)
pub const STANDARD_DSK_SIGNATURE: &[u8] = b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n";

/// Track-Info block marker
pub const TRACK_INFO_MARKER: &[u8] = b"Track-Info\r\n";

/// Creator tag written by this library (14 bytes, NUL padded)
pub const CREATOR_SIGNATURE: &[u8] = b"plus3dsk v0.1";

/// Length of the creator field in the disk info block
pub const CREATOR_LENGTH: usize = 14;

/// Size of disk info block
pub const DISK_INFO_BLOCK_SIZE: usize = 256;

/// Size of track info block
pub const TRACK_INFO_BLOCK_SIZE: usize = 256;

/// Size of sector info entry
pub const SECTOR_INFO_SIZE: usize = 8;

/// Offset of creator in disk info block
pub const DISK_INFO_CREATOR_OFFSET: usize = 34;

/// Offset of track count in disk info block
pub const DISK_INFO_TRACK_COUNT_OFFSET: usize = 0x30;

/// Offset of side count in disk info block
pub const DISK_INFO_SIDE_COUNT_OFFSET: usize = 0x31;

/// Offset of track size in disk info block
pub const DISK_INFO_TRACK_SIZE_OFFSET: usize = 0x32;

/// Offset of extended track size table in disk info block
pub const DISK_INFO_EXT_TRACK_SIZE_OFFSET: usize = 0x34;

/// Tracks per side
pub const TRACKS_PER_SIDE: usize = 40;

/// Sectors per track
pub const SECTORS_PER_TRACK: usize = 9;

/// Bytes per sector
pub const BYTES_PER_SECTOR: usize = 512;

/// Sides per disk
pub const SIDES_PER_DISK: usize = 1;

/// FDC size code for 512-byte sectors
pub const SECTOR_SIZE_CODE: u8 = 2;

/// First sector ID on each track
pub const FIRST_SECTOR_ID: u8 = 0x01;

/// GAP#3 length written in track info blocks
pub const GAP3_LENGTH: u8 = 0x52;

/// Filler byte for freshly formatted and unused sectors
pub const FILLER_BYTE: u8 = 0xE5;

/// Raw track data size (sectors only, no track info block)
pub const TRACK_SIZE: usize = SECTORS_PER_TRACK * BYTES_PER_SECTOR;

/// Total number of sectors on the disk
pub const TOTAL_SECTORS: usize = TRACKS_PER_SIDE * SECTORS_PER_TRACK * SIDES_PER_DISK;

/// Total data capacity in bytes
pub const DISK_SIZE_IN_BYTES: usize = TOTAL_SECTORS * BYTES_PER_SECTOR;

/// Allocation block size
pub const BLOCK_SIZE: usize = 1024;

/// Sectors grouped into one allocation block
pub const SECTORS_PER_BLOCK: usize = BLOCK_SIZE / BYTES_PER_SECTOR;

/// Total number of allocation blocks
pub const TOTAL_BLOCKS: usize = TOTAL_SECTORS / SECTORS_PER_BLOCK;

/// Blocks reserved for the boot sector
pub const BOOT_BLOCKS: usize = 1;

/// Blocks reserved for the directory
pub const DIRECTORY_BLOCKS: usize = 2;

/// Blocks never handed out to files
pub const RESERVED_BLOCKS: usize = BOOT_BLOCKS + DIRECTORY_BLOCKS;

/// Sectors never handed out to files
pub const RESERVED_SECTORS: usize = RESERVED_BLOCKS * SECTORS_PER_BLOCK;

/// Linear sector where the directory starts
pub const DIRECTORY_START_SECTOR: usize = BOOT_BLOCKS * SECTORS_PER_BLOCK;

/// Number of sectors holding the directory
pub const DIRECTORY_SECTORS: usize = DIRECTORY_BLOCKS * SECTORS_PER_BLOCK;

/// Size of a directory entry
pub const DIRECTORY_ENTRY_SIZE: usize = 32;

/// Directory slots
pub const MAX_DIRECTORY_ENTRIES: usize =
    DIRECTORY_SECTORS * BYTES_PER_SECTOR / DIRECTORY_ENTRY_SIZE;

/// Block pointers held by one directory entry
pub const BLOCKS_PER_EXTENT: usize = 16;

/// CP/M record size
pub const RECORD_SIZE: usize = 128;

/// Records addressed by a full extent
pub const RECORDS_PER_EXTENT: usize = BLOCKS_PER_EXTENT * BLOCK_SIZE / RECORD_SIZE;

/// Maximum number of blocks a single file may use
pub const MAX_BLOCKS_PER_FILE: usize = 256;

/// Largest file accepted for import
pub const MAX_IMPORT_SIZE: usize = 8 * 1024 * 1024;

/// Bytes usable by files (reserved region excluded)
pub const DATA_CAPACITY: usize = (TOTAL_BLOCKS - RESERVED_BLOCKS) * BLOCK_SIZE;

/// Convert FDC size code to actual byte size
#[inline]
pub fn fdc_size_to_bytes(size_code: u8) -> usize {
    128usize << (size_code.min(8) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_totals() {
        assert_eq!(TOTAL_SECTORS, 360);
        assert_eq!(DISK_SIZE_IN_BYTES, 184_320);
        assert_eq!(TOTAL_BLOCKS, 180);
        assert_eq!(MAX_DIRECTORY_ENTRIES, 64);
        assert_eq!(RECORDS_PER_EXTENT, 128);
        assert_eq!(DATA_CAPACITY, 177 * 1024);
    }

    #[test]
    fn test_fdc_size_to_bytes() {
        assert_eq!(fdc_size_to_bytes(0), 128);
        assert_eq!(fdc_size_to_bytes(SECTOR_SIZE_CODE), BYTES_PER_SECTOR);
        assert_eq!(fdc_size_to_bytes(3), 1024);
    }
}
