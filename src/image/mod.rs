/// Disk image: track buffers, allocation state and directory

/// Sector allocation bitmap
pub mod allocation;
/// Image builder for creating disk images
pub mod builder;
/// Disk information block
pub mod header;
/// Track information block
pub mod track;

pub use allocation::SectorAllocation;
pub use builder::DiskImageBuilder;
pub use header::DiskHeader;
pub use track::{SectorInfo, TrackInfo};

use crate::boot::BootSector;
use crate::error::{DskError, Result};
use crate::filesystem::{
    BlockAllocator, DirEntry, Directory, DirectoryEntry, File, FileAttributes, Plus3DosHeader,
};
use crate::format::constants::*;
use crate::format::geometry::{physical_to_linear, track_bounds, track_index};
use crate::validation::{ValidationLevel, Validator, Violation};
use std::path::Path;

/// Aggregate space figures for a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    /// Number of live files
    pub file_count: usize,
    /// Bytes available to files on an empty disk
    pub total_space: usize,
    /// Bytes held by file blocks
    pub used_space: usize,
    /// Bytes still available
    pub free_space: usize,
    /// Directory slots still available
    pub free_entries: usize,
}

/// A +3DOS disk image held in memory
#[derive(Debug, Clone)]
pub struct DiskImage {
    /// Disk information block
    pub(crate) header: DiskHeader,
    /// Sector data per track, sectors in ID order
    pub(crate) tracks: Vec<Vec<u8>>,
    /// Which sectors hold live data
    pub(crate) allocation: SectorAllocation,
    /// In-memory directory, flushed to its sectors on save
    pub(crate) directory: Directory,
    /// Has the image been modified since load or save?
    pub(crate) changed: bool,
    /// Original filename if loaded from disk
    pub(crate) filename: Option<String>,
}

impl DiskImage {
    /// Empty image: zeroed tracks, unused directory, only the reserved
    /// region allocated
    pub fn new() -> Self {
        let mut image = Self {
            header: DiskHeader::standard(),
            tracks: vec![vec![0u8; TRACK_SIZE]; TRACKS_PER_SIDE * SIDES_PER_DISK],
            allocation: SectorAllocation::standard(),
            directory: Directory::new(),
            changed: true,
            filename: None,
        };
        image.block_allocator().reserve_system_blocks();
        image
    }

    /// Freshly formatted image ready to take files
    pub fn create() -> Self {
        let mut image = Self::new();
        image.format();
        image
    }

    /// Create a new builder for constructing disk images
    pub fn builder() -> DiskImageBuilder {
        DiskImageBuilder::new()
    }

    /// Open a DSK file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::io::reader::read_dsk(path)
    }

    /// Parse an image from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        crate::io::reader::read_dsk_from(data)
    }

    /// Serialize the image
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            DISK_INFO_BLOCK_SIZE + self.tracks.len() * (TRACK_INFO_BLOCK_SIZE + TRACK_SIZE),
        );
        crate::io::writer::write_dsk_to(self, &mut out)?;
        Ok(out)
    }

    /// Save the image to a file
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        crate::io::writer::write_dsk(self, &path)?;
        self.filename = Some(path.as_ref().display().to_string());
        self.changed = false;
        Ok(())
    }

    /// Disk information block
    pub fn header(&self) -> &DiskHeader {
        &self.header
    }

    /// Mutable disk information block
    pub fn header_mut(&mut self) -> &mut DiskHeader {
        self.changed = true;
        &mut self.header
    }

    /// Get the original filename if loaded from disk
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Check if the image has been modified
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Mark the image as unchanged
    pub fn mark_unchanged(&mut self) {
        self.changed = false;
    }

    /// Number of track buffers
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Reformat: fill every track with filler and write a fresh directory
    pub fn format(&mut self) {
        for track in &mut self.tracks {
            track.fill(FILLER_BYTE);
        }
        self.allocation.clear();
        self.block_allocator().reserve_system_blocks();
        self.initialize_directory();
        log::debug!("Formatted disk image");
    }

    /// Reset the directory to deleted markers and release every file block
    pub fn initialize_directory(&mut self) {
        for block in self.directory.used_blocks() {
            let _ = self.block_allocator().free(&[block]);
        }
        self.directory = Directory::formatted();
        self.flush_directory();
    }

    /// Directory table
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Mutable directory table
    ///
    /// Changes to block lists are not reflected in the allocation bitmap
    /// until [`DiskImage::rebuild_allocation`] is called.
    pub fn directory_mut(&mut self) -> &mut Directory {
        self.changed = true;
        &mut self.directory
    }

    /// Sector allocation bitmap
    pub fn sector_allocation(&self) -> &SectorAllocation {
        &self.allocation
    }

    /// Block allocator over this image's bitmap
    pub fn block_allocator(&mut self) -> BlockAllocator<'_> {
        BlockAllocator::new(&mut self.allocation)
    }

    /// Derive the bitmap from the reserved region and live file entries
    pub fn rebuild_allocation(&mut self) {
        self.allocation.clear();
        let blocks = self.directory.used_blocks();

        let mut allocator = BlockAllocator::new(&mut self.allocation);
        allocator.reserve_system_blocks();
        for block in blocks {
            if let Err(e) = allocator.claim(block) {
                log::warn!("Directory references block {}: {}", block, e);
            }
        }
        log::debug!(
            "Rebuilt allocation: {} of {} sectors in use",
            self.allocation.allocated_count(),
            self.allocation.len()
        );
    }

    fn locate(&self, linear: usize) -> (usize, usize) {
        let track = linear / SECTORS_PER_TRACK;
        let offset = (linear % SECTORS_PER_TRACK) * BYTES_PER_SECTOR;
        (track, offset)
    }

    pub(crate) fn raw_sector(&self, linear: usize) -> Result<&[u8]> {
        if linear >= TOTAL_SECTORS {
            return Err(DskError::out_of_range("sector", linear, TOTAL_SECTORS));
        }
        let (track, offset) = self.locate(linear);
        Ok(&self.tracks[track][offset..offset + BYTES_PER_SECTOR])
    }

    pub(crate) fn raw_sector_mut(&mut self, linear: usize) -> Result<&mut [u8]> {
        if linear >= TOTAL_SECTORS {
            return Err(DskError::out_of_range("sector", linear, TOTAL_SECTORS));
        }
        self.changed = true;
        let (track, offset) = self.locate(linear);
        Ok(&mut self.tracks[track][offset..offset + BYTES_PER_SECTOR])
    }

    /// Read an allocated sector
    pub fn get_sector_data(&self, track: u8, sector: u8, side: u8) -> Result<&[u8]> {
        let linear = physical_to_linear(track, sector, side)?;
        if !self.allocation.is_allocated(linear) {
            return Err(DskError::SectorNotAllocated(linear));
        }
        log::trace!("Read sector T{} S{} H{}", track, sector, side);
        self.raw_sector(linear)
    }

    /// Write a full sector, allocating it if needed
    pub fn set_sector_data(&mut self, track: u8, sector: u8, side: u8, data: &[u8]) -> Result<()> {
        let linear = physical_to_linear(track, sector, side)?;
        if data.len() != BYTES_PER_SECTOR {
            return Err(DskError::invalid_format(format!(
                "sector data must be {} bytes, got {}",
                BYTES_PER_SECTOR,
                data.len()
            )));
        }

        if !self.allocation.is_allocated(linear) {
            self.allocation.allocate(linear, 1)?;
        }
        self.raw_sector_mut(linear)?.copy_from_slice(data);
        log::trace!("Wrote sector T{} S{} H{}", track, sector, side);
        Ok(())
    }

    /// Raw data of a whole track, allocated or not
    pub fn track_data(&self, track: u8, side: u8) -> Result<&[u8]> {
        let index = track_index(track, side)?;
        Ok(&self.tracks[index])
    }

    /// Replace a whole track, allocating every sector on it
    pub fn set_track_data(&mut self, track: u8, side: u8, data: &[u8]) -> Result<()> {
        let index = track_index(track, side)?;
        if data.len() != TRACK_SIZE {
            return Err(DskError::invalid_format(format!(
                "track data must be {} bytes, got {}",
                TRACK_SIZE,
                data.len()
            )));
        }

        let (first, last) = track_bounds(track, side)?;
        for linear in first..=last {
            if !self.allocation.is_allocated(linear) {
                self.allocation.allocate(linear, 1)?;
            }
        }
        self.tracks[index].copy_from_slice(data);
        self.changed = true;
        Ok(())
    }

    /// Copy bytes out of a block, starting at an offset within it
    pub(crate) fn read_block(&self, block: usize, offset: usize, buf: &mut [u8]) -> Result<()> {
        if block >= TOTAL_BLOCKS || offset + buf.len() > BLOCK_SIZE {
            return Err(DskError::out_of_range("block", block, TOTAL_BLOCKS));
        }

        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done;
            let linear = block * SECTORS_PER_BLOCK + pos / BYTES_PER_SECTOR;
            let in_sector = pos % BYTES_PER_SECTOR;
            let n = (BYTES_PER_SECTOR - in_sector).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&self.raw_sector(linear)?[in_sector..in_sector + n]);
            done += n;
        }
        Ok(())
    }

    /// Copy bytes into a block, starting at an offset within it
    pub(crate) fn write_block(&mut self, block: usize, offset: usize, data: &[u8]) -> Result<()> {
        if block >= TOTAL_BLOCKS || offset + data.len() > BLOCK_SIZE {
            return Err(DskError::out_of_range("block", block, TOTAL_BLOCKS));
        }

        let mut done = 0;
        while done < data.len() {
            let pos = offset + done;
            let linear = block * SECTORS_PER_BLOCK + pos / BYTES_PER_SECTOR;
            let in_sector = pos % BYTES_PER_SECTOR;
            let n = (BYTES_PER_SECTOR - in_sector).min(data.len() - done);
            self.raw_sector_mut(linear)?[in_sector..in_sector + n]
                .copy_from_slice(&data[done..done + n]);
            done += n;
        }
        Ok(())
    }

    /// Write the in-memory directory into its reserved sectors
    pub fn flush_directory(&mut self) {
        let bytes = self.directory.to_bytes();
        for (i, chunk) in bytes.chunks(BYTES_PER_SECTOR).enumerate() {
            if let Ok(sector) = self.raw_sector_mut(DIRECTORY_START_SECTOR + i) {
                sector.copy_from_slice(chunk);
            }
        }
    }

    /// Re-read the directory from its reserved sectors
    pub fn reload_directory(&mut self) -> Result<()> {
        let mut bytes = Vec::with_capacity(DIRECTORY_SECTORS * BYTES_PER_SECTOR);
        for i in 0..DIRECTORY_SECTORS {
            bytes.extend_from_slice(self.raw_sector(DIRECTORY_START_SECTOR + i)?);
        }
        self.directory = Directory::from_bytes(&bytes)?;
        self.rebuild_allocation();
        Ok(())
    }

    /// Boot sector contents
    pub fn boot_sector(&self) -> Result<BootSector> {
        BootSector::from_bytes(self.raw_sector(0)?)
    }

    /// Replace the boot sector
    pub fn set_boot_sector(&mut self, boot: &BootSector) -> Result<()> {
        self.raw_sector_mut(0)?.copy_from_slice(boot.as_bytes());
        Ok(())
    }

    /// Volume label
    pub fn label(&self) -> Option<String> {
        self.directory.label()
    }

    /// Set the volume label
    pub fn set_label(&mut self, label: &str) -> Result<()> {
        self.directory.set_label(label)?;
        self.changed = true;
        Ok(())
    }

    /// Disk usage summary
    pub fn usage(&self) -> DiskUsage {
        let total_space = (TOTAL_BLOCKS - RESERVED_BLOCKS) * BLOCK_SIZE;
        // sectors written outside any file do not count
        let mut referenced: Vec<usize> = self
            .directory
            .used_blocks()
            .into_iter()
            .filter(|b| (RESERVED_BLOCKS..TOTAL_BLOCKS).contains(b))
            .collect();
        referenced.sort_unstable();
        referenced.dedup();
        let used_space = referenced.len() * BLOCK_SIZE;

        DiskUsage {
            file_count: self.directory.file_count(),
            total_space,
            used_space,
            free_space: total_space.saturating_sub(used_space),
            free_entries: self.directory.free_slots(),
        }
    }

    /// Blocks of a file in file order, across all its extents
    pub fn file_blocks(&self, name: &str) -> Result<Vec<usize>> {
        let mut blocks = Vec::new();
        for index in self.directory.extents(name)? {
            if let Some(entry) = self.directory.entry(index) {
                blocks.extend(entry.blocks());
            }
        }
        Ok(blocks)
    }

    /// Records used by a file, across all its extents
    pub fn file_records(&self, name: &str) -> Result<usize> {
        Ok(self
            .directory
            .extents(name)?
            .iter()
            .filter_map(|&i| self.directory.entry(i))
            .map(DirectoryEntry::record_count)
            .sum())
    }

    /// Size of a file in bytes, header included
    pub fn file_size(&self, name: &str) -> Result<usize> {
        let records = self.file_records(name)?;
        let blocks = self.file_blocks(name)?;
        Ok(match self.header_of(&blocks, records) {
            Some(header) => bounded_length(&header, records),
            None => records * RECORD_SIZE,
        })
    }

    /// Valid PLUS3DOS header at the start of a block list, if any
    pub(crate) fn header_of(&self, blocks: &[usize], records: usize) -> Option<Plus3DosHeader> {
        let first = *blocks.first()?;
        if records * RECORD_SIZE < crate::filesystem::header::HEADER_SIZE {
            return None;
        }
        let mut raw = [0u8; crate::filesystem::header::HEADER_SIZE];
        self.read_block(first, 0, &mut raw).ok()?;
        let header = Plus3DosHeader::from_bytes(&raw).ok()?;
        header.validate().ok()?;
        Some(header)
    }

    fn describe(&self, index: usize, include_deleted: bool) -> Option<DirEntry> {
        let entry = self.directory.entry(index)?;
        let deleted = !entry.is_file();

        let extents: Vec<&DirectoryEntry> = if deleted {
            vec![entry]
        } else {
            self.directory
                .extents_of(index)
                .iter()
                .filter_map(|&i| self.directory.entry(i))
                .collect()
        };
        if deleted && !include_deleted {
            return None;
        }

        let records: usize = extents.iter().map(|e| e.record_count()).sum();
        let blocks: Vec<usize> = extents.iter().flat_map(|e| e.blocks()).collect();
        let header = if deleted {
            None
        } else {
            self.header_of(&blocks, records)
        };
        let size = match &header {
            Some(h) => bounded_length(h, records),
            None => records * RECORD_SIZE,
        };

        Some(DirEntry {
            name: entry.filename(),
            user: entry.user().unwrap_or(0),
            size,
            records,
            blocks,
            extents: extents.len(),
            attributes: entry.attributes(),
            header,
            deleted,
        })
    }

    /// Live files in directory order
    pub fn list(&self) -> Vec<DirEntry> {
        self.directory
            .files()
            .into_iter()
            .filter_map(|i| self.describe(i, false))
            .collect()
    }

    /// Live files plus deleted first extents that still carry a name
    pub fn list_all(&self) -> Vec<DirEntry> {
        let mut entries = self.list();
        for (i, entry) in self.directory.entries().iter().enumerate() {
            let formatted = entry.to_bytes()[1..12].iter().all(|&b| b == FILLER_BYTE);
            if entry.status() == crate::filesystem::EntryStatus::Deleted
                && !formatted
                && entry.extent_number() == 0
            {
                if let Some(described) = self.describe(i, true) {
                    entries.push(described);
                }
            }
        }
        entries
    }

    /// Does a live file exist?
    pub fn exists(&self, name: &str) -> bool {
        self.directory.find_file(name).is_ok()
    }

    /// Open a file for reading
    pub fn open_file(&mut self, name: &str) -> Result<File<'_>> {
        File::open(self, name)
    }

    /// Open a file for reading and writing
    pub fn edit_file(&mut self, name: &str) -> Result<File<'_>> {
        File::open_rw(self, name)
    }

    /// Create a new empty file open for writing
    pub fn create_file(&mut self, name: &str) -> Result<File<'_>> {
        File::create(self, name)
    }

    /// Whole contents of a file, header included
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.open_file(name)?;
        let mut data = vec![0u8; file.size()];
        let n = file.read_at(&mut data, 0)?;
        data.truncate(n);
        Ok(data)
    }

    /// Delete a file, keeping its entry bytes for recovery
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        self.remove_file(name, false, false)
    }

    /// Delete a file even when it is read-only
    pub fn delete_file_forced(&mut self, name: &str) -> Result<()> {
        self.remove_file(name, true, false)
    }

    /// Delete a file and zero its entries so the slots are reused at once
    pub fn erase_file(&mut self, name: &str) -> Result<()> {
        self.remove_file(name, false, true)
    }

    fn remove_file(&mut self, name: &str, force: bool, erase: bool) -> Result<()> {
        let (entry, _) = self.directory.find_file(name)?;
        if entry.attributes().read_only && !force {
            return Err(DskError::ReadOnly(entry.filename()));
        }

        let blocks = if erase {
            self.directory.erase_file(name)?
        } else {
            self.directory.delete_file(name)?
        };
        let data_blocks: Vec<usize> = blocks
            .into_iter()
            .filter(|b| (RESERVED_BLOCKS..TOTAL_BLOCKS).contains(b))
            .collect();
        self.block_allocator().free(&data_blocks)?;
        self.changed = true;

        log::debug!("Deleted {} ({} blocks freed)", name, data_blocks.len());
        Ok(())
    }

    /// Attributes of a file
    pub fn attributes(&self, name: &str) -> Result<FileAttributes> {
        let (entry, _) = self.directory.find_file(name)?;
        Ok(entry.attributes())
    }

    /// Set the attributes of every extent of a file
    pub fn set_attributes(&mut self, name: &str, attributes: &FileAttributes) -> Result<()> {
        for index in self.directory.extents(name)? {
            if let Some(entry) = self.directory.entry_mut(index) {
                entry.set_attributes(attributes);
            }
        }
        self.changed = true;
        Ok(())
    }

    /// Rename a live file
    pub fn rename_file(&mut self, from: &str, to: &str) -> Result<()> {
        let (name, ext) = crate::filesystem::parse_filename(to)?;
        if self.exists(to) {
            return Err(DskError::FileExists(to.to_string()));
        }
        for index in self.directory.extents(from)? {
            if let Some(entry) = self.directory.entry_mut(index) {
                let attributes = entry.attributes();
                entry.name = name;
                entry.ext = ext;
                entry.set_attributes(&attributes);
            }
        }
        self.changed = true;
        Ok(())
    }

    /// Move a file's blocks into one contiguous run
    ///
    /// Returns false when the file was already contiguous.
    pub fn defragment_file(&mut self, name: &str) -> Result<bool> {
        let old = self.file_blocks(name)?;
        if old.windows(2).all(|w| w[1] == w[0] + 1) {
            return Ok(false);
        }

        let new = self.defragment_blocks(&old)?;

        let extents = self.directory.extents(name)?;
        let mut remaining = new.as_slice();
        for index in extents {
            if let Some(entry) = self.directory.entry_mut(index) {
                let count = entry.blocks().len();
                let (mine, rest) = remaining.split_at(count.min(remaining.len()));
                entry.set_blocks(mine)?;
                remaining = rest;
            }
        }
        self.changed = true;
        log::debug!("Defragmented {}: {:?} -> {:?}", name, old, new);
        Ok(true)
    }

    /// Copy blocks into a fresh contiguous run and release the originals
    ///
    /// The old blocks stay allocated and untouched if no run is free.
    pub fn defragment_blocks(&mut self, old: &[usize]) -> Result<Vec<usize>> {
        if old.is_empty() {
            return Ok(Vec::new());
        }

        let start = self.block_allocator().find_contiguous_blocks(old.len())?;
        let new: Vec<usize> = (start..start + old.len()).collect();
        for &block in &new {
            self.block_allocator().claim(block)?;
        }

        let mut buf = [0u8; BLOCK_SIZE];
        for (&from, &to) in old.iter().zip(&new) {
            self.read_block(from, 0, &mut buf)?;
            self.write_block(to, 0, &buf)?;
        }

        self.block_allocator().free(old)?;
        Ok(new)
    }

    /// Run the validator at a level
    pub fn validate(&self, level: ValidationLevel) -> Vec<Violation> {
        Validator::new(self).run(level)
    }
}

impl Default for DiskImage {
    fn default() -> Self {
        Self::new()
    }
}

/// File length from a header, kept within the records the entry accounts for
fn bounded_length(header: &Plus3DosHeader, records: usize) -> usize {
    (header.file_length() as usize)
        .max(crate::filesystem::header::HEADER_SIZE)
        .min(records * RECORD_SIZE)
}
