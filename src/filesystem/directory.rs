/// CP/M directory table

use crate::error::{DskError, Result};
use crate::filesystem::FileAttributes;
use crate::format::constants::*;

/// Status byte of a deleted entry
pub const STATUS_DELETED: u8 = 0xE5;

/// Status byte of a volume label
pub const STATUS_LABEL: u8 = 0x20;

/// Highest CP/M user number
pub const MAX_USER: u8 = 0x0F;

/// Characters CP/M reserves for its command line
pub(crate) const INVALID_CHARS: &[u8] = b"<>.,;:=?*[]";

/// What a directory slot currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Never written, or zeroed for immediate reuse
    Unused,
    /// Deleted, bytes kept for recovery
    Deleted,
    /// File owned by a user number
    File(u8),
    /// Disk volume label
    Label,
    /// Any other record type, preserved untouched
    Other(u8),
}

impl EntryStatus {
    /// Slot can be reused by a new entry
    pub fn is_free(&self) -> bool {
        matches!(self, EntryStatus::Unused | EntryStatus::Deleted)
    }
}

/// Split and validate a `NAME.EXT` filename into padded 8.3 fields
///
/// Lowercase letters are folded to uppercase.
pub fn parse_filename(name: &str) -> Result<([u8; 8], [u8; 3])> {
    let upper = name.trim().to_ascii_uppercase();
    let (base, ext) = match upper.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (upper.as_str(), ""),
    };

    if base.is_empty() {
        return Err(DskError::InvalidFilename(format!("{}: empty name", name)));
    }
    if base.len() > 8 {
        return Err(DskError::InvalidFilename(format!(
            "{}: name longer than 8 characters",
            name
        )));
    }
    if ext.len() > 3 {
        return Err(DskError::InvalidFilename(format!(
            "{}: extension longer than 3 characters",
            name
        )));
    }

    for b in base.bytes().chain(ext.bytes()) {
        if !(0x21..=0x7E).contains(&b) || INVALID_CHARS.contains(&b) {
            return Err(DskError::InvalidFilename(format!(
                "{}: invalid character {:?}",
                name, b as char
            )));
        }
    }

    let mut name_field = [b' '; 8];
    let mut ext_field = [b' '; 3];
    name_field[..base.len()].copy_from_slice(base.as_bytes());
    ext_field[..ext.len()].copy_from_slice(ext.as_bytes());
    Ok((name_field, ext_field))
}

/// One 32-byte directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub(crate) status: u8,
    pub(crate) name: [u8; 8],
    pub(crate) ext: [u8; 3],
    pub(crate) extent_low: u8,
    pub(crate) s1: u8,
    pub(crate) extent_high: u8,
    pub(crate) record_count: u8,
    pub(crate) blocks: [u8; BLOCKS_PER_EXTENT],
}

impl DirectoryEntry {
    /// All-zero slot
    pub fn unused() -> Self {
        Self {
            status: 0,
            name: [0; 8],
            ext: [0; 3],
            extent_low: 0,
            s1: 0,
            extent_high: 0,
            record_count: 0,
            blocks: [0; BLOCKS_PER_EXTENT],
        }
    }

    /// Slot as written by a format: every byte is the filler
    pub fn formatted() -> Self {
        Self::parse(&[FILLER_BYTE; DIRECTORY_ENTRY_SIZE])
    }

    /// Empty file extent for a validated name
    pub fn new_file(name: &str, extent: usize) -> Result<Self> {
        let (name, ext) = parse_filename(name)?;
        let mut entry = Self::unused();
        entry.name = name;
        entry.ext = ext;
        entry.set_extent_number(extent);
        Ok(entry)
    }

    /// Decode 32 raw bytes
    pub fn parse(data: &[u8; DIRECTORY_ENTRY_SIZE]) -> Self {
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        let mut blocks = [0u8; BLOCKS_PER_EXTENT];
        name.copy_from_slice(&data[1..9]);
        ext.copy_from_slice(&data[9..12]);
        blocks.copy_from_slice(&data[16..32]);

        Self {
            status: data[0],
            name,
            ext,
            extent_low: data[12],
            s1: data[13],
            extent_high: data[14],
            record_count: data[15],
            blocks,
        }
    }

    /// Encode as 32 raw bytes
    pub fn to_bytes(&self) -> [u8; DIRECTORY_ENTRY_SIZE] {
        let mut data = [0u8; DIRECTORY_ENTRY_SIZE];
        data[0] = self.status;
        data[1..9].copy_from_slice(&self.name);
        data[9..12].copy_from_slice(&self.ext);
        data[12] = self.extent_low;
        data[13] = self.s1;
        data[14] = self.extent_high;
        data[15] = self.record_count;
        data[16..32].copy_from_slice(&self.blocks);
        data
    }

    /// Classify the slot
    pub fn status(&self) -> EntryStatus {
        match self.status {
            0 if self.name.iter().all(|&b| b == 0) => EntryStatus::Unused,
            STATUS_DELETED => EntryStatus::Deleted,
            user @ 0..=MAX_USER => EntryStatus::File(user),
            STATUS_LABEL => EntryStatus::Label,
            other => EntryStatus::Other(other),
        }
    }

    /// Holds a live file extent
    pub fn is_file(&self) -> bool {
        matches!(self.status(), EntryStatus::File(_))
    }

    /// User number of a file entry
    pub fn user(&self) -> Option<u8> {
        match self.status() {
            EntryStatus::File(user) => Some(user),
            _ => None,
        }
    }

    /// Raw status byte
    pub fn status_byte(&self) -> u8 {
        self.status
    }

    /// Name field with attribute bits removed
    pub fn name_bytes(&self) -> [u8; 8] {
        self.name.map(|b| b & 0x7F)
    }

    /// Extension field with attribute bits removed
    pub fn ext_bytes(&self) -> [u8; 3] {
        self.ext.map(|b| b & 0x7F)
    }

    /// `NAME.EXT` with padding and attribute bits removed
    pub fn filename(&self) -> String {
        let name = String::from_utf8_lossy(&self.name_bytes())
            .trim_end()
            .to_string();
        let ext = String::from_utf8_lossy(&self.ext_bytes())
            .trim_end()
            .to_string();

        if ext.is_empty() {
            name
        } else {
            format!("{}.{}", name, ext)
        }
    }

    /// Does this entry carry the given name (case-insensitive)?
    pub fn matches(&self, name: &[u8; 8], ext: &[u8; 3]) -> bool {
        self.name_bytes() == *name && self.ext_bytes() == *ext
    }

    /// Logical extent number (S2 * 32 + EX)
    pub fn extent_number(&self) -> usize {
        ((self.extent_high as usize) << 5) | (self.extent_low as usize & 0x1F)
    }

    /// Set the logical extent number
    pub fn set_extent_number(&mut self, extent: usize) {
        self.extent_low = (extent & 0x1F) as u8;
        self.extent_high = ((extent >> 5) & 0x3F) as u8;
    }

    /// Records (128 bytes) used in this extent
    pub fn record_count(&self) -> usize {
        self.record_count as usize
    }

    /// Set the record count of this extent
    pub fn set_record_count(&mut self, records: usize) {
        self.record_count = records.min(u8::MAX as usize) as u8;
    }

    /// Non-zero block numbers in order
    pub fn blocks(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as usize)
            .collect()
    }

    /// Raw block pointer table
    pub fn block_table(&self) -> &[u8; BLOCKS_PER_EXTENT] {
        &self.blocks
    }

    /// Replace the block list (at most 16 blocks)
    pub fn set_blocks(&mut self, blocks: &[usize]) -> Result<()> {
        if blocks.len() > BLOCKS_PER_EXTENT {
            return Err(DskError::out_of_range(
                "extent block",
                blocks.len(),
                BLOCKS_PER_EXTENT + 1,
            ));
        }
        if let Some(&bad) = blocks.iter().find(|&&b| b == 0 || b >= TOTAL_BLOCKS) {
            return Err(DskError::out_of_range("block", bad, TOTAL_BLOCKS));
        }

        self.blocks = [0; BLOCKS_PER_EXTENT];
        for (slot, &block) in self.blocks.iter_mut().zip(blocks) {
            *slot = block as u8;
        }
        Ok(())
    }

    /// Attribute flags held in the high bits
    pub fn attributes(&self) -> FileAttributes {
        FileAttributes {
            read_only: self.ext[0] & 0x80 != 0,
            system: self.ext[1] & 0x80 != 0,
            archive: self.ext[2] & 0x80 != 0,
            user_flags: [0, 1, 2, 3].map(|i| self.name[i] & 0x80 != 0),
        }
    }

    /// Store attribute flags; reserved name bits are always cleared
    pub fn set_attributes(&mut self, attributes: &FileAttributes) {
        let flags = [attributes.read_only, attributes.system, attributes.archive];
        for (byte, flag) in self.ext.iter_mut().zip(flags) {
            *byte = (*byte & 0x7F) | if flag { 0x80 } else { 0 };
        }
        for (i, byte) in self.name.iter_mut().enumerate() {
            let flag = attributes.user_flags.get(i).copied().unwrap_or(false);
            *byte = (*byte & 0x7F) | if flag { 0x80 } else { 0 };
        }
    }

    /// Mark as deleted, keeping the rest of the bytes
    pub fn mark_deleted(&mut self) {
        self.status = STATUS_DELETED;
    }

    /// Problems with the name and extension character set
    pub fn name_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (i, &b) in self.name[4..].iter().enumerate() {
            if b & 0x80 != 0 {
                problems.push(format!("reserved attribute bit set in name byte {}", i + 4));
            }
        }
        for &b in self.name_bytes().iter().chain(self.ext_bytes().iter()) {
            if b != b' ' && (!(0x21..=0x7E).contains(&b) || INVALID_CHARS.contains(&b)) {
                problems.push(format!("invalid character {:#04X} in name", b));
            }
        }
        if self.name_bytes()[0] == b' ' {
            problems.push("empty filename".to_string());
        }
        if self.name_bytes().iter().any(|b| b.is_ascii_lowercase())
            || self.ext_bytes().iter().any(|b| b.is_ascii_lowercase())
        {
            problems.push("lowercase character in name".to_string());
        }

        problems
    }
}

impl Default for DirectoryEntry {
    fn default() -> Self {
        Self::unused()
    }
}

/// The fixed table of directory entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Table with every slot unused
    pub fn new() -> Self {
        Self {
            entries: vec![DirectoryEntry::unused(); MAX_DIRECTORY_ENTRIES],
        }
    }

    /// Table as written by a format: every slot deleted
    pub fn formatted() -> Self {
        Self {
            entries: vec![DirectoryEntry::formatted(); MAX_DIRECTORY_ENTRIES],
        }
    }

    /// Decode the raw directory region
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let expected = MAX_DIRECTORY_ENTRIES * DIRECTORY_ENTRY_SIZE;
        if data.len() != expected {
            return Err(DskError::parse(
                data.len(),
                format!("Directory region must be {} bytes", expected),
            ));
        }

        let entries = data
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .map(|chunk| {
                let mut raw = [0u8; DIRECTORY_ENTRY_SIZE];
                raw.copy_from_slice(chunk);
                DirectoryEntry::parse(&raw)
            })
            .collect();

        Ok(Self { entries })
    }

    /// Encode the directory region
    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|e| e.to_bytes()).collect()
    }

    /// All slots
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Slot by index
    pub fn entry(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    /// Mutable slot by index
    pub fn entry_mut(&mut self, index: usize) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(index)
    }

    /// Find the first extent of a live file
    pub fn find_file(&self, name: &str) -> Result<(&DirectoryEntry, usize)> {
        let index = self.find_index(name)?;
        Ok((&self.entries[index], index))
    }

    fn find_index(&self, name: &str) -> Result<usize> {
        let (name_field, ext_field) = parse_filename(name)?;
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_file() && e.matches(&name_field, &ext_field))
            .min_by_key(|(_, e)| e.extent_number())
            .map(|(i, _)| i)
            .ok_or_else(|| DskError::FileNotFound(name.to_string()))
    }

    /// Slot indices of every extent of a live file, in extent order
    pub fn extents(&self, name: &str) -> Result<Vec<usize>> {
        let (name_field, ext_field) = parse_filename(name)?;
        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_file() && e.matches(&name_field, &ext_field))
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return Err(DskError::FileNotFound(name.to_string()));
        }
        indices.sort_by_key(|&i| self.entries[i].extent_number());
        Ok(indices)
    }

    /// Slot indices of every live extent sharing the name and user of a slot
    pub fn extents_of(&self, index: usize) -> Vec<usize> {
        let Some(target) = self.entries.get(index) else {
            return Vec::new();
        };
        let (name, ext, user) = (target.name_bytes(), target.ext_bytes(), target.user());

        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_file() && e.user() == user && e.matches(&name, &ext))
            .map(|(i, _)| i)
            .collect();
        indices.sort_by_key(|&i| self.entries[i].extent_number());
        indices
    }

    /// Create the first extent of a new file in the first free slot
    pub fn add_file(&mut self, name: &str) -> Result<(&mut DirectoryEntry, usize)> {
        let entry = DirectoryEntry::new_file(name, 0)?;
        if self.find_index(name).is_ok() {
            return Err(DskError::FileExists(entry.filename()));
        }

        let index = self.claim_slot(entry)?;
        log::debug!("Directory: added {} in slot {}", name, index);
        Ok((&mut self.entries[index], index))
    }

    /// Add a further extent for an existing file
    pub fn add_extent(&mut self, name: &str, extent: usize) -> Result<usize> {
        let entry = DirectoryEntry::new_file(name, extent)?;
        self.claim_slot(entry)
    }

    fn claim_slot(&mut self, entry: DirectoryEntry) -> Result<usize> {
        let index = self
            .entries
            .iter()
            .position(|e| e.status().is_free())
            .ok_or(DskError::DirectoryFull)?;
        self.entries[index] = entry;
        Ok(index)
    }

    /// Mark every extent of a file deleted, returning the blocks it held
    pub fn delete_file(&mut self, name: &str) -> Result<Vec<usize>> {
        let mut blocks = Vec::new();
        for index in self.extents(name)? {
            let entry = &mut self.entries[index];
            blocks.extend(entry.blocks());
            entry.mark_deleted();
        }
        log::debug!("Directory: deleted {}", name);
        Ok(blocks)
    }

    /// Zero every extent of a file so its slots are immediately reusable
    pub fn erase_file(&mut self, name: &str) -> Result<Vec<usize>> {
        let mut blocks = Vec::new();
        for index in self.extents(name)? {
            blocks.extend(self.entries[index].blocks());
            self.entries[index] = DirectoryEntry::unused();
        }
        log::debug!("Directory: erased {}", name);
        Ok(blocks)
    }

    /// Release a single slot
    pub fn clear_slot(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = DirectoryEntry::unused();
        }
    }

    /// Slot indices of the first extent of every live file
    ///
    /// Extents are grouped by user number as well as name, so a name that
    /// appears under two users is listed twice.
    pub fn files(&self) -> Vec<usize> {
        let mut firsts: Vec<usize> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if !entry.is_file() {
                continue;
            }
            let existing = firsts.iter().position(|&j| {
                let other = &self.entries[j];
                other.user() == entry.user()
                    && other.matches(&entry.name_bytes(), &entry.ext_bytes())
            });
            match existing {
                Some(pos) if entry.extent_number() < self.entries[firsts[pos]].extent_number() => {
                    firsts[pos] = i;
                }
                Some(_) => {}
                None => firsts.push(i),
            }
        }
        firsts
    }

    /// Number of live files
    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    /// Blocks referenced by every live file entry
    pub fn used_blocks(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| e.is_file())
            .flat_map(|e| e.blocks())
            .collect()
    }

    /// Volume label, if one is present
    pub fn label(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.status() == EntryStatus::Label)
            .map(|e| {
                let mut raw = e.name_bytes().to_vec();
                raw.extend_from_slice(&e.ext_bytes());
                String::from_utf8_lossy(&raw).trim_end().to_string()
            })
    }

    /// Write or replace the volume label
    pub fn set_label(&mut self, label: &str) -> Result<()> {
        let upper = label.trim().to_ascii_uppercase();
        if upper.is_empty() || upper.len() > 11 {
            return Err(DskError::InvalidFilename(format!(
                "{}: label must be 1 to 11 characters",
                label
            )));
        }
        if let Some(b) = upper.bytes().find(|b| !(0x20..=0x7E).contains(b)) {
            return Err(DskError::InvalidFilename(format!(
                "{}: invalid character {:#04X}",
                label, b
            )));
        }

        let mut raw = [b' '; 11];
        raw[..upper.len()].copy_from_slice(upper.as_bytes());

        let mut entry = DirectoryEntry::unused();
        entry.status = STATUS_LABEL;
        entry.name.copy_from_slice(&raw[..8]);
        entry.ext.copy_from_slice(&raw[8..]);
        entry.set_attributes(&FileAttributes {
            read_only: true,
            system: true,
            ..FileAttributes::default()
        });

        match self
            .entries
            .iter()
            .position(|e| e.status() == EntryStatus::Label)
        {
            Some(index) => self.entries[index] = entry,
            None => {
                self.claim_slot(entry)?;
            }
        }
        Ok(())
    }

    /// Slots that can take a new entry
    pub fn free_slots(&self) -> usize {
        self.entries.iter().filter(|e| e.status().is_free()).count()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filename() {
        let (name, ext) = parse_filename("hello.bas").unwrap();
        assert_eq!(&name, b"HELLO   ");
        assert_eq!(&ext, b"BAS");

        let (name, ext) = parse_filename("README").unwrap();
        assert_eq!(&name, b"README  ");
        assert_eq!(&ext, b"   ");
    }

    #[test]
    fn test_parse_filename_rejects() {
        assert!(parse_filename("TOOLONGNAME.BAS").is_err());
        assert!(parse_filename("A.LONG").is_err());
        assert!(parse_filename(".BAS").is_err());
        assert!(parse_filename("BAD*.BAS").is_err());
        assert!(parse_filename("SP ACE.BAS").is_err());
        assert!(parse_filename("TAB\t.BAS").is_err());
    }

    #[test]
    fn test_entry_status() {
        assert_eq!(DirectoryEntry::unused().status(), EntryStatus::Unused);
        assert_eq!(DirectoryEntry::formatted().status(), EntryStatus::Deleted);

        let entry = DirectoryEntry::new_file("GAME.BIN", 0).unwrap();
        assert_eq!(entry.status(), EntryStatus::File(0));
        assert_eq!(entry.filename(), "GAME.BIN");

        let mut raw = entry.to_bytes();
        raw[0] = 0x20;
        assert_eq!(DirectoryEntry::parse(&raw).status(), EntryStatus::Label);
        raw[0] = 0x21;
        assert_eq!(DirectoryEntry::parse(&raw).status(), EntryStatus::Other(0x21));
    }

    #[test]
    fn test_entry_layout() {
        let mut entry = DirectoryEntry::new_file("A.B", 33).unwrap();
        entry.set_record_count(100);
        entry.set_blocks(&[3, 4, 10]).unwrap();

        let raw = entry.to_bytes();
        assert_eq!(raw[0], 0);
        assert_eq!(&raw[1..12], b"A       B  ");
        assert_eq!(raw[12], 1);
        assert_eq!(raw[14], 1);
        assert_eq!(raw[15], 100);
        assert_eq!(&raw[16..19], &[3, 4, 10]);
        assert_eq!(entry.extent_number(), 33);
        assert_eq!(DirectoryEntry::parse(&raw), entry);
    }

    #[test]
    fn test_set_blocks_limits() {
        let mut entry = DirectoryEntry::new_file("A", 0).unwrap();
        assert!(entry.set_blocks(&[3; 17]).is_err());
        assert!(entry.set_blocks(&[0]).is_err());
        assert!(entry.set_blocks(&[180]).is_err());
    }

    #[test]
    fn test_attributes() {
        let mut entry = DirectoryEntry::new_file("FILE.TXT", 0).unwrap();
        entry.name[6] |= 0x80;

        let attributes = FileAttributes {
            read_only: true,
            archive: true,
            user_flags: [false, true, false, false],
            ..FileAttributes::default()
        };
        entry.set_attributes(&attributes);

        assert_eq!(entry.attributes(), attributes);
        assert_eq!(entry.filename(), "FILE.TXT");
        assert_eq!(entry.ext[0], b'T' | 0x80);
        assert_eq!(entry.name[1], b'I' | 0x80);
        assert!(entry.name[4..].iter().all(|b| b & 0x80 == 0));
        assert!(entry.name_problems().is_empty());
    }

    #[test]
    fn test_add_find_delete() {
        let mut dir = Directory::formatted();
        let (entry, index) = dir.add_file("prog.bas").unwrap();
        entry.set_blocks(&[3]).unwrap();
        assert_eq!(index, 0);

        let (found, found_index) = dir.find_file("PROG.BAS").unwrap();
        assert_eq!(found_index, 0);
        assert_eq!(found.blocks(), vec![3]);

        assert!(matches!(
            dir.add_file("PROG.BAS"),
            Err(DskError::FileExists(_))
        ));

        assert_eq!(dir.delete_file("prog.bas").unwrap(), vec![3]);
        assert!(matches!(
            dir.find_file("PROG.BAS"),
            Err(DskError::FileNotFound(_))
        ));
        // deleted bytes survive for recovery
        assert_eq!(dir.entry(0).unwrap().blocks(), vec![3]);
    }

    #[test]
    fn test_erase_zeroes_slot() {
        let mut dir = Directory::new();
        dir.add_file("A.BIN").unwrap();
        dir.erase_file("A.BIN").unwrap();
        assert_eq!(dir.entry(0).unwrap().status(), EntryStatus::Unused);
    }

    #[test]
    fn test_directory_full() {
        let mut dir = Directory::new();
        for i in 0..MAX_DIRECTORY_ENTRIES {
            dir.add_file(&format!("F{}", i)).unwrap();
        }
        assert!(matches!(dir.add_file("ONEMORE"), Err(DskError::DirectoryFull)));
        assert_eq!(dir.free_slots(), 0);
    }

    #[test]
    fn test_extents_ordered() {
        let mut dir = Directory::new();
        dir.add_extent("BIG.BIN", 1).unwrap();
        dir.add_file("OTHER").unwrap();
        dir.add_extent("BIG.BIN", 0).unwrap();

        assert_eq!(dir.extents("BIG.BIN").unwrap(), vec![2, 0]);
        assert_eq!(dir.find_file("BIG.BIN").unwrap().1, 2);
        assert_eq!(dir.files(), vec![2, 1]);
        assert_eq!(dir.file_count(), 2);
    }

    #[test]
    fn test_label() {
        let mut dir = Directory::formatted();
        dir.set_label("my disk").unwrap();
        assert_eq!(dir.label().as_deref(), Some("MY DISK"));
        assert_eq!(dir.file_count(), 0);

        dir.set_label("OTHER").unwrap();
        assert_eq!(dir.label().as_deref(), Some("OTHER"));
        assert_eq!(dir.free_slots(), MAX_DIRECTORY_ENTRIES - 1);
        assert!(dir.set_label("TWELVE CHARS").is_err());
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut dir = Directory::formatted();
        dir.add_file("X.Y").unwrap();
        let bytes = dir.to_bytes();

        assert_eq!(bytes.len(), 2048);
        assert_eq!(Directory::from_bytes(&bytes).unwrap(), dir);
        assert!(Directory::from_bytes(&bytes[..100]).is_err());
    }
}
