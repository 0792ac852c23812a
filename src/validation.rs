/// Structural checks over a disk image
///
/// `Basic` covers what must hold before an image can be written at all:
/// container signature, geometry and track buffers. `Strict` adds
/// filesystem consistency: boot checksum, filler in free sectors, block
/// ownership, record counts, names and file headers. Every violation found
/// is reported; callers decide which ones matter.

use crate::filesystem::{Directory, Plus3DosHeader};
use crate::format::constants::*;
use crate::image::DiskImage;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// How thorough a validation run is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    /// Container and geometry
    Basic,
    /// Container, geometry and filesystem
    Strict,
}

/// One failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Short name of the check
    pub check: &'static str,
    /// What was found
    pub message: String,
}

impl Violation {
    fn new(check: &'static str, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.check, self.message)
    }
}

/// Runs checks against one image
pub struct Validator<'a> {
    image: &'a DiskImage,
    violations: Vec<Violation>,
}

impl<'a> Validator<'a> {
    /// Validator over an image
    pub fn new(image: &'a DiskImage) -> Self {
        Self {
            image,
            violations: Vec::new(),
        }
    }

    /// Run every check for a level
    pub fn run(mut self, level: ValidationLevel) -> Vec<Violation> {
        self.check_geometry();
        self.check_tracks();
        self.check_directory_region();

        if level >= ValidationLevel::Strict {
            self.check_boot_sector();
            self.check_free_sectors();
            self.check_blocks();
            self.check_extents();
            self.check_duplicates();
            self.check_names();
            self.check_headers();
        }

        log::debug!(
            "Validation ({:?}): {} violation(s)",
            level,
            self.violations.len()
        );
        self.violations
    }

    fn report(&mut self, check: &'static str, message: impl Into<String>) {
        self.violations.push(Violation::new(check, message));
    }

    fn check_geometry(&mut self) {
        for problem in self.image.header.geometry_problems() {
            self.report("geometry", problem);
        }
    }

    fn check_tracks(&mut self) {
        let expected = self.image.header.track_count();
        if self.image.tracks.len() != expected {
            self.report(
                "tracks",
                format!(
                    "expected {} track buffers, found {}",
                    expected,
                    self.image.tracks.len()
                ),
            );
        }

        let size = self.image.header.track_size() as usize;
        let bad: Vec<(usize, usize)> = self
            .image
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.len() != size)
            .map(|(i, t)| (i, t.len()))
            .collect();
        for (index, len) in bad {
            self.report(
                "tracks",
                format!("track {} holds {} bytes, expected {}", index, len, size),
            );
        }
    }

    fn check_directory_region(&mut self) {
        let mut bytes = Vec::with_capacity(DIRECTORY_SECTORS * BYTES_PER_SECTOR);
        for i in 0..DIRECTORY_SECTORS {
            match self.image.raw_sector(DIRECTORY_START_SECTOR + i) {
                Ok(sector) => bytes.extend_from_slice(sector),
                Err(e) => {
                    self.report("directory", format!("directory sector unreadable: {}", e));
                    return;
                }
            }
        }
        if let Err(e) = Directory::from_bytes(&bytes) {
            self.report("directory", format!("directory region unreadable: {}", e));
        }
    }

    fn check_boot_sector(&mut self) {
        let boot = match self.image.boot_sector() {
            Ok(boot) => boot,
            Err(e) => {
                self.report("boot", e.to_string());
                return;
            }
        };
        if !boot.is_blank() && !boot.is_bootable() {
            self.report(
                "boot",
                format!("boot sector checksum is {}, expected 3", boot.checksum()),
            );
        }
    }

    fn check_free_sectors(&mut self) {
        let mut dirty = Vec::new();
        for linear in 0..TOTAL_SECTORS {
            if self.image.allocation.is_allocated(linear) {
                continue;
            }
            if let Ok(sector) = self.image.raw_sector(linear) {
                if sector.iter().any(|&b| b != FILLER_BYTE) {
                    dirty.push(linear);
                }
            }
        }
        for linear in dirty {
            self.report(
                "filler",
                format!("unallocated sector {} holds data", linear),
            );
        }
    }

    fn check_blocks(&mut self) {
        let directory = &self.image.directory;
        let mut owners: HashMap<usize, String> = HashMap::new();
        let mut found = Vec::new();

        for entry in directory.entries().iter().filter(|e| e.is_file()) {
            let name = entry.filename();
            for block in entry.blocks() {
                if block >= TOTAL_BLOCKS {
                    found.push(format!("{}: block {} beyond end of disk", name, block));
                    continue;
                }
                if block < RESERVED_BLOCKS {
                    found.push(format!("{}: block {} is in the system area", name, block));
                    continue;
                }
                if let Some(owner) = owners.get(&block) {
                    found.push(format!(
                        "{}: block {} already used by {}",
                        name, block, owner
                    ));
                    continue;
                }
                owners.insert(block, name.clone());

                let first = block * SECTORS_PER_BLOCK;
                if !(first..first + SECTORS_PER_BLOCK)
                    .all(|s| self.image.allocation.is_allocated(s))
                {
                    found.push(format!("{}: block {} not marked allocated", name, block));
                }
            }
        }

        for block in RESERVED_BLOCKS..TOTAL_BLOCKS {
            let first = block * SECTORS_PER_BLOCK;
            let allocated =
                (first..first + SECTORS_PER_BLOCK).any(|s| self.image.allocation.is_allocated(s));
            if allocated && !owners.contains_key(&block) {
                found.push(format!("block {} allocated but owned by no file", block));
            }
        }

        for message in found {
            self.report("blocks", message);
        }
    }

    fn check_extents(&mut self) {
        let directory = &self.image.directory;
        let mut found = Vec::new();

        for first in directory.files() {
            let extents = directory.extents_of(first);
            let Some(head) = directory.entry(first) else {
                continue;
            };
            let name = head.filename();

            let mut seen = HashSet::new();
            for (position, &index) in extents.iter().enumerate() {
                let Some(entry) = directory.entry(index) else {
                    continue;
                };
                let number = entry.extent_number();
                let records = entry.record_count();
                let blocks = entry.blocks().len();
                let is_last = position + 1 == extents.len();

                if !seen.insert(number) {
                    found.push(("duplicates", format!("{}: extent {} appears twice", name, number)));
                }
                if records > RECORDS_PER_EXTENT {
                    found.push((
                        "size",
                        format!("{}: extent {} has {} records", name, number, records),
                    ));
                }
                if records * RECORD_SIZE > blocks * BLOCK_SIZE {
                    found.push((
                        "size",
                        format!(
                            "{}: extent {} has {} records but only {} blocks",
                            name, number, records, blocks
                        ),
                    ));
                }
                if !is_last && (records != RECORDS_PER_EXTENT || blocks != BLOCKS_PER_EXTENT) {
                    found.push((
                        "extents",
                        format!("{}: extent {} is not full but is not the last", name, number),
                    ));
                }
            }

            let highest = seen.iter().copied().max().unwrap_or(0);
            for missing in (0..highest).filter(|n| !seen.contains(n)) {
                found.push(("extents", format!("{}: extent {} missing", name, missing)));
            }
        }

        for (check, message) in found {
            self.report(check, message);
        }
    }

    fn check_duplicates(&mut self) {
        let directory = &self.image.directory;
        let mut owners: HashMap<([u8; 8], [u8; 3]), u8> = HashMap::new();
        let mut found = Vec::new();

        for first in directory.files() {
            let Some(entry) = directory.entry(first) else {
                continue;
            };
            let user = entry.user().unwrap_or(0);
            let key = (entry.name_bytes(), entry.ext_bytes());
            match owners.get(&key) {
                Some(&other) => found.push(format!(
                    "{}: present under user {} and user {}",
                    entry.filename(),
                    other,
                    user
                )),
                None => {
                    owners.insert(key, user);
                }
            }
        }

        for message in found {
            self.report("duplicates", message);
        }
    }

    fn check_names(&mut self) {
        let directory = &self.image.directory;
        let mut found = Vec::new();

        for first in directory.files() {
            if let Some(entry) = directory.entry(first) {
                for problem in entry.name_problems() {
                    found.push(format!("{}: {}", entry.filename(), problem));
                }
            }
        }

        for message in found {
            self.report("names", message);
        }
    }

    fn check_headers(&mut self) {
        let directory = &self.image.directory;
        let mut found = Vec::new();

        for first in directory.files() {
            let Some(entry) = directory.entry(first) else {
                continue;
            };
            let name = entry.filename();
            let extents = directory.extents_of(first);
            let blocks: Vec<usize> = extents
                .iter()
                .filter_map(|&i| directory.entry(i))
                .flat_map(|e| e.blocks())
                .collect();
            let records: usize = extents
                .iter()
                .filter_map(|&i| directory.entry(i))
                .map(|e| e.record_count())
                .sum();

            let Some(&block) = blocks.first() else {
                continue;
            };
            if block >= TOTAL_BLOCKS || records * RECORD_SIZE < crate::filesystem::header::HEADER_SIZE {
                continue;
            }

            let mut raw = [0u8; crate::filesystem::header::HEADER_SIZE];
            if self.image.read_block(block, 0, &mut raw).is_err()
                || !Plus3DosHeader::has_signature(&raw)
            {
                continue;
            }
            let Ok(header) = Plus3DosHeader::from_bytes(&raw) else {
                continue;
            };

            for problem in header.problems() {
                found.push(format!("{}: {}", name, problem));
            }
            if header.file_length() as usize > records * RECORD_SIZE {
                found.push(format!(
                    "{}: header length {} exceeds {} recorded bytes",
                    name,
                    header.file_length(),
                    records * RECORD_SIZE
                ));
            }
        }

        for message in found {
            self.report("header", message);
        }
    }
}
