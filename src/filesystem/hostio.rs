/// Import and export of host byte buffers
///
/// Imports wrap the payload in a PLUS3DOS header when a file kind is given.
/// Every import checks size limits and free space before it creates a
/// directory entry, and removes the entry again if writing fails.

use crate::error::{DskError, Result};
use crate::filesystem::allocator::blocks_needed;
use crate::filesystem::directory::INVALID_CHARS;
use crate::filesystem::header::{
    FileKind, Plus3DosHeader, HEADER_SIZE, NO_AUTOSTART, SCREEN_ADDRESS, SCREEN_LENGTH,
};
use crate::format::constants::*;
use crate::image::DiskImage;
use std::path::Path;

/// How to store an imported buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Header kind to prepend, or `None` for a raw file
    pub kind: Option<FileKind>,
}

impl ImportOptions {
    /// Raw import, no header
    pub fn raw() -> Self {
        Self { kind: None }
    }

    /// Headered import of the given kind
    pub fn headered(kind: FileKind) -> Self {
        Self { kind: Some(kind) }
    }
}

/// Derive an 8.3 disk filename from a host path
///
/// Characters CP/M cannot store are dropped, the name is upper-cased and
/// truncated. `ext` replaces the host extension when given.
pub fn disk_filename(path: &Path, ext: Option<&str>) -> String {
    fn clean(s: &str, max: usize) -> String {
        s.bytes()
            .filter(|b| (0x21..=0x7E).contains(b) && !INVALID_CHARS.contains(b))
            .map(|b| (b as char).to_ascii_uppercase())
            .take(max)
            .collect()
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let host_ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = clean(&stem, 8);
    if name.is_empty() {
        name = "FILE".to_string();
    }
    let ext = clean(ext.unwrap_or(&host_ext), 3);

    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

impl DiskImage {
    /// Store a host buffer as a new file
    pub fn import(&mut self, name: &str, data: &[u8], options: &ImportOptions) -> Result<()> {
        if data.len() > MAX_IMPORT_SIZE {
            return Err(DskError::FileTooLarge {
                size: data.len(),
                max: MAX_IMPORT_SIZE,
            });
        }

        let contents = match options.kind {
            Some(kind) => {
                let header = Plus3DosHeader::for_data(kind, data.len())?;
                let mut contents = Vec::with_capacity(HEADER_SIZE + data.len());
                contents.extend_from_slice(&header.to_bytes());
                contents.extend_from_slice(data);
                contents
            }
            None => data.to_vec(),
        };

        let blocks = blocks_needed(contents.len());
        if blocks > MAX_BLOCKS_PER_FILE {
            return Err(DskError::FileTooLarge {
                size: contents.len(),
                max: MAX_BLOCKS_PER_FILE * BLOCK_SIZE,
            });
        }
        if blocks > self.block_allocator().free_block_count() {
            return Err(DskError::DiskFull);
        }
        if blocks.div_ceil(BLOCKS_PER_EXTENT).max(1) > self.directory().free_slots() {
            return Err(DskError::DirectoryFull);
        }

        let mut file = self.create_file(name)?;
        let outcome = match file.write_at(&contents, 0) {
            Ok(_) => file.close(),
            Err(e) => {
                drop(file);
                Err(e)
            }
        };

        if let Err(e) = outcome {
            log::warn!("Import of {} failed, removing partial file: {}", name, e);
            let _ = self.erase_file(name);
            return Err(e);
        }

        log::debug!(
            "Imported {} ({} bytes, headered={})",
            name,
            data.len(),
            options.kind.is_some()
        );
        Ok(())
    }

    /// Store a BASIC program; `line` of `NO_AUTOSTART` or above means no autostart
    pub fn import_basic(&mut self, name: &str, data: &[u8], line: u16) -> Result<()> {
        let program_length = u16::try_from(data.len()).map_err(|_| DskError::FileTooLarge {
            size: data.len(),
            max: u16::MAX as usize,
        })?;
        let kind = FileKind::Program {
            line,
            program_length,
        };
        self.import(name, data, &ImportOptions::headered(kind))
    }

    /// Store a BASIC program without autostart
    pub fn import_basic_no_autostart(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.import_basic(name, data, NO_AUTOSTART)
    }

    /// Store a block of machine code loading at `load_address`
    pub fn import_code(&mut self, name: &str, data: &[u8], load_address: u16) -> Result<()> {
        self.import(
            name,
            data,
            &ImportOptions::headered(FileKind::Code { load_address }),
        )
    }

    /// Store a 6912-byte screen dump
    pub fn import_screen(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if data.len() != SCREEN_LENGTH {
            return Err(DskError::invalid_format(format!(
                "screen must be {} bytes, got {}",
                SCREEN_LENGTH,
                data.len()
            )));
        }
        self.import(name, data, &ImportOptions::headered(FileKind::screen()))
    }

    /// Store a buffer without a header
    pub fn import_raw(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.import(name, data, &ImportOptions::raw())
    }

    /// Whole file contents, optionally without the header
    ///
    /// Stripping only applies to files with a valid header.
    pub fn export(&mut self, name: &str, strip_header: bool) -> Result<Vec<u8>> {
        let mut data = self.read_file(name)?;
        let headered = self.file_header(name)?.is_some();
        if strip_header && headered {
            data.drain(..HEADER_SIZE.min(data.len()));
        }
        log::debug!("Exported {} ({} bytes)", name, data.len());
        Ok(data)
    }

    /// Program bytes of a file that holds a BASIC program
    pub fn export_basic(&mut self, name: &str) -> Result<Vec<u8>> {
        let header = self
            .file_header(name)?
            .ok_or_else(|| DskError::invalid_header(format!("{}: not a BASIC program (no header)", name)))?;
        if !matches!(header.kind(), Ok(FileKind::Program { .. })) {
            return Err(DskError::invalid_header(format!(
                "{}: not a BASIC program ({})",
                name, header
            )));
        }
        self.export(name, true)
    }

    /// Screen data of a file that really holds a screen dump
    pub fn export_screen(&mut self, name: &str) -> Result<Vec<u8>> {
        let header = self
            .file_header(name)?
            .ok_or_else(|| DskError::invalid_header(format!("{}: no header", name)))?;
        let is_screen = matches!(
            header.kind(),
            Ok(FileKind::Code { load_address }) if load_address == SCREEN_ADDRESS
        ) && header.basic_length() as usize == SCREEN_LENGTH;

        if !is_screen {
            return Err(DskError::invalid_header(format!(
                "{}: not a screen file ({})",
                name, header
            )));
        }
        self.export(name, true)
    }

    /// Valid PLUS3DOS header of a file, if it has one
    pub fn file_header(&self, name: &str) -> Result<Option<Plus3DosHeader>> {
        let blocks = self.file_blocks(name)?;
        let records = self.file_records(name)?;
        Ok(self.header_of(&blocks, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::header::FILE_TYPE_PROGRAM;

    #[test]
    fn test_disk_filename() {
        assert_eq!(disk_filename(Path::new("/tmp/hello.bas"), None), "HELLO.BAS");
        assert_eq!(
            disk_filename(Path::new("a very long name.txt"), Some("BIN")),
            "AVERYLON.BIN"
        );
        assert_eq!(disk_filename(Path::new("noext"), None), "NOEXT");
        assert_eq!(disk_filename(Path::new("x.jpeg"), None), "X.JPE");
    }

    #[test]
    fn test_import_basic() {
        let mut image = DiskImage::create();
        let program = [0u8; 29];
        image.import_basic("HELLO.BAS", &program, 10).unwrap();

        let list = image.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "HELLO.BAS");
        assert_eq!(list[0].records, 2);
        assert_eq!(list[0].size, 157);

        let header = list[0].header.as_ref().unwrap();
        let (file_type, length, line, program_length) = header.basic_header();
        assert_eq!(file_type, FILE_TYPE_PROGRAM);
        assert_eq!(length, 29);
        assert_eq!(line, 10);
        assert_eq!(program_length, 29);
    }

    #[test]
    fn test_round_trips() {
        let mut image = DiskImage::create();
        let code: Vec<u8> = (0..=255).collect();
        let screen: Vec<u8> = (0..SCREEN_LENGTH).map(|i| (i % 251) as u8).collect();
        let program = b"\x00\x0a\x05\x00\xf5\"hi\"\x0d".to_vec();

        image.import_code("CODE.BIN", &code, 32768).unwrap();
        image.import_screen("PIC.SCR", &screen).unwrap();
        image.import_basic("PROG.BAS", &program, 10).unwrap();

        assert_eq!(image.export("CODE.BIN", true).unwrap(), code);
        assert_eq!(image.export("PIC.SCR", true).unwrap(), screen);
        assert_eq!(image.export_screen("PIC.SCR").unwrap(), screen);
        assert_eq!(image.export("PROG.BAS", true).unwrap(), program);

        let full = image.export("CODE.BIN", false).unwrap();
        assert_eq!(full.len(), HEADER_SIZE + code.len());
        assert!(Plus3DosHeader::has_signature(&full));
    }

    #[test]
    fn test_raw_import_is_record_padded() {
        let mut image = DiskImage::create();
        image.import_raw("RAW.DAT", &[0xAA; 200]).unwrap();

        let out = image.export("RAW.DAT", true).unwrap();
        assert_eq!(out.len(), 256);
        assert_eq!(&out[..200], &[0xAA; 200][..]);
        assert!(image.file_header("RAW.DAT").unwrap().is_none());
    }

    #[test]
    fn test_import_too_large_creates_nothing() {
        let mut image = DiskImage::create();
        let huge = vec![0u8; MAX_IMPORT_SIZE + 1];

        let err = image.import_raw("HUGE", &huge).unwrap_err();
        assert!(matches!(err, DskError::FileTooLarge { .. }));
        assert!(image.list().is_empty());
        assert_eq!(image.directory().free_slots(), MAX_DIRECTORY_ENTRIES);
    }

    #[test]
    fn test_import_disk_full() {
        let mut image = DiskImage::create();
        image.import_raw("A", &vec![1u8; 100 * 1024]).unwrap();

        let err = image.import_raw("B", &vec![2u8; 100 * 1024]).unwrap_err();
        assert!(matches!(err, DskError::DiskFull));
        assert!(!image.exists("B"));
        assert_eq!(image.usage().used_space, 100 * 1024);
    }

    #[test]
    fn test_import_duplicate() {
        let mut image = DiskImage::create();
        image.import_raw("SAME", b"one").unwrap();
        let err = image.import_raw("same", b"two").unwrap_err();
        assert!(matches!(err, DskError::FileExists(_)));
        assert_eq!(image.usage().used_space, 1024);
    }

    #[test]
    fn test_screen_size_checked() {
        let mut image = DiskImage::create();
        assert!(image.import_screen("BAD.SCR", &[0u8; 1000]).is_err());
        assert!(!image.exists("BAD.SCR"));

        image.import_code("NOTSCR", &[0u8; 100], 16384).unwrap();
        assert!(image.export_screen("NOTSCR").is_err());
    }

    #[test]
    fn test_export_basic_checks_type() {
        let mut image = DiskImage::create();
        let program = [0x00, 0x0A, 0x02, 0x00, 0xFD, 0x0D];
        image.import_basic("PROG.BAS", &program, 10).unwrap();
        image.import_code("CODE.BAS", &[0xC9; 10], 32768).unwrap();
        image.import_raw("RAW.BAS", &[0u8; 300]).unwrap();

        assert_eq!(image.export_basic("PROG.BAS").unwrap(), program);
        assert!(matches!(
            image.export_basic("CODE.BAS"),
            Err(DskError::InvalidHeader(_))
        ));
        assert!(matches!(
            image.export_basic("RAW.BAS"),
            Err(DskError::InvalidHeader(_))
        ));
        assert!(matches!(
            image.export_basic("NONE.BAS"),
            Err(DskError::FileNotFound(_))
        ));
    }
}
