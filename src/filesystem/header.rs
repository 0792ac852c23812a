/// PLUS3DOS file header

use crate::error::{DskError, Result};
use std::fmt;

/// Header signature
pub const HEADER_SIGNATURE: &[u8; 8] = b"PLUS3DOS";

/// Soft end-of-file marker following the signature
pub const HEADER_SOFT_EOF: u8 = 0x1A;

/// Size of the header in bytes
pub const HEADER_SIZE: usize = 128;

/// Issue number understood by this library
pub const HEADER_ISSUE: u8 = 1;

/// Highest version number understood by this library
pub const HEADER_VERSION: u8 = 1;

/// BASIC program
pub const FILE_TYPE_PROGRAM: u8 = 0;
/// Numeric array
pub const FILE_TYPE_NUMERIC_ARRAY: u8 = 1;
/// Character array
pub const FILE_TYPE_CHAR_ARRAY: u8 = 2;
/// Code or screen data
pub const FILE_TYPE_CODE: u8 = 3;

/// Load address of the display file
pub const SCREEN_ADDRESS: u16 = 16384;

/// Size of a full screen dump (bitmap + attributes)
pub const SCREEN_LENGTH: usize = 6912;

/// Line numbers at or above this mean "no autostart"
pub const NO_AUTOSTART: u16 = 0x8000;

const OFFSET_ISSUE: usize = 9;
const OFFSET_VERSION: usize = 10;
const OFFSET_FILE_LENGTH: usize = 11;
const OFFSET_BASIC: usize = 15;
const OFFSET_CHECKSUM: usize = 127;

/// What a headered file contains, with the parameters that kind carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// BASIC program
    Program {
        /// Autostart line (`NO_AUTOSTART` or above for none)
        line: u16,
        /// Length of the program without its variables
        program_length: u16,
    },
    /// Numeric array
    NumericArray {
        /// Variable name byte
        name: u8,
    },
    /// Character array
    CharArray {
        /// Variable name byte
        name: u8,
    },
    /// Machine code or other memory dump
    Code {
        /// Load address
        load_address: u16,
    },
}

impl FileKind {
    /// Code block loading at the display file
    pub fn screen() -> Self {
        FileKind::Code {
            load_address: SCREEN_ADDRESS,
        }
    }

    /// Numeric type code
    pub fn type_code(&self) -> u8 {
        match self {
            FileKind::Program { .. } => FILE_TYPE_PROGRAM,
            FileKind::NumericArray { .. } => FILE_TYPE_NUMERIC_ARRAY,
            FileKind::CharArray { .. } => FILE_TYPE_CHAR_ARRAY,
            FileKind::Code { .. } => FILE_TYPE_CODE,
        }
    }

    /// Raw `(param1, param2)` pair
    pub fn params(&self) -> (u16, u16) {
        match *self {
            FileKind::Program {
                line,
                program_length,
            } => (line, program_length),
            FileKind::NumericArray { name } | FileKind::CharArray { name } => (name as u16, 0),
            FileKind::Code { load_address } => (load_address, 0),
        }
    }

    /// Build from a type code and raw parameters
    pub fn from_parts(file_type: u8, param1: u16, param2: u16) -> Result<Self> {
        match file_type {
            FILE_TYPE_PROGRAM => Ok(FileKind::Program {
                line: param1,
                program_length: param2,
            }),
            FILE_TYPE_NUMERIC_ARRAY => Ok(FileKind::NumericArray {
                name: param1 as u8,
            }),
            FILE_TYPE_CHAR_ARRAY => Ok(FileKind::CharArray {
                name: param1 as u8,
            }),
            FILE_TYPE_CODE => Ok(FileKind::Code {
                load_address: param1,
            }),
            other => Err(DskError::invalid_header(format!(
                "invalid file type: {}",
                other
            ))),
        }
    }

    /// Short type name as shown by +3 BASIC
    pub fn name(&self) -> &'static str {
        match self {
            FileKind::Program { .. } => "Program",
            FileKind::NumericArray { .. } => "Number array",
            FileKind::CharArray { .. } => "Character array",
            FileKind::Code { .. } => "Bytes",
        }
    }
}

/// The 128-byte header prepended to most +3DOS files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plus3DosHeader {
    bytes: [u8; HEADER_SIZE],
}

impl Plus3DosHeader {
    /// Blank header with signature, issue and version set
    pub fn new() -> Self {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..8].copy_from_slice(HEADER_SIGNATURE);
        bytes[8] = HEADER_SOFT_EOF;
        bytes[OFFSET_ISSUE] = HEADER_ISSUE;
        bytes[OFFSET_VERSION] = HEADER_VERSION;

        let mut header = Self { bytes };
        header.set_file_length(HEADER_SIZE as u32);
        header
    }

    /// Complete header for a data payload of the given kind
    pub fn for_data(kind: FileKind, data_length: usize) -> Result<Self> {
        let length = u16::try_from(data_length).map_err(|_| DskError::FileTooLarge {
            size: data_length,
            max: u16::MAX as usize,
        })?;

        let mut header = Self::new();
        header.set_kind(kind, length);
        header.set_file_length((HEADER_SIZE + data_length) as u32);
        header.update_checksum();
        Ok(header)
    }

    /// Decode the first 128 bytes of a slice, without validating
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(DskError::invalid_header(format!(
                "data too short for header: {} bytes",
                data.len()
            )));
        }

        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(&data[..HEADER_SIZE]);
        Ok(Self { bytes })
    }

    /// Does the data start with the header signature?
    pub fn has_signature(data: &[u8]) -> bool {
        data.len() >= 9 && &data[..8] == HEADER_SIGNATURE && data[8] == HEADER_SOFT_EOF
    }

    /// Raw header bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        self.bytes
    }

    /// Issue number
    pub fn issue(&self) -> u8 {
        self.bytes[OFFSET_ISSUE]
    }

    /// Version number
    pub fn version(&self) -> u8 {
        self.bytes[OFFSET_VERSION]
    }

    /// Total file length including this header
    pub fn file_length(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[OFFSET_FILE_LENGTH..OFFSET_FILE_LENGTH + 4]);
        u32::from_le_bytes(raw)
    }

    /// Set the total file length including this header
    pub fn set_file_length(&mut self, length: u32) {
        self.bytes[OFFSET_FILE_LENGTH..OFFSET_FILE_LENGTH + 4]
            .copy_from_slice(&length.to_le_bytes());
    }

    /// Data length, excluding this header
    pub fn data_length(&self) -> usize {
        (self.file_length() as usize).saturating_sub(HEADER_SIZE)
    }

    /// Write the +3 BASIC header fields
    pub fn set_basic_header(
        &mut self,
        file_type: u8,
        length: u16,
        param1: u16,
        param2: u16,
    ) -> Result<()> {
        let kind = FileKind::from_parts(file_type, param1, param2)?;
        self.set_kind(kind, length);
        Ok(())
    }

    /// Read the +3 BASIC header fields as `(type, length, param1, param2)`
    ///
    /// Parameters that the type does not use read as zero.
    pub fn basic_header(&self) -> (u8, u16, u16, u16) {
        let file_type = self.bytes[OFFSET_BASIC];
        let length = self.word(OFFSET_BASIC + 1);

        match file_type {
            FILE_TYPE_PROGRAM => (
                file_type,
                length,
                self.word(OFFSET_BASIC + 3),
                self.word(OFFSET_BASIC + 5),
            ),
            FILE_TYPE_NUMERIC_ARRAY | FILE_TYPE_CHAR_ARRAY => {
                (file_type, length, self.bytes[OFFSET_BASIC + 3] as u16, 0)
            }
            FILE_TYPE_CODE => (file_type, length, self.word(OFFSET_BASIC + 3), 0),
            _ => (file_type, length, 0, 0),
        }
    }

    /// Typed view of the +3 BASIC header
    pub fn kind(&self) -> Result<FileKind> {
        let (file_type, _, param1, param2) = self.basic_header();
        FileKind::from_parts(file_type, param1, param2)
    }

    /// Length field of the +3 BASIC header
    pub fn basic_length(&self) -> u16 {
        self.word(OFFSET_BASIC + 1)
    }

    /// Store a file kind and its data length
    pub fn set_kind(&mut self, kind: FileKind, length: u16) {
        let basic = &mut self.bytes[OFFSET_BASIC..OFFSET_BASIC + 8];
        basic.fill(0);
        basic[0] = kind.type_code();
        basic[1..3].copy_from_slice(&length.to_le_bytes());

        match kind {
            FileKind::Program {
                line,
                program_length,
            } => {
                basic[3..5].copy_from_slice(&line.to_le_bytes());
                basic[5..7].copy_from_slice(&program_length.to_le_bytes());
            }
            FileKind::NumericArray { name } | FileKind::CharArray { name } => {
                basic[3] = name;
            }
            FileKind::Code { load_address } => {
                basic[3..5].copy_from_slice(&load_address.to_le_bytes());
            }
        }
    }

    /// Sum of bytes 0..=126 modulo 256
    pub fn compute_checksum(&self) -> u8 {
        self.bytes[..OFFSET_CHECKSUM]
            .iter()
            .fold(0u8, |sum, &b| sum.wrapping_add(b))
    }

    /// Stored checksum
    pub fn checksum(&self) -> u8 {
        self.bytes[OFFSET_CHECKSUM]
    }

    /// Recompute and store the checksum
    pub fn update_checksum(&mut self) {
        self.bytes[OFFSET_CHECKSUM] = self.compute_checksum();
    }

    /// Check the header, stopping at the first problem
    pub fn validate(&self) -> Result<()> {
        if &self.bytes[..8] != HEADER_SIGNATURE {
            return Err(DskError::invalid_header("invalid PLUS3DOS signature"));
        }
        if self.bytes[8] != HEADER_SOFT_EOF {
            return Err(DskError::invalid_header("invalid soft-EOF marker"));
        }
        if self.issue() != HEADER_ISSUE {
            return Err(DskError::invalid_header(format!(
                "incompatible issue number: {}",
                self.issue()
            )));
        }
        if self.version() > HEADER_VERSION {
            return Err(DskError::invalid_header(format!(
                "incompatible version: {}",
                self.version()
            )));
        }
        self.kind()?;

        let expected = self.compute_checksum();
        if expected != self.checksum() {
            return Err(DskError::ChecksumMismatch {
                expected,
                found: self.checksum(),
            });
        }
        Ok(())
    }

    /// Every problem with the header
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if &self.bytes[..8] != HEADER_SIGNATURE {
            problems.push("invalid PLUS3DOS signature".to_string());
        }
        if self.bytes[8] != HEADER_SOFT_EOF {
            problems.push("invalid soft-EOF marker".to_string());
        }
        if self.issue() != HEADER_ISSUE {
            problems.push(format!("incompatible issue number: {}", self.issue()));
        }
        if self.version() > HEADER_VERSION {
            problems.push(format!("incompatible version: {}", self.version()));
        }
        if let Err(e) = self.kind() {
            problems.push(e.to_string());
        }
        if (self.file_length() as usize) < HEADER_SIZE {
            problems.push(format!(
                "file length {} shorter than the header",
                self.file_length()
            ));
        }
        if self.compute_checksum() != self.checksum() {
            problems.push(format!(
                "checksum mismatch: expected {:#04X}, found {:#04X}",
                self.compute_checksum(),
                self.checksum()
            ));
        }

        problems
    }

    fn word(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }
}

impl Default for Plus3DosHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Plus3DosHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            Ok(kind) => kind,
            Err(_) => return write!(f, "Unknown type {}", self.bytes[OFFSET_BASIC]),
        };

        write!(f, "{} {}", kind.name(), self.basic_length())?;
        match kind {
            FileKind::Program { line, .. } if line < NO_AUTOSTART => write!(f, " LINE {}", line),
            FileKind::NumericArray { name } | FileKind::CharArray { name } => {
                let letter = (name & 0x1F) | 0x60;
                write!(f, " {}()", letter as char)
            }
            FileKind::Code { load_address } => write!(f, " CODE {}", load_address),
            _ => Ok(()),
        }
    }
}
