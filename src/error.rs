use thiserror::Error;

/// Result type alias for disk image operations
pub type Result<T> = std::result::Result<T, DskError>;

/// Broad classes of failure, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed signatures, wrong geometry, checksum mismatches, truncated data
    Format,
    /// Directory full, disk full, file too large
    Capacity,
    /// Read-only, duplicate name, missing file and other usage errors
    Policy,
    /// Out-of-bounds track, sector, side or block
    Range,
    /// Host I/O failure
    Io,
}

/// Errors that can occur when working with disk images
#[derive(Debug, Error)]
pub enum DskError {
    /// I/O error occurred while reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unrecognized disk image format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Parse error at specific offset
    #[error("Parse error at offset {offset}: {message}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Error message
        message: String,
    },

    /// Invalid or corrupt PLUS3DOS file header
    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    /// Checksum did not match the stored value
    #[error("Checksum mismatch: expected {expected:#04X}, found {found:#04X}")]
    ChecksumMismatch {
        /// Checksum computed from the data
        expected: u8,
        /// Checksum stored on disk
        found: u8,
    },

    /// Invalid track number specified
    #[error("Invalid track {track} on side {side} (max: {max})")]
    InvalidTrack {
        /// Side number
        side: u8,
        /// Track number
        track: u8,
        /// Maximum allowed track number
        max: u8,
    },

    /// Invalid sector specified
    #[error("Invalid sector {sector} on track {track} (max: {max})")]
    InvalidSector {
        /// Track number
        track: u8,
        /// Sector index within the track
        sector: u8,
        /// Maximum allowed sector index
        max: u8,
    },

    /// Invalid side specified
    #[error("Invalid side {side} (max: {max})")]
    InvalidSide {
        /// Side number
        side: u8,
        /// Maximum allowed side number
        max: u8,
    },

    /// A linear sector, block or record index is out of range
    #[error("{what} {index} out of range (limit {limit})")]
    OutOfRange {
        /// Kind of index
        what: &'static str,
        /// Requested index
        index: usize,
        /// Exclusive upper bound
        limit: usize,
    },

    /// Attempted to allocate a sector that is already in use
    #[error("Sector {0} already allocated")]
    SectorAlreadyAllocated(usize),

    /// Attempted to read a sector that holds no live data
    #[error("Sector {0} is not allocated")]
    SectorNotAllocated(usize),

    /// File not found in filesystem
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A live file with the same name already exists
    #[error("File already exists: {0}")]
    FileExists(String),

    /// File or entry is write protected
    #[error("File is read-only: {0}")]
    ReadOnly(String),

    /// Directory has no unused or deleted slot left
    #[error("Directory full")]
    DirectoryFull,

    /// Disk is full, no free space
    #[error("Disk full: no free space available")]
    DiskFull,

    /// File exceeds the maximum size the filesystem can hold
    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge {
        /// Requested size in bytes
        size: usize,
        /// Maximum size in bytes
        max: usize,
    },

    /// Invalid filename
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
}

impl DskError {
    /// Create a parse error with context
    pub fn parse<S: Into<String>>(offset: usize, message: S) -> Self {
        DskError::ParseError {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        DskError::InvalidFormat(message.into())
    }

    /// Create an invalid header error
    pub fn invalid_header<S: Into<String>>(message: S) -> Self {
        DskError::InvalidHeader(message.into())
    }

    /// Create an out-of-range error
    pub fn out_of_range(what: &'static str, index: usize, limit: usize) -> Self {
        DskError::OutOfRange { what, index, limit }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            DskError::Io(_) => ErrorCategory::Io,
            DskError::InvalidFormat(_)
            | DskError::ParseError { .. }
            | DskError::InvalidHeader(_)
            | DskError::ChecksumMismatch { .. } => ErrorCategory::Format,
            DskError::DirectoryFull | DskError::DiskFull | DskError::FileTooLarge { .. } => {
                ErrorCategory::Capacity
            }
            DskError::InvalidTrack { .. }
            | DskError::InvalidSector { .. }
            | DskError::InvalidSide { .. }
            | DskError::OutOfRange { .. } => ErrorCategory::Range,
            DskError::SectorAlreadyAllocated(_)
            | DskError::SectorNotAllocated(_)
            | DskError::FileNotFound(_)
            | DskError::FileExists(_)
            | DskError::ReadOnly(_)
            | DskError::InvalidFilename(_) => ErrorCategory::Policy,
        }
    }
}

impl From<DskError> for std::io::Error {
    fn from(err: DskError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            DskError::Io(inner) => inner.kind(),
            DskError::FileNotFound(_) => ErrorKind::NotFound,
            DskError::FileExists(_) => ErrorKind::AlreadyExists,
            DskError::ReadOnly(_) => ErrorKind::PermissionDenied,
            DskError::DiskFull | DskError::DirectoryFull | DskError::FileTooLarge { .. } => {
                ErrorKind::Other
            }
            _ => ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, err)
    }
}
