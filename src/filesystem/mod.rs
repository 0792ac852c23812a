/// +3DOS filesystem: directory, allocation, headers and file handles

/// Block allocation over the sector bitmap
pub mod allocator;
/// Directory table
pub mod directory;
/// Stream access to files
pub mod file;
/// PLUS3DOS file headers
pub mod header;
/// Import and export of host byte buffers
pub mod hostio;

pub use allocator::{blocks_needed, BlockAllocator};
pub use directory::{parse_filename, Directory, DirectoryEntry, EntryStatus};
pub use file::File;
pub use header::{FileKind, Plus3DosHeader};
pub use hostio::{disk_filename, ImportOptions};

/// File attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes {
    /// Read-only flag
    pub read_only: bool,
    /// System file flag
    pub system: bool,
    /// Archive flag
    pub archive: bool,
    /// User-defined flags f1 to f4
    pub user_flags: [bool; 4],
}

impl FileAttributes {
    /// Parse a flag string such as `"+R-S"` on top of the current flags
    ///
    /// `R`, `S` and `A` select read-only, system and archive; `1` to `4`
    /// select the user flags.
    pub fn apply(&self, spec: &str) -> Option<Self> {
        let mut result = *self;
        let mut set = true;

        for ch in spec.chars() {
            match ch.to_ascii_uppercase() {
                '+' => set = true,
                '-' => set = false,
                'R' => result.read_only = set,
                'S' => result.system = set,
                'A' => result.archive = set,
                digit @ '1'..='4' => {
                    let index = digit as usize - '1' as usize;
                    result.user_flags[index] = set;
                }
                _ => return None,
            }
        }
        Some(result)
    }

    /// Flags as a fixed-width string, e.g. `RSA-2--`
    pub fn flags_string(&self) -> String {
        let mut s = String::with_capacity(7);
        s.push(if self.read_only { 'R' } else { '-' });
        s.push(if self.system { 'S' } else { '-' });
        s.push(if self.archive { 'A' } else { '-' });
        for (i, &flag) in self.user_flags.iter().enumerate() {
            s.push(if flag { (b'1' + i as u8) as char } else { '-' });
        }
        s
    }
}

/// Directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Filename (8.3 format, e.g., "FILENAME.BAS")
    pub name: String,
    /// User number (0-15)
    pub user: u8,
    /// File size in bytes, header included
    pub size: usize,
    /// 128-byte records used
    pub records: usize,
    /// Allocation blocks in file order
    pub blocks: Vec<usize>,
    /// Number of directory extents
    pub extents: usize,
    /// File attributes
    pub attributes: FileAttributes,
    /// Parsed PLUS3DOS header, if the file carries a valid one
    pub header: Option<Plus3DosHeader>,
    /// Entry is deleted (listed for recovery only)
    pub deleted: bool,
}

impl DirEntry {
    /// Size of the data following the header
    pub fn data_size(&self) -> usize {
        match &self.header {
            Some(header) => header.data_length(),
            None => self.size,
        }
    }

    /// One-line description of the header, or an empty string
    pub fn header_summary(&self) -> String {
        self.header
            .as_ref()
            .map(|h| h.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_flags_string() {
        let attributes = FileAttributes {
            read_only: true,
            archive: true,
            user_flags: [false, true, false, false],
            ..FileAttributes::default()
        };
        assert_eq!(attributes.flags_string(), "R-A-2--");
    }

    #[test]
    fn test_attribute_apply() {
        let attributes = FileAttributes::default().apply("+RS").unwrap();
        assert!(attributes.read_only && attributes.system);

        let attributes = attributes.apply("-r+4").unwrap();
        assert!(!attributes.read_only);
        assert!(attributes.user_flags[3]);

        assert!(FileAttributes::default().apply("+X").is_none());
    }
}
