/// TAP tape image conversion
///
/// A TAP file is a sequence of blocks, each a little-endian length followed
/// by a flag byte, the payload and an XOR checksum over flag and payload.
/// Files are stored as a 17-byte header block (flag 0x00) followed by a
/// data block (flag 0xFF).

use crate::error::{DskError, Result};
use crate::filesystem::header::{FileKind, NO_AUTOSTART};
use crate::filesystem::{disk_filename, ImportOptions};
use crate::image::DiskImage;
use std::path::Path;

/// Flag byte of a header block
pub const FLAG_HEADER: u8 = 0x00;

/// Flag byte of a data block
pub const FLAG_DATA: u8 = 0xFF;

/// Payload size of a header block
pub const TAP_HEADER_SIZE: usize = 17;

/// Width of the tape filename field
pub const TAP_NAME_LENGTH: usize = 10;

/// One block from a tape image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapBlock {
    /// Flag byte
    pub flag: u8,
    /// Payload without flag and checksum
    pub data: Vec<u8>,
}

impl TapBlock {
    /// XOR of the flag and every payload byte
    pub fn checksum(&self) -> u8 {
        self.data.iter().fold(self.flag, |sum, &b| sum ^ b)
    }

    /// Encode with length prefix and checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = (self.data.len() + 2) as u16;
        let mut out = Vec::with_capacity(self.data.len() + 4);
        out.extend_from_slice(&length.to_le_bytes());
        out.push(self.flag);
        out.extend_from_slice(&self.data);
        out.push(self.checksum());
        out
    }
}

/// The payload of a tape header block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapHeader {
    /// Tape file type (0 program, 1 numeric array, 2 character array, 3 code)
    pub file_type: u8,
    /// Space padded filename
    pub name: [u8; TAP_NAME_LENGTH],
    /// Length of the data block payload
    pub length: u16,
    /// First parameter
    pub param1: u16,
    /// Second parameter
    pub param2: u16,
}

impl TapHeader {
    /// Decode a header block payload
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != TAP_HEADER_SIZE {
            return Err(DskError::invalid_format(format!(
                "tape header must be {} bytes, got {}",
                TAP_HEADER_SIZE,
                data.len()
            )));
        }
        let word = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);

        let mut name = [0u8; TAP_NAME_LENGTH];
        name.copy_from_slice(&data[1..11]);
        Ok(Self {
            file_type: data[0],
            name,
            length: word(11),
            param1: word(13),
            param2: word(15),
        })
    }

    /// Encode as a header block payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TAP_HEADER_SIZE);
        out.push(self.file_type);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.param1.to_le_bytes());
        out.extend_from_slice(&self.param2.to_le_bytes());
        out
    }

    /// Filename with padding removed
    pub fn filename(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }

    /// Equivalent +3DOS file kind
    ///
    /// Array headers keep the variable name in the high byte of `param1`.
    pub fn kind(&self) -> Result<FileKind> {
        match self.file_type {
            0 => Ok(FileKind::Program {
                line: self.param1,
                program_length: self.param2,
            }),
            1 => Ok(FileKind::NumericArray {
                name: (self.param1 >> 8) as u8,
            }),
            2 => Ok(FileKind::CharArray {
                name: (self.param1 >> 8) as u8,
            }),
            3 => Ok(FileKind::Code {
                load_address: self.param1,
            }),
            other => Err(DskError::invalid_format(format!(
                "unsupported tape file type {}",
                other
            ))),
        }
    }

    /// Tape header for a +3DOS file kind
    pub fn for_kind(name: &str, kind: FileKind, length: u16) -> Self {
        let (param1, param2) = match kind {
            FileKind::Program {
                line,
                program_length,
            } => (line, program_length),
            FileKind::NumericArray { name } | FileKind::CharArray { name } => {
                ((name as u16) << 8, NO_AUTOSTART)
            }
            FileKind::Code { load_address } => (load_address, NO_AUTOSTART),
        };

        let mut field = [b' '; TAP_NAME_LENGTH];
        for (slot, b) in field.iter_mut().zip(name.bytes()) {
            *slot = b;
        }

        Self {
            file_type: kind.type_code(),
            name: field,
            length,
            param1,
            param2,
        }
    }
}

/// Split a tape image into blocks, checking every checksum
pub fn parse_tap(data: &[u8]) -> Result<Vec<TapBlock>> {
    let mut blocks = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        if offset + 2 > data.len() {
            return Err(DskError::parse(offset, "truncated block length"));
        }
        let length = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        let start = offset + 2;
        if length < 2 || start + length > data.len() {
            return Err(DskError::parse(offset, format!("bad block length {}", length)));
        }

        let body = &data[start..start + length];
        let block = TapBlock {
            flag: body[0],
            data: body[1..length - 1].to_vec(),
        };
        let stored = body[length - 1];
        if block.checksum() != stored {
            return Err(DskError::ChecksumMismatch {
                expected: block.checksum(),
                found: stored,
            });
        }

        blocks.push(block);
        offset = start + length;
    }

    log::debug!("Tape image holds {} blocks", blocks.len());
    Ok(blocks)
}

/// Import every header and data block pair of a tape image as headered files
///
/// Returns the disk names created. Data blocks without a header are skipped.
pub fn import_tap(image: &mut DiskImage, data: &[u8]) -> Result<Vec<String>> {
    let blocks = parse_tap(data)?;
    let mut created = Vec::new();
    let mut i = 0;

    while i < blocks.len() {
        let block = &blocks[i];
        if block.flag != FLAG_HEADER || block.data.len() != TAP_HEADER_SIZE {
            log::warn!("Skipping headerless tape block {} ({} bytes)", i, block.data.len());
            i += 1;
            continue;
        }

        let header = TapHeader::parse(&block.data)?;
        let payload = match blocks.get(i + 1) {
            Some(next) if next.flag == FLAG_DATA => &next.data,
            _ => {
                return Err(DskError::invalid_format(format!(
                    "tape header '{}' has no data block",
                    header.filename()
                )))
            }
        };
        if payload.len() != header.length as usize {
            log::warn!(
                "'{}': header says {} bytes, data block has {}",
                header.filename(),
                header.length,
                payload.len()
            );
        }

        let kind = header.kind()?;
        let ext = match kind {
            FileKind::Program { .. } => "BAS",
            FileKind::Code { .. } => "BIN",
            _ => "DAT",
        };
        let name = disk_filename(Path::new(&header.filename()), Some(ext));
        image.import(&name, payload, &ImportOptions::headered(kind))?;

        created.push(name);
        i += 2;
    }

    Ok(created)
}

/// Encode a headered file as a tape header and data block pair
pub fn export_tap(image: &mut DiskImage, name: &str) -> Result<Vec<u8>> {
    let header = image
        .file_header(name)?
        .ok_or_else(|| DskError::invalid_header(format!("{}: no PLUS3DOS header", name)))?;
    let kind = header.kind()?;
    let data = image.export(name, true)?;
    let length = u16::try_from(data.len()).map_err(|_| DskError::FileTooLarge {
        size: data.len(),
        max: u16::MAX as usize,
    })?;

    let stem = name.split('.').next().unwrap_or(name);
    let tap_header = TapHeader::for_kind(stem, kind, length);

    let mut out = TapBlock {
        flag: FLAG_HEADER,
        data: tap_header.to_bytes(),
    }
    .to_bytes();
    out.extend(
        TapBlock {
            flag: FLAG_DATA,
            data,
        }
        .to_bytes(),
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape(blocks: &[TapBlock]) -> Vec<u8> {
        blocks.iter().flat_map(TapBlock::to_bytes).collect()
    }

    fn file_pair(header: TapHeader, data: &[u8]) -> Vec<TapBlock> {
        vec![
            TapBlock {
                flag: FLAG_HEADER,
                data: header.to_bytes(),
            },
            TapBlock {
                flag: FLAG_DATA,
                data: data.to_vec(),
            },
        ]
    }

    #[test]
    fn test_block_checksum() {
        let block = TapBlock {
            flag: 0xFF,
            data: vec![0x01, 0x02],
        };
        assert_eq!(block.checksum(), 0xFF ^ 0x01 ^ 0x02);
        assert_eq!(block.to_bytes(), vec![4, 0, 0xFF, 1, 2, 0xFC]);
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut bytes = TapBlock {
            flag: 0xFF,
            data: vec![1, 2, 3],
        }
        .to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert!(matches!(
            parse_tap(&bytes),
            Err(DskError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_truncation() {
        let bytes = TapBlock {
            flag: 0xFF,
            data: vec![1, 2, 3],
        }
        .to_bytes();
        assert!(parse_tap(&bytes[..4]).is_err());
    }

    #[test]
    fn test_import_program_and_code() {
        let program = vec![0x00, 0x0A, 0x02, 0x00, 0xFD, 0x0D];
        let code = vec![0xF3, 0xC9];

        let mut blocks = file_pair(TapHeader::for_kind("demo", FileKind::Program {
            line: 10,
            program_length: 6,
        }, 6), &program);
        blocks.extend(file_pair(
            TapHeader::for_kind("loader", FileKind::Code { load_address: 0x8000 }, 2),
            &code,
        ));

        let mut image = DiskImage::create();
        let created = import_tap(&mut image, &tape(&blocks)).unwrap();
        assert_eq!(created, vec!["DEMO.BAS", "LOADER.BIN"]);

        let header = image.file_header("DEMO.BAS").unwrap().unwrap();
        assert_eq!(
            header.kind().unwrap(),
            FileKind::Program {
                line: 10,
                program_length: 6
            }
        );
        assert_eq!(image.export("DEMO.BAS", true).unwrap(), program);
        assert_eq!(image.export("LOADER.BIN", true).unwrap(), code);
    }

    #[test]
    fn test_header_without_data() {
        let blocks = vec![TapBlock {
            flag: FLAG_HEADER,
            data: TapHeader::for_kind("x", FileKind::Code { load_address: 0 }, 1).to_bytes(),
        }];
        let mut image = DiskImage::create();
        assert!(import_tap(&mut image, &tape(&blocks)).is_err());
        assert!(image.list().is_empty());
    }

    #[test]
    fn test_export_then_import() {
        let mut image = DiskImage::create();
        image.import_code("SPRITES.BIN", &[7u8; 300], 40000).unwrap();

        let tap = export_tap(&mut image, "SPRITES.BIN").unwrap();
        let blocks = parse_tap(&tap).unwrap();
        assert_eq!(blocks.len(), 2);

        let header = TapHeader::parse(&blocks[0].data).unwrap();
        assert_eq!(header.filename(), "SPRITES");
        assert_eq!(header.length, 300);
        assert_eq!(header.param1, 40000);
        assert_eq!(blocks[1].data, vec![7u8; 300]);

        let mut other = DiskImage::create();
        assert_eq!(import_tap(&mut other, &tap).unwrap(), vec!["SPRITES.BIN"]);
        assert_eq!(other.export("SPRITES.BIN", true).unwrap(), vec![7u8; 300]);
    }

    #[test]
    fn test_export_requires_header() {
        let mut image = DiskImage::create();
        image.import_raw("PLAIN", &[1, 2, 3]).unwrap();
        assert!(export_tap(&mut image, "PLAIN").is_err());
    }
}
