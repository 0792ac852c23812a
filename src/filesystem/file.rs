/// Seekable byte stream over a file's blocks
///
/// A `File` borrows its image mutably for its whole life. Block
/// allocation happens eagerly on writes that extend the file; record counts
/// and the PLUS3DOS header length are brought up to date on `close`,
/// `flush` or drop.

use crate::error::{DskError, Result};
use crate::filesystem::allocator::blocks_needed;
use crate::filesystem::header::{Plus3DosHeader, HEADER_SIZE};
use crate::format::constants::*;
use crate::image::DiskImage;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// An open file on a disk image
pub struct File<'a> {
    image: &'a mut DiskImage,
    name: String,
    blocks: Vec<usize>,
    size: usize,
    position: u64,
    read_only: bool,
    header: Option<Plus3DosHeader>,
    dirty: bool,
    closed: bool,
}

impl<'a> File<'a> {
    /// Open an existing file for reading
    pub fn open(image: &'a mut DiskImage, name: &str) -> Result<Self> {
        Self::from_directory(image, name, true)
    }

    /// Open an existing file for reading and writing
    pub fn open_rw(image: &'a mut DiskImage, name: &str) -> Result<Self> {
        let (entry, _) = image.directory().find_file(name)?;
        if entry.attributes().read_only {
            return Err(DskError::ReadOnly(entry.filename()));
        }
        Self::from_directory(image, name, false)
    }

    /// Create a new, empty file
    pub fn create(image: &'a mut DiskImage, name: &str) -> Result<Self> {
        let (entry, _) = image.directory_mut().add_file(name)?;
        let canonical = entry.filename();
        image.changed = true;
        log::debug!("Created {}", canonical);

        Ok(Self {
            image,
            name: canonical,
            blocks: Vec::new(),
            size: 0,
            position: 0,
            read_only: false,
            header: None,
            dirty: true,
            closed: false,
        })
    }

    fn from_directory(image: &'a mut DiskImage, name: &str, read_only: bool) -> Result<Self> {
        let (entry, _) = image.directory().find_file(name)?;
        let canonical = entry.filename();
        let blocks = image.file_blocks(name)?;
        let records = image.file_records(name)?;

        let header = image.header_of(&blocks, records);
        let size = match &header {
            Some(h) => (h.file_length() as usize)
                .max(HEADER_SIZE)
                .min(records * RECORD_SIZE),
            None => records * RECORD_SIZE,
        };
        let position = if header.is_some() { HEADER_SIZE as u64 } else { 0 };

        log::debug!(
            "Opened {} ({} bytes, {} blocks, headered={})",
            canonical,
            size,
            blocks.len(),
            header.is_some()
        );

        Ok(Self {
            image,
            name: canonical,
            blocks,
            size,
            position,
            read_only,
            header,
            dirty: false,
            closed: false,
        })
    }

    /// Canonical `NAME.EXT`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes, header included
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Opened without write access
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Did the file carry a valid header when opened?
    pub fn is_headered(&self) -> bool {
        self.header.is_some()
    }

    /// Header parsed when the file was opened
    pub fn header(&self) -> Option<&Plus3DosHeader> {
        self.header.as_ref()
    }

    /// Bytes after the header
    pub fn data_length(&self) -> usize {
        if self.header.is_some() {
            self.size.saturating_sub(HEADER_SIZE)
        } else {
            self.size
        }
    }

    /// Blocks in file order
    pub fn blocks(&self) -> &[usize] {
        &self.blocks
    }

    /// Read from an absolute offset without moving the cursor
    pub fn read_at(&mut self, buf: &mut [u8], offset: usize) -> Result<usize> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }

        let n = buf.len().min(self.size - offset);
        let mut done = 0;
        while done < n {
            let pos = offset + done;
            let index = pos / BLOCK_SIZE;
            let in_block = pos % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - in_block).min(n - done);

            let block = *self
                .blocks
                .get(index)
                .ok_or_else(|| DskError::out_of_range("file block", index, self.blocks.len()))?;
            self.image
                .read_block(block, in_block, &mut buf[done..done + chunk])?;
            done += chunk;
        }

        log::trace!("{}: read {} bytes at {}", self.name, n, offset);
        Ok(n)
    }

    /// Write at an absolute offset without moving the cursor
    ///
    /// Writing past the end grows the file; any gap reads back as zeros.
    pub fn write_at(&mut self, data: &[u8], offset: usize) -> Result<usize> {
        if self.read_only {
            return Err(DskError::ReadOnly(self.name.clone()));
        }
        if data.is_empty() {
            return Ok(0);
        }

        let max = MAX_BLOCKS_PER_FILE * BLOCK_SIZE;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= max)
            .ok_or(DskError::FileTooLarge {
                size: offset.saturating_add(data.len()),
                max,
            })?;
        self.ensure_capacity(end)?;

        if offset > self.size {
            let gap = vec![0u8; offset - self.size];
            self.copy_in(&gap, self.size)?;
        }
        self.copy_in(data, offset)?;

        self.size = self.size.max(end);
        self.dirty = true;
        self.image.changed = true;
        log::trace!("{}: wrote {} bytes at {}", self.name, data.len(), offset);
        Ok(data.len())
    }

    fn copy_in(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let mut done = 0;
        while done < data.len() {
            let pos = offset + done;
            let index = pos / BLOCK_SIZE;
            let in_block = pos % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - in_block).min(data.len() - done);

            let block = *self
                .blocks
                .get(index)
                .ok_or_else(|| DskError::out_of_range("file block", index, self.blocks.len()))?;
            self.image
                .write_block(block, in_block, &data[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Allocate blocks so the file can hold `end` bytes
    fn ensure_capacity(&mut self, end: usize) -> Result<()> {
        let needed = blocks_needed(end);
        if needed <= self.blocks.len() {
            return Ok(());
        }
        if needed > MAX_BLOCKS_PER_FILE {
            return Err(DskError::FileTooLarge {
                size: end,
                max: MAX_BLOCKS_PER_FILE * BLOCK_SIZE,
            });
        }

        let extra = self
            .image
            .block_allocator()
            .allocate_blocks(needed - self.blocks.len())?;
        let previous = self.blocks.len();
        self.blocks.extend_from_slice(&extra);

        if let Err(e) = self.sync_directory() {
            log::warn!("{}: cannot record new blocks, rolling back: {}", self.name, e);
            self.blocks.truncate(previous);
            let _ = self.image.block_allocator().free(&extra);
            let _ = self.sync_directory();
            return Err(e);
        }
        Ok(())
    }

    /// Write block lists and record counts into the directory extents
    fn sync_directory(&mut self) -> Result<()> {
        let extents_needed = self.blocks.len().div_ceil(BLOCKS_PER_EXTENT).max(1);
        let mut extents = self.image.directory().extents(&self.name)?;
        let first = extents[0];

        let (status, attributes) = match self.image.directory().entry(first) {
            Some(entry) => (entry.status_byte(), entry.attributes()),
            None => return Err(DskError::FileNotFound(self.name.clone())),
        };

        let mut added = Vec::new();
        while extents.len() < extents_needed {
            match self
                .image
                .directory_mut()
                .add_extent(&self.name, extents.len())
            {
                Ok(index) => {
                    added.push(index);
                    extents.push(index);
                }
                Err(e) => {
                    for index in added {
                        self.image.directory_mut().clear_slot(index);
                    }
                    return Err(e);
                }
            }
        }
        for &index in &extents[extents_needed..] {
            self.image.directory_mut().clear_slot(index);
        }

        let total_records = self.size.div_ceil(RECORD_SIZE);
        let directory = self.image.directory_mut();
        for (i, &index) in extents.iter().take(extents_needed).enumerate() {
            let start = (i * BLOCKS_PER_EXTENT).min(self.blocks.len());
            let end = ((i + 1) * BLOCKS_PER_EXTENT).min(self.blocks.len());
            let records = total_records
                .saturating_sub(i * RECORDS_PER_EXTENT)
                .min(RECORDS_PER_EXTENT);

            if let Some(entry) = directory.entry_mut(index) {
                entry.status = status;
                entry.set_extent_number(i);
                entry.set_blocks(&self.blocks[start..end])?;
                entry.set_record_count(records);
                entry.set_attributes(&attributes);
            }
        }
        Ok(())
    }

    /// Bring the header and directory up to date
    fn finish(&mut self) -> Result<()> {
        if !self.dirty || self.read_only {
            return Ok(());
        }

        if self.size >= HEADER_SIZE {
            let mut raw = [0u8; HEADER_SIZE];
            self.read_at(&mut raw, 0)?;
            let mut header = Plus3DosHeader::from_bytes(&raw)?;

            if self.header.is_some() || header.validate().is_ok() {
                header.set_file_length(self.size as u32);
                if let Ok(kind) = header.kind() {
                    let data_length = (self.size - HEADER_SIZE).min(u16::MAX as usize) as u16;
                    header.set_kind(kind, data_length);
                }
                header.update_checksum();
                self.copy_in(&header.to_bytes(), 0)?;
                self.header = Some(header);
            }
        }

        self.sync_directory()?;
        self.dirty = false;
        Ok(())
    }

    /// Flush pending metadata and release the image
    pub fn close(mut self) -> Result<()> {
        let result = self.finish();
        self.closed = true;
        result
    }
}

impl Read for File<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(buf, usize::try_from(self.position).unwrap_or(usize::MAX))?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for File<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_at(buf, usize::try_from(self.position).unwrap_or(usize::MAX))?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.finish()?;
        Ok(())
    }
}

impl Seek for File<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset as i128),
            SeekFrom::Current(delta) => Some(self.position as i128 + delta as i128),
            SeekFrom::End(delta) => Some(self.size as i128 + delta as i128),
        };

        match target {
            Some(t) if t >= 0 => {
                self.position = t as u64;
                Ok(self.position)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            )),
        }
    }
}

impl Drop for File<'_> {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            if let Err(e) = self.finish() {
                log::warn!("{}: metadata not updated on drop: {}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::header::FileKind;
    use crate::filesystem::FileAttributes;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn test_create_write_read() {
        let mut image = DiskImage::create();
        let data = pattern(3000);

        let mut file = image.create_file("data.bin").unwrap();
        file.write_all(&data).unwrap();
        assert_eq!(file.blocks(), &[3, 4, 5]);
        file.close().unwrap();

        let (entry, _) = image.directory().find_file("DATA.BIN").unwrap();
        assert_eq!(entry.record_count(), 24);
        assert_eq!(entry.blocks(), vec![3, 4, 5]);

        let mut file = image.open_file("DATA.BIN").unwrap();
        assert!(!file.is_headered());
        assert_eq!(file.size(), 24 * 128);
        let mut back = Vec::new();
        file.read_to_end(&mut back).unwrap();
        assert_eq!(&back[..3000], data.as_slice());
    }

    #[test]
    fn test_short_read_then_eof() {
        let mut image = DiskImage::create();
        image
            .create_file("A")
            .unwrap()
            .write_all(&[1u8; 128])
            .unwrap();

        let mut file = image.open_file("A").unwrap();
        let mut buf = [0u8; 200];
        assert_eq!(file.read(&mut buf).unwrap(), 128);
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_headered_open_skips_header() {
        let mut image = DiskImage::create();
        let header = Plus3DosHeader::for_data(FileKind::Code { load_address: 32768 }, 5).unwrap();
        {
            let mut file = image.create_file("CODE.BIN").unwrap();
            file.write_all(&header.to_bytes()).unwrap();
            file.write_all(&[1, 2, 3, 4, 5]).unwrap();
            file.close().unwrap();
        }

        let mut file = image.open_file("CODE.BIN").unwrap();
        assert!(file.is_headered());
        assert_eq!(file.position(), 128);
        assert_eq!(file.size(), 133);
        assert_eq!(file.data_length(), 5);

        let mut rest = Vec::new();
        file.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_close_updates_header_length() {
        let mut image = DiskImage::create();
        let header = Plus3DosHeader::for_data(FileKind::Code { load_address: 0 }, 2).unwrap();
        {
            let mut file = image.create_file("GROW").unwrap();
            file.write_all(&header.to_bytes()).unwrap();
            file.write_all(&[9, 9]).unwrap();
        }
        {
            let mut file = image.edit_file("GROW").unwrap();
            file.seek(SeekFrom::End(0)).unwrap();
            file.write_all(&[7; 100]).unwrap();
            file.close().unwrap();
        }

        let file = image.open_file("GROW").unwrap();
        let header = file.header().unwrap();
        assert_eq!(header.file_length(), 230);
        assert_eq!(header.basic_length(), 102);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let mut image = DiskImage::create();
        image.create_file("RO").unwrap().write_all(b"abc").unwrap();

        let mut file = image.open_file("RO").unwrap();
        assert!(file.write(b"x").is_err());
        assert!(matches!(file.write_at(b"x", 0), Err(DskError::ReadOnly(_))));
    }

    #[test]
    fn test_read_only_attribute_blocks_edit() {
        let mut image = DiskImage::create();
        image.create_file("LOCK").unwrap().write_all(b"abc").unwrap();
        image
            .set_attributes(
                "LOCK",
                &FileAttributes {
                    read_only: true,
                    ..FileAttributes::default()
                },
            )
            .unwrap();

        assert!(matches!(image.edit_file("LOCK"), Err(DskError::ReadOnly(_))));
    }

    #[test]
    fn test_seek() {
        let mut image = DiskImage::create();
        let mut file = image.create_file("S").unwrap();
        file.write_all(&[0u8; 256]).unwrap();

        assert_eq!(file.seek(SeekFrom::Start(10)).unwrap(), 10);
        assert_eq!(file.seek(SeekFrom::Current(-5)).unwrap(), 5);
        assert_eq!(file.seek(SeekFrom::End(-6)).unwrap(), 250);
        assert!(file.seek(SeekFrom::Current(-300)).is_err());
        assert_eq!(file.position(), 250);

        // past the end: reads hit EOF, writes extend with a zero gap
        file.seek(SeekFrom::Start(1000)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 0);
        file.write_all(&[5u8; 4]).unwrap();
        assert_eq!(file.size(), 1004);

        let mut gap = [1u8; 4];
        file.read_at(&mut gap, 500).unwrap();
        assert_eq!(gap, [0u8; 4]);
    }

    #[test]
    fn test_large_file_uses_extents() {
        let mut image = DiskImage::create();
        let data = pattern(20 * 1024);
        {
            let mut file = image.create_file("BIG.BIN").unwrap();
            file.write_all(&data).unwrap();
            file.close().unwrap();
        }

        let extents = image.directory().extents("BIG.BIN").unwrap();
        assert_eq!(extents.len(), 2);
        let first = image.directory().entry(extents[0]).unwrap();
        let second = image.directory().entry(extents[1]).unwrap();
        assert_eq!(first.record_count(), 128);
        assert_eq!(first.blocks().len(), 16);
        assert_eq!(second.extent_number(), 1);
        assert_eq!(second.record_count(), 32);
        assert_eq!(second.blocks().len(), 4);

        assert_eq!(image.read_file("BIG.BIN").unwrap(), data);
    }

    #[test]
    fn test_write_beyond_block_limit() {
        let mut image = DiskImage::create();
        let mut file = image.create_file("HUGE").unwrap();
        let err = file
            .write_at(&[0], MAX_BLOCKS_PER_FILE * BLOCK_SIZE)
            .unwrap_err();
        assert!(matches!(err, DskError::FileTooLarge { .. }));
        assert!(file.blocks().is_empty());
    }

    #[test]
    fn test_write_at_far_offset() {
        let mut image = DiskImage::create();
        let mut file = image.create_file("FAR").unwrap();
        file.seek(SeekFrom::Start(u64::MAX)).unwrap();

        let err = file.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(matches!(
            file.write_at(b"x", usize::MAX).unwrap_err(),
            DskError::FileTooLarge { .. }
        ));
        assert!(file.blocks().is_empty());
        assert_eq!(file.size(), 0);
    }

    #[test]
    fn test_disk_full_rolls_back() {
        let mut image = DiskImage::create();
        let free_before = image.usage().free_space;
        {
            let mut file = image.create_file("FILL").unwrap();
            let err = file.write_at(&vec![0u8; 178 * 1024], 0).unwrap_err();
            assert!(matches!(err, DskError::DiskFull));
            file.close().unwrap();
        }
        assert_eq!(image.usage().free_space, free_before);
    }
}
