/// DSK file reader

use crate::error::{DskError, Result};
use crate::filesystem::Directory;
use crate::format::constants::*;
use crate::image::{DiskHeader, DiskImage, SectorAllocation, TrackInfo};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read a DSK file from disk
pub fn read_dsk<P: AsRef<Path>>(path: P) -> Result<DiskImage> {
    let file = File::open(path.as_ref())?;
    let mut image = read_dsk_reader(BufReader::new(file))?;
    image.filename = Some(path.as_ref().display().to_string());
    Ok(image)
}

/// Parse a DSK image held in memory
pub fn read_dsk_from(data: &[u8]) -> Result<DiskImage> {
    read_dsk_reader(data)
}

/// Read a DSK image from any byte stream
pub fn read_dsk_reader<R: Read>(mut reader: R) -> Result<DiskImage> {
    let mut offset = 0;

    let mut disk_info = vec![0u8; DISK_INFO_BLOCK_SIZE];
    read_exact_at(&mut reader, &mut disk_info, offset)?;
    offset += DISK_INFO_BLOCK_SIZE;

    let header = DiskHeader::parse(&disk_info)?;
    let problems = header.geometry_problems();
    if !problems.is_empty() {
        return Err(DskError::invalid_format(problems.join("; ")));
    }

    let mut tracks = Vec::with_capacity(header.track_count());
    for index in 0..header.track_count() {
        let track = (index % TRACKS_PER_SIDE) as u8;
        let side = (index / TRACKS_PER_SIDE) as u8;
        let table_size = disk_info[DISK_INFO_EXT_TRACK_SIZE_OFFSET + index] as usize * 256;

        let (data, consumed) = read_track(&mut reader, track, side, table_size, offset)?;
        tracks.push(data);
        offset += consumed;
    }

    let mut image = DiskImage {
        header,
        tracks,
        allocation: SectorAllocation::standard(),
        directory: Directory::new(),
        changed: false,
        filename: None,
    };
    image.reload_directory()?;
    image.changed = false;

    log::debug!(
        "Loaded image: {} tracks, {} files",
        image.tracks.len(),
        image.directory.file_count()
    );
    Ok(image)
}

/// Read one track, returning its sector data in ID order and the bytes consumed
fn read_track<R: Read>(
    reader: &mut R,
    track: u8,
    side: u8,
    table_size: usize,
    offset: usize,
) -> Result<(Vec<u8>, usize)> {
    let mut block = vec![0u8; TRACK_INFO_BLOCK_SIZE];
    read_exact_at(reader, &mut block, offset)?;

    let info = TrackInfo::parse(&block, offset)?;
    let problems = info.layout_problems(track, side);
    if !problems.is_empty() {
        return Err(DskError::invalid_format(problems.join("; ")));
    }

    let mut raw = vec![0u8; info.data_size()];
    read_exact_at(reader, &mut raw, offset + TRACK_INFO_BLOCK_SIZE)?;

    let mut data = vec![0u8; TRACK_SIZE];
    for (position, physical) in info.id_order().into_iter().enumerate() {
        let from = physical * BYTES_PER_SECTOR;
        let to = position * BYTES_PER_SECTOR;
        data[to..to + BYTES_PER_SECTOR].copy_from_slice(&raw[from..from + BYTES_PER_SECTOR]);
    }

    // Tracks may be padded up to the size in the disk info table
    let mut consumed = TRACK_INFO_BLOCK_SIZE + raw.len();
    if table_size > consumed {
        let padding = (table_size - consumed) as u64;
        let skipped = io::copy(&mut reader.take(padding), &mut io::sink())?;
        consumed += skipped as usize;
    }

    log::trace!("Read track {} side {}", track, side);
    Ok((data, consumed))
}

fn read_exact_at<R: Read>(reader: &mut R, buf: &mut [u8], offset: usize) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DskError::parse(offset, "image truncated")
        } else {
            DskError::Io(e)
        }
    })
}
