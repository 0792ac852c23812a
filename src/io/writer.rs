/// DSK file writer

use crate::error::{DskError, Result};
use crate::format::constants::*;
use crate::format::geometry::track_bounds;
use crate::image::{DiskImage, TrackInfo};
use crate::validation::ValidationLevel;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a DSK file to disk
///
/// The image is validated before the host file is created, so a rejected
/// image never leaves a truncated file behind.
pub fn write_dsk<P: AsRef<Path>>(image: &mut DiskImage, path: P) -> Result<()> {
    prepare(image)?;

    let mut file = BufWriter::new(File::create(path.as_ref())?);
    write_tracks(image, &mut file)?;
    file.flush()?;

    log::debug!("Saved image to {}", path.as_ref().display());
    Ok(())
}

/// Serialize a DSK image to any byte sink
pub fn write_dsk_to<W: Write>(image: &mut DiskImage, out: &mut W) -> Result<()> {
    prepare(image)?;
    write_tracks(image, out)
}

/// Check the image can be written and bring it in line with what is written
///
/// The directory is flushed into its sectors and every track with no
/// allocated sector is reformatted with filler, in memory as on disk.
fn prepare(image: &mut DiskImage) -> Result<()> {
    let violations = image.validate(ValidationLevel::Basic);
    if !violations.is_empty() {
        let messages: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
        return Err(DskError::invalid_format(messages.join("; ")));
    }
    image.flush_directory();

    let mut reformatted = 0;
    for index in 0..image.tracks.len() {
        let track = (index % TRACKS_PER_SIDE) as u8;
        let side = (index / TRACKS_PER_SIDE) as u8;
        let (first, last) = track_bounds(track, side)?;
        if !(first..=last).any(|s| image.allocation.is_allocated(s)) {
            image.tracks[index].fill(FILLER_BYTE);
            reformatted += 1;
        }
    }
    log::debug!("{} unallocated tracks reformatted", reformatted);
    Ok(())
}

fn write_tracks<W: Write>(image: &DiskImage, out: &mut W) -> Result<()> {
    out.write_all(&image.header.to_bytes())?;

    for (index, data) in image.tracks.iter().enumerate() {
        let track = (index % TRACKS_PER_SIDE) as u8;
        let side = (index / TRACKS_PER_SIDE) as u8;

        out.write_all(&TrackInfo::standard(track, side).to_bytes())?;
        out.write_all(data)?;
    }

    log::debug!("Wrote {} tracks", image.tracks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::read_dsk_from;

    fn track_data_offset(track: usize) -> usize {
        DISK_INFO_BLOCK_SIZE + track * (TRACK_INFO_BLOCK_SIZE + TRACK_SIZE) + TRACK_INFO_BLOCK_SIZE
    }

    #[test]
    fn test_serialized_layout() {
        let bytes = DiskImage::create().to_bytes().unwrap();

        assert_eq!(
            bytes.len(),
            DISK_INFO_BLOCK_SIZE + TRACKS_PER_SIDE * (TRACK_INFO_BLOCK_SIZE + TRACK_SIZE)
        );
        assert!(bytes.starts_with(EXTENDED_DSK_SIGNATURE));
        assert!(bytes[DISK_INFO_BLOCK_SIZE..].starts_with(TRACK_INFO_MARKER));

        // directory sectors carry deleted markers
        let directory = track_data_offset(0) + DIRECTORY_START_SECTOR * BYTES_PER_SECTOR;
        assert_eq!(bytes[directory], 0xE5);
    }

    #[test]
    fn test_unallocated_tracks_written_blank() {
        let mut image = DiskImage::create();
        image.import_raw("KEEP", &[0x11; 100]).unwrap();
        // stale bytes on a track no file uses
        image.raw_sector_mut(30 * SECTORS_PER_TRACK).unwrap().fill(0x77);

        let bytes = image.to_bytes().unwrap();
        let track30 = track_data_offset(30);
        assert!(bytes[track30..track30 + TRACK_SIZE].iter().all(|&b| b == FILLER_BYTE));

        let reloaded = read_dsk_from(&bytes).unwrap();
        assert_eq!(reloaded.list().len(), 1);
    }

    #[test]
    fn test_saved_image_matches_memory() {
        let mut image = DiskImage::create();
        image.raw_sector_mut(25 * SECTORS_PER_TRACK + 4).unwrap().fill(0x66);
        let violations = image.validate(ValidationLevel::Strict);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].check, "filler");

        let bytes = image.to_bytes().unwrap();
        assert!(image.validate(ValidationLevel::Strict).is_empty());
        assert!(image.track_data(25, 0).unwrap().iter().all(|&b| b == FILLER_BYTE));
        assert_eq!(image.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_invalid_image_not_written() {
        let mut image = DiskImage::create();
        image.header.num_sides = 2;

        let mut out = Vec::new();
        let err = write_dsk_to(&mut image, &mut out).unwrap_err();
        assert!(matches!(err, DskError::InvalidFormat(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_directory_flushed_on_write() {
        let mut image = DiskImage::create();
        image.import_code("LOADER.BIN", &[0xC9], 0x8000).unwrap();

        let bytes = image.to_bytes().unwrap();
        let slot = track_data_offset(0) + DIRECTORY_START_SECTOR * BYTES_PER_SECTOR;
        assert_eq!(bytes[slot], 0);
        assert_eq!(&bytes[slot + 1..slot + 12], b"LOADER  BIN");
    }
}
