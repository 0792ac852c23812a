/*!
# plus3dsk

A Rust library for creating, reading and writing ZX Spectrum +3DOS disk
images stored in the Extended CPC DSK container.

## Features

- Standard +3 geometry: 40 tracks, 9 sectors of 512 bytes, single sided
- Sector allocation bitmap and 1 KiB block allocator with rollback
- CP/M directory with extents, user numbers, attributes and volume label
- PLUS3DOS file headers for programs, arrays, code and screens
- `std::io::Read`/`Write`/`Seek` file handles
- Structural validation at two levels
- Boot sectors, TAP conversion and defragmentation

## Quick Start

```rust,no_run
use plus3dsk::{DiskImage, ValidationLevel};

// Create a formatted disk and add a BASIC program
let mut image = DiskImage::create();
image.import_basic("HELLO.BAS", &[0x00, 0x0A, 0x02, 0x00, 0xFD, 0x0D], 10)?;

// List the directory
for entry in image.list() {
    println!("{:12} {:6} {}", entry.name, entry.size, entry.header_summary());
}

// Check the image and save it
assert!(image.validate(ValidationLevel::Strict).is_empty());
image.save("hello.dsk")?;

// Load it back and export the program without its header
let mut loaded = DiskImage::open("hello.dsk")?;
let program = loaded.export("HELLO.BAS", true)?;
# Ok::<(), plus3dsk::DskError>(())
```

## Modules

- `format`: container constants, signature detection and sector addressing
- `image`: the disk image, its header, tracks and allocation bitmap
- `filesystem`: directory, block allocator, file headers and file handles
- `boot`: boot sector and disk specification record
- `validation`: structural checks
- `io`: DSK reading and writing, TAP conversion
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Boot sector and disk specification record
pub mod boot;
/// Error types and Result alias
pub mod error;
/// +3DOS filesystem
pub mod filesystem;
/// DSK format constants and addressing
pub mod format;
/// Core disk image
pub mod image;
/// I/O operations for reading and writing DSK files
pub mod io;
/// Structural validation
pub mod validation;

// Re-export common types
pub use boot::{BootSector, DiskSpecification};
pub use error::{DskError, ErrorCategory, Result};
pub use filesystem::{
    disk_filename, BlockAllocator, DirEntry, Directory, DirectoryEntry, EntryStatus, File,
    FileAttributes, FileKind, ImportOptions, Plus3DosHeader,
};
pub use format::{DiskImageFormat, PhysicalSector};
pub use image::{DiskHeader, DiskImage, DiskImageBuilder, DiskUsage, SectorAllocation};
pub use validation::{ValidationLevel, Validator, Violation};
