/// I/O operations for reading and writing DSK files

/// Reader implementation for DSK files
pub mod reader;
/// TAP tape image conversion
pub mod tap;
/// Writer implementation for DSK files
pub mod writer;

pub use reader::{read_dsk, read_dsk_from, read_dsk_reader};
pub use tap::{export_tap, import_tap, parse_tap, TapBlock, TapHeader};
pub use writer::{write_dsk, write_dsk_to};
