/// Integration tests for plus3dsk

use plus3dsk::format::{block_to_sector, linear_to_physical, BLOCK_SIZE, MAX_IMPORT_SIZE};
use plus3dsk::io::{export_tap, import_tap};
use plus3dsk::*;

fn basic_program() -> Vec<u8> {
    // 10 PRINT "HELLO WORLD": GO TO 10
    let mut line = vec![0xF5, b'"'];
    line.extend_from_slice(b"HELLO WORLD");
    line.extend_from_slice(&[b'"', b':', 0xEC, b'1', b'0', 0x0D]);

    let mut program = vec![0x00, 0x0A];
    program.extend_from_slice(&(line.len() as u16).to_le_bytes());
    program.extend_from_slice(&line);
    program.extend(std::iter::repeat(0x20).take(29 - program.len()));
    program
}

#[test]
fn test_fresh_image() {
    let image = DiskImage::create();
    let usage = image.usage();

    assert_eq!(usage.used_space, 0);
    assert_eq!(usage.free_space, usage.total_space);
    assert_eq!(usage.file_count, 0);
    assert!(image.list().is_empty());
    assert!(image.validate(ValidationLevel::Strict).is_empty());
}

#[test]
fn test_import_basic_program() {
    let program = basic_program();
    assert_eq!(program.len(), 29);

    let mut image = DiskImage::create();
    image
        .import_basic("HELLO.BAS", &program, 10)
        .expect("Failed to import program");

    let list = image.list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "HELLO.BAS");
    assert_eq!(list[0].records, 2);

    let header = list[0].header.as_ref().expect("Program should carry a header");
    assert_eq!(header.data_length(), 29);
    match header.kind().expect("Header should decode") {
        FileKind::Program { line, .. } => assert_eq!(line, 10),
        other => panic!("Unexpected kind {:?}", other),
    }

    assert!(image.validate(ValidationLevel::Strict).is_empty());
}

#[test]
fn test_oversized_import_creates_nothing() {
    let mut image = DiskImage::create();
    let data = vec![0u8; MAX_IMPORT_SIZE + 1];

    let err = image.import_raw("HUGE", &data).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Capacity);
    assert!(!image.exists("HUGE"));
    assert_eq!(image.usage().used_space, 0);
    assert_eq!(image.directory().file_count(), 0);
}

#[test]
fn test_block_limit_leaves_bitmap_untouched() {
    let mut image = DiskImage::create();
    let before = image.sector_allocation().free_space_count();

    let err = image.block_allocator().allocate_blocks(257).unwrap_err();
    assert!(matches!(err, DskError::FileTooLarge { .. }));
    assert_eq!(image.sector_allocation().free_space_count(), before);
}

#[test]
fn test_import_export_round_trip() {
    let mut image = DiskImage::create();

    let program = basic_program();
    let code: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
    let screen: Vec<u8> = (0..6912u32).map(|i| (i % 251) as u8).collect();

    image.import_basic("PROG.BAS", &program, 10).unwrap();
    image.import_code("CODE.BIN", &code, 32768).unwrap();
    image.import_screen("PIC.SCR", &screen).unwrap();

    assert_eq!(image.export("PROG.BAS", true).unwrap(), program);
    assert_eq!(image.export("CODE.BIN", true).unwrap(), code);
    assert_eq!(image.export("PIC.SCR", true).unwrap(), screen);
    assert_eq!(image.export_screen("PIC.SCR").unwrap(), screen);

    let headered = image.export("CODE.BIN", false).unwrap();
    assert_eq!(headered.len(), code.len() + 128);
    assert!(headered.starts_with(b"PLUS3DOS"));
}

#[test]
fn test_corrupted_header_detected() {
    let mut image = DiskImage::create();
    image.import_code("LOADER.BIN", &[0xC9; 200], 0x8000).unwrap();

    let block = image.file_blocks("LOADER.BIN").unwrap()[0];
    let location = linear_to_physical(block_to_sector(block).unwrap()).unwrap();
    let mut sector = image
        .get_sector_data(location.track, location.sector, location.side)
        .unwrap()
        .to_vec();

    let header = Plus3DosHeader::from_bytes(&sector).unwrap();
    assert!(header.validate().is_ok());

    // change the load address without fixing the checksum
    sector[18] ^= 0xFF;
    let header = Plus3DosHeader::from_bytes(&sector).unwrap();
    assert!(matches!(
        header.validate(),
        Err(DskError::ChecksumMismatch { .. })
    ));

    image
        .set_sector_data(location.track, location.sector, location.side, &sector)
        .unwrap();
    assert!(image.file_header("LOADER.BIN").unwrap().is_none());

    let violations = image.validate(ValidationLevel::Strict);
    assert!(violations.iter().any(|v| v.check == "header"));
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test.dsk");

    let code: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();
    let mut image = DiskImage::builder()
        .label("GAMES")
        .build()
        .expect("Failed to build image");
    image.import_basic("DISK", &basic_program(), 10).unwrap();
    image.import_code("GAME.BIN", &code, 24000).unwrap();
    image.save(&path).expect("Failed to save image");
    assert!(!image.is_changed());

    let mut loaded = DiskImage::open(&path).expect("Failed to load image");
    assert!(!loaded.is_changed());
    assert_eq!(loaded.label().as_deref(), Some("GAMES"));
    assert_eq!(loaded.list().len(), 2);
    assert_eq!(loaded.export("GAME.BIN", true).unwrap(), code);
    assert_eq!(loaded.usage(), image.usage());
    assert!(loaded.validate(ValidationLevel::Strict).is_empty());

    let length = std::fs::metadata(&path).unwrap().len();
    assert_eq!(length, 256 + 40 * (256 + 9 * 512));
}

#[test]
fn test_delete_and_reuse_space() {
    let mut image = DiskImage::create();
    let data = vec![0x55; 150 * BLOCK_SIZE];

    image.import_raw("FIRST", &data).unwrap();
    let err = image.import_raw("SECOND", &data).unwrap_err();
    assert!(matches!(err, DskError::DiskFull));
    assert!(!image.exists("SECOND"));

    image.delete_file("FIRST").unwrap();
    assert!(matches!(
        image.open_file("FIRST"),
        Err(DskError::FileNotFound(_))
    ));
    assert_eq!(image.usage().used_space, 0);

    image.import_raw("SECOND", &data).unwrap();
    assert_eq!(image.read_file("SECOND").unwrap(), data);
}

#[test]
fn test_defragment_file() {
    let mut image = DiskImage::create();
    image.import_raw("SPLIT", &[0x11; BLOCK_SIZE]).unwrap();
    image.import_raw("WEDGE", &[0x22; BLOCK_SIZE]).unwrap();

    {
        let mut file = image.edit_file("SPLIT").unwrap();
        file.write_at(&[0x33; BLOCK_SIZE], BLOCK_SIZE).unwrap();
        file.close().unwrap();
    }

    let blocks = image.file_blocks("SPLIT").unwrap();
    assert_eq!(blocks.len(), 2);
    assert_ne!(blocks[1], blocks[0] + 1);

    assert!(image.defragment_file("SPLIT").unwrap());
    let blocks = image.file_blocks("SPLIT").unwrap();
    assert_eq!(blocks[1], blocks[0] + 1);
    assert!(!image.defragment_file("SPLIT").unwrap());

    let data = image.read_file("SPLIT").unwrap();
    assert!(data[..BLOCK_SIZE].iter().all(|&b| b == 0x11));
    assert!(data[BLOCK_SIZE..].iter().all(|&b| b == 0x33));
    assert_eq!(image.read_file("WEDGE").unwrap(), vec![0x22; BLOCK_SIZE]);
}

#[test]
fn test_read_only_attribute() {
    let mut image = DiskImage::create();
    image.import_raw("LOCKED", &[1, 2, 3]).unwrap();

    let attributes = image.attributes("LOCKED").unwrap().apply("+R").unwrap();
    image.set_attributes("LOCKED", &attributes).unwrap();

    assert!(matches!(image.edit_file("LOCKED"), Err(DskError::ReadOnly(_))));
    assert!(matches!(image.delete_file("LOCKED"), Err(DskError::ReadOnly(_))));
    assert_eq!(image.list()[0].attributes.flags_string(), "R------");

    image.delete_file_forced("LOCKED").unwrap();
    assert!(!image.exists("LOCKED"));
}

#[test]
fn test_tap_round_trip() {
    let code: Vec<u8> = (0..500u32).map(|i| (i * 3) as u8).collect();

    let mut source = DiskImage::create();
    source.import_code("LOADER.BIN", &code, 0x8000).unwrap();
    let tap = export_tap(&mut source, "LOADER.BIN").expect("Failed to export TAP");

    let mut target = DiskImage::create();
    let created = import_tap(&mut target, &tap).expect("Failed to import TAP");
    assert_eq!(created, vec!["LOADER.BIN".to_string()]);

    assert_eq!(target.export("LOADER.BIN", true).unwrap(), code);
    let header = target.file_header("LOADER.BIN").unwrap().unwrap();
    assert_eq!(
        header.kind().unwrap(),
        FileKind::Code {
            load_address: 0x8000
        }
    );
}
