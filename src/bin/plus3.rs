/// Interactive +3DOS disk image console

use dez80::Instruction;

use plus3dsk::io::{export_tap, import_tap};
use plus3dsk::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::path::{Path, PathBuf};

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                "attrib",
                "create",
                "dasm",
                "defrag",
                "delete",
                "dir",
                "exit",
                "export",
                "help",
                "import",
                "info",
                "open",
                "quit",
                "save",
                "tap-export",
                "tap-import",
                "validate",
            ],
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the first word (command name)
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Get the path to the history file
fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".plus3_history");
        p
    })
}

/// What the console is working on
struct Session {
    image: Option<DiskImage>,
}

/// Outcome of one command line
enum Flow {
    Continue,
    Quit,
}

impl Session {
    fn image(&mut self) -> Result<&mut DiskImage> {
        self.image
            .as_mut()
            .ok_or_else(|| DskError::invalid_format("no disk image open (use 'open' or 'create')"))
    }

    fn execute(&mut self, parts: &[String]) -> Result<Flow> {
        let command = parts[0].to_lowercase();
        let args = &parts[1..];

        match command.as_str() {
            "help" => print_help(),
            "quit" | "exit" => {
                if self.image.as_ref().is_some_and(DiskImage::is_changed) {
                    println!("Image has unsaved changes. Use 'save' first or 'quit!' to discard.");
                } else {
                    return Ok(Flow::Quit);
                }
            }
            "quit!" | "exit!" => return Ok(Flow::Quit),
            "create" => {
                let mut builder = DiskImage::builder();
                if let Some(label) = args.first() {
                    builder = builder.label(label);
                }
                self.image = Some(builder.build()?);
                println!("Created new +3 disk image");
            }
            "open" | "load" => {
                let Some(path) = args.first() else {
                    println!("Usage: open <path>");
                    return Ok(Flow::Continue);
                };
                self.image = Some(DiskImage::open(path)?);
                println!("Opened: {}", path);
            }
            "save" => {
                let image = self.image()?;
                let path = match args.first() {
                    Some(path) => path.clone(),
                    None => match image.filename() {
                        Some(name) => name.to_string(),
                        None => {
                            println!("Usage: save <path>");
                            return Ok(Flow::Continue);
                        }
                    },
                };
                image.save(&path)?;
                println!("Saved: {}", path);
            }
            "info" => print_info(self.image()?)?,
            "dir" | "cat" | "ls" => {
                let all = args.first().is_some_and(|a| a == "-a");
                print_directory(self.image()?, all);
            }
            "import" => self.import(args)?,
            "export" => self.export(args)?,
            "delete" | "erase" => {
                let Some(name) = args.first() else {
                    println!("Usage: delete <name> [force]");
                    return Ok(Flow::Continue);
                };
                let image = self.image()?;
                if args.get(1).is_some_and(|a| a == "force") {
                    image.delete_file_forced(name)?;
                } else {
                    image.delete_file(name)?;
                }
                println!("Deleted {}", name.to_uppercase());
            }
            "attrib" => {
                let Some(name) = args.first() else {
                    println!("Usage: attrib <name> [+R-S+A...]");
                    return Ok(Flow::Continue);
                };
                let image = self.image()?;
                let current = image.attributes(name)?;
                if let Some(flags) = args.get(1) {
                    let Some(updated) = current.apply(flags) else {
                        println!("Invalid attribute flags: {}", flags);
                        return Ok(Flow::Continue);
                    };
                    image.set_attributes(name, &updated)?;
                    println!("{} {}", updated.flags_string(), name.to_uppercase());
                } else {
                    println!("{} {}", current.flags_string(), name.to_uppercase());
                }
            }
            "validate" => {
                let level = match args.first().map(|s| s.as_str()) {
                    Some("basic") => ValidationLevel::Basic,
                    _ => ValidationLevel::Strict,
                };
                let violations = self.image()?.validate(level);
                if violations.is_empty() {
                    println!("No problems found ({:?})", level);
                } else {
                    for violation in &violations {
                        println!("{}", violation);
                    }
                    println!("{} problem(s) found", violations.len());
                }
            }
            "defrag" => {
                let Some(name) = args.first() else {
                    println!("Usage: defrag <name>");
                    return Ok(Flow::Continue);
                };
                if self.image()?.defragment_file(name)? {
                    println!("Defragmented {}", name.to_uppercase());
                } else {
                    println!("{} is already contiguous", name.to_uppercase());
                }
            }
            "dasm" | "disassemble" => {
                let Some(name) = args.first() else {
                    println!("Usage: dasm <name> [max-bytes]");
                    return Ok(Flow::Continue);
                };
                let limit = args.get(1).and_then(|s| s.parse::<usize>().ok());
                let image = self.image()?;
                let origin = match image.file_header(name)?.map(|h| h.kind()) {
                    Some(Ok(FileKind::Code { load_address })) => load_address,
                    _ => 0,
                };
                let data = image.export(name, true)?;
                let len = limit.unwrap_or(data.len()).min(data.len());
                disassemble_z80(&data[..len], origin);
            }
            "tap-import" => {
                let Some(path) = args.first() else {
                    println!("Usage: tap-import <tap-path>");
                    return Ok(Flow::Continue);
                };
                let data = std::fs::read(path)?;
                let created = import_tap(self.image()?, &data)?;
                for name in &created {
                    println!("Imported {}", name);
                }
                println!("{} file(s) imported", created.len());
            }
            "tap-export" => {
                let Some(name) = args.first() else {
                    println!("Usage: tap-export <name> [tap-path]");
                    return Ok(Flow::Continue);
                };
                let target = match args.get(1) {
                    Some(path) => PathBuf::from(path),
                    None => PathBuf::from(format!("{}.tap", stem(name).to_lowercase())),
                };
                let data = export_tap(self.image()?, name)?;
                write_host_file(&target, &data)?;
                println!("Wrote {} ({} bytes)", target.display(), data.len());
            }
            _ => {
                println!("Unknown command: {}", command);
                println!("Type 'help' for available commands");
            }
        }

        Ok(Flow::Continue)
    }

    fn import(&mut self, args: &[String]) -> Result<()> {
        let Some(host) = args.first() else {
            println!("Usage: import <host-path> [basic [line] | code <address> | screen | raw]");
            return Ok(());
        };
        let host = Path::new(host);
        let data = std::fs::read(host)?;

        let detected = match host.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bas") => "basic",
            Some(ext) if ext.eq_ignore_ascii_case("scr") && data.len() == 6912 => "screen",
            _ => "raw",
        };
        let kind = args.get(1).map(|s| s.to_lowercase());
        let kind = kind.as_deref().unwrap_or(detected);
        let param = args.get(2).and_then(|s| parse_number(s));

        let image = self.image()?;
        let name = match kind {
            "basic" => {
                let name = disk_filename(host, Some("BAS"));
                match param {
                    Some(line) => image.import_basic(&name, &data, line)?,
                    None => image.import_basic_no_autostart(&name, &data)?,
                }
                name
            }
            "code" => {
                let Some(address) = param else {
                    println!("Usage: import <host-path> code <address>");
                    return Ok(());
                };
                let name = disk_filename(host, Some("BIN"));
                image.import_code(&name, &data, address)?;
                name
            }
            "screen" => {
                let name = disk_filename(host, Some("SCR"));
                image.import_screen(&name, &data)?;
                name
            }
            "raw" => {
                let name = disk_filename(host, None);
                image.import_raw(&name, &data)?;
                name
            }
            other => {
                println!("Unknown import type: {}", other);
                return Ok(());
            }
        };

        println!("Imported {} as {} ({} bytes)", host.display(), name, data.len());
        Ok(())
    }

    fn export(&mut self, args: &[String]) -> Result<()> {
        let Some(name) = args.first() else {
            println!("Usage: export <name> [host-path] [raw]");
            println!("  PLUS3DOS headers are stripped unless 'raw' is given.");
            println!("  .BAS files must be BASIC programs and .SCR files screen dumps.");
            return Ok(());
        };
        let raw = args.iter().skip(1).any(|a| a == "raw");
        let target = args
            .iter()
            .skip(1)
            .find(|a| *a != "raw")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(name.to_lowercase()));

        let image = self.image()?;
        let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        let data = match ext.as_deref() {
            _ if raw => image.export(name, false)?,
            Some("bas") => image.export_basic(name)?,
            Some("scr") => image.export_screen(name)?,
            _ => image.export(name, true)?,
        };
        write_host_file(&target, &data)?;
        println!("Exported {} to {} ({} bytes)", name.to_uppercase(), target.display(), data.len());
        Ok(())
    }
}

/// Write a host file, removing it again if the write fails part way
fn write_host_file(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let result = std::fs::File::create(path).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(e) = result {
        let _ = std::fs::remove_file(path);
        return Err(e.into());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("=== plus3 ===");
    println!("Interactive console for ZX Spectrum +3 disk images.");
    println!("Type 'help' for available commands\n");

    let mut rl = match Editor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create editor: {}", e);
            std::process::exit(1);
        }
    };
    rl.set_helper(Some(CommandCompleter::new()));

    // Load history if available
    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let mut session = Session { image: None };

    loop {
        let input = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }

        match session.execute(&parts) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => println!("Error: {}", e),
        }
    }

    if let Some(history_path) = history_path() {
        let _ = rl.save_history(&history_path);
    }
    println!("Goodbye!");
}

fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn parse_number(s: &str) -> Option<u16> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix('#')) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn stem(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

fn print_help() {
    println!("Available commands:");
    println!("  create [label]                 - Create a new formatted +3 disk");
    println!("  open <path>                    - Open a DSK image (use quotes for paths with spaces)");
    println!("  save [path]                    - Save the image");
    println!("  info                           - Show disk information and usage");
    println!("  dir [-a]                       - List files (-a includes deleted entries)");
    println!("  import <path> [type] [param]   - Import a host file; type is basic [line],");
    println!("                                   code <address>, screen or raw");
    println!("  export <name> [path] [raw]     - Export a file, stripping its header unless raw");
    println!("  delete <name> [force]          - Delete a file (force ignores read-only)");
    println!("  attrib <name> [+R-S+A...]      - Show or change attributes (R, S, A, 1-4)");
    println!("  validate [basic|strict]        - Check the image structure");
    println!("  defrag <name>                  - Move a file into contiguous blocks");
    println!("  dasm <name> [bytes]            - Disassemble a file's data as Z80 code");
    println!("  tap-import <path>              - Import every file from a TAP image");
    println!("  tap-export <name> [path]       - Write a headered file as a TAP image");
    println!("  help                           - Show this help");
    println!("  quit | exit                    - Leave the console (quit! discards changes)");
}

fn print_info(image: &DiskImage) -> Result<()> {
    let header = image.header();
    let usage = image.usage();
    let boot = image.boot_sector()?;

    println!("Format:      {}", header.format().name());
    println!("Creator:     {}", header.creator());
    println!("Geometry:    {} tracks, {} side(s), {} bytes per track",
        header.num_tracks(), header.num_sides(), header.track_size());
    if let Some(label) = image.label() {
        println!("Label:       {}", label);
    }
    if let Some(name) = image.filename() {
        println!("File:        {}", name);
    }
    println!("Bootable:    {}", if boot.is_bootable() { "yes" } else { "no" });
    println!("Files:       {}", usage.file_count);
    println!("Used:        {}K of {}K", usage.used_space / 1024, usage.total_space / 1024);
    println!("Free:        {}K, {} directory entries", usage.free_space / 1024, usage.free_entries);
    println!("Modified:    {}", if image.is_changed() { "yes" } else { "no" });
    Ok(())
}

fn print_directory(image: &DiskImage, include_deleted: bool) {
    let entries = if include_deleted {
        image.list_all()
    } else {
        image.list()
    };

    if entries.is_empty() {
        println!("No files");
    } else {
        println!("{:<12} {:>4} {:>7} {:>3} {:<7}  Header", "Name", "User", "Size", "Ext", "Attr");
        for entry in &entries {
            let name = if entry.deleted {
                format!("{}*", entry.name)
            } else {
                entry.name.clone()
            };
            println!(
                "{:<12} {:>4} {:>7} {:>3} {:<7}  {}",
                name,
                entry.user,
                entry.size,
                entry.extents,
                entry.attributes.flags_string(),
                entry.header_summary()
            );
        }
    }

    let usage = image.usage();
    println!(
        "{} file(s), {}K free",
        usage.file_count,
        usage.free_space / 1024
    );
}

fn disassemble_z80(data: &[u8], origin: u16) {
    let mut slice: &[u8] = data;
    let mut offset: usize = 0;

    while !slice.is_empty() {
        let start_len = slice.len();
        let address = origin.wrapping_add(offset as u16);

        match Instruction::decode_one(&mut slice) {
            Ok(instruction) => {
                let bytes_consumed = start_len - slice.len();
                let bytes: Vec<String> = data[offset..offset + bytes_consumed]
                    .iter()
                    .map(|b| format!("{:02X}", b))
                    .collect();

                println!("{:04X}  {:<12} {}", address, bytes.join(" "), instruction);
                offset += bytes_consumed;
            }
            Err(_) => {
                // Incomplete instruction at the end of the data
                println!("{:04X}  {:02X}           DB {:02X}h", address, slice[0], slice[0]);
                slice = &slice[1..];
                offset += 1;
            }
        }
    }
}
