//! Small CLI for poking at a delta document.
//!
//! Commands run in order against one document opened on `<file>`; the source
//! file only changes through `save`.
//!
//! Usage:
//!   delta_inspect <file> [command]...
//!
//! Commands:
//!   set <pos> <byte>        overwrite one byte (decimal or 0x-prefixed hex)
//!   insert <pos> <hex>      insert bytes given as hex digits
//!   delete <pos> <len>      remove a range
//!   hex <pos> <len>         dump a range
//!   segments                print the segment layout as JSON
//!   stats                   print document and repository stats as JSON
//!   save <path>             write the document and rebase onto the new file
//!
//! Set `RUST_LOG=delta_document=trace` to watch the segment surgery.

use delta_document::{Config, DeltaDocument, SegmentsRepository, StorageError};
use std::env;
use std::process::exit;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Usage: delta_inspect <file> [command]...");
    eprintln!("Commands:");
    eprintln!("  set <pos> <byte>    - Overwrite one byte");
    eprintln!("  insert <pos> <hex>  - Insert hex-encoded bytes");
    eprintln!("  delete <pos> <len>  - Remove a range");
    eprintln!("  hex <pos> <len>     - Dump a range");
    eprintln!("  segments            - Print the segment layout");
    eprintln!("  stats               - Print statistics");
    eprintln!("  save <path>         - Save and rebase");
    exit(1);
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("ERROR: {}", message);
    exit(1);
}

fn parse_number(text: &str) -> u64 {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.unwrap_or_else(|_| fail(format!("invalid number: {}", text)))
}

fn parse_hex(text: &str) -> Vec<u8> {
    if !text.is_ascii() || text.len() % 2 != 0 {
        fail(format!("invalid hex: {}", text));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .unwrap_or_else(|_| fail(format!("invalid hex: {}", text)))
        })
        .collect()
}

fn next_arg<'a>(rest: &mut impl Iterator<Item = &'a str>, name: &str) -> String {
    match rest.next() {
        Some(value) => value.to_string(),
        None => fail(format!("missing argument <{}>", name)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}

fn hex_dump(document: &DeltaDocument, position: u64, length: u64) -> Result<(), StorageError> {
    let bytes = document.read_range(position, length)?;
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let text: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!(
            "{:08x}  {:<47}  {}",
            position + (row * 16) as u64,
            hex.join(" "),
            text
        );
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let repository = SegmentsRepository::new(Config::new()).unwrap_or_else(|e| fail(e));
    let mut document = repository
        .open_document(&args[1])
        .unwrap_or_else(|e| fail(format!("failed to open {}: {}", args[1], e)));

    let mut rest = args[2..].iter().map(String::as_str);

    while let Some(command) = rest.next() {
        let result = match command {
            "set" => {
                let position = parse_number(&next_arg(&mut rest, "pos"));
                let value = parse_number(&next_arg(&mut rest, "byte"));
                if value > 0xFF {
                    fail(format!("byte out of range: {}", value));
                }
                document.set_byte(position, value as u8)
            }
            "insert" => {
                let position = parse_number(&next_arg(&mut rest, "pos"));
                let data = parse_hex(&next_arg(&mut rest, "hex"));
                document.insert(position, &data)
            }
            "delete" => {
                let position = parse_number(&next_arg(&mut rest, "pos"));
                let length = parse_number(&next_arg(&mut rest, "len"));
                document.remove(position, length)
            }
            "hex" => {
                let position = parse_number(&next_arg(&mut rest, "pos"));
                let length = parse_number(&next_arg(&mut rest, "len"));
                hex_dump(&document, position, length)
            }
            "segments" => {
                print_json(&document.segments());
                Ok(())
            }
            "stats" => {
                print_json(&document.stats());
                print_json(&repository.stats());
                Ok(())
            }
            "save" => {
                let path = next_arg(&mut rest, "path");
                repository
                    .save_document(&mut document, &path)
                    .map(|written| println!("SAVED: {} bytes to {}", written, path))
            }
            _ => usage(),
        };

        if let Err(e) = result {
            fail(format!("{} failed: {}", command, e));
        }
    }

    drop(document);
    if let Err(e) = repository.dispose() {
        eprintln!("Warning: Failed to clean up swap files: {}", e);
    }
}
