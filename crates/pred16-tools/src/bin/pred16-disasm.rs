use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use pred16::disasm::{disassemble, fmt_decoded_with_labels};
use pred16::Bus;
use pred16_tools::{load_labels, load_raw_bin, parse_u16, Image};

#[derive(Parser, Debug)]
#[command(author, version, about = "pred16 disassembler CLI", long_about = None)]
struct Cli {
    /// Load address for the binary
    #[arg(long, default_value_t = 0u16)]
    base: u16,
    /// Skip N bytes at start of file before loading
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Input binary path
    #[arg(value_name = "BINFILE")]
    input: PathBuf,
    /// Limit bytes loaded (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List loaded segments
    Sections,
    /// Disassemble a range [start, end) in bytes
    Range {
        /// Start address (hex or dec)
        start: String,
        /// End address (hex or dec, exclusive; 0x10000 reaches the top of memory)
        end: String,
        /// Show instruction bytes
        #[arg(long)]
        show_bytes: bool,
        /// Symbol table JSON written by pred16-asm --symbols
        #[arg(long, value_name = "FILE")]
        labels_in: Option<PathBuf>,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn parse_end(s: &str) -> Result<u32> {
    let s = s.trim();
    let v = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)?
    } else {
        s.parse::<u32>()?
    };
    anyhow::ensure!(v <= 0x1_0000, "end {v:#x} is past the end of memory");
    Ok(v)
}

fn render_sections(img: &Image) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "{:<10} {:<8} {:<8} {:<6}", "name", "start", "end", "size");
    for s in &img.segments {
        let _ = writeln!(
            buf,
            "{:<10} {:#06x}   {:#07x}  {:<6}",
            s.name,
            s.base,
            s.end(),
            s.bytes.len()
        );
    }
    buf
}

/// Linear listing of `[start, end)`. A label line precedes every address
/// that has one.
fn render_range<B: Bus>(
    bus: &B,
    start: u16,
    end: u32,
    show_bytes: bool,
    labels: &BTreeMap<u16, String>,
) -> String {
    let mut buf = String::new();
    for line in disassemble(bus, start, end) {
        if let Some(name) = labels.get(&line.addr) {
            let _ = writeln!(buf, "{name}:");
        }
        let text = match &line.insn {
            Some(d) => fmt_decoded_with_labels(d, labels),
            None => line.text(),
        };
        let _ = write!(buf, "{:#06x}: ", line.addr);
        if show_bytes {
            let hex: Vec<String> = line.bytes.iter().map(|b| format!("{b:02x}")).collect();
            // Widest instruction is 7 bytes.
            let _ = write!(buf, "{:<21}", hex.join(" "));
        }
        let _ = writeln!(buf, "{text}");
    }
    buf
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let img = load_raw_bin(Path::new(&cli.input), cli.base, cli.skip, cli.len)?;
    tracing::debug!(segments = img.segments.len(), "image loaded");

    match cli.cmd {
        Command::Sections => print!("{}", render_sections(&img)),
        Command::Range {
            start,
            end,
            show_bytes,
            labels_in,
            out,
        } => {
            let start = parse_u16(&start)?;
            let end = parse_end(&end)?;
            anyhow::ensure!(end >= start as u32, "end must be >= start");

            let labels = match &labels_in {
                Some(path) => load_labels(path)?,
                None => BTreeMap::new(),
            };
            let mem = img.to_memory();
            let buf = render_range(&mem, start, end, show_bytes, &labels);
            if let Some(path) = out {
                std::fs::write(path, buf)?;
            } else {
                print!("{buf}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pred16::{assemble, Memory};
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_end_accepts_top_of_memory() {
        assert_eq!(parse_end("0x10000").unwrap(), 0x1_0000);
        assert_eq!(parse_end("12").unwrap(), 12);
        assert!(parse_end("0x10001").is_err());
    }

    #[test]
    fn range_lists_labels_and_bytes() {
        let asm = assemble("start: mov 5, r0\nloop: call loop\nnop.").unwrap();
        let mut mem = Memory::new();
        mem.load(&asm.code, 0);
        let labels = pred16_tools::invert(&asm.symbols);

        let text = render_range(&mem, 0, asm.code.len() as u32, false, &labels);
        assert_eq!(
            text,
            "start:\n0x0000: mov 0x5, r0\nloop:\n0x0004: call loop\n0x0007: nop.\n"
        );

        let text = render_range(&mem, 0, 4, true, &BTreeMap::new());
        assert_eq!(text, format!("0x0000: {:<21}mov 0x5, r0\n", "81 05 00 00"));
    }

    #[test]
    fn sections_table() {
        let img = Image {
            segments: vec![pred16_tools::Segment {
                name: "segment0".into(),
                base: 0x100,
                bytes: vec![0; 16],
            }],
        };
        let text = render_sections(&img);
        assert!(text.lines().nth(1).unwrap().starts_with("segment0   0x0100   0x00110"));
    }
}
