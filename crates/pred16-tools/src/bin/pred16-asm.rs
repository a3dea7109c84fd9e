use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pred16::{assemble, Assembled, Memory};

#[derive(Parser, Debug)]
#[command(author, version, about = "pred16 assembler")]
struct Opts {
    /// Input assembly file
    #[arg(short, long)]
    input: PathBuf,
    /// Output binary file
    #[arg(short, long)]
    output: PathBuf,
    /// Write a full 64 KiB memory image instead of just the code
    #[arg(long)]
    image: bool,
    /// Also write the symbol table as JSON
    #[arg(long, value_name = "FILE")]
    symbols: Option<PathBuf>,
}

fn output_bytes(asm: &Assembled, image: bool) -> Vec<u8> {
    if !image {
        return asm.code.clone();
    }
    let mut mem = Memory::new();
    mem.load(&asm.code, 0);
    mem.image().to_vec()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let text = fs::read_to_string(&opts.input)
        .with_context(|| format!("reading {}", opts.input.display()))?;
    let asm = assemble(&text).with_context(|| format!("assembling {}", opts.input.display()))?;
    tracing::info!(bytes = asm.code.len(), labels = asm.symbols.len(), "assembled");

    fs::write(&opts.output, output_bytes(&asm, opts.image))
        .with_context(|| format!("writing {}", opts.output.display()))?;
    if let Some(path) = &opts.symbols {
        let json = serde_json::to_string_pretty(&asm.symbols)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
