use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pred16::{assemble, CpuConfig, Machine, Memory, MEMORY_SIZE};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run a pred16 program (.asm source, memory image, or raw binary)"
)]
struct Opts {
    /// Initial instruction pointer
    #[arg(short, long)]
    entry: Option<u16>,
    /// Initial stack pointer
    #[arg(long)]
    sp: Option<u16>,
    /// CpuConfig as JSON; --entry/--sp override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Load address for raw binaries
    #[arg(long, default_value_t = 0u16)]
    base: u16,
    /// Stop after this many instructions
    #[arg(long, default_value_t = 10_000_000u64)]
    max_steps: u64,
    /// Write the final memory image here
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
    /// Print registers when the run ends
    #[arg(long)]
    regs: bool,
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

/// Forwards OUT bytes to `w`. The first write error stops further output and
/// is reported by [`OutSink::finish`].
struct OutSink<W: Write> {
    w: W,
    err: Option<io::Error>,
}

impl<W: Write> OutSink<W> {
    fn new(w: W) -> Self {
        Self { w, err: None }
    }

    fn emit(&mut self, b: u8) {
        if self.err.is_some() {
            return;
        }
        if let Err(e) = self.w.write_all(&[b]) {
            self.err = Some(e);
        }
    }

    fn finish(mut self) -> io::Result<()> {
        match self.err.take() {
            Some(e) => Err(e),
            None => self.w.flush(),
        }
    }
}

fn load_config(opts: &Opts) -> Result<CpuConfig> {
    let mut cfg = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CpuConfig::default(),
    };
    if let Some(entry) = opts.entry {
        cfg.entry = entry;
    }
    if let Some(sp) = opts.sp {
        cfg.stack_top = sp;
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let cfg = load_config(&opts)?;
    let mut machine = Machine::new(cfg);

    let is_asm = opts.input.extension().is_some_and(|e| e == "asm");
    if is_asm {
        let text = std::fs::read_to_string(&opts.input)
            .with_context(|| format!("reading {}", opts.input.display()))?;
        let program = assemble(&text)?;
        tracing::info!(bytes = program.code.len(), labels = program.symbols.len(), "assembled");
        machine.mem.load(&program.code, 0);
    } else {
        let bytes = std::fs::read(&opts.input)
            .with_context(|| format!("reading {}", opts.input.display()))?;
        if bytes.len() == MEMORY_SIZE {
            machine.mem = Memory::from_image(&bytes)?;
        } else {
            anyhow::ensure!(bytes.len() < MEMORY_SIZE, "binary is larger than memory");
            machine.mem.load(&bytes, opts.base);
        }
    }

    let mut sink = OutSink::new(std::io::stdout().lock());
    let (steps, trap) = machine.run(opts.max_steps, &mut |b: u8| sink.emit(b));
    sink.finish().context("writing program output")?;

    match &trap {
        Some(trap) => eprintln!("TRAP after {steps} steps: {trap}"),
        None => tracing::info!(steps, "step limit reached"),
    }

    if opts.regs {
        let cpu = &machine.cpu;
        for (i, r) in cpu.regs.iter().enumerate() {
            eprint!("r{i:x}={r:#06x}{}", if i % 4 == 3 { "\n" } else { "  " });
        }
        eprintln!(
            "flag={} predicate=(armed: {}, condition: {})",
            cpu.flag, cpu.predicate.armed, cpu.predicate.condition
        );
    }

    if let Some(path) = &opts.dump {
        std::fs::write(path, machine.mem.image())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Accepts `room` bytes, then fails every write.
    struct Full {
        room: usize,
        written: Vec<u8>,
        attempts: usize,
    }

    impl Write for Full {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            if self.written.len() >= self.room {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "full"));
            }
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_passes_bytes_through() {
        let mut sink = OutSink::new(Vec::new());
        for b in b"hi" {
            sink.emit(*b);
        }
        assert!(sink.err.is_none());
        assert_eq!(sink.w, b"hi".to_vec());
        sink.finish().unwrap();
    }

    #[test]
    fn sink_stops_at_first_write_error() {
        let mut sink = OutSink::new(Full { room: 1, written: Vec::new(), attempts: 0 });
        for b in b"abcd" {
            sink.emit(*b);
        }
        assert_eq!(sink.w.written, b"a".to_vec());
        assert_eq!(sink.w.attempts, 2);
        let e = sink.finish().unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::WriteZero);
    }
}
