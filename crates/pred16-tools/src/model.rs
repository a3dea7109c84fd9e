use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use pred16::{Memory, SymbolTable, MEMORY_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub base: u16,
    pub bytes: Vec<u8>,
}

impl Segment {
    /// One past the last byte, in a 17-bit space so a segment may end at 0x10000.
    pub fn end(&self) -> u32 {
        self.base as u32 + self.bytes.len() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub segments: Vec<Segment>,
}

impl Image {
    /// Places every segment into a fresh 64 KiB memory. Later segments win on overlap.
    pub fn to_memory(&self) -> Memory {
        let mut mem = Memory::new();
        for s in &self.segments {
            mem.load(&s.bytes, s.base);
        }
        mem
    }
}

pub fn load_raw_bin(path: &Path, base: u16, skip: usize, len: Option<usize>) -> Result<Image> {
    let file = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    anyhow::ensure!(skip <= file.len(), "--skip exceeds file size");
    let mut payload = &file[skip..];
    if let Some(lim) = len {
        anyhow::ensure!(lim <= payload.len(), "--len exceeds remaining file size after skip");
        payload = &payload[..lim];
    }
    anyhow::ensure!(
        base as usize + payload.len() <= MEMORY_SIZE,
        "{} bytes at {base:#06x} run past the end of memory",
        payload.len()
    );
    let seg = Segment {
        name: "segment0".into(),
        base,
        bytes: payload.to_vec(),
    };
    Ok(Image { segments: vec![seg] })
}

/// Hex (`0x` prefix) or decimal address.
pub fn parse_u16(s: &str) -> Result<u16> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u16::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse::<u16>()?)
    }
}

/// Reads a symbol table written by `pred16-asm --symbols` and indexes it by
/// address. When several labels share an address the alphabetically first wins.
pub fn load_labels(path: &Path) -> Result<BTreeMap<u16, String>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let symbols: SymbolTable =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(invert(&symbols))
}

pub fn invert(symbols: &SymbolTable) -> BTreeMap<u16, String> {
    let mut by_addr = BTreeMap::new();
    for (name, addr) in symbols {
        by_addr.entry(*addr).or_insert_with(|| name.clone());
    }
    by_addr
}
