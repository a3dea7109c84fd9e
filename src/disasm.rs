use std::collections::BTreeMap;

use crate::decoder::{Decoded, Decoder, IsaDecoder};
use crate::isa::Operand;
use crate::memory::Bus;

fn operand(o: &Operand) -> String {
    match o {
        Operand::Reg(r) => format!("r{r:x}"),
        Operand::Imm(v) => format!("{v:#x}"),
    }
}

/// Formats `d` as assembler input. Zero-operand instructions get the
/// terminating `.` so the output re-assembles.
pub fn fmt_decoded(d: &Decoded) -> String {
    let mn = d.op.mnemonic().to_ascii_lowercase();
    if d.operands().is_empty() {
        return format!("{mn}.");
    }
    let ops: Vec<String> = d.operands().iter().map(operand).collect();
    format!("{mn} {}", ops.join(", "))
}

/// Like [`fmt_decoded`] but prints immediates that match a label by name.
pub fn fmt_decoded_with_labels(d: &Decoded, labels: &BTreeMap<u16, String>) -> String {
    let mn = d.op.mnemonic().to_ascii_lowercase();
    if d.operands().is_empty() {
        return format!("{mn}.");
    }
    let ops: Vec<String> = d
        .operands()
        .iter()
        .map(|o| match o {
            Operand::Imm(v) => labels.get(v).cloned().unwrap_or_else(|| operand(o)),
            Operand::Reg(_) => operand(o),
        })
        .collect();
    format!("{mn} {}", ops.join(", "))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub addr: u16,
    pub bytes: Vec<u8>,
    /// `None` for a byte that does not start a valid instruction.
    pub insn: Option<Decoded>,
}

/// Linear sweep over `[start, end)`. Undecodable bytes become one-byte lines.
pub fn disassemble<B: Bus>(bus: &B, start: u16, end: u32) -> Vec<Line> {
    let dec = IsaDecoder::new();
    let mut lines = Vec::new();
    let mut addr = start as u32;
    while addr < end {
        let at = addr as u16;
        let (width, insn) = match dec.decode(bus, at) {
            Some(d) => (d.width as u32, Some(d)),
            None => (1, None),
        };
        let bytes = (0..width)
            .map(|i| bus.read_u8(at.wrapping_add(i as u16)))
            .collect();
        lines.push(Line { addr: at, bytes, insn });
        addr += width;
    }
    lines
}

impl Line {
    pub fn text(&self) -> String {
        match &self.insn {
            Some(d) => fmt_decoded(d),
            None => format!("byte {:#04x}", self.bytes[0]),
        }
    }
}
