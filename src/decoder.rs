use serde::{Deserialize, Serialize};

use crate::isa::{Opcode, Operand, OperandKind, SrcMask, OPCODE_MASK};
use crate::memory::Bus;

/// Largest operand list of any pattern (`SrcSrcRR`).
pub const MAX_OPERANDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub op: Opcode,
    /// Total encoded size, opcode byte included (1..=7).
    pub width: u8,
    operands: [Operand; MAX_OPERANDS],
    count: u8,
}

impl Decoded {
    /// Builds a decoded instruction by hand. Returns `None` unless `operands`
    /// fits `op.pattern()`: same count, and a register in every register slot.
    pub fn new(op: Opcode, operands: &[Operand]) -> Option<Self> {
        let kinds = op.pattern().kinds();
        if kinds.len() != operands.len() {
            return None;
        }
        let fits = kinds
            .iter()
            .zip(operands)
            .all(|(kind, o)| *kind == OperandKind::Src || matches!(o, Operand::Reg(_)));
        if !fits {
            return None;
        }

        let mut buf = [Operand::Reg(0); MAX_OPERANDS];
        buf[..operands.len()].copy_from_slice(operands);
        Some(Self {
            op,
            width: crate::isa::instruction_width(operands) as u8,
            operands: buf,
            count: operands.len() as u8,
        })
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands[..self.count as usize]
    }

    /// Register index of operand `i`. Register slots never hold immediates,
    /// the decoder only produces `Operand::Reg` for them.
    pub fn reg(&self, i: usize) -> usize {
        match self.operands[i] {
            Operand::Reg(r) => r as usize,
            Operand::Imm(_) => unreachable!("operand {i} of {} is not a register", self.op.mnemonic()),
        }
    }
}

pub trait Decoder {
    /// Decodes the instruction whose opcode byte sits at `ip`.
    /// Returns `None` when the low six bits name no opcode.
    fn decode<B: Bus>(&self, bus: &B, ip: u16) -> Option<Decoded>;
}

/// Decoder for the [`crate::isa`] encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsaDecoder;

impl IsaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for IsaDecoder {
    fn decode<B: Bus>(&self, bus: &B, ip: u16) -> Option<Decoded> {
        let first = bus.read_u8(ip);
        let op = Opcode::try_from(first & OPCODE_MASK).ok()?;
        let mask = SrcMask::from_bits_truncate(first);

        let mut operands = [Operand::Reg(0); MAX_OPERANDS];
        let mut count = 0;
        let mut cursor = ip.wrapping_add(1);
        let mut src_index = 0;
        for kind in op.pattern().kinds() {
            let immediate = match kind {
                OperandKind::Reg => false,
                OperandKind::Src => {
                    let bit = SrcMask::for_source(src_index);
                    src_index += 1;
                    mask.contains(bit)
                }
            };
            operands[count] = if immediate {
                let v = bus.read_u16(cursor);
                cursor = cursor.wrapping_add(2);
                Operand::Imm(v)
            } else {
                let r = bus.read_u8(cursor) & 0x0F;
                cursor = cursor.wrapping_add(1);
                Operand::Reg(r)
            };
            count += 1;
        }

        Some(Decoded {
            op,
            width: cursor.wrapping_sub(ip) as u8,
            operands,
            count: count as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    #[test]
    fn decodes_mixed_sources() {
        let mut mem = Memory::new();
        // add 0x1234, r1, r2 ; first source immediate
        mem.load(&[0x0D | 0x80, 0x34, 0x12, 0x01, 0x02], 0x10);
        let d = IsaDecoder.decode(&mem, 0x10).unwrap();
        assert_eq!(d.op, Opcode::Add);
        assert_eq!(d.width, 5);
        assert_eq!(
            d.operands(),
            &[Operand::Imm(0x1234), Operand::Reg(1), Operand::Reg(2)]
        );
    }

    #[test]
    fn register_byte_uses_low_nibble() {
        let mut mem = Memory::new();
        mem.load(&[0x24, 0xF3], 0);
        let d = IsaDecoder.decode(&mem, 0).unwrap();
        assert_eq!(d.op, Opcode::PopB);
        assert_eq!(d.operands(), &[Operand::Reg(3)]);
    }

    #[test]
    fn source_bits_ignored_without_sources() {
        let mut mem = Memory::new();
        mem.load(&[0xC0], 0);
        let d = IsaDecoder.decode(&mem, 0).unwrap();
        assert_eq!(d.op, Opcode::Nop);
        assert_eq!(d.width, 1);
    }

    #[test]
    fn operand_fetch_wraps() {
        let mut mem = Memory::new();
        mem.load(&[0x81, 0xEF, 0xBE, 0x05], 0xFFFE);
        let d = IsaDecoder.decode(&mem, 0xFFFE).unwrap();
        assert_eq!(d.operands(), &[Operand::Imm(0xBEEF), Operand::Reg(5)]);
        assert_eq!(d.width, 4);
    }

    #[test]
    fn hand_built_must_fit_pattern() {
        let ok = Decoded::new(Opcode::Mov, &[Operand::Imm(5), Operand::Reg(0)]).unwrap();
        assert_eq!(ok.width, 4);
        assert!(Decoded::new(Opcode::Mov, &[Operand::Imm(5), Operand::Imm(0)]).is_none());
        assert!(Decoded::new(Opcode::Mov, &[Operand::Imm(5)]).is_none());
        assert!(Decoded::new(Opcode::Nop, &[Operand::Reg(0); 5]).is_none());
    }

    #[test]
    fn unknown_opcode() {
        let mut mem = Memory::new();
        mem.load(&[0x3F], 0);
        assert!(IsaDecoder.decode(&mem, 0).is_none());
    }
}
