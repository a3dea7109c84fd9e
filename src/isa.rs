//! Instruction set definition.
//!
//! [`for_each_opcode!`] holds the canonical opcode list. It is expanded once
//! here to generate [`Opcode`] with its mnemonic and operand pattern; the
//! encoder ([`encode_instruction`]) and the decoder
//! ([`crate::decoder::IsaDecoder`]) both walk [`OperandPattern::kinds`], so
//! the two sides consume exactly the bytes the other produces.
//!
//! # Instruction format
//!
//! ```text
//!  7   6   5          0
//! +---+---+------------+-----------------+-----+
//! |s0 |s1 |  opcode    | operand bytes...      |
//! +---+---+------------+-----------------+-----+
//! ```
//!
//! - `s0`/`s1`: source-type bit of the first/second source operand
//!   (0 = register, 1 = immediate).
//! - register operand: 1 byte, index in the low nibble.
//! - immediate operand: 2 bytes, little-endian.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Low six bits of the first instruction byte.
pub const OPCODE_MASK: u8 = 0x3F;

/// Invokes `$callback` with the full opcode list.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // Move / memory
            /// NOP. ; does nothing
            Nop = 0x00, "NOP" => None,
            /// MOV a, r ; r = a
            Mov = 0x01, "MOV" => SrcR,
            /// STOREB a, addr ; mem[addr] = a & 0xff
            StoreB = 0x02, "STOREB" => SrcSrc,
            /// STOREW a, addr ; mem[addr..addr+2] = a
            StoreW = 0x03, "STOREW" => SrcSrc,
            /// LOADB addr, r ; r = mem[addr]
            LoadB = 0x04, "LOADB" => SrcR,
            /// LOADW addr, r ; r = mem[addr..addr+2]
            LoadW = 0x05, "LOADW" => SrcR,
            // Bitwise / shift
            /// NOT a, r ; r = !a
            Not = 0x06, "NOT" => SrcR,
            /// AND a, b, r ; r = a & b
            And = 0x07, "AND" => SrcSrcR,
            /// OR a, b, r ; r = a | b
            Or = 0x08, "OR" => SrcSrcR,
            /// XOR a, b, r ; r = a ^ b
            Xor = 0x09, "XOR" => SrcSrcR,
            /// SHL a, b, r ; r = a << b
            Shl = 0x0A, "SHL" => SrcSrcR,
            /// ASR a, b, r ; r = a >> b, sign filled
            Asr = 0x0B, "ASR" => SrcSrcR,
            /// SHR a, b, r ; r = a >> b, zero filled
            Shr = 0x0C, "SHR" => SrcSrcR,
            // Arithmetic
            /// ADD a, b, r ; r = a + b, flag = carry
            Add = 0x0D, "ADD" => SrcSrcR,
            /// ADDC a, b, r ; r = a + b + flag, flag = carry
            AddC = 0x0E, "ADDC" => SrcSrcR,
            /// SUB a, b, r ; r = a - b, flag = borrow
            Sub = 0x0F, "SUB" => SrcSrcR,
            /// SUBB a, b, r ; r = a - b - flag, flag = borrow
            SubB = 0x10, "SUBB" => SrcSrcR,
            /// MUL a, b, hi, lo ; hi:lo = a * b
            Mul = 0x11, "MUL" => SrcSrcRR,
            /// IMUL a, b, hi, lo ; hi:lo = a * b, signed
            IMul = 0x12, "IMUL" => SrcSrcRR,
            /// DIV a, b, q, rem ; q = a / b, rem = a % b
            Div = 0x13, "DIV" => SrcSrcRR,
            /// IDIV a, b, q, rem ; signed division, truncating
            IDiv = 0x14, "IDIV" => SrcSrcRR,
            // Flag
            /// CF. ; flag = 0
            Cf = 0x15, "CF" => None,
            /// SF. ; flag = 1
            Sf = 0x16, "SF" => None,
            // Predication
            /// IFZ a ; next runs if a == 0
            IfZ = 0x17, "IFZ" => Src,
            /// IF a ; next runs if a != 0
            If = 0x18, "IF" => Src,
            /// IFEQ a, b ; next runs if a == b
            IfEq = 0x19, "IFEQ" => SrcSrc,
            /// IFNEQ a, b ; next runs if a != b
            IfNeq = 0x1A, "IFNEQ" => SrcSrc,
            /// IFGU a, b ; next runs if a > b, unsigned
            IfGu = 0x1B, "IFGU" => SrcSrc,
            /// IFLU a, b ; next runs if a < b, unsigned
            IfLu = 0x1C, "IFLU" => SrcSrc,
            /// IFGS a, b ; next runs if a > b, signed
            IfGs = 0x1D, "IFGS" => SrcSrc,
            /// IFLS a, b ; next runs if a < b, signed
            IfLs = 0x1E, "IFLS" => SrcSrc,
            /// IFF. ; next runs if flag is set
            IfF = 0x1F, "IFF" => None,
            /// IFNF. ; next runs if flag is clear
            IfNf = 0x20, "IFNF" => None,
            // Stack
            /// CALL a ; push ip, ip = a
            Call = 0x21, "CALL" => Src,
            /// PUSHB a ; sp -= 1, mem[sp] = a & 0xff
            PushB = 0x22, "PUSHB" => Src,
            /// PUSHW a ; sp -= 2, mem[sp..sp+2] = a
            PushW = 0x23, "PUSHW" => Src,
            /// POPB r ; r = mem[sp], sp += 1
            PopB = 0x24, "POPB" => R,
            /// POPW r ; r = mem[sp..sp+2], sp += 2
            PopW = 0x25, "POPW" => R,
            // I/O
            /// OUT a ; emit a & 0xff on the output channel
            Out = 0x26, "OUT" => Src,
        }
    };
}

macro_rules! define_opcodes {
    (
        $( $(#[$doc:meta])* $name:ident = $code:literal, $mnemonic:literal => $pattern:ident ),* $(,)?
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $code, )*
        }

        impl Opcode {
            /// Every opcode, in numbering order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Canonical (upper-case) mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            pub const fn pattern(self) -> OperandPattern {
                match self {
                    $( Opcode::$name => OperandPattern::$pattern, )*
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            /// Accepts the 6-bit opcode only; callers strip the source-type bits first.
            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Opcode::$name), )*
                    _ => Err(value),
                }
            }
        }
    };
}

for_each_opcode!(define_opcodes);

/// Alternative spellings accepted by the assembler.
const ALIASES: &[(&str, Opcode)] = &[
    ("IFG", Opcode::IfGu),
    ("IFL", Opcode::IfLu),
    ("TMPPRINT", Opcode::Out),
];

impl Opcode {
    /// Case-insensitive mnemonic lookup, aliases included.
    pub fn lookup(mnemonic: &str) -> Option<Opcode> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(mnemonic))
                    .map(|&(_, op)| op)
            })
    }

    /// Multiply/divide family: two destination registers.
    pub const fn has_two_destinations(self) -> bool {
        matches!(self.pattern(), OperandPattern::SrcSrcRR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandPattern {
    None,
    R,
    Src,
    SrcR,
    SrcSrc,
    SrcSrcR,
    SrcSrcRR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Bare register.
    Reg,
    /// Register or 16-bit immediate, selected by a source-type bit.
    Src,
}

impl OperandPattern {
    pub const fn kinds(self) -> &'static [OperandKind] {
        use OperandKind::*;
        match self {
            OperandPattern::None => &[],
            OperandPattern::R => &[Reg],
            OperandPattern::Src => &[Src],
            OperandPattern::SrcR => &[Src, Reg],
            OperandPattern::SrcSrc => &[Src, Src],
            OperandPattern::SrcSrcR => &[Src, Src, Reg],
            OperandPattern::SrcSrcRR => &[Src, Src, Reg, Reg],
        }
    }

    pub fn operand_count(self) -> usize {
        self.kinds().len()
    }
}

bitflags! {
    /// Source-type bits in the top of the opcode byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SrcMask: u8 {
        const FIRST_IMM = 1 << 7;
        const SECOND_IMM = 1 << 6;
    }
}

impl SrcMask {
    /// Bit for the `index`th source operand (0 or 1).
    pub const fn for_source(index: usize) -> SrcMask {
        if index == 0 {
            SrcMask::FIRST_IMM
        } else {
            SrcMask::SECOND_IMM
        }
    }
}

/// A concrete operand: register index or 16-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Reg(u8),
    Imm(u16),
}

impl Operand {
    /// Encoded size in bytes.
    pub const fn width(self) -> u16 {
        match self {
            Operand::Reg(_) => 1,
            Operand::Imm(_) => 2,
        }
    }
}

/// Encoded size of an instruction: opcode byte plus each operand.
pub fn instruction_width(operands: &[Operand]) -> u16 {
    1 + operands.iter().map(|o| o.width()).sum::<u16>()
}

/// Serializes one instruction. `operands` must already match `op.pattern()`;
/// the assembler guarantees that before calling.
pub fn encode_instruction(op: Opcode, operands: &[Operand], out: &mut Vec<u8>) {
    let mut mask = SrcMask::empty();
    let mut src_index = 0;
    for (kind, operand) in op.pattern().kinds().iter().zip(operands) {
        if *kind == OperandKind::Src {
            if matches!(operand, Operand::Imm(_)) {
                mask |= SrcMask::for_source(src_index);
            }
            src_index += 1;
        }
    }
    out.push(op as u8 | mask.bits());
    for operand in operands {
        match *operand {
            Operand::Reg(r) => out.push(r & 0x0F),
            Operand::Imm(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_fit_six_bits_and_are_unique() {
        let mut seen = [false; 64];
        for op in Opcode::ALL {
            let code = *op as u8;
            assert_eq!(code & !OPCODE_MASK, 0, "{} does not fit", op.mnemonic());
            assert!(!seen[code as usize], "{} reuses {code:#04x}", op.mnemonic());
            seen[code as usize] = true;
            assert_eq!(Opcode::try_from(code), Ok(*op));
        }
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(Opcode::try_from(0x3F), Err(0x3F));
    }

    #[test]
    fn lookup_is_case_insensitive_with_aliases() {
        assert_eq!(Opcode::lookup("mov"), Some(Opcode::Mov));
        assert_eq!(Opcode::lookup("IfEq"), Some(Opcode::IfEq));
        assert_eq!(Opcode::lookup("ifg"), Some(Opcode::IfGu));
        assert_eq!(Opcode::lookup("tmpprint"), Some(Opcode::Out));
        assert_eq!(Opcode::lookup("jmp"), None);
    }

    #[test]
    fn sources_precede_registers() {
        for op in Opcode::ALL {
            let kinds = op.pattern().kinds();
            let first_reg = kinds.iter().position(|k| *k == OperandKind::Reg);
            if let Some(i) = first_reg {
                assert!(kinds[i..].iter().all(|k| *k == OperandKind::Reg));
            }
            assert!(kinds.iter().filter(|k| **k == OperandKind::Src).count() <= 2);
        }
    }

    #[test]
    fn encode_sets_source_bits() {
        let mut out = Vec::new();
        encode_instruction(
            Opcode::Add,
            &[Operand::Reg(0), Operand::Imm(0x1234), Operand::Reg(2)],
            &mut out,
        );
        assert_eq!(out, vec![0x0D | 0x40, 0x00, 0x34, 0x12, 0x02]);
        assert_eq!(instruction_width(&[Operand::Reg(0), Operand::Imm(1), Operand::Reg(2)]), 5);
    }
}
