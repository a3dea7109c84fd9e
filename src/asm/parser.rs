use std::iter::Peekable;
use std::vec::IntoIter;

use super::lexer::{Token, TokenKind};
use super::{AsmError, AsmErrorKind};
use crate::isa::{Opcode, OperandKind};

/// Operand as written in source; labels are resolved in the encode pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmOperand {
    Reg(u8),
    Imm(u16),
    Label(String),
}

impl AsmOperand {
    /// Bytes this operand occupies. Labels always become 16-bit immediates.
    pub fn width(&self) -> u32 {
        match self {
            AsmOperand::Reg(_) => 1,
            AsmOperand::Imm(_) | AsmOperand::Label(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Label {
        name: String,
        line: u32,
    },
    Instr {
        op: Opcode,
        operands: Vec<AsmOperand>,
        line: u32,
    },
    /// `byte` and `string` data.
    Bytes { bytes: Vec<u8>, line: u32 },
    /// `word` data; each value is a number or a label.
    Words { values: Vec<AsmOperand>, line: u32 },
}

impl Record {
    /// Bytes this record contributes to the output.
    pub fn size(&self) -> u32 {
        match self {
            Record::Label { .. } => 0,
            Record::Instr { operands, .. } => 1 + operands.iter().map(AsmOperand::width).sum::<u32>(),
            Record::Bytes { bytes, .. } => bytes.len() as u32,
            Record::Words { values, .. } => 2 * values.len() as u32,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            Record::Label { line, .. }
            | Record::Instr { line, .. }
            | Record::Bytes { line, .. }
            | Record::Words { line, .. } => *line,
        }
    }
}

type Tokens = Peekable<IntoIter<Token>>;

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Record>, AsmError> {
    let mut it = tokens.into_iter().peekable();
    let mut records = Vec::new();

    while let Some(tok) = it.next() {
        let line = tok.line;
        match tok.kind {
            TokenKind::LabelDecl(name) => records.push(Record::Label { name, line }),
            TokenKind::Mnemonic(name) => {
                let record = match Opcode::lookup(&name) {
                    Some(op) => instruction(op, line, &mut it)?,
                    None => directive(&name, line, &mut it)?,
                };
                records.push(record);
            }
            other => {
                return Err(AsmError {
                    line,
                    kind: AsmErrorKind::UnexpectedToken(other.describe()),
                })
            }
        }
    }
    Ok(records)
}

fn instruction(op: Opcode, line: u32, it: &mut Tokens) -> Result<Record, AsmError> {
    let mut operands = Vec::with_capacity(op.pattern().operand_count());
    for kind in op.pattern().kinds() {
        operands.push(operand(*kind, line, it)?);
    }

    if op.has_two_destinations() {
        if let (AsmOperand::Reg(hi), AsmOperand::Reg(lo)) = (&operands[2], &operands[3]) {
            if hi == lo {
                return Err(AsmError {
                    line,
                    kind: AsmErrorKind::AliasedDestinations {
                        mnemonic: op.mnemonic(),
                        reg: *hi,
                    },
                });
            }
        }
    }

    Ok(Record::Instr { op, operands, line })
}

fn operand(kind: OperandKind, line: u32, it: &mut Tokens) -> Result<AsmOperand, AsmError> {
    let expected = match kind {
        OperandKind::Reg => "register",
        OperandKind::Src => "source",
    };
    let Some(tok) = it.next() else {
        return Err(AsmError {
            line,
            kind: AsmErrorKind::TypeMismatch {
                expected,
                actual: "end of input",
            },
        });
    };
    match (kind, tok.kind) {
        (_, TokenKind::Register(r)) => Ok(AsmOperand::Reg(r)),
        (OperandKind::Src, TokenKind::Number(v)) => Ok(AsmOperand::Imm(v)),
        (OperandKind::Src, TokenKind::Label(name)) => Ok(AsmOperand::Label(name)),
        (_, other) => Err(AsmError {
            line: tok.line,
            kind: AsmErrorKind::TypeMismatch {
                expected,
                actual: other.describe(),
            },
        }),
    }
}

fn directive(name: &str, line: u32, it: &mut Tokens) -> Result<Record, AsmError> {
    match name.to_ascii_lowercase().as_str() {
        "byte" => {
            let mut bytes = Vec::new();
            while let Some(Token {
                kind: TokenKind::Number(v),
                line: value_line,
            }) = it.peek()
            {
                let b = u8::try_from(*v).map_err(|_| AsmError {
                    line: *value_line,
                    kind: AsmErrorKind::ByteOutOfRange(*v),
                })?;
                bytes.push(b);
                it.next();
            }
            Ok(Record::Bytes { bytes, line })
        }
        "word" => {
            let mut values = Vec::new();
            loop {
                match it.peek().map(|t| &t.kind) {
                    Some(TokenKind::Number(v)) => values.push(AsmOperand::Imm(*v)),
                    Some(TokenKind::Label(l)) => values.push(AsmOperand::Label(l.clone())),
                    _ => break,
                }
                it.next();
            }
            Ok(Record::Words { values, line })
        }
        "string" => match it.next() {
            Some(Token {
                kind: TokenKind::Str(bytes),
                ..
            }) => Ok(Record::Bytes { bytes, line }),
            other => Err(AsmError {
                line: other.as_ref().map_or(line, |t| t.line),
                kind: AsmErrorKind::TypeMismatch {
                    expected: "string",
                    actual: other.map_or("end of input", |t| t.kind.describe()),
                },
            }),
        },
        _ => Err(AsmError {
            line,
            kind: AsmErrorKind::UnknownMnemonic(name.to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn parse_src(src: &str) -> Result<Vec<Record>, AsmError> {
        parse(tokenize(src)?)
    }

    #[test]
    fn instruction_records() {
        let recs = parse_src("loop: ADD r0, 1, r0\nout 'x'\nnop.").unwrap();
        assert_eq!(
            recs,
            vec![
                Record::Label { name: "loop".into(), line: 1 },
                Record::Instr {
                    op: Opcode::Add,
                    operands: vec![AsmOperand::Reg(0), AsmOperand::Imm(1), AsmOperand::Reg(0)],
                    line: 1,
                },
                Record::Instr {
                    op: Opcode::Out,
                    operands: vec![AsmOperand::Imm(b'x' as u16)],
                    line: 2,
                },
                Record::Instr { op: Opcode::Nop, operands: vec![], line: 3 },
            ]
        );
        assert_eq!(recs[1].size(), 5);
        assert_eq!(recs[2].size(), 3);
        assert_eq!(recs[3].size(), 1);
    }

    #[test]
    fn data_directives() {
        let recs = parse_src("byte 1, 2, 0xff\nWORD 0x1234, end\nstring \"ok\"\nend:").unwrap();
        assert_eq!(recs[0], Record::Bytes { bytes: vec![1, 2, 0xFF], line: 1 });
        assert_eq!(
            recs[1],
            Record::Words {
                values: vec![AsmOperand::Imm(0x1234), AsmOperand::Label("end".into())],
                line: 2
            }
        );
        assert_eq!(recs[2], Record::Bytes { bytes: b"ok".to_vec(), line: 3 });
        assert_eq!(recs[1].size(), 4);
    }

    #[test]
    fn register_slot_rejects_immediate() {
        let e = parse_src("mov 1, 2").unwrap_err();
        assert_eq!(
            e.kind,
            AsmErrorKind::TypeMismatch { expected: "register", actual: "number" }
        );
    }

    #[test]
    fn missing_operand_is_end_of_input() {
        let e = parse_src("nop.\nadd r0, r1").unwrap_err();
        assert_eq!(e.line, 2);
        assert_eq!(
            e.kind,
            AsmErrorKind::TypeMismatch { expected: "register", actual: "end of input" }
        );
    }

    #[test]
    fn unknown_mnemonic() {
        let e = parse_src("jmp somewhere").unwrap_err();
        assert_eq!(e.kind, AsmErrorKind::UnknownMnemonic("jmp".into()));
    }

    #[test]
    fn oversized_byte() {
        let e = parse_src("byte 1, 256").unwrap_err();
        assert_eq!(e.kind, AsmErrorKind::ByteOutOfRange(256));
    }

    #[test]
    fn aliased_multiply_destinations() {
        let e = parse_src("mul r0, r1, r2, r2").unwrap_err();
        assert_eq!(
            e.kind,
            AsmErrorKind::AliasedDestinations { mnemonic: "MUL", reg: 2 }
        );
    }

    #[test]
    fn stray_operand_in_statement_position() {
        let e = parse_src("mov 1, r0, r1").unwrap_err();
        assert_eq!(e.kind, AsmErrorKind::UnexpectedToken("register"));
    }
}
