//! Two-pass assembler: text → tokens → records → bytes + symbols.

pub mod lexer;
pub mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::isa::{encode_instruction, Operand};
use crate::memory::MEMORY_SIZE;
use parser::{AsmOperand, Record};

/// Label name → byte offset.
pub type SymbolTable = BTreeMap<String, u16>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembled {
    pub code: Vec<u8>,
    pub symbols: SymbolTable,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct AsmError {
    pub line: u32,
    pub kind: AsmErrorKind,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    #[error("illegal character {ch:?} {context}")]
    IllegalCharacter { ch: char, context: &'static str },
    #[error("illegal operand \"{0}\"")]
    IllegalOperand(String),
    #[error("literal {0} does not fit in 16 bits")]
    LiteralOutOfRange(String),
    #[error("unknown escape sequence \\{0}")]
    BadEscape(char),
    #[error("reached unexpected end of input")]
    UnexpectedEof,
    #[error("unknown instruction \"{0}\"")]
    UnknownMnemonic(String),
    #[error("expected {expected} but got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("unexpected {0}, anticipated a label declaration or instruction")]
    UnexpectedToken(&'static str),
    #[error("value {0} is too large to fit within a byte")]
    ByteOutOfRange(u16),
    #[error("\"{0}\" cannot be declared as a label")]
    BadLabelName(String),
    #[error("unknown label \"{0}\"")]
    UndefinedLabel(String),
    #[error("duplicate label name \"{0}\"")]
    DuplicateLabel(String),
    #[error("{mnemonic} names r{reg:x} as both destinations")]
    AliasedDestinations { mnemonic: &'static str, reg: u8 },
    #[error("program needs {0} bytes, more than the address space holds")]
    ProgramTooLarge(u32),
}

/// Assembles `text` into a code buffer that starts at address 0.
/// Nothing is returned unless every line assembles.
pub fn assemble(text: &str) -> Result<Assembled, AsmError> {
    let tokens = lexer::tokenize(text)?;
    let records = parser::parse(tokens)?;
    debug!(records = records.len(), "parsed");

    let symbols = layout(&records)?;
    debug!(labels = symbols.len(), "layout done");

    let code = encode(&records, &symbols)?;
    debug!(bytes = code.len(), "encoded");
    Ok(Assembled { code, symbols })
}

/// Pass 1: assigns every label the offset of the record that follows it.
pub fn layout(records: &[Record]) -> Result<SymbolTable, AsmError> {
    let mut symbols = SymbolTable::new();
    let mut offset = 0u32;
    for rec in records {
        if let Record::Label { name, line } = rec {
            // A label may sit at the end of memory but not past it.
            let addr = u16::try_from(offset).map_err(|_| AsmError {
                line: *line,
                kind: AsmErrorKind::ProgramTooLarge(offset),
            })?;
            if symbols.insert(name.clone(), addr).is_some() {
                return Err(AsmError {
                    line: *line,
                    kind: AsmErrorKind::DuplicateLabel(name.clone()),
                });
            }
            continue;
        }
        offset += rec.size();
        if offset as usize > MEMORY_SIZE {
            return Err(AsmError {
                line: rec.line(),
                kind: AsmErrorKind::ProgramTooLarge(offset),
            });
        }
    }
    Ok(symbols)
}

fn resolve(op: &AsmOperand, symbols: &SymbolTable, line: u32) -> Result<Operand, AsmError> {
    match op {
        AsmOperand::Reg(r) => Ok(Operand::Reg(*r)),
        AsmOperand::Imm(v) => Ok(Operand::Imm(*v)),
        AsmOperand::Label(name) => symbols.get(name).map(|v| Operand::Imm(*v)).ok_or_else(|| AsmError {
            line,
            kind: AsmErrorKind::UndefinedLabel(name.clone()),
        }),
    }
}

/// Pass 2: resolves labels and serializes every record.
pub fn encode(records: &[Record], symbols: &SymbolTable) -> Result<Vec<u8>, AsmError> {
    let mut out = Vec::new();
    for rec in records {
        match rec {
            Record::Label { .. } => {}
            Record::Instr { op, operands, line } => {
                let resolved = operands
                    .iter()
                    .map(|o| resolve(o, symbols, *line))
                    .collect::<Result<Vec<_>, _>>()?;
                encode_instruction(*op, &resolved, &mut out);
            }
            Record::Bytes { bytes, .. } => out.extend_from_slice(bytes),
            Record::Words { values, line } => {
                for v in values {
                    match resolve(v, symbols, *line)? {
                        Operand::Imm(w) => out.extend_from_slice(&w.to_le_bytes()),
                        Operand::Reg(_) => unreachable!("word data never holds registers"),
                    }
                }
            }
        }
    }
    Ok(out)
}
