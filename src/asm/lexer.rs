//! Character-driven tokenizer.
//!
//! The first non-whitespace character of a statement or operand commits the
//! lexer to one state path; nothing is ever re-read except the single
//! character that ends a token, which is handed to the next state through
//! the `reprocess` flag.

use super::{AsmError, AsmErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `name:`
    LabelDecl(String),
    /// `name` followed by operands, or `name.` with none.
    Mnemonic(String),
    Register(u8),
    Number(u16),
    /// Bare name in operand position.
    Label(String),
    /// Decoded bytes of a `"..."` literal.
    Str(Vec<u8>),
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::LabelDecl(_) => "label declaration",
            TokenKind::Mnemonic(_) => "instruction",
            TokenKind::Register(_) => "register",
            TokenKind::Number(_) => "number",
            TokenKind::Label(_) => "label",
            TokenKind::Str(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FindVerbStart,
    FindVerbEnd,
    FindOperandStart,
    FindOperandEnd,
    FindStringEnd,
    HandleEscape,
    FindCommentEnd,
    AfterOperand,
}

pub(crate) fn is_name(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$')
}

fn err(line: u32, kind: AsmErrorKind) -> AsmError {
    AsmError { line, kind }
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, AsmError> {
    // Trailing newline flushes whatever token is open at end of input.
    let chars: Vec<char> = text.chars().chain(std::iter::once('\n')).collect();

    let mut state = State::FindVerbStart;
    let mut after_comment = State::FindVerbStart;
    let mut cur = String::new();
    let mut string = Vec::new();
    let mut tokens = Vec::new();
    let mut line = 1u32;
    let mut start_line = 1u32;
    let mut pos = 0;
    let mut reprocess = false;

    while pos < chars.len() {
        let c = chars[pos];

        match state {
            State::FindVerbStart => {
                if is_name(c) {
                    cur.clear();
                    start_line = line;
                    state = State::FindVerbEnd;
                    reprocess = true;
                } else if c == ';' {
                    after_comment = State::FindVerbStart;
                    state = State::FindCommentEnd;
                } else if !c.is_whitespace() {
                    return Err(err(
                        line,
                        AsmErrorKind::IllegalCharacter {
                            ch: c,
                            context: "at start of statement",
                        },
                    ));
                }
            }
            State::FindVerbEnd => {
                if is_name(c) {
                    cur.push(c);
                } else if c == ':' {
                    // Only names an operand could refer back to.
                    if !matches!(classify(&cur), Ok(TokenKind::Label(_))) {
                        return Err(err(start_line, AsmErrorKind::BadLabelName(cur)));
                    }
                    tokens.push(Token {
                        kind: TokenKind::LabelDecl(std::mem::take(&mut cur)),
                        line: start_line,
                    });
                    state = State::FindVerbStart;
                } else if c == '.' || c.is_whitespace() {
                    tokens.push(Token {
                        kind: TokenKind::Mnemonic(std::mem::take(&mut cur)),
                        line: start_line,
                    });
                    // A period says no operands follow.
                    state = if c == '.' {
                        State::FindVerbStart
                    } else {
                        State::FindOperandStart
                    };
                } else {
                    return Err(err(
                        line,
                        AsmErrorKind::IllegalCharacter {
                            ch: c,
                            context: "in instruction or label name",
                        },
                    ));
                }
            }
            State::FindOperandStart => {
                if c == '"' {
                    string.clear();
                    start_line = line;
                    state = State::FindStringEnd;
                } else if c == ';' {
                    after_comment = State::FindOperandStart;
                    state = State::FindCommentEnd;
                } else if !c.is_whitespace() {
                    cur.clear();
                    start_line = line;
                    state = State::FindOperandEnd;
                    reprocess = true;
                }
            }
            State::FindOperandEnd => {
                if c == ',' || c == ';' || c.is_whitespace() {
                    let kind = classify(&cur).map_err(|kind| err(start_line, kind))?;
                    tokens.push(Token {
                        kind,
                        line: start_line,
                    });
                    state = State::AfterOperand;
                    reprocess = true;
                } else {
                    cur.push(c);
                }
            }
            State::FindStringEnd => match c {
                '"' => {
                    tokens.push(Token {
                        kind: TokenKind::Str(std::mem::take(&mut string)),
                        line: start_line,
                    });
                    state = State::AfterOperand;
                }
                '\\' => state = State::HandleEscape,
                _ => {
                    let mut buf = [0u8; 4];
                    string.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            },
            State::HandleEscape => {
                if pos == chars.len() - 1 {
                    // The backslash was the last real character.
                    return Err(err(start_line, AsmErrorKind::UnexpectedEof));
                }
                let b = match c {
                    'n' => b'\n',
                    't' => b'\t',
                    'r' => b'\r',
                    '0' => 0,
                    '\\' => b'\\',
                    '"' => b'"',
                    '\'' => b'\'',
                    other => return Err(err(line, AsmErrorKind::BadEscape(other))),
                };
                string.push(b);
                state = State::FindStringEnd;
            }
            State::AfterOperand => {
                if c == ',' {
                    state = State::FindOperandStart;
                } else if c == ';' {
                    after_comment = State::FindVerbStart;
                    state = State::FindCommentEnd;
                } else if c.is_whitespace() {
                    state = State::FindVerbStart;
                } else {
                    return Err(err(
                        line,
                        AsmErrorKind::IllegalCharacter {
                            ch: c,
                            context: "after operand",
                        },
                    ));
                }
            }
            State::FindCommentEnd => {
                if c == '\n' {
                    state = after_comment;
                }
            }
        }

        if reprocess {
            reprocess = false;
        } else {
            if c == '\n' {
                line += 1;
            }
            pos += 1;
        }
    }

    match state {
        State::FindStringEnd | State::HandleEscape => {
            Err(err(start_line, AsmErrorKind::UnexpectedEof))
        }
        _ => Ok(tokens),
    }
}

/// Classifies one operand: register, hex, binary, character, decimal, label.
fn classify(text: &str) -> Result<TokenKind, AsmErrorKind> {
    let mut chars = text.chars();
    if let (Some('r' | 'R'), Some(d), None) = (chars.next(), chars.next(), chars.next()) {
        if let Some(r) = d.to_digit(16) {
            return Ok(TokenKind::Register(r as u8));
        }
    }

    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return radix(text, digits, 16);
    }
    if let Some(digits) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return radix(text, digits, 2);
    }

    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        let mut it = inner.chars();
        return match (it.next(), it.next()) {
            (Some(c), None) if (c as u32) <= 0xFF => Ok(TokenKind::Number(c as u16)),
            (Some(_), None) => Err(AsmErrorKind::LiteralOutOfRange(text.to_string())),
            _ => Err(AsmErrorKind::IllegalOperand(text.to_string())),
        };
    }

    let unsigned = text.strip_prefix('-').unwrap_or(text);
    if !unsigned.is_empty() && unsigned.chars().all(|c| c.is_ascii_digit()) {
        return match text.parse::<i64>() {
            Ok(v) if (-0x8000..=0xFFFF).contains(&v) => Ok(TokenKind::Number(v as u16)),
            _ => Err(AsmErrorKind::LiteralOutOfRange(text.to_string())),
        };
    }

    // Something number-shaped that failed above is not a label either.
    let numeric_start = text.starts_with(|c: char| c.is_ascii_digit() || c == '-');
    if !text.is_empty() && !numeric_start && text.chars().all(is_name) {
        return Ok(TokenKind::Label(text.to_string()));
    }
    Err(AsmErrorKind::IllegalOperand(text.to_string()))
}

fn radix(text: &str, digits: &str, radix: u32) -> Result<TokenKind, AsmErrorKind> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(AsmErrorKind::IllegalOperand(text.to_string()));
    }
    u16::from_str_radix(digits, radix)
        .map(TokenKind::Number)
        .map_err(|_| AsmErrorKind::LiteralOutOfRange(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn statement_shapes() {
        assert_eq!(
            kinds("start: mov 0x10, r0\nnop.\ncall start ; go"),
            vec![
                LabelDecl("start".into()),
                Mnemonic("mov".into()),
                Number(0x10),
                Register(0),
                Mnemonic("nop".into()),
                Mnemonic("call".into()),
                Label("start".into()),
            ]
        );
    }

    #[test]
    fn literal_classification() {
        assert_eq!(
            kinds("word rF, 0xBEEF, 0b101, 'A', -1, 42, $loop"),
            vec![
                Mnemonic("word".into()),
                Register(15),
                Number(0xBEEF),
                Number(5),
                Number(65),
                Number(0xFFFF),
                Number(42),
                Label("$loop".into()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"string "hi\n\"x\"""#),
            vec![Mnemonic("string".into()), Str(b"hi\n\"x\"".to_vec())]
        );
    }

    #[test]
    fn label_declaration_with_dollar() {
        assert_eq!(kinds("$L:\n"), vec![LabelDecl("$L".into())]);
    }

    #[test]
    fn comment_between_mnemonic_and_operands() {
        assert_eq!(
            kinds("mov ; value next line\n  1, r2"),
            vec![Mnemonic("mov".into()), Number(1), Register(2)]
        );
    }

    #[test]
    fn line_numbers_count_each_newline_once() {
        let toks = tokenize("nop.\n\n  mov 1, r0\n; c\nadd r0, r0, r1\n").unwrap();
        let lines: Vec<u32> = toks.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 3, 3, 3, 5, 5, 5, 5]);
    }

    #[test]
    fn errors_carry_line() {
        let e = tokenize("nop.\nmov 1, r0\n#bad").unwrap_err();
        assert_eq!(e.line, 3);
        assert!(matches!(e.kind, AsmErrorKind::IllegalCharacter { ch: '#', .. }));

        let e = tokenize("mov 1, r0\nmov 0x10000, r1").unwrap_err();
        assert_eq!(e.line, 2);
        assert_eq!(e.kind, AsmErrorKind::LiteralOutOfRange("0x10000".into()));
    }

    #[test]
    fn junk_after_string_is_rejected() {
        let e = tokenize("string \"ab\"c").unwrap_err();
        assert!(matches!(
            e.kind,
            AsmErrorKind::IllegalCharacter { ch: 'c', context: "after operand" }
        ));
    }

    #[test]
    fn unterminated_string() {
        let e = tokenize("string \"abc\n").unwrap_err();
        assert_eq!(e, AsmError { line: 1, kind: AsmErrorKind::UnexpectedEof });
    }

    #[test]
    fn backslash_at_end_of_input() {
        let e = tokenize("nop.\nstring \"abc\\").unwrap_err();
        assert_eq!(e, AsmError { line: 2, kind: AsmErrorKind::UnexpectedEof });
    }

    #[test]
    fn unknown_escape() {
        let e = tokenize("string \"a\\q\"").unwrap_err();
        assert_eq!(e, AsmError { line: 1, kind: AsmErrorKind::BadEscape('q') });
    }

    #[test]
    fn decimal_range_edges() {
        assert_eq!(kinds("out -32768"), vec![Mnemonic("out".into()), Number(0x8000)]);
        assert_eq!(kinds("out 65535"), vec![Mnemonic("out".into()), Number(0xFFFF)]);
        assert_eq!(
            tokenize("out -32769").unwrap_err().kind,
            AsmErrorKind::LiteralOutOfRange("-32769".into())
        );
    }

    #[test]
    fn label_names_must_read_back_as_labels() {
        let e = tokenize("nop.\nr1: nop.").unwrap_err();
        assert_eq!(e, AsmError { line: 2, kind: AsmErrorKind::BadLabelName("r1".into()) });
        assert_eq!(
            tokenize("123:").unwrap_err().kind,
            AsmErrorKind::BadLabelName("123".into())
        );
        assert_eq!(
            tokenize("0x10:").unwrap_err().kind,
            AsmErrorKind::BadLabelName("0x10".into())
        );
        assert_eq!(kinds("r10:"), vec![LabelDecl("r10".into())]);
    }

    #[test]
    fn bad_operands() {
        assert!(matches!(
            tokenize("mov 12ab, r0").unwrap_err().kind,
            AsmErrorKind::IllegalOperand(s) if s == "12ab"
        ));
        assert!(matches!(
            tokenize("mov 0xZZ, r0").unwrap_err().kind,
            AsmErrorKind::IllegalOperand(_)
        ));
        assert!(matches!(
            tokenize("mov 70000, r0").unwrap_err().kind,
            AsmErrorKind::LiteralOutOfRange(_)
        ));
    }
}
