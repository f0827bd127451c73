//! Tokenizer for protobuf source text.
//!
//! Columns are counted in UTF-16 code units so the ranges on every token can
//! flow into editor responses without any later transcoding.

use crate::ast::{ParseNote, Position, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    Float,
    /// A quoted string; `text` holds the decoded content.
    Str,
    /// A single punctuation character.
    Punct,
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub range: Range,
}

impl Token {
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == ch.len_utf8() && self.text.starts_with(ch)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == word
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }
}

/// Parses a protobuf integer literal: decimal, `0x` hex, or leading-zero
/// octal.
pub fn integer_value(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if text.len() > 1 && text.starts_with('0') {
        return i64::from_str_radix(&text[1..], 8).ok();
    }
    text.parse().ok()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    character: u32,
}

/// Tokenizes `text`. Lexical problems (unterminated strings or block
/// comments) do not abort the scan; they are reported as notes and the
/// tokenizer continues at the next line.
pub fn tokenize(text: &str) -> (Vec<Token>, Vec<ParseNote>) {
    let mut lexer = Lexer {
        chars: text.chars().collect(),
        pos: 0,
        line: 0,
        character: 0,
    };
    lexer.run()
}

impl Lexer {
    fn run(&mut self) -> (Vec<Token>, Vec<ParseNote>) {
        let mut tokens = Vec::new();
        let mut notes = Vec::new();
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '/' if self.peek_at(1) == Some('/') => tokens.push(self.line_comment()),
                '/' if self.peek_at(1) == Some('*') => tokens.push(self.block_comment(&mut notes)),
                '"' | '\'' => tokens.push(self.string(ch, &mut notes)),
                c if c.is_ascii_digit() => tokens.push(self.number()),
                '.' if self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) => {
                    tokens.push(self.number())
                }
                c if c.is_ascii_alphabetic() || c == '_' => tokens.push(self.identifier()),
                _ => {
                    let start = self.position();
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::Punct,
                        text: ch.to_string(),
                        range: Range::new(start, self.position()),
                    });
                }
            }
        }
        (tokens, notes)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.character)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.character = 0;
        } else {
            self.character += ch.len_utf16() as u32;
        }
        Some(ch)
    }

    fn line_comment(&mut self) -> Token {
        let start = self.position();
        self.bump();
        self.bump();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.bump();
        }
        Token {
            kind: TokenKind::LineComment,
            text: text.trim().to_string(),
            range: Range::new(start, self.position()),
        }
    }

    fn block_comment(&mut self, notes: &mut Vec<ParseNote>) -> Token {
        let start = self.position();
        self.bump();
        self.bump();
        let mut text = String::new();
        let mut terminated = false;
        while let Some(ch) = self.peek() {
            if ch == '*' && self.peek_at(1) == Some('/') {
                self.bump();
                self.bump();
                terminated = true;
                break;
            }
            text.push(ch);
            self.bump();
        }
        if !terminated {
            notes.push(ParseNote {
                message: "unterminated block comment".to_string(),
                range: Range::new(start, self.position()),
            });
        }
        // Strip the decorative leading asterisks common in block comments.
        let cleaned = text
            .lines()
            .map(|line| line.trim().trim_start_matches('*').trim())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        Token {
            kind: TokenKind::BlockComment,
            text: cleaned,
            range: Range::new(start, self.position()),
        }
    }

    fn string(&mut self, quote: char, notes: &mut Vec<ParseNote>) -> Token {
        let start = self.position();
        self.bump();
        let mut value = String::new();
        let mut terminated = false;
        while let Some(ch) = self.peek() {
            if ch == quote {
                self.bump();
                terminated = true;
                break;
            }
            if ch == '\n' {
                break;
            }
            if ch == '\\' {
                self.bump();
                if let Some(esc) = self.bump() {
                    value.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                continue;
            }
            value.push(ch);
            self.bump();
        }
        if !terminated {
            notes.push(ParseNote {
                message: "unterminated string literal".to_string(),
                range: Range::new(start, self.position()),
            });
        }
        Token {
            kind: TokenKind::Str,
            text: value,
            range: Range::new(start, self.position()),
        }
    }

    fn number(&mut self) -> Token {
        let start = self.position();
        let mut text = String::new();
        let mut is_float = false;
        let hex = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x') | Some('X'));
        while let Some(ch) = self.peek() {
            let take = match ch {
                '0'..='9' => true,
                'a'..='f' | 'A'..='F' if hex => true,
                'x' | 'X' if hex && text.len() == 1 => true,
                '.' if !hex => {
                    is_float = true;
                    true
                }
                'e' | 'E' if !hex => {
                    is_float = true;
                    true
                }
                '+' | '-' => {
                    // Sign is part of the literal only directly after an exponent.
                    matches!(text.chars().last(), Some('e') | Some('E'))
                }
                _ => false,
            };
            if !take {
                break;
            }
            text.push(ch);
            self.bump();
        }
        Token {
            kind: if is_float {
                TokenKind::Float
            } else {
                TokenKind::Integer
            },
            text,
            range: Range::new(start, self.position()),
        }
    }

    fn identifier(&mut self) -> Token {
        let start = self.position();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        Token {
            kind: TokenKind::Identifier,
            text,
            range: Range::new(start, self.position()),
        }
    }
}
