//! The recursive-descent parser backend.
//!
//! The parser never fails: syntax errors are recorded as [`ParseNote`]s on
//! the returned tree and parsing resumes at the next synchronisation point
//! (a `;`, the matching `}`, or a line starting with a top-level keyword).
//!
//! Comment attachment happens inline. A comment run ending at most one
//! newline above a declaration becomes its leading comment; a comment
//! starting on the same line as a statement's terminator becomes its
//! trailing comment; everything else floats to the file level.

use log::trace;

use crate::ast::*;
use crate::lexer::{integer_value, tokenize, Token, TokenKind};

/// Keywords that begin a top-level declaration, used as recovery anchors.
const TOP_LEVEL_KEYWORDS: &[&str] = &[
    "syntax", "edition", "package", "import", "option", "message", "enum", "service", "extend",
];

/// Parses `text` into a [`ProtoFile`]. Never panics on any input; malformed
/// constructs produce notes and best-effort nodes.
pub fn parse_text(uri: &str, text: &str) -> ProtoFile {
    let (all_tokens, lex_notes) = tokenize(text);
    let mut comments = Vec::new();
    let mut tokens = Vec::new();
    for tok in all_tokens {
        if tok.is_comment() {
            comments.push(Comment {
                text: tok.text,
                range: tok.range,
                block: tok.kind == TokenKind::BlockComment,
            });
        } else {
            tokens.push(tok);
        }
    }
    let mut parser = Parser {
        tokens,
        idx: 0,
        comments,
        cidx: 0,
        file: ProtoFile::empty(uri),
    };
    parser.file.notes = lex_notes;
    parser.parse_file();
    parser.finish()
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    comments: Vec<Comment>,
    cidx: usize,
    file: ProtoFile,
}

impl Parser {
    fn finish(mut self) -> ProtoFile {
        while self.cidx < self.comments.len() {
            let comment = self.comments[self.cidx].clone();
            self.file.comments.push(comment);
            self.cidx += 1;
        }
        trace!(
            "parsed {}: {} messages, {} notes",
            self.file.uri,
            self.file.messages.len(),
            self.file.notes.len()
        );
        self.file
    }

    // ---- token cursor -------------------------------------------------

    fn cur(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn at_eof(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    fn at_punct(&self, ch: char) -> bool {
        self.cur().map_or(false, |t| t.is_punct(ch))
    }

    fn at_ident(&self, word: &str) -> bool {
        self.cur().map_or(false, |t| t.is_ident(word))
    }

    fn at_any_ident(&self) -> bool {
        self.cur().map_or(false, |t| t.kind == TokenKind::Identifier)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx).cloned();
        if tok.is_some() {
            self.idx += 1;
        }
        tok
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.at_punct(ch) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.at_ident(word) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    /// Position just past the most recently consumed token.
    fn prev_end(&self) -> Position {
        if self.idx == 0 {
            Position::default()
        } else {
            self.tokens[self.idx - 1].range.end
        }
    }

    fn here(&self) -> Position {
        self.cur().map(|t| t.range.start).unwrap_or(self.prev_end())
    }

    fn note(&mut self, message: impl Into<String>, range: Range) {
        self.file.notes.push(ParseNote {
            message: message.into(),
            range,
        });
    }

    fn note_here(&mut self, message: impl Into<String>) {
        let range = self
            .cur()
            .map(|t| t.range)
            .unwrap_or(Range::empty(self.prev_end()));
        self.note(message, range);
    }

    fn expect_punct(&mut self, ch: char) -> bool {
        if self.eat_punct(ch) {
            true
        } else {
            self.note_here(format!("expected '{ch}'"));
            false
        }
    }

    fn expect_ident(&mut self) -> Option<Token> {
        if self.at_any_ident() {
            self.bump()
        } else {
            self.note_here("expected identifier");
            None
        }
    }

    /// Consumes the statement terminator, tolerating a missing one.
    fn expect_semicolon(&mut self) {
        if !self.eat_punct(';') {
            self.note_here("expected ';'");
        }
    }

    // ---- comment attachment -------------------------------------------

    /// Claims the comment run immediately above a declaration starting at
    /// `decl_start`. Comment runs separated from the declaration (or from
    /// each other) by a blank line float to the file level.
    fn take_leading(&mut self, decl_start: Position) -> Option<String> {
        let mut run: Vec<Comment> = Vec::new();
        while self.cidx < self.comments.len()
            && self.comments[self.cidx].range.start < decl_start
        {
            let comment = self.comments[self.cidx].clone();
            self.cidx += 1;
            if let Some(last) = run.last() {
                if comment.range.start.line > last.range.end.line + 1 {
                    self.file.comments.append(&mut run);
                }
            }
            run.push(comment);
        }
        let last = run.last()?;
        let attached = decl_start.line >= last.range.end.line
            && decl_start.line - last.range.end.line <= 1;
        if !attached {
            self.file.comments.append(&mut run);
            return None;
        }
        let text = run
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Some(text)
    }

    /// Claims a comment that starts on the same line as a statement that
    /// just ended at `end`.
    fn take_trailing(&mut self, end: Position) -> Option<String> {
        let comment = self.comments.get(self.cidx)?;
        if comment.range.start.line == end.line && comment.range.start >= end {
            let text = comment.text.clone();
            self.cidx += 1;
            Some(text)
        } else {
            None
        }
    }

    // ---- recovery -----------------------------------------------------

    /// Skips tokens until a plausible statement boundary: a `;` at the
    /// current depth (consumed), the enclosing `}` (left for the caller),
    /// or a top-level keyword starting a fresh line.
    fn recover(&mut self) {
        let error_line = self.here().line;
        let mut depth = 0usize;
        while let Some(tok) = self.cur() {
            if tok.kind == TokenKind::Punct {
                match tok.text.chars().next() {
                    Some('{') => depth += 1,
                    Some('}') => {
                        if depth == 0 {
                            return;
                        }
                        depth -= 1;
                    }
                    Some(';') if depth == 0 => {
                        self.idx += 1;
                        return;
                    }
                    _ => {}
                }
            } else if depth == 0
                && tok.kind == TokenKind::Identifier
                && tok.range.start.line > error_line
                && TOP_LEVEL_KEYWORDS.contains(&tok.text.as_str())
            {
                return;
            }
            self.idx += 1;
        }
    }

    // ---- file ----------------------------------------------------------

    fn parse_file(&mut self) {
        while let Some(tok) = self.cur() {
            let word = if tok.kind == TokenKind::Identifier {
                tok.text.clone()
            } else if tok.is_punct(';') {
                self.idx += 1;
                continue;
            } else {
                self.note_here("expected a top-level declaration");
                self.bump();
                self.recover();
                continue;
            };
            match word.as_str() {
                "syntax" => self.parse_syntax(),
                "edition" => self.parse_edition(),
                "package" => self.parse_package(),
                "import" => self.parse_import(),
                "option" => {
                    let option = self.parse_option_statement();
                    self.file.options.push(option);
                }
                "message" => {
                    let msg = self.parse_message();
                    self.file.messages.push(msg);
                }
                "enum" => {
                    let item = self.parse_enum();
                    self.file.enums.push(item);
                }
                "service" => {
                    let svc = self.parse_service();
                    self.file.services.push(svc);
                }
                "extend" => {
                    let ext = self.parse_extend();
                    self.file.extends.push(ext);
                }
                _ => {
                    self.note_here(format!("unexpected '{word}'"));
                    self.recover();
                }
            }
        }
    }

    fn parse_syntax(&mut self) {
        let start = self.here();
        self.bump();
        self.expect_punct('=');
        let mut decl = None;
        if let Some(tok) = self.cur().cloned() {
            if tok.kind == TokenKind::Str {
                self.idx += 1;
                let version = match tok.text.as_str() {
                    "proto2" => Some(SyntaxVersion::Proto2),
                    "proto3" => Some(SyntaxVersion::Proto3),
                    other => {
                        self.note(format!("unknown syntax '{other}'"), tok.range);
                        None
                    }
                };
                if let Some(version) = version {
                    decl = Some(SyntaxDecl {
                        version,
                        range: Range::new(start, tok.range.end),
                    });
                }
            } else {
                self.note_here("expected a quoted syntax version");
                self.recover();
            }
        }
        self.expect_semicolon();
        if let Some(mut decl) = decl {
            decl.range.end = self.prev_end();
            self.file.syntax = Some(decl);
        }
    }

    fn parse_edition(&mut self) {
        let start = self.here();
        self.bump();
        self.expect_punct('=');
        if let Some(tok) = self.cur().cloned() {
            if tok.kind == TokenKind::Str {
                self.idx += 1;
                self.expect_semicolon();
                self.file.edition = Some(EditionDecl {
                    value: tok.text,
                    range: Range::new(start, self.prev_end()),
                });
                return;
            }
        }
        self.note_here("expected a quoted edition");
        self.recover();
    }

    fn parse_package(&mut self) {
        let start = self.here();
        self.bump();
        if let Some((name, name_range)) = self.parse_dotted_name() {
            self.expect_semicolon();
            if self.file.package.is_some() {
                self.note("multiple package declarations", name_range);
            }
            self.file.package.get_or_insert(PackageDecl {
                name,
                range: Range::new(start, self.prev_end()),
                name_range,
            });
        } else {
            self.recover();
        }
    }

    fn parse_import(&mut self) {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let modifier = if self.eat_ident("public") {
            ImportModifier::Public
        } else if self.eat_ident("weak") {
            ImportModifier::Weak
        } else {
            ImportModifier::None
        };
        let Some(tok) = self.cur().cloned() else {
            self.note_here("expected a quoted import path");
            return;
        };
        if tok.kind != TokenKind::Str {
            self.note_here("expected a quoted import path");
            self.recover();
            return;
        }
        self.idx += 1;
        self.expect_semicolon();
        let end = self.prev_end();
        let trailing = self.take_trailing(end);
        self.file.imports.push(ImportStatement {
            path: tok.text,
            modifier,
            range: Range::new(start, end),
            path_range: tok.range,
            comments: Comments { leading, trailing },
        });
    }

    // ---- names and values ---------------------------------------------

    /// `ident ("." ident)*`, e.g. a package name.
    fn parse_dotted_name(&mut self) -> Option<(String, Range)> {
        let first = self.expect_ident()?;
        let mut name = first.text;
        let mut range = first.range;
        while self.at_punct('.') {
            self.idx += 1;
            name.push('.');
            match self.expect_ident() {
                Some(tok) => {
                    name.push_str(&tok.text);
                    range = range.cover(tok.range);
                }
                None => break,
            }
        }
        Some((name, range))
    }

    /// A type reference: identifier, dotted qualifier, or leading-dot
    /// absolute name.
    fn parse_type_name(&mut self) -> Option<(String, Range)> {
        let mut name = String::new();
        let mut range = None;
        if self.at_punct('.') {
            let dot = self.bump().unwrap();
            name.push('.');
            range = Some(dot.range);
        }
        let first = self.expect_ident()?;
        name.push_str(&first.text);
        let mut range = range.map_or(first.range, |r| r.cover(first.range));
        while self.at_punct('.') {
            self.idx += 1;
            name.push('.');
            match self.expect_ident() {
                Some(tok) => {
                    name.push_str(&tok.text);
                    range = range.cover(tok.range);
                }
                None => break,
            }
        }
        Some((name, range))
    }

    /// An option name: `ident`, a dotted path, or a custom option with a
    /// parenthesised prefix such as `(buf.validate.field).string.min_len`.
    fn parse_option_name(&mut self) -> Option<(String, Range)> {
        let mut name = String::new();
        let start = self.here();
        if self.eat_punct('(') {
            name.push('(');
            if self.at_punct('.') {
                self.idx += 1;
                name.push('.');
            }
            let (inner, _) = self.parse_dotted_name()?;
            name.push_str(&inner);
            self.expect_punct(')');
            name.push(')');
        } else {
            let (inner, _) = self.parse_dotted_name()?;
            name.push_str(&inner);
        }
        while self.at_punct('.') {
            self.idx += 1;
            name.push('.');
            match self.expect_ident() {
                Some(tok) => name.push_str(&tok.text),
                None => break,
            }
        }
        Some((name, Range::new(start, self.prev_end())))
    }

    /// A constant: string, number (optionally signed), bool, identifier, or
    /// a `{ … }` aggregate captured as raw text.
    fn parse_constant(&mut self) -> (OptionValue, Range) {
        let start = self.here();
        if self.at_punct('{') {
            let text = self.capture_aggregate();
            return (OptionValue::Aggregate(text), Range::new(start, self.prev_end()));
        }
        let negative = self.eat_punct('-');
        if !negative {
            self.eat_punct('+');
        }
        let Some(tok) = self.cur().cloned() else {
            self.note_here("expected a value");
            return (
                OptionValue::Identifier(String::new()),
                Range::empty(self.prev_end()),
            );
        };
        let value = match tok.kind {
            TokenKind::Str => {
                self.idx += 1;
                OptionValue::String(tok.text)
            }
            TokenKind::Integer => {
                self.idx += 1;
                let magnitude = integer_value(&tok.text).unwrap_or_else(|| {
                    self.note(format!("invalid integer '{}'", tok.text), tok.range);
                    0
                });
                OptionValue::Integer(if negative { -magnitude } else { magnitude })
            }
            TokenKind::Float => {
                self.idx += 1;
                let magnitude: f64 = tok.text.parse().unwrap_or(0.0);
                OptionValue::Float(if negative { -magnitude } else { magnitude })
            }
            TokenKind::Identifier if tok.text == "true" => {
                self.idx += 1;
                OptionValue::Bool(true)
            }
            TokenKind::Identifier if tok.text == "false" => {
                self.idx += 1;
                OptionValue::Bool(false)
            }
            TokenKind::Identifier => {
                let (name, _) = self.parse_dotted_name().unwrap_or((tok.text, tok.range));
                OptionValue::Identifier(name)
            }
            _ => {
                self.note_here("expected a value");
                self.recover();
                OptionValue::Identifier(String::new())
            }
        };
        (value, Range::new(start, self.prev_end()))
    }

    /// Consumes a balanced `{ … }` block, reconstructing its raw text from
    /// the token stream.
    fn capture_aggregate(&mut self) -> String {
        let mut depth = 0usize;
        let mut parts: Vec<String> = Vec::new();
        while let Some(tok) = self.cur().cloned() {
            if tok.is_punct('{') {
                depth += 1;
                self.idx += 1;
                if depth > 1 {
                    parts.push("{".to_string());
                }
                continue;
            }
            if tok.is_punct('}') {
                depth -= 1;
                self.idx += 1;
                if depth == 0 {
                    break;
                }
                parts.push("}".to_string());
                continue;
            }
            parts.push(match tok.kind {
                TokenKind::Str => format!("\"{}\"", tok.text),
                _ => tok.text.clone(),
            });
            self.idx += 1;
            if self.at_eof() {
                break;
            }
        }
        parts.join(" ")
    }

    fn parse_option_statement(&mut self) -> OptionStatement {
        let start = self.here();
        self.bump();
        let (name, name_range) = self
            .parse_option_name()
            .unwrap_or((String::new(), Range::empty(start)));
        self.expect_punct('=');
        let (value, value_range) = self.parse_constant();
        self.expect_semicolon();
        OptionStatement {
            name,
            value,
            range: Range::new(start, self.prev_end()),
            name_range,
            value_range,
        }
    }

    /// A bracketed field option list: `[ name = value ("," name = value)* ]`.
    fn parse_field_options(&mut self) -> Vec<OptionStatement> {
        let mut options = Vec::new();
        if !self.eat_punct('[') {
            return options;
        }
        loop {
            let start = self.here();
            let Some((name, name_range)) = self.parse_option_name() else {
                self.recover();
                break;
            };
            self.expect_punct('=');
            let (value, value_range) = self.parse_constant();
            options.push(OptionStatement {
                name,
                value,
                range: Range::new(start, self.prev_end()),
                name_range,
                value_range,
            });
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(']');
        options
    }

    fn parse_field_number(&mut self) -> (i64, Range) {
        let negative = self.eat_punct('-');
        let Some(tok) = self.cur().cloned() else {
            self.note_here("expected a field number");
            return (0, Range::empty(self.prev_end()));
        };
        if tok.kind != TokenKind::Integer {
            self.note_here("expected a field number");
            return (0, tok.range);
        }
        self.idx += 1;
        let magnitude = integer_value(&tok.text).unwrap_or_else(|| {
            self.note(format!("invalid integer '{}'", tok.text), tok.range);
            0
        });
        (if negative { -magnitude } else { magnitude }, tok.range)
    }

    // ---- messages -----------------------------------------------------

    fn parse_message(&mut self) -> MessageDefinition {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let name_tok = self.expect_ident();
        let mut msg = MessageDefinition::new(
            name_tok.as_ref().map(|t| t.text.clone()).unwrap_or_default(),
        );
        msg.name_range = name_tok.map(|t| t.range).unwrap_or(Range::empty(start));
        msg.comments.leading = leading;
        if !self.expect_punct('{') {
            self.recover();
            msg.range = Range::new(start, self.prev_end());
            return msg;
        }
        self.parse_message_body(&mut msg);
        msg.range = Range::new(start, self.prev_end());
        msg
    }

    fn parse_message_body(&mut self, msg: &mut MessageDefinition) {
        loop {
            if self.at_eof() {
                self.note_here("expected '}'");
                return;
            }
            if self.eat_punct('}') {
                return;
            }
            if self.eat_punct(';') {
                continue;
            }
            if self.at_ident("option") {
                let option = self.parse_option_statement();
                msg.options.push(option);
            } else if self.at_ident("reserved") {
                let reserved = self.parse_reserved();
                msg.reserved.push(reserved);
            } else if self.at_ident("extensions") {
                let extensions = self.parse_extensions();
                msg.extensions.push(extensions);
            } else if self.at_ident("oneof") {
                let oneof = self.parse_oneof();
                msg.oneofs.push(oneof);
            } else if self.at_ident("map") && self.peek_next_is_punct('<') {
                let map = self.parse_map_field();
                msg.maps.push(map);
            } else if self.at_ident("message") {
                let nested = self.parse_message();
                msg.nested_messages.push(nested);
            } else if self.at_ident("enum") {
                let nested = self.parse_enum();
                msg.nested_enums.push(nested);
            } else if self.at_ident("extend") {
                let ext = self.parse_extend();
                msg.extends.push(ext);
            } else if self.at_any_ident() || self.at_punct('.') {
                self.parse_field_like(msg);
            } else {
                self.note_here("expected a field or declaration");
                self.recover();
            }
        }
    }

    fn peek_next_is_punct(&self, ch: char) -> bool {
        self.tokens
            .get(self.idx + 1)
            .map_or(false, |t| t.is_punct(ch))
    }

    fn parse_modifier(&mut self) -> FieldModifier {
        if self.eat_ident("optional") {
            FieldModifier::Optional
        } else if self.eat_ident("required") {
            FieldModifier::Required
        } else if self.eat_ident("repeated") {
            FieldModifier::Repeated
        } else {
            FieldModifier::None
        }
    }

    /// A field or a proto2 group, distinguished after the optional modifier.
    fn parse_field_like(&mut self, msg: &mut MessageDefinition) {
        let start = self.here();
        let leading = self.take_leading(start);
        let modifier = self.parse_modifier();
        if self.at_ident("group") {
            let group = self.parse_group(start, modifier, leading);
            msg.groups.push(group);
            return;
        }
        if let Some(field) = self.parse_field_tail(start, modifier, leading) {
            msg.fields.push(field);
        }
    }

    fn parse_field_tail(
        &mut self,
        start: Position,
        modifier: FieldModifier,
        leading: Option<String>,
    ) -> Option<FieldDefinition> {
        let (field_type, type_range) = match self.parse_type_name() {
            Some(parsed) => parsed,
            None => {
                self.recover();
                return None;
            }
        };
        let name_tok = match self.expect_ident() {
            Some(tok) => tok,
            None => {
                self.recover();
                return None;
            }
        };
        self.expect_punct('=');
        let (number, number_range) = self.parse_field_number();
        let options = self.parse_field_options();
        self.expect_semicolon();
        let end = self.prev_end();
        let trailing = self.take_trailing(end);
        Some(FieldDefinition {
            name: name_tok.text,
            field_type,
            number,
            modifier,
            options,
            range: Range::new(start, end),
            name_range: name_tok.range,
            type_range,
            number_range,
            comments: Comments { leading, trailing },
        })
    }

    fn parse_group(
        &mut self,
        start: Position,
        modifier: FieldModifier,
        leading: Option<String>,
    ) -> GroupDefinition {
        self.bump();
        let name_tok = self.expect_ident();
        let name = name_tok.as_ref().map(|t| t.text.clone()).unwrap_or_default();
        let name_range = name_tok.map(|t| t.range).unwrap_or(Range::empty(start));
        self.expect_punct('=');
        let (number, number_range) = self.parse_field_number();
        let mut body = MessageDefinition::new(name.clone());
        body.name_range = name_range;
        if self.expect_punct('{') {
            self.parse_message_body(&mut body);
        } else {
            self.recover();
        }
        body.range = Range::new(start, self.prev_end());
        GroupDefinition {
            name,
            modifier,
            number,
            body,
            range: Range::new(start, self.prev_end()),
            name_range,
            number_range,
            comments: Comments {
                leading,
                trailing: None,
            },
        }
    }

    fn parse_map_field(&mut self) -> MapFieldDefinition {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        self.expect_punct('<');
        let (key_type, key_type_range) = self
            .parse_type_name()
            .unwrap_or((String::new(), Range::empty(start)));
        if !key_type.is_empty() && !is_valid_map_key(&key_type) {
            self.note(
                "map keys must be an integer type, bool or string",
                key_type_range,
            );
        }
        self.expect_punct(',');
        let (value_type, value_type_range) = self
            .parse_type_name()
            .unwrap_or((String::new(), Range::empty(start)));
        self.expect_punct('>');
        let name_tok = self.expect_ident();
        self.expect_punct('=');
        let (number, number_range) = self.parse_field_number();
        let options = self.parse_field_options();
        self.expect_semicolon();
        let end = self.prev_end();
        let trailing = self.take_trailing(end);
        MapFieldDefinition {
            name: name_tok.as_ref().map(|t| t.text.clone()).unwrap_or_default(),
            key_type,
            value_type,
            number,
            options,
            range: Range::new(start, end),
            name_range: name_tok.map(|t| t.range).unwrap_or(Range::empty(start)),
            key_type_range,
            value_type_range,
            number_range,
            comments: Comments { leading, trailing },
        }
    }

    fn parse_oneof(&mut self) -> OneofDefinition {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let name_tok = self.expect_ident();
        let mut oneof = OneofDefinition {
            name: name_tok.as_ref().map(|t| t.text.clone()).unwrap_or_default(),
            fields: Vec::new(),
            options: Vec::new(),
            range: Range::default(),
            name_range: name_tok.map(|t| t.range).unwrap_or(Range::empty(start)),
            comments: Comments {
                leading,
                trailing: None,
            },
        };
        if !self.expect_punct('{') {
            self.recover();
            oneof.range = Range::new(start, self.prev_end());
            return oneof;
        }
        loop {
            if self.at_eof() {
                self.note_here("expected '}'");
                break;
            }
            if self.eat_punct('}') {
                break;
            }
            if self.eat_punct(';') {
                continue;
            }
            if self.at_ident("option") {
                let option = self.parse_option_statement();
                oneof.options.push(option);
                continue;
            }
            let field_start = self.here();
            let field_leading = self.take_leading(field_start);
            let modifier = self.parse_modifier();
            if modifier != FieldModifier::None {
                self.note(
                    "oneof fields may not have a label",
                    Range::new(field_start, self.prev_end()),
                );
            }
            match self.parse_field_tail(field_start, modifier, field_leading) {
                Some(field) => oneof.fields.push(field),
                None => {
                    if self.at_punct('}') || self.at_eof() {
                        continue;
                    }
                }
            }
        }
        oneof.range = Range::new(start, self.prev_end());
        oneof
    }

    fn parse_reserved(&mut self) -> ReservedStatement {
        let start = self.here();
        self.bump();
        let mut statement = ReservedStatement {
            numbers: Vec::new(),
            names: Vec::new(),
            range: Range::default(),
        };
        loop {
            let Some(tok) = self.cur().cloned() else { break };
            match tok.kind {
                TokenKind::Str => {
                    self.idx += 1;
                    statement.names.push((tok.text, tok.range));
                }
                TokenKind::Integer => {
                    let (first, first_range) = self.parse_field_number();
                    let mut range = NumberRange {
                        start: first,
                        end: Some(first),
                        range: first_range,
                    };
                    if self.eat_ident("to") {
                        if self.eat_ident("max") {
                            range.end = None;
                        } else {
                            let (end, end_range) = self.parse_field_number();
                            range.end = Some(end);
                            range.range = range.range.cover(end_range);
                        }
                        range.range = range.range.cover(Range::empty(self.prev_end()));
                    }
                    statement.numbers.push(range);
                }
                _ => {
                    self.note_here("expected a reserved number, range or name");
                    self.recover();
                    break;
                }
            }
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_semicolon();
        statement.range = Range::new(start, self.prev_end());
        statement
    }

    fn parse_extensions(&mut self) -> ExtensionsStatement {
        let start = self.here();
        self.bump();
        let mut statement = ExtensionsStatement {
            ranges: Vec::new(),
            options: Vec::new(),
            range: Range::default(),
        };
        loop {
            let (first, first_range) = self.parse_field_number();
            let mut range = NumberRange {
                start: first,
                end: Some(first),
                range: first_range,
            };
            if self.eat_ident("to") {
                if self.eat_ident("max") {
                    range.end = None;
                } else {
                    let (end, end_range) = self.parse_field_number();
                    range.end = Some(end);
                    range.range = range.range.cover(end_range);
                }
            }
            statement.ranges.push(range);
            if !self.eat_punct(',') {
                break;
            }
        }
        statement.options = self.parse_field_options();
        self.expect_semicolon();
        statement.range = Range::new(start, self.prev_end());
        statement
    }

    // ---- enums ---------------------------------------------------------

    fn parse_enum(&mut self) -> EnumDefinition {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let name_tok = self.expect_ident();
        let mut item = EnumDefinition::new(
            name_tok.as_ref().map(|t| t.text.clone()).unwrap_or_default(),
        );
        item.name_range = name_tok.map(|t| t.range).unwrap_or(Range::empty(start));
        item.comments.leading = leading;
        if !self.expect_punct('{') {
            self.recover();
            item.range = Range::new(start, self.prev_end());
            return item;
        }
        loop {
            if self.at_eof() {
                self.note_here("expected '}'");
                break;
            }
            if self.eat_punct('}') {
                break;
            }
            if self.eat_punct(';') {
                continue;
            }
            if self.at_ident("option") {
                let option = self.parse_option_statement();
                item.options.push(option);
                continue;
            }
            if self.at_ident("reserved") {
                let reserved = self.parse_reserved();
                item.reserved.push(reserved);
                continue;
            }
            let value_start = self.here();
            let value_leading = self.take_leading(value_start);
            let Some(name_tok) = self.expect_ident() else {
                self.recover();
                continue;
            };
            self.expect_punct('=');
            let (number, number_range) = self.parse_field_number();
            let options = self.parse_field_options();
            self.expect_semicolon();
            let end = self.prev_end();
            let trailing = self.take_trailing(end);
            item.values.push(EnumValueDefinition {
                name: name_tok.text,
                number,
                options,
                range: Range::new(value_start, end),
                name_range: name_tok.range,
                number_range,
                comments: Comments {
                    leading: value_leading,
                    trailing,
                },
            });
        }
        item.range = Range::new(start, self.prev_end());
        item
    }

    // ---- services ------------------------------------------------------

    fn parse_service(&mut self) -> ServiceDefinition {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let name_tok = self.expect_ident();
        let mut svc = ServiceDefinition {
            name: name_tok.as_ref().map(|t| t.text.clone()).unwrap_or_default(),
            rpcs: Vec::new(),
            options: Vec::new(),
            range: Range::default(),
            name_range: name_tok.map(|t| t.range).unwrap_or(Range::empty(start)),
            comments: Comments {
                leading,
                trailing: None,
            },
        };
        if !self.expect_punct('{') {
            self.recover();
            svc.range = Range::new(start, self.prev_end());
            return svc;
        }
        loop {
            if self.at_eof() {
                self.note_here("expected '}'");
                break;
            }
            if self.eat_punct('}') {
                break;
            }
            if self.eat_punct(';') {
                continue;
            }
            if self.at_ident("option") {
                let option = self.parse_option_statement();
                svc.options.push(option);
                continue;
            }
            if self.at_ident("rpc") {
                if let Some(rpc) = self.parse_rpc() {
                    svc.rpcs.push(rpc);
                }
                continue;
            }
            self.note_here("expected 'rpc', 'option' or '}'");
            self.recover();
        }
        svc.range = Range::new(start, self.prev_end());
        svc
    }

    fn parse_rpc(&mut self) -> Option<RpcDefinition> {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let name_tok = self.expect_ident()?;
        self.expect_punct('(');
        let input_stream = self.eat_ident("stream");
        let (input_type, input_type_range) = self
            .parse_type_name()
            .unwrap_or((String::new(), Range::empty(self.here())));
        self.expect_punct(')');
        if !self.eat_ident("returns") {
            self.note_here("expected 'returns'");
        }
        self.expect_punct('(');
        let output_stream = self.eat_ident("stream");
        let (output_type, output_type_range) = self
            .parse_type_name()
            .unwrap_or((String::new(), Range::empty(self.here())));
        self.expect_punct(')');
        let mut options = Vec::new();
        if self.eat_punct('{') {
            loop {
                if self.at_eof() {
                    self.note_here("expected '}'");
                    break;
                }
                if self.eat_punct('}') {
                    break;
                }
                if self.eat_punct(';') {
                    continue;
                }
                if self.at_ident("option") {
                    let option = self.parse_option_statement();
                    options.push(option);
                    continue;
                }
                self.note_here("expected 'option' or '}'");
                self.recover();
            }
        } else {
            self.expect_semicolon();
        }
        let end = self.prev_end();
        let trailing = self.take_trailing(end);
        Some(RpcDefinition {
            name: name_tok.text,
            input_type,
            output_type,
            input_stream,
            output_stream,
            options,
            range: Range::new(start, end),
            name_range: name_tok.range,
            input_type_range,
            output_type_range,
            comments: Comments { leading, trailing },
        })
    }

    // ---- extend --------------------------------------------------------

    fn parse_extend(&mut self) -> ExtendBlock {
        let start = self.here();
        let leading = self.take_leading(start);
        self.bump();
        let (target, target_range) = self
            .parse_type_name()
            .unwrap_or((String::new(), Range::empty(start)));
        let mut block = ExtendBlock {
            target,
            target_range,
            fields: Vec::new(),
            groups: Vec::new(),
            range: Range::default(),
            comments: Comments {
                leading,
                trailing: None,
            },
        };
        if self.at_punct(';') {
            // The head of an extend block takes a body, never a bare
            // semicolon.
            self.note_here("expected '{' after extend target");
            self.idx += 1;
            block.range = Range::new(start, self.prev_end());
            return block;
        }
        if !self.expect_punct('{') {
            self.recover();
            block.range = Range::new(start, self.prev_end());
            return block;
        }
        loop {
            if self.at_eof() {
                self.note_here("expected '}'");
                break;
            }
            if self.eat_punct('}') {
                break;
            }
            if self.eat_punct(';') {
                continue;
            }
            let field_start = self.here();
            let field_leading = self.take_leading(field_start);
            let modifier = self.parse_modifier();
            if self.at_ident("group") {
                let group = self.parse_group(field_start, modifier, field_leading);
                block.groups.push(group);
                continue;
            }
            match self.parse_field_tail(field_start, modifier, field_leading) {
                Some(field) => block.fields.push(field),
                None => {
                    if self.at_punct('}') || self.at_eof() {
                        continue;
                    }
                }
            }
        }
        block.range = Range::new(start, self.prev_end());
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> ProtoFile {
        parse_text("file:///test.proto", text)
    }

    #[test]
    fn parses_a_small_proto3_file() {
        let file = parse(
            r#"
syntax = "proto3";
package demo.v1;

import "google/protobuf/timestamp.proto";

message User {
  string name = 1;
  int32 age = 2;
  google.protobuf.Timestamp created_at = 3;
}
"#,
        );
        assert_eq!(file.syntax.as_ref().unwrap().version, SyntaxVersion::Proto3);
        assert_eq!(file.package_name(), "demo.v1");
        assert_eq!(file.imports.len(), 1);
        assert_eq!(file.imports[0].path, "google/protobuf/timestamp.proto");
        let user = &file.messages[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.fields.len(), 3);
        assert_eq!(user.fields[2].field_type, "google.protobuf.Timestamp");
        assert_eq!(user.fields[2].number, 3);
        assert!(file.notes.is_empty());
    }

    #[test]
    fn name_range_covers_identifier_only() {
        let file = parse("message User {}\n");
        let user = &file.messages[0];
        assert_eq!(user.name_range.start, Position::new(0, 8));
        assert_eq!(user.name_range.end, Position::new(0, 12));
        assert_eq!(user.range.start, Position::new(0, 0));
    }

    #[test]
    fn parses_modifiers_and_leading_dot_types() {
        let file = parse(
            "syntax = \"proto2\";\nmessage M {\n  required .pkg.Other o = 1;\n  repeated int32 xs = 2;\n}\n",
        );
        let m = &file.messages[0];
        assert_eq!(m.fields[0].modifier, FieldModifier::Required);
        assert_eq!(m.fields[0].field_type, ".pkg.Other");
        assert_eq!(m.fields[1].modifier, FieldModifier::Repeated);
    }

    #[test]
    fn parses_map_oneof_reserved() {
        let file = parse(
            r#"
message M {
  map<string, Project> projects = 1;
  oneof kind {
    string a = 2;
    int32 b = 3;
  }
  reserved 5, 10 to 20, 100 to max;
  reserved "legacy", "old";
}
"#,
        );
        let m = &file.messages[0];
        assert_eq!(m.maps[0].key_type, "string");
        assert_eq!(m.maps[0].value_type, "Project");
        assert_eq!(m.oneofs[0].fields.len(), 2);
        let reserved = &m.reserved[0];
        assert_eq!(reserved.numbers.len(), 3);
        assert_eq!(reserved.numbers[1].start, 10);
        assert_eq!(reserved.numbers[1].end, Some(20));
        assert_eq!(reserved.numbers[2].end, None);
        assert_eq!(m.reserved[1].names.len(), 2);
    }

    #[test]
    fn oneof_label_is_noted() {
        let file = parse("message M {\n  oneof k {\n    repeated int32 a = 1;\n  }\n}\n");
        assert!(file
            .notes
            .iter()
            .any(|n| n.message.contains("oneof fields may not have a label")));
        assert_eq!(file.messages[0].oneofs[0].fields.len(), 1);
    }

    #[test]
    fn parses_enum_with_options_and_negatives() {
        let file = parse(
            r#"
enum Status {
  option allow_alias = true;
  UNKNOWN = 0;
  ACTIVE = 1;
  RUNNING = 1;
  BROKEN = -1;
}
"#,
        );
        let e = &file.enums[0];
        assert!(e.allows_alias());
        assert_eq!(e.values.len(), 4);
        assert_eq!(e.values[3].number, -1);
    }

    #[test]
    fn parses_service_streams_and_bodies() {
        let file = parse(
            r#"
service Chat {
  rpc Open (OpenRequest) returns (stream Event);
  rpc Send (stream Frame) returns (Ack) {
    option idempotency_level = IDEMPOTENT;
  }
}
"#,
        );
        let svc = &file.services[0];
        assert_eq!(svc.rpcs.len(), 2);
        assert!(!svc.rpcs[0].input_stream);
        assert!(svc.rpcs[0].output_stream);
        assert!(svc.rpcs[1].input_stream);
        assert_eq!(svc.rpcs[1].options[0].name, "idempotency_level");
    }

    #[test]
    fn parses_groups_and_extend() {
        let file = parse(
            r#"
syntax = "proto2";
message M {
  optional group Result = 1 {
    optional string url = 2;
  }
}
extend M {
  optional int32 extra = 100;
}
"#,
        );
        let m = &file.messages[0];
        assert_eq!(m.groups.len(), 1);
        assert_eq!(m.groups[0].name, "Result");
        assert_eq!(m.groups[0].number, 1);
        assert_eq!(m.groups[0].body.fields.len(), 1);
        assert_eq!(file.extends.len(), 1);
        assert_eq!(file.extends[0].target, "M");
        assert_eq!(file.extends[0].fields[0].number, 100);
    }

    #[test]
    fn extend_with_semicolon_is_an_error() {
        let file = parse("syntax = \"proto2\";\nextend Foo;\n");
        assert!(file
            .notes
            .iter()
            .any(|n| n.message.contains("expected '{' after extend target")));
        assert_eq!(file.extends.len(), 1);
    }

    #[test]
    fn recovers_after_malformed_message() {
        let file = parse(
            r#"
message Broken {
  string name 1;
}
message Fine {
  int32 ok = 1;
}
"#,
        );
        assert!(!file.notes.is_empty());
        assert_eq!(file.messages.len(), 2);
        let fine = &file.messages[1];
        assert_eq!(fine.name, "Fine");
        assert_eq!(fine.fields.len(), 1);
    }

    #[test]
    fn recovers_from_garbage_at_top_level() {
        let file = parse("]]] ;;; \nmessage M { int32 a = 1; }\n");
        assert!(!file.notes.is_empty());
        assert_eq!(file.messages.len(), 1);
    }

    #[test]
    fn leading_comment_attaches_to_declaration() {
        let file = parse("// The user record.\nmessage User {\n  string name = 1;\n}\n");
        let user = &file.messages[0];
        assert_eq!(user.comments.leading.as_deref(), Some("The user record."));
        assert_eq!(user.fields[0].comments.leading, None);
    }

    #[test]
    fn blank_line_detaches_comment() {
        let file = parse("// floating thought\n\nmessage User {}\n");
        assert_eq!(file.messages[0].comments.leading, None);
        assert_eq!(file.comments.len(), 1);
        assert_eq!(file.comments[0].text, "floating thought");
    }

    #[test]
    fn trailing_comment_attaches_to_statement() {
        let file = parse("message M {\n  int32 a = 1; // the a field\n}\n");
        assert_eq!(
            file.messages[0].fields[0].comments.trailing.as_deref(),
            Some("the a field"),
        );
    }

    #[test]
    fn mixed_comment_styles_concatenate() {
        let file = parse("/* block */\n// line\nmessage M {}\n");
        assert_eq!(
            file.messages[0].comments.leading.as_deref(),
            Some("block\nline"),
        );
    }

    #[test]
    fn field_options_parse() {
        let file = parse(
            "message M {\n  string id = 1 [deprecated = true, (buf.validate.field).string.min_len = 3];\n}\n",
        );
        let field = &file.messages[0].fields[0];
        assert_eq!(field.options.len(), 2);
        assert!(field.is_deprecated());
        assert_eq!(field.options[1].name, "(buf.validate.field).string.min_len");
        assert_eq!(field.options[1].value, OptionValue::Integer(3));
    }

    #[test]
    fn aggregate_option_is_captured() {
        let file = parse(
            "message M {\n  string q = 1 [(buf.validate.field).cel = { id: \"q\" expression: \"size(this) > 0\" }];\n}\n",
        );
        let field = &file.messages[0].fields[0];
        match &field.options[0].value {
            OptionValue::Aggregate(text) => {
                assert!(text.contains("expression"));
                assert!(text.contains("size(this) > 0"));
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn edition_files_parse() {
        let file = parse("edition = \"2023\";\nmessage M { int32 a = 1; }\n");
        assert_eq!(file.edition.as_ref().unwrap().value, "2023");
        assert_eq!(file.syntax_level(), SyntaxLevel::Edition);
    }

    #[test]
    fn import_modifiers() {
        let file = parse(
            "import public \"a.proto\";\nimport weak \"b.proto\";\nimport \"c.proto\";\n",
        );
        assert_eq!(file.imports[0].modifier, ImportModifier::Public);
        assert_eq!(file.imports[1].modifier, ImportModifier::Weak);
        assert_eq!(file.imports[2].modifier, ImportModifier::None);
    }

    #[test]
    fn extensions_ranges_parse() {
        let file = parse(
            "syntax = \"proto2\";\nmessage M {\n  extensions 100 to 199, 500;\n  extensions 1000 to max;\n}\n",
        );
        let m = &file.messages[0];
        assert_eq!(m.extensions.len(), 2);
        assert_eq!(m.extensions[0].ranges[0].start, 100);
        assert_eq!(m.extensions[0].ranges[0].end, Some(199));
        assert_eq!(m.extensions[0].ranges[1].start, 500);
        assert_eq!(m.extensions[1].ranges[0].end, None);
    }

    #[test]
    fn invalid_map_key_is_noted() {
        let file = parse("message M {\n  map<float, string> bad = 1;\n}\n");
        assert!(file
            .notes
            .iter()
            .any(|n| n.message.contains("map keys")));
    }

    #[test]
    fn message_comment_does_not_leak_to_first_field() {
        let file = parse(
            "// Describes a widget.\nmessage Widget {\n  // Field doc.\n  string label = 1;\n  string other = 2;\n}\n",
        );
        let widget = &file.messages[0];
        assert_eq!(widget.comments.leading.as_deref(), Some("Describes a widget."));
        assert_eq!(widget.fields[0].comments.leading.as_deref(), Some("Field doc."));
        assert_eq!(widget.fields[1].comments.leading, None);
    }

    #[test]
    fn nested_messages_and_enums() {
        let file = parse(
            r#"
message Outer {
  message Inner {
    enum Kind { KIND_UNSPECIFIED = 0; }
    Kind kind = 1;
  }
  Inner inner = 1;
}
"#,
        );
        let outer = &file.messages[0];
        let inner = outer.nested_message("Inner").unwrap();
        assert_eq!(inner.nested_enums[0].name, "Kind");
        assert_eq!(outer.fields[0].field_type, "Inner");
    }
}
