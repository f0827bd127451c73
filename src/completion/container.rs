//! Enclosing-container detection for number and type completion.
//!
//! Works on raw document text rather than the parsed tree: completion runs
//! on half-typed lines that the parser may have skipped, so the container
//! is found by walking braces backwards from the cursor and classifying the
//! preamble of the enclosing block. Only direct-child statements contribute
//! to tag collection, with one exception: oneof members, whose numbers
//! share the enclosing message's namespace, are collected one level deeper.

use once_cell::sync::Lazy;
use regex::Regex;

use protonav_parse::ast::{
    MessageDefinition, Position, IMPL_RESERVED_END, IMPL_RESERVED_START, MAX_FIELD_NUMBER,
};

static BLOCK_HEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(message|enum|oneof|service|extend)\s+([A-Za-z_][\w.]*)\s*$").unwrap()
});
static FIELD_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"=\s*(\d+)\s*(?:;|\[|$)").unwrap());
static RESERVED_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(?:\s+to\s+(\d+|max))?").unwrap());

/// The `N to max` sweep is capped so number scans stay bounded.
const TO_MAX_SPAN: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContainerKind {
    Message,
    Enum,
    Service,
}

#[derive(Debug, Clone)]
pub(crate) struct ContainerContext {
    pub kind: ContainerKind,
    /// Simple name from the block head, e.g. `User`.
    pub name: String,
    pub used_numbers: Vec<i64>,
    pub reserved: Vec<(i64, i64)>,
}

/// Blanks out string and comment contents (preserving newlines) so brace
/// walking and number scanning cannot be fooled by literals.
fn mask_source(document: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Str(char),
        LineComment,
        BlockComment,
    }
    let mut state = State::Code;
    let mut out = String::with_capacity(document.len());
    let chars: Vec<char> = document.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        match state {
            State::Code => match ch {
                '"' | '\'' => {
                    state = State::Str(ch);
                    out.push(' ');
                }
                '/' if chars.get(idx + 1) == Some(&'/') => {
                    state = State::LineComment;
                    out.push(' ');
                }
                '/' if chars.get(idx + 1) == Some(&'*') => {
                    state = State::BlockComment;
                    out.push(' ');
                }
                other => out.push(other),
            },
            State::Str(quote) => {
                if ch == '\\' && idx + 1 < chars.len() {
                    out.push(' ');
                    out.push(if chars[idx + 1] == '\n' { '\n' } else { ' ' });
                    idx += 2;
                    continue;
                }
                if ch == quote || ch == '\n' {
                    state = State::Code;
                }
                out.push(if ch == '\n' { '\n' } else { ' ' });
            }
            State::LineComment => {
                if ch == '\n' {
                    state = State::Code;
                }
                out.push(if ch == '\n' { '\n' } else { ' ' });
            }
            State::BlockComment => {
                if ch == '*' && chars.get(idx + 1) == Some(&'/') {
                    state = State::Code;
                    out.push(' ');
                    out.push(' ');
                    idx += 2;
                    continue;
                }
                out.push(if ch == '\n' { '\n' } else { ' ' });
            }
        }
        idx += 1;
    }
    out
}

/// Byte offset of a UTF-16 position within `document`.
fn offset_of(document: &str, position: Position) -> Option<usize> {
    let mut offset = 0usize;
    for (line_no, line) in document.split('\n').enumerate() {
        if line_no as u32 == position.line {
            let mut units = 0u32;
            for (byte_idx, ch) in line.char_indices() {
                if units >= position.character {
                    return Some(offset + byte_idx);
                }
                units += ch.len_utf16() as u32;
            }
            return Some(offset + line.len());
        }
        offset += line.len() + 1;
    }
    None
}

/// Finds the container enclosing `position`, classifying it and collecting
/// the field numbers and reserved ranges of its direct children.
pub(crate) fn detect_container(document: &str, position: Position) -> Option<ContainerContext> {
    let masked = mask_source(document);
    let offset = offset_of(&masked, position)?;
    detect_at_offset(&masked, offset)
}

fn detect_at_offset(masked: &str, offset: usize) -> Option<ContainerContext> {
    let mut search = offset;
    loop {
        let open = enclosing_open_brace(masked, search)?;
        let head = &masked[..open];
        let Some(caps) = BLOCK_HEAD_RE.captures(head.trim_end()) else {
            // Not a declaration block (for example an option aggregate);
            // keep walking outward.
            search = open;
            continue;
        };
        let keyword = caps.get(1).unwrap().as_str();
        let name = caps.get(2).unwrap().as_str().to_string();
        return match keyword {
            // Oneof members live in the enclosing message's number
            // namespace; classify from the parent block instead.
            "oneof" => {
                let head_start = caps.get(1).unwrap().start();
                detect_at_offset(masked, head_start)
            }
            "enum" => Some(collect(masked, open, ContainerKind::Enum, name)),
            "service" => Some(collect(masked, open, ContainerKind::Service, name)),
            _ => Some(collect(masked, open, ContainerKind::Message, name)),
        };
    }
}

fn enclosing_open_brace(masked: &str, offset: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in masked[..offset].char_indices().rev() {
        match ch {
            '}' => depth += 1,
            '{' => {
                if depth == 0 {
                    return Some(idx);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn collect(masked: &str, open: usize, kind: ContainerKind, name: String) -> ContainerContext {
    let mut context = ContainerContext {
        kind,
        name,
        used_numbers: Vec::new(),
        reserved: Vec::new(),
    };

    // Forward-walk to the matching close brace, splitting the body into
    // direct-child statements. Depth 1 is collected only inside oneofs.
    let body = &masked[open + 1..];
    let mut depth = 0i32;
    let mut oneof_depth: Option<i32> = None;
    let mut statement = String::new();
    for ch in body.chars() {
        match ch {
            '{' => {
                if depth == 0 && statement.contains("oneof") {
                    oneof_depth = Some(1);
                }
                depth += 1;
                statement.clear();
            }
            '}' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
                if oneof_depth == Some(depth + 1) {
                    oneof_depth = None;
                }
                statement.clear();
            }
            ';' => {
                let collecting = depth == 0 || (oneof_depth == Some(depth) && depth == 1);
                if collecting {
                    scan_statement(&statement, &mut context);
                }
                statement.clear();
            }
            other => statement.push(other),
        }
    }
    context
}

fn scan_statement(statement: &str, context: &mut ContainerContext) {
    let trimmed = statement.trim();
    if trimmed.starts_with("option") {
        return;
    }
    if trimmed.starts_with("reserved") || trimmed.starts_with("extensions") {
        for caps in RESERVED_ENTRY_RE.captures_iter(trimmed) {
            let start: i64 = caps[1].parse().unwrap_or(0);
            let end = match caps.get(2).map(|m| m.as_str()) {
                Some("max") => start + TO_MAX_SPAN,
                Some(num) => num.parse().unwrap_or(start),
                None => start,
            };
            context.reserved.push((start, end));
        }
        return;
    }
    if let Some(caps) = FIELD_NUMBER_RE.captures(trimmed) {
        if let Ok(number) = caps[1].parse() {
            context.used_numbers.push(number);
        }
    }
}

impl ContainerContext {
    fn is_blocked(&self, n: i64) -> bool {
        self.used_numbers.contains(&n)
            || (IMPL_RESERVED_START..=IMPL_RESERVED_END).contains(&n)
            || self.reserved.iter().any(|(start, end)| (*start..=*end).contains(&n))
    }

    /// The next free field number: one past the highest in use, skipping
    /// reserved ranges and the implementation-reserved block.
    pub fn next_field_number(&self) -> i64 {
        let mut candidate = self.used_numbers.iter().max().map_or(1, |max| max + 1);
        while self.is_blocked(candidate) && candidate <= MAX_FIELD_NUMBER {
            candidate += 1;
        }
        candidate
    }

    /// The next free enum value number; enums start at zero.
    pub fn next_enum_number(&self) -> i64 {
        let mut candidate = self.used_numbers.iter().max().map_or(0, |max| max + 1);
        while self.used_numbers.contains(&candidate)
            || self.reserved.iter().any(|(s, e)| (*s..=*e).contains(&candidate))
        {
            candidate += 1;
        }
        candidate
    }
}

/// AST-based variant of the next-number computation, for fix providers
/// that already hold a parsed message.
pub fn next_field_number(message: &MessageDefinition) -> i64 {
    let used: Vec<i64> = message
        .direct_field_numbers()
        .iter()
        .map(|(n, _)| *n)
        .collect();
    let reserved: Vec<(i64, i64)> = message
        .reserved
        .iter()
        .flat_map(|r| &r.numbers)
        .chain(message.extensions.iter().flat_map(|e| &e.ranges))
        .map(|r| (r.start, r.end.unwrap_or(r.start + TO_MAX_SPAN)))
        .collect();
    let context = ContainerContext {
        kind: ContainerKind::Message,
        name: message.name.clone(),
        used_numbers: used,
        reserved,
    };
    context.next_field_number()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"syntax = "proto3";

message Order {
  reserved 4, 10 to 12;
  string id = 1;
  oneof payment {
    string card = 2;
    string cash = 3;
  }
  message Line {
    int32 qty = 1;
  }
  // cursor here
}

enum State {
  STATE_UNSPECIFIED = 0;
  OPEN = 1;
}
"#;

    #[test]
    fn classifies_the_enclosing_message() {
        let ctx = detect_container(DOC, Position::new(12, 2)).unwrap();
        assert_eq!(ctx.kind, ContainerKind::Message);
        assert_eq!(ctx.name, "Order");
        assert_eq!(ctx.used_numbers, vec![1, 2, 3]);
        assert_eq!(ctx.reserved, vec![(4, 4), (10, 12)]);
    }

    #[test]
    fn oneof_shares_the_message_namespace() {
        // Cursor inside the oneof block.
        let ctx = detect_container(DOC, Position::new(7, 4)).unwrap();
        assert_eq!(ctx.kind, ContainerKind::Message);
        assert_eq!(ctx.name, "Order");
        assert!(ctx.used_numbers.contains(&1));
        assert!(ctx.used_numbers.contains(&2));
    }

    #[test]
    fn nested_message_has_its_own_namespace() {
        let ctx = detect_container(DOC, Position::new(10, 4)).unwrap();
        assert_eq!(ctx.name, "Line");
        assert_eq!(ctx.used_numbers, vec![1]);
    }

    #[test]
    fn classifies_enums() {
        let ctx = detect_container(DOC, Position::new(17, 2)).unwrap();
        assert_eq!(ctx.kind, ContainerKind::Enum);
        assert_eq!(ctx.used_numbers, vec![0, 1]);
        assert_eq!(ctx.next_enum_number(), 2);
    }

    #[test]
    fn next_number_skips_reserved_and_impl_ranges() {
        let ctx = ContainerContext {
            kind: ContainerKind::Message,
            name: "M".to_string(),
            used_numbers: vec![1, 2, 3],
            reserved: vec![(4, 6)],
        };
        assert_eq!(ctx.next_field_number(), 7);

        let near_impl = ContainerContext {
            kind: ContainerKind::Message,
            name: "M".to_string(),
            used_numbers: vec![18999],
            reserved: vec![],
        };
        assert_eq!(near_impl.next_field_number(), 20000);
    }

    #[test]
    fn braces_in_strings_and_comments_are_ignored() {
        let doc = "message M {\n  // fake }\n  string a = 1; // {\n  \n}\n";
        let ctx = detect_container(doc, Position::new(3, 2)).unwrap();
        assert_eq!(ctx.name, "M");
        assert_eq!(ctx.used_numbers, vec![1]);
    }

    #[test]
    fn ast_based_next_number() {
        let file = protonav_parse::parse(
            "file:///x.proto",
            "message M {\n  reserved 3 to 5;\n  string a = 1;\n  string b = 2;\n}\n",
        );
        assert_eq!(next_field_number(&file.messages[0]), 6);
    }
}
