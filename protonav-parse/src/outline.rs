//! The line-oriented fallback backend.
//!
//! A deliberately coarse scanner that recovers the declaration outline of a
//! file — package, imports, message/enum/service shells and numbered
//! members — without ever looking at more than one line at a time. It exists
//! so that a crash in the full parser still leaves the workspace with
//! something to index.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::*;
use crate::lexer::integer_value;

static SYNTAX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*syntax\s*=\s*"(proto2|proto3)""#).unwrap());
static EDITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*edition\s*=\s*"([^"]+)""#).unwrap());
static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*package\s+([A-Za-z_][\w.]*)").unwrap());
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*import\s+(?:(public|weak)\s+)?["']([^"']+)["']"#).unwrap());
static MESSAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*message\s+([A-Za-z_]\w*)").unwrap());
static ENUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*enum\s+([A-Za-z_]\w*)").unwrap());
static SERVICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*service\s+([A-Za-z_]\w*)").unwrap());
static ONEOF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*oneof\s+([A-Za-z_]\w*)").unwrap());
static MAP_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*map\s*<\s*(\w+)\s*,\s*([.\w]+)\s*>\s*([A-Za-z_]\w*)\s*=\s*(\d+)").unwrap()
});
static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(optional|required|repeated)\s+)?([.A-Za-z_][\w.]*)\s+([A-Za-z_]\w*)\s*=\s*(\d+)")
        .unwrap()
});
static ENUM_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*=\s*(-?\w+)").unwrap());
static RPC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*rpc\s+([A-Za-z_]\w*)\s*\(\s*(stream\s+)?([.\w]+)\s*\)\s*returns\s*\(\s*(stream\s+)?([.\w]+)\s*\)",
    )
    .unwrap()
});

enum Scope {
    Message(MessageDefinition),
    Enum(EnumDefinition),
    Service(ServiceDefinition),
    Oneof(OneofDefinition),
}

struct ScopeEntry {
    scope: Scope,
    at_depth: i32,
}

/// Parses the declaration outline of `text`.
pub fn parse_outline(uri: &str, text: &str) -> ProtoFile {
    let mut file = ProtoFile::empty(uri);
    let mut stack: Vec<ScopeEntry> = Vec::new();
    let mut depth: i32 = 0;

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no as u32;
        scan_line(&mut file, &mut stack, depth, line, line_no);

        let (opens, closes) = brace_delta(line);
        depth += opens - closes;
        if depth < 0 {
            depth = 0;
        }
        while closes > 0 {
            match stack.last() {
                Some(entry) if depth < entry.at_depth => {
                    let entry = stack.pop().unwrap();
                    close_scope(&mut file, &mut stack, entry.scope, line_no, line);
                }
                _ => break,
            }
        }
    }
    while let Some(entry) = stack.pop() {
        let last_line = text.lines().count().saturating_sub(1) as u32;
        close_scope(&mut file, &mut stack, entry.scope, last_line, "");
    }
    file
}

fn scan_line(
    file: &mut ProtoFile,
    stack: &mut Vec<ScopeEntry>,
    depth: i32,
    line: &str,
    line_no: u32,
) {
    if let Some(caps) = SYNTAX_RE.captures(line) {
        let version = match &caps[1] {
            "proto3" => SyntaxVersion::Proto3,
            _ => SyntaxVersion::Proto2,
        };
        file.syntax = Some(SyntaxDecl {
            version,
            range: line_range(line, line_no),
        });
        return;
    }
    if let Some(caps) = EDITION_RE.captures(line) {
        file.edition = Some(EditionDecl {
            value: caps[1].to_string(),
            range: line_range(line, line_no),
        });
        return;
    }
    if let Some(caps) = PACKAGE_RE.captures(line) {
        let m = caps.get(1).unwrap();
        file.package = Some(PackageDecl {
            name: m.as_str().to_string(),
            range: line_range(line, line_no),
            name_range: match_range(line, line_no, m),
        });
        return;
    }
    if let Some(caps) = IMPORT_RE.captures(line) {
        let modifier = match caps.get(1).map(|m| m.as_str()) {
            Some("public") => ImportModifier::Public,
            Some("weak") => ImportModifier::Weak,
            _ => ImportModifier::None,
        };
        let m = caps.get(2).unwrap();
        file.imports.push(ImportStatement {
            path: m.as_str().to_string(),
            modifier,
            range: line_range(line, line_no),
            path_range: match_range(line, line_no, m),
            comments: Comments::default(),
        });
        return;
    }
    if let Some(caps) = MESSAGE_RE.captures(line) {
        let m = caps.get(1).unwrap();
        let mut msg = MessageDefinition::new(m.as_str());
        msg.range = line_range(line, line_no);
        msg.name_range = match_range(line, line_no, m);
        stack.push(ScopeEntry {
            scope: Scope::Message(msg),
            at_depth: depth + 1,
        });
        return;
    }
    if let Some(caps) = ENUM_RE.captures(line) {
        let m = caps.get(1).unwrap();
        let mut item = EnumDefinition::new(m.as_str());
        item.range = line_range(line, line_no);
        item.name_range = match_range(line, line_no, m);
        stack.push(ScopeEntry {
            scope: Scope::Enum(item),
            at_depth: depth + 1,
        });
        return;
    }
    if let Some(caps) = SERVICE_RE.captures(line) {
        let m = caps.get(1).unwrap();
        stack.push(ScopeEntry {
            scope: Scope::Service(ServiceDefinition {
                name: m.as_str().to_string(),
                rpcs: Vec::new(),
                options: Vec::new(),
                range: line_range(line, line_no),
                name_range: match_range(line, line_no, m),
                comments: Comments::default(),
            }),
            at_depth: depth + 1,
        });
        return;
    }
    if let Some(caps) = ONEOF_RE.captures(line) {
        let m = caps.get(1).unwrap();
        stack.push(ScopeEntry {
            scope: Scope::Oneof(OneofDefinition {
                name: m.as_str().to_string(),
                fields: Vec::new(),
                options: Vec::new(),
                range: line_range(line, line_no),
                name_range: match_range(line, line_no, m),
                comments: Comments::default(),
            }),
            at_depth: depth + 1,
        });
        return;
    }

    match stack.last_mut().map(|e| &mut e.scope) {
        Some(Scope::Message(msg)) => {
            if let Some(caps) = MAP_FIELD_RE.captures(line) {
                let name = caps.get(3).unwrap();
                msg.maps.push(MapFieldDefinition {
                    name: name.as_str().to_string(),
                    key_type: caps[1].to_string(),
                    value_type: caps[2].to_string(),
                    number: caps[4].parse().unwrap_or(0),
                    options: Vec::new(),
                    range: line_range(line, line_no),
                    name_range: match_range(line, line_no, name),
                    key_type_range: match_range(line, line_no, caps.get(1).unwrap()),
                    value_type_range: match_range(line, line_no, caps.get(2).unwrap()),
                    number_range: match_range(line, line_no, caps.get(4).unwrap()),
                    comments: Comments::default(),
                });
            } else if let Some(field) = scan_field(line, line_no) {
                msg.fields.push(field);
            }
        }
        Some(Scope::Oneof(oneof)) => {
            if let Some(field) = scan_field(line, line_no) {
                oneof.fields.push(field);
            }
        }
        Some(Scope::Enum(item)) => {
            if let Some(caps) = ENUM_VALUE_RE.captures(line) {
                let name = caps.get(1).unwrap();
                if name.as_str() != "option" {
                    item.values.push(EnumValueDefinition {
                        name: name.as_str().to_string(),
                        number: integer_value(caps[2].trim_start_matches('-'))
                            .map(|n| if caps[2].starts_with('-') { -n } else { n })
                            .unwrap_or(0),
                        options: Vec::new(),
                        range: line_range(line, line_no),
                        name_range: match_range(line, line_no, name),
                        number_range: match_range(line, line_no, caps.get(2).unwrap()),
                        comments: Comments::default(),
                    });
                }
            }
        }
        Some(Scope::Service(svc)) => {
            if let Some(caps) = RPC_RE.captures(line) {
                let name = caps.get(1).unwrap();
                svc.rpcs.push(RpcDefinition {
                    name: name.as_str().to_string(),
                    input_type: caps[3].to_string(),
                    output_type: caps[5].to_string(),
                    input_stream: caps.get(2).is_some(),
                    output_stream: caps.get(4).is_some(),
                    options: Vec::new(),
                    range: line_range(line, line_no),
                    name_range: match_range(line, line_no, name),
                    input_type_range: match_range(line, line_no, caps.get(3).unwrap()),
                    output_type_range: match_range(line, line_no, caps.get(5).unwrap()),
                    comments: Comments::default(),
                });
            }
        }
        None => {}
    }
}

fn scan_field(line: &str, line_no: u32) -> Option<FieldDefinition> {
    let caps = FIELD_RE.captures(line)?;
    let type_match = caps.get(2).unwrap();
    if matches!(
        type_match.as_str(),
        "option" | "reserved" | "extensions" | "import" | "package" | "syntax" | "rpc"
    ) {
        return None;
    }
    let modifier = match caps.get(1).map(|m| m.as_str()) {
        Some("optional") => FieldModifier::Optional,
        Some("required") => FieldModifier::Required,
        Some("repeated") => FieldModifier::Repeated,
        _ => FieldModifier::None,
    };
    let name = caps.get(3).unwrap();
    Some(FieldDefinition {
        name: name.as_str().to_string(),
        field_type: type_match.as_str().to_string(),
        number: caps[4].parse().unwrap_or(0),
        modifier,
        options: Vec::new(),
        range: line_range(line, line_no),
        name_range: match_range(line, line_no, name),
        type_range: match_range(line, line_no, type_match),
        number_range: match_range(line, line_no, caps.get(4).unwrap()),
        comments: Comments::default(),
    })
}

fn close_scope(
    file: &mut ProtoFile,
    stack: &mut [ScopeEntry],
    scope: Scope,
    line_no: u32,
    line: &str,
) {
    let end = Position::new(line_no, utf16_len(line));
    match scope {
        Scope::Message(mut msg) => {
            msg.range.end = end;
            match stack.last_mut().map(|e| &mut e.scope) {
                Some(Scope::Message(parent)) => parent.nested_messages.push(msg),
                _ => file.messages.push(msg),
            }
        }
        Scope::Enum(mut item) => {
            item.range.end = end;
            match stack.last_mut().map(|e| &mut e.scope) {
                Some(Scope::Message(parent)) => parent.nested_enums.push(item),
                _ => file.enums.push(item),
            }
        }
        Scope::Service(mut svc) => {
            svc.range.end = end;
            file.services.push(svc);
        }
        Scope::Oneof(mut oneof) => {
            oneof.range.end = end;
            if let Some(Scope::Message(parent)) = stack.last_mut().map(|e| &mut e.scope) {
                parent.oneofs.push(oneof);
            }
        }
    }
}

/// Counts braces outside of strings and line comments.
fn brace_delta(line: &str) -> (i32, i32) {
    let mut opens = 0;
    let mut closes = 0;
    let mut in_string: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match in_string {
            Some(quote) => {
                if ch == '\\' {
                    chars.next();
                } else if ch == quote {
                    in_string = None;
                }
            }
            None => match ch {
                '"' | '\'' => in_string = Some(ch),
                '/' if chars.peek() == Some(&'/') => break,
                '{' => opens += 1,
                '}' => closes += 1,
                _ => {}
            },
        }
    }
    (opens, closes)
}

fn utf16_len(line: &str) -> u32 {
    line.encode_utf16().count() as u32
}

fn line_range(line: &str, line_no: u32) -> Range {
    Range::new(Position::new(line_no, 0), Position::new(line_no, utf16_len(line)))
}

fn match_range(line: &str, line_no: u32, m: regex::Match<'_>) -> Range {
    let start = line[..m.start()].encode_utf16().count() as u32;
    let end = start + m.as_str().encode_utf16().count() as u32;
    Range::new(Position::new(line_no, start), Position::new(line_no, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recovers_outline_of_a_file() {
        let file = parse_outline(
            "file:///x.proto",
            r#"
syntax = "proto3";
package acme.v1;
import "other.proto";

message Order {
  string id = 1;
  map<string, int64> totals = 2;
  oneof payment {
    Card card = 3;
  }
  message Line {
    int32 quantity = 1;
  }
}

enum State {
  STATE_UNSPECIFIED = 0;
  OPEN = 1;
}

service Orders {
  rpc Get (GetRequest) returns (Order);
}
"#,
        );
        assert_eq!(file.package_name(), "acme.v1");
        assert_eq!(file.imports.len(), 1);
        let order = &file.messages[0];
        assert_eq!(order.name, "Order");
        assert_eq!(order.fields[0].name, "id");
        assert_eq!(order.maps[0].name, "totals");
        assert_eq!(order.oneofs[0].fields[0].name, "card");
        assert_eq!(order.nested_messages[0].name, "Line");
        assert_eq!(file.enums[0].values.len(), 2);
        assert_eq!(file.services[0].rpcs[0].name, "Get");
    }

    #[test]
    fn tolerates_unbalanced_braces() {
        let file = parse_outline(
            "file:///x.proto",
            "message A {\n  string x = 1;\nmessage B {\n  int32 y = 1;\n",
        );
        // Both shells survive, one nested in the other for want of a brace.
        assert_eq!(file.messages.len(), 1);
        assert_eq!(file.messages[0].name, "A");
    }

    #[test]
    fn brace_counting_skips_strings_and_comments() {
        assert_eq!(brace_delta("option x = \"{\"; // }"), (0, 0));
        assert_eq!(brace_delta("message M { // {"), (1, 0));
    }
}
