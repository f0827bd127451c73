//! The completion context classifier.
//!
//! For each request the classifier picks at most one dominant context,
//! checked in a fixed order: CEL expression, import path, type, field name,
//! field number, enum value number, option key, keyword. Every emitted item
//! carries a `text_edit` that replaces exactly the prefix the user typed,
//! so accepting a candidate never duplicates its first letters, and a
//! `filter_text` holding both the simple and the fully-qualified name so
//! fuzzy matching works from either angle.

mod cel;
pub mod container;
mod options;
mod paths;
mod types;

pub use container::next_field_number;

use protonav_parse::ast::{Position, Range};

use crate::error::Error;
use crate::workspace::Workspace;

use container::{ContainerContext, ContainerKind};
use types::FieldLine;

/// A completion query.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub uri: String,
    /// Cursor position, UTF-16 columns.
    pub position: Position,
    /// The text of the cursor line up to the cursor.
    pub line_before_cursor: String,
    /// The whole document, when the caller has it. Container-dependent
    /// contexts (numbers, CEL fields) need it; the rest degrade gracefully.
    pub full_document: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionItemKind {
    Class,
    Enum,
    EnumMember,
    Field,
    File,
    Function,
    Keyword,
    Property,
    Snippet,
    Value,
}

/// An edit replacing the user-typed prefix with the accepted candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionItemKind,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    pub insert_text: Option<String>,
    pub text_edit: Option<TextEdit>,
    /// Keeps the preferred bucket first under client-side sorting.
    pub sort_text: Option<String>,
    pub filter_text: Option<String>,
    /// Rendered dimmed after the label, e.g. the qualifier of a qualified
    /// candidate.
    pub label_description: Option<String>,
}

/// The range covering the `prefix` immediately before `position`.
fn edit_range_for(position: Position, prefix: &str) -> Range {
    let units = prefix.encode_utf16().count() as u32;
    Range::new(
        Position::new(position.line, position.character.saturating_sub(units)),
        position,
    )
}

/// Computes completion candidates for a request.
///
/// Errors only on contract violations: an empty URI, or a position past the
/// end of the supplied document.
pub fn complete(
    workspace: &Workspace,
    request: &CompletionRequest,
) -> Result<Vec<CompletionItem>, Error> {
    if request.uri.is_empty() {
        return Err(Error::invalid_argument("uri must not be empty"));
    }
    if let Some(document) = request.full_document.as_deref() {
        let lines = document.split('\n').count() as u32;
        if request.position.line >= lines {
            return Err(Error::invalid_argument(format!(
                "position line {} is past the end of the document",
                request.position.line,
            )));
        }
    }

    if let Some(items) = cel::detect(workspace, request) {
        return Ok(items);
    }
    if let Some(items) = paths::detect(workspace, request) {
        return Ok(items);
    }

    let container = request
        .full_document
        .as_deref()
        .and_then(|doc| container::detect_container(doc, request.position));

    match container.as_ref().map(|c| c.kind) {
        Some(ContainerKind::Enum) => {
            if let Some(items) = enum_value_items(request, container.as_ref().unwrap()) {
                return Ok(items);
            }
        }
        Some(ContainerKind::Message) | None => {
            if let Some(items) = field_line_items(workspace, request, container.as_ref()) {
                return Ok(items);
            }
        }
        Some(ContainerKind::Service) => {}
    }

    if let Some(items) = options::detect(request, container.as_ref()) {
        return Ok(items);
    }
    Ok(keyword_items(request, container.as_ref()))
}

fn field_line_items(
    workspace: &Workspace,
    request: &CompletionRequest,
    container: Option<&ContainerContext>,
) -> Option<Vec<CompletionItem>> {
    // Option lines are not field lines; let the option context have them.
    let trimmed = request.line_before_cursor.trim_start();
    if trimmed.starts_with("option") && !trimmed.starts_with("optional") {
        return None;
    }
    if request.line_before_cursor.matches('[').count()
        > request.line_before_cursor.matches(']').count()
    {
        return None;
    }
    // Outside any container only declarations make sense, not fields.
    let in_message = matches!(container.map(|c| c.kind), Some(ContainerKind::Message));
    match types::classify_field_line(&request.line_before_cursor)? {
        FieldLine::Type { prefix } => {
            if !in_message && container.is_some() {
                return None;
            }
            if !in_message && prefix.is_empty() {
                return None;
            }
            Some(types::type_items(workspace, request, prefix))
        }
        FieldLine::Name { field_type, prefix } if in_message => {
            let items = types::field_name_items(request, field_type);
            if prefix.is_empty() {
                Some(items)
            } else {
                Some(
                    items
                        .into_iter()
                        .filter(|item| item.label.starts_with(prefix))
                        .collect(),
                )
            }
        }
        FieldLine::Number if in_message => {
            let next = container?.next_field_number();
            Some(number_items(request, next, true))
        }
        FieldLine::NumberAfterEquals if in_message => {
            let next = container?.next_field_number();
            Some(number_items(request, next, false))
        }
        _ => None,
    }
}

/// Number candidates: the bare number and a terminated snippet; with
/// `with_equals` the snippet carries the `= ` the user has not typed yet.
fn number_items(request: &CompletionRequest, next: i64, with_equals: bool) -> Vec<CompletionItem> {
    let edit_range = edit_range_for(request.position, "");
    let (bare, snippet) = if with_equals {
        (format!("{next}"), format!("= {next};"))
    } else {
        (format!("{next}"), format!("{next};"))
    };
    vec![
        CompletionItem {
            label: snippet.clone(),
            kind: CompletionItemKind::Snippet,
            detail: Some("next available field number".to_string()),
            documentation: None,
            insert_text: Some(snippet.clone()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: snippet.clone(),
            }),
            sort_text: Some(format!("0_{snippet}")),
            filter_text: Some(snippet),
            label_description: None,
        },
        CompletionItem {
            label: bare.clone(),
            kind: CompletionItemKind::Value,
            detail: Some("next available field number".to_string()),
            documentation: None,
            insert_text: Some(bare.clone()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: bare.clone(),
            }),
            sort_text: Some(format!("1_{bare}")),
            filter_text: Some(bare),
            label_description: None,
        },
    ]
}

fn enum_value_items(
    request: &CompletionRequest,
    container: &ContainerContext,
) -> Option<Vec<CompletionItem>> {
    let trimmed = request.line_before_cursor.trim_start();
    if trimmed.starts_with("option") || trimmed.starts_with("reserved") {
        return None;
    }
    let next = container.next_enum_number();
    let stripped = trimmed.trim_end();
    if stripped.ends_with('=') {
        return Some(number_items(request, next, false));
    }
    // A value name followed by whitespace, awaiting its number.
    let mut words = trimmed.split_whitespace();
    match (words.next(), words.next()) {
        (Some(_), None) if request.line_before_cursor.ends_with(char::is_whitespace) => {
            Some(number_items(request, next, true))
        }
        _ => None,
    }
}

fn keyword_items(
    request: &CompletionRequest,
    container: Option<&ContainerContext>,
) -> Vec<CompletionItem> {
    let line = &request.line_before_cursor;
    let trimmed = line.trim_start();
    let mut keywords: Vec<&str> = Vec::new();
    // `stream` inside an rpc signature's parentheses.
    if line.matches('(').count() > line.matches(')').count() && trimmed.starts_with("rpc")
        || trimmed.ends_with("returns (")
    {
        keywords.push("stream");
    } else if matches!(container.map(|c| c.kind), Some(ContainerKind::Message)) {
        keywords.extend(["optional", "required", "repeated"]);
    }
    let prefix = trailing_word(line);
    let edit_range = edit_range_for(request.position, prefix);
    keywords
        .into_iter()
        .map(|keyword| CompletionItem {
            label: keyword.to_string(),
            kind: CompletionItemKind::Keyword,
            detail: None,
            documentation: None,
            insert_text: Some(keyword.to_string()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: keyword.to_string(),
            }),
            sort_text: Some(format!("0_{keyword}")),
            filter_text: Some(keyword.to_string()),
            label_description: None,
        })
        .collect()
}

fn trailing_word(line: &str) -> &str {
    let boundary = line
        .rfind(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    &line[boundary..]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn add(ws: &mut Workspace, uri: &str, text: &str) {
        ws.update_file(uri, protonav_parse::parse(uri, text)).unwrap();
    }

    fn request_at(document: &str, line: u32, line_text: &str) -> CompletionRequest {
        CompletionRequest {
            uri: "file:///w/main.proto".to_string(),
            position: Position::new(line, line_text.encode_utf16().count() as u32),
            line_before_cursor: line_text.to_string(),
            full_document: Some(document.to_string()),
        }
    }

    #[test]
    fn empty_uri_is_invalid() {
        let ws = Workspace::new();
        let request = CompletionRequest {
            uri: String::new(),
            position: Position::new(0, 0),
            line_before_cursor: String::new(),
            full_document: None,
        };
        assert_eq!(
            complete(&ws, &request).unwrap_err().kind(),
            ErrorKind::InvalidArgument,
        );
    }

    #[test]
    fn position_past_document_is_invalid() {
        let ws = Workspace::new();
        let request = CompletionRequest {
            uri: "file:///w/a.proto".to_string(),
            position: Position::new(99, 0),
            line_before_cursor: String::new(),
            full_document: Some("syntax = \"proto3\";".to_string()),
        };
        assert!(complete(&ws, &request).is_err());
    }

    #[test]
    fn qualified_type_completion_lists_children_only() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nimport \"google/protobuf/timestamp.proto\";\nmessage M {\n  google.protobuf.\n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 3, "  google.protobuf.");
        let items = complete(&ws, &request).unwrap();
        let timestamp = items
            .iter()
            .find(|item| item.label == "Timestamp")
            .expect("Timestamp candidate");
        assert_eq!(timestamp.label_description.as_deref(), Some("google.protobuf"));
        assert_eq!(
            timestamp.filter_text.as_deref(),
            Some("google.protobuf.Timestamp"),
        );
        // Only children of the qualifier appear.
        assert!(items.iter().all(|item| !item.label.contains('.')));
        assert!(items.iter().all(|item| item
            .detail
            .as_deref()
            .map_or(true, |d| d.starts_with("google.")),));
        // The text edit replaces only the typed partial, which is empty.
        assert_eq!(
            timestamp.text_edit.as_ref().unwrap().range,
            Range::new(Position::new(3, 18), Position::new(3, 18)),
        );
    }

    #[test]
    fn unqualified_type_completion_has_scalars_first() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nmessage Other {}\nmessage M {\n  \n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 3, "  ");
        let items = complete(&ws, &request).unwrap();
        assert!(items.iter().any(|i| i.label == "string"));
        assert!(items.iter().any(|i| i.label == "Other"));
        let string_sort = items
            .iter()
            .find(|i| i.label == "string")
            .and_then(|i| i.sort_text.clone())
            .unwrap();
        let other_sort = items
            .iter()
            .find(|i| i.label == "Other")
            .and_then(|i| i.sort_text.clone())
            .unwrap();
        assert!(string_sort < other_sort);
    }

    #[test]
    fn type_prefix_edit_replaces_typed_letters() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nmessage M {\n  stri\n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 2, "  stri");
        let items = complete(&ws, &request).unwrap();
        let string_item = items.iter().find(|i| i.label == "string").unwrap();
        let edit = string_item.text_edit.as_ref().unwrap();
        assert_eq!(edit.range, Range::new(Position::new(2, 2), Position::new(2, 6)));
        assert_eq!(edit.new_text, "string");
    }

    #[test]
    fn field_name_suggestions_follow_the_type() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nimport \"google/protobuf/timestamp.proto\";\nmessage M {\n  google.protobuf.Timestamp \n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 3, "  google.protobuf.Timestamp ");
        let items = complete(&ws, &request).unwrap();
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"created_at"));
        assert!(items.len() <= 5);
    }

    #[test]
    fn field_number_after_name() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nmessage M {\n  string a = 1;\n  reserved 2, 3;\n  int32 count \n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 4, "  int32 count ");
        let items = complete(&ws, &request).unwrap();
        assert_eq!(items[0].label, "= 4;");
        assert_eq!(items[1].label, "4");
    }

    #[test]
    fn field_number_after_equals() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nmessage M {\n  string a = 1;\n  int32 count = \n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 3, "  int32 count = ");
        let items = complete(&ws, &request).unwrap();
        assert_eq!(items[0].label, "2;");
        assert_eq!(items[1].label, "2");
    }

    #[test]
    fn enum_value_number() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nenum E {\n  E_UNSPECIFIED = 0;\n  E_ACTIVE \n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 3, "  E_ACTIVE ");
        let items = complete(&ws, &request).unwrap();
        assert_eq!(items[0].label, "= 1;");
    }

    #[test]
    fn import_path_completion_offers_wkt_and_workspace_files() {
        let mut ws = Workspace::new();
        add(&mut ws, "file:///w/common.proto", "syntax = \"proto3\";");
        let doc = "syntax = \"proto3\";\nimport \"\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 1, "import \"");
        let items = complete(&ws, &request).unwrap();
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"google/protobuf/timestamp.proto"));
        assert!(labels.contains(&"common.proto"));
    }

    #[test]
    fn cel_expression_completion() {
        let mut ws = Workspace::new();
        let doc = concat!(
            "syntax = \"proto3\";\n",
            "import \"buf/validate/validate.proto\";\n",
            "message User {\n",
            "  string email = 1;\n",
            "  option (buf.validate.message).cel = {\n",
            "    id: \"user.email\"\n",
            "    expression: \"\n",
            "  };\n",
            "}\n",
        );
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 6, "    expression: \"");
        let items = complete(&ws, &request).unwrap();
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"this"));
        assert!(labels.contains(&"has"));
        assert!(labels.contains(&"matches"));
    }

    #[test]
    fn cel_this_dot_lists_message_fields() {
        let mut ws = Workspace::new();
        let doc = concat!(
            "syntax = \"proto3\";\n",
            "message User {\n",
            "  string email = 1;\n",
            "  int32 age = 2;\n",
            "  option (buf.validate.message).cel = {\n",
            "    expression: \"this.\n",
            "  };\n",
            "}\n",
        );
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 5, "    expression: \"this.");
        let items = complete(&ws, &request).unwrap();
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"email"));
        assert!(labels.contains(&"age"));
    }

    #[test]
    fn stream_keyword_inside_rpc_parens() {
        let mut ws = Workspace::new();
        let doc = "syntax = \"proto3\";\nservice S {\n  rpc Watch (\n}\n";
        add(&mut ws, "file:///w/main.proto", doc);
        let request = request_at(doc, 2, "  rpc Watch (");
        let items = complete(&ws, &request).unwrap();
        assert!(items.iter().any(|i| i.label == "stream"));
    }
}
