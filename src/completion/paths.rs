//! Import path completion.
//!
//! Offers the bundled well-known paths and every workspace file, each under
//! its canonical computed import path and its basename, canonical first.

use itertools::Itertools;

use crate::uri::{basename, normalize_uri, uri_path};
use crate::workspace::Workspace;

use super::{CompletionItem, CompletionItemKind, CompletionRequest, TextEdit};
use protonav_parse::ast::{Position, Range};

pub(super) fn detect(
    workspace: &Workspace,
    request: &CompletionRequest,
) -> Option<Vec<CompletionItem>> {
    let line = &request.line_before_cursor;
    let quote = line.find("import").and_then(|idx| {
        line[idx..]
            .find(|ch| ch == '"' || ch == '\'')
            .map(|offset| idx + offset)
    })?;
    // Cursor must be inside the quoted path.
    let typed = &line[quote + 1..];
    if typed.contains('"') || typed.contains('\'') {
        return None;
    }

    let typed_units = typed.encode_utf16().count() as u32;
    let edit_range = Range::new(
        Position::new(
            request.position.line,
            request.position.character.saturating_sub(typed_units),
        ),
        request.position,
    );

    let current = normalize_uri(&request.uri);
    let mut items = Vec::new();
    let mut offer = |path: String, canonical: bool, detail: String| {
        items.push(CompletionItem {
            label: path.clone(),
            kind: CompletionItemKind::File,
            detail: Some(detail),
            documentation: None,
            insert_text: Some(path.clone()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: path.clone(),
            }),
            sort_text: Some(format!("{}_{path}", if canonical { "0" } else { "1" })),
            filter_text: Some(path),
            label_description: None,
        });
    };

    for (path, _) in protonav_wkt::STUBS {
        offer((*path).to_string(), true, "well-known".to_string());
    }
    for file in workspace.files() {
        if file.uri == current || protonav_wkt::is_builtin_uri(&file.uri) {
            continue;
        }
        let base = basename(uri_path(&file.uri)).to_string();
        match workspace.import_path_for_file(&current, &file.uri) {
            Some(canonical) => {
                let differs = canonical != base;
                offer(canonical, true, file.uri.clone());
                if differs {
                    offer(base, false, file.uri.clone());
                }
            }
            None => offer(base, false, file.uri.clone()),
        }
    }

    let items = items
        .into_iter()
        .unique_by(|item| item.label.clone())
        .sorted_by(|a, b| a.sort_text.cmp(&b.sort_text))
        .collect();
    Some(items)
}
