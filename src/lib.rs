#![doc(html_root_url = "https://docs.rs/protonav/0.3.1")]

//! `protonav` is the semantic workspace core of a Protocol Buffers
//! language server.
//!
//! The engine parses `.proto` sources (via [`protonav_parse`]), maintains a
//! cross-file symbol index, resolves imports under the conventions real
//! workspaces use, resolves type references by protobuf's scoped-name
//! rules, validates files into ranged diagnostics, and classifies cursor
//! contexts for completion. Transport, file watching and UI concerns live
//! in the editor adapter on top; nothing here does I/O.
//!
//! ## Example
//!
//! ```
//! use protonav::{diagnostics, Workspace};
//!
//! let mut workspace = Workspace::new();
//! let uri = "file:///demo/event.proto";
//! let source = r#"
//! syntax = "proto3";
//! package demo.v1;
//!
//! import "google/protobuf/timestamp.proto";
//!
//! message Event {
//!   string id = 1;
//!   google.protobuf.Timestamp at = 2;
//! }
//! "#;
//! workspace
//!     .update_file(uri, protonav_parse::parse(uri, source))
//!     .unwrap();
//!
//! let at = workspace
//!     .resolve_type("google.protobuf.Timestamp", uri, Some("demo.v1"))
//!     .unwrap();
//! assert_eq!(at.full_name, "google.protobuf.Timestamp");
//! assert!(diagnostics::check_file(&workspace, uri).is_empty());
//! ```
//!
//! The workspace is single-threaded by design: mutations
//! ([`Workspace::update_file`] and friends) run to completion before the
//! next query, and queries observe exactly the state the last mutation
//! left behind. Callers that want parallel parsing finish their parses
//! first and feed the trees in sequentially, or wrap the workspace in a
//! reader/writer discipline of their own.

pub mod completion;
pub mod diagnostics;
mod error;
mod imports;
mod registry;
mod symbol;
mod typeres;
mod uri;
mod workspace;

pub use crate::completion::{
    complete, next_field_number, CompletionItem, CompletionItemKind, CompletionRequest, TextEdit,
};
pub use crate::diagnostics::{check_file, Diagnostic, DiagnosticKind, Severity};
pub use crate::error::{Error, ErrorKind};
pub use crate::registry::{is_registry_import, registry_module};
pub use crate::symbol::{Location, SymbolInfo, SymbolKind};
pub use crate::uri::normalize_uri;
pub use crate::workspace::{
    ConfigOracle, ImportResolution, PathMapping, Workspace,
};

// The parse crate is part of the public contract: `Workspace::update_file`
// consumes its trees.
pub use protonav_parse::ast;
