//! Symbols and locations.

use std::fmt;

use protonav_parse::ast::Range;

/// What a symbol declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Message,
    Enum,
    EnumValue,
    Field,
    Oneof,
    Service,
    Rpc,
}

impl SymbolKind {
    /// Whether the symbol names a type that fields and RPC signatures can
    /// reference.
    pub fn is_type(&self) -> bool {
        matches!(self, SymbolKind::Message | SymbolKind::Enum)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumValue => "enum value",
            SymbolKind::Field => "field",
            SymbolKind::Oneof => "oneof",
            SymbolKind::Service => "service",
            SymbolKind::Rpc => "rpc",
        };
        f.write_str(text)
    }
}

/// A place in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

/// One entry of the workspace symbol table.
///
/// `location.range` spans the defining identifier, so jumping to a symbol
/// lands on its name rather than at the start of the declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    /// Simple name.
    pub name: String,
    /// Fully-qualified dotted name, without a leading dot.
    pub full_name: String,
    pub kind: SymbolKind,
    pub location: Location,
    /// Fully-qualified name of the containing scope, if any.
    pub container_name: Option<String>,
    /// The declaration's leading comment, if any.
    pub documentation: Option<String>,
}
