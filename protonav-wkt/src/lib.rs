#![doc(html_root_url = "https://docs.rs/protonav-wkt/0.3.1")]

//! Bundled well-known type stubs.
//!
//! A compiled-in corpus of the canonical Google `.proto` files that nearly
//! every workspace imports without owning a copy: the
//! `google/protobuf/*.proto` well-known types plus the most common
//! `google/rpc`, `google/type` and `google/api` files. The workspace engine
//! registers these under `builtin:///…` URIs at startup so that
//! `import "google/protobuf/timestamp.proto";` resolves with zero
//! configuration.
//!
//! The stubs are trimmed to the declarations and doc comments that language
//! queries need; they are not suitable for code generation.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// The URI scheme under which stubs are registered.
pub const BUILTIN_SCHEME: &str = "builtin";

/// Every bundled stub as `(import path, source text)`.
pub const STUBS: &[(&str, &str)] = &[
    (
        "google/protobuf/timestamp.proto",
        include_str!("../proto/google/protobuf/timestamp.proto"),
    ),
    (
        "google/protobuf/duration.proto",
        include_str!("../proto/google/protobuf/duration.proto"),
    ),
    (
        "google/protobuf/any.proto",
        include_str!("../proto/google/protobuf/any.proto"),
    ),
    (
        "google/protobuf/empty.proto",
        include_str!("../proto/google/protobuf/empty.proto"),
    ),
    (
        "google/protobuf/field_mask.proto",
        include_str!("../proto/google/protobuf/field_mask.proto"),
    ),
    (
        "google/protobuf/struct.proto",
        include_str!("../proto/google/protobuf/struct.proto"),
    ),
    (
        "google/protobuf/wrappers.proto",
        include_str!("../proto/google/protobuf/wrappers.proto"),
    ),
    (
        "google/protobuf/descriptor.proto",
        include_str!("../proto/google/protobuf/descriptor.proto"),
    ),
    (
        "google/protobuf/source_context.proto",
        include_str!("../proto/google/protobuf/source_context.proto"),
    ),
    (
        "google/protobuf/type.proto",
        include_str!("../proto/google/protobuf/type.proto"),
    ),
    (
        "google/rpc/status.proto",
        include_str!("../proto/google/rpc/status.proto"),
    ),
    (
        "google/rpc/code.proto",
        include_str!("../proto/google/rpc/code.proto"),
    ),
    (
        "google/rpc/error_details.proto",
        include_str!("../proto/google/rpc/error_details.proto"),
    ),
    (
        "google/type/date.proto",
        include_str!("../proto/google/type/date.proto"),
    ),
    (
        "google/type/money.proto",
        include_str!("../proto/google/type/money.proto"),
    ),
    (
        "google/type/latlng.proto",
        include_str!("../proto/google/type/latlng.proto"),
    ),
    (
        "google/type/timeofday.proto",
        include_str!("../proto/google/type/timeofday.proto"),
    ),
    (
        "google/api/http.proto",
        include_str!("../proto/google/api/http.proto"),
    ),
    (
        "google/api/annotations.proto",
        include_str!("../proto/google/api/annotations.proto"),
    ),
    (
        "google/api/field_behavior.proto",
        include_str!("../proto/google/api/field_behavior.proto"),
    ),
];

static BY_PATH: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| STUBS.iter().copied().collect());

/// The `builtin:///…` URI a stub is registered under.
pub fn builtin_uri(path: &str) -> String {
    format!("builtin:///{path}")
}

pub fn is_builtin_uri(uri: &str) -> bool {
    uri.starts_with("builtin:///")
}

/// The import path behind a `builtin:///…` URI.
pub fn builtin_path(uri: &str) -> Option<&str> {
    uri.strip_prefix("builtin:///")
}

/// The stub source for an import path, if one is bundled.
pub fn stub_source(path: &str) -> Option<&'static str> {
    BY_PATH.get(path).copied()
}

/// Whether `path` belongs to the well-known `google.protobuf` corpus.
///
/// Note this is about the canonical namespace, not about whether a stub is
/// bundled: `google/api` files are bundled but come from the Buf registry,
/// not from protobuf itself.
pub fn is_well_known(path: &str) -> bool {
    path.starts_with("google/protobuf/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timestamp_is_bundled() {
        let source = stub_source("google/protobuf/timestamp.proto").unwrap();
        assert!(source.contains("message Timestamp"));
        assert!(source.contains("package google.protobuf;"));
    }

    #[test]
    fn uris_round_trip() {
        let uri = builtin_uri("google/rpc/status.proto");
        assert_eq!(uri, "builtin:///google/rpc/status.proto");
        assert!(is_builtin_uri(&uri));
        assert_eq!(builtin_path(&uri), Some("google/rpc/status.proto"));
    }

    #[test]
    fn stub_paths_are_unique() {
        let mut paths: Vec<&str> = STUBS.iter().map(|(path, _)| *path).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), STUBS.len());
    }

    #[test]
    fn well_known_excludes_registry_namespaces() {
        assert!(is_well_known("google/protobuf/any.proto"));
        assert!(!is_well_known("google/api/http.proto"));
        assert!(!is_well_known("buf/validate/validate.proto"));
    }
}
