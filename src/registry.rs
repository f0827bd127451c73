//! Buf registry import recognition.
//!
//! Certain import prefixes conventionally come from registry modules rather
//! than from files in the workspace. When such an import is unresolved the
//! validator points at the module to depend on instead of piling an
//! unknown-type diagnostic on every identifier the missing file would have
//! provided.
//!
//! `google/protobuf/` deliberately does not count: those are the well-known
//! types, bundled as builtin stubs.

/// Import path prefixes that identify registry-provided files.
const REGISTRY_PREFIXES: &[&str] = &[
    "buf/",
    "google/api/",
    "google/rpc/",
    "google/type/",
    "envoy/",
    "validate/",
    "xds/",
];

/// Whether `path` looks like a Buf registry import.
pub fn is_registry_import(path: &str) -> bool {
    if path.starts_with("google/protobuf/") {
        return false;
    }
    REGISTRY_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// The canonical registry module that provides `path`, if recognised.
pub fn registry_module(path: &str) -> Option<&'static str> {
    if path.starts_with("buf/validate/") {
        Some("buf.build/bufbuild/protovalidate")
    } else if path.starts_with("google/api/")
        || path.starts_with("google/rpc/")
        || path.starts_with("google/type/")
    {
        Some("buf.build/googleapis/googleapis")
    } else if path.starts_with("envoy/") {
        Some("buf.build/envoyproxy/envoy")
    } else if path.starts_with("validate/") {
        Some("buf.build/envoyproxy/protoc-gen-validate")
    } else if path.starts_with("xds/") {
        Some("buf.build/cncf/xds")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_registry_prefixes() {
        assert!(is_registry_import("buf/validate/validate.proto"));
        assert!(is_registry_import("google/api/annotations.proto"));
        assert!(is_registry_import("envoy/config/route.proto"));
        assert!(is_registry_import("validate/validate.proto"));
        assert!(is_registry_import("xds/core/v3/authority.proto"));
    }

    #[test]
    fn well_known_types_are_not_registry_imports() {
        assert!(!is_registry_import("google/protobuf/timestamp.proto"));
        assert!(!is_registry_import("acme/user.proto"));
    }

    #[test]
    fn maps_prefixes_to_modules() {
        assert_eq!(
            registry_module("buf/validate/validate.proto"),
            Some("buf.build/bufbuild/protovalidate"),
        );
        assert_eq!(
            registry_module("google/rpc/code.proto"),
            Some("buf.build/googleapis/googleapis"),
        );
        assert_eq!(registry_module("something/else.proto"), None);
    }
}
