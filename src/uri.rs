//! URI and path helpers.
//!
//! Documents are identified by opaque URI strings in two schemes:
//! `file://…` for disk files and `builtin:///…` for the bundled well-known
//! stubs. All comparisons happen on forward-slash-normalised paths; paths
//! inside `file://` URIs are taken literally, with no percent-decoding.

/// Normalises a URI for use as a map key: backslashes become forward
/// slashes.
pub fn normalize_uri(uri: &str) -> String {
    uri.replace('\\', "/")
}

/// The comparable path behind a URI: `file:///w/a.proto` → `/w/a.proto`,
/// `builtin:///google/x.proto` → `google/x.proto`. Unknown schemes pass
/// through untouched.
pub fn uri_path(uri: &str) -> &str {
    if let Some(path) = uri.strip_prefix("builtin:///") {
        path
    } else if let Some(path) = uri.strip_prefix("file://") {
        path
    } else {
        uri
    }
}

/// Everything before the final `/`, or the empty string.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Everything after the final `/`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join_path(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), rel)
    }
}

/// Lexically resolves `.` and `..` segments.
pub fn canonicalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() && !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// The forward-only relative path from `dir` to `path`, if `path` lies
/// beneath `dir`.
pub fn forward_relative(dir: &str, path: &str) -> Option<String> {
    let dir = dir.trim_end_matches('/');
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

/// The relative path from `dir` to `path`, using `..` segments where the
/// target is not beneath `dir`.
pub fn traversal_relative(dir: &str, path: &str) -> String {
    let dir_segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let common = dir_segments
        .iter()
        .zip(path_segments.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut segments: Vec<&str> = Vec::new();
    for _ in common..dir_segments.len() {
        segments.push("..");
    }
    segments.extend(&path_segments[common..]);
    segments.join("/")
}
