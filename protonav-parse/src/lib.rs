#![doc(html_root_url = "https://docs.rs/protonav-parse/0.3.1")]

//! Error-tolerant parsing of Protocol Buffers source text.
//!
//! `protonav-parse` turns UTF-8 `.proto` text into the typed source model in
//! [`ast`], with precise UTF-16 ranges and attached comments. Parsing never
//! fails: malformed input produces a best-effort tree with
//! [`ast::ParseNote`]s describing what went wrong.
//!
//! ```
//! let file = protonav_parse::parse(
//!     "file:///demo.proto",
//!     "syntax = \"proto3\";\nmessage Ping { int64 at = 1; }",
//! );
//! assert_eq!(file.messages[0].name, "Ping");
//! assert!(file.notes.is_empty());
//! ```
//!
//! Two backends implement the same contract: the recursive-descent
//! [`DescentParser`] (preferred, full fidelity) and the line-oriented
//! [`OutlineParser`] (coarse, crash-proof). [`ParserSelector`] prefers the
//! first and falls back to the second; a backend failure never surfaces to
//! the caller.

use std::panic::{self, AssertUnwindSafe};

use log::warn;

pub mod ast;
mod lexer;
mod outline;
mod parser;

pub use lexer::{integer_value, tokenize, Token, TokenKind};

use ast::{ParseNote, ProtoFile, Range};

/// A parser backend: text in, best-effort tree out.
///
/// Implementations must not return errors; anything unparseable is reported
/// through notes on the returned tree. Panics are tolerated by the
/// selector, not by direct callers.
pub trait ParseBackend {
    fn name(&self) -> &'static str;

    fn parse(&self, uri: &str, text: &str) -> ProtoFile;
}

/// The recursive-descent backend. Full grammar surface, comment
/// attachment, recovery at statement boundaries.
#[derive(Debug, Default)]
pub struct DescentParser;

impl ParseBackend for DescentParser {
    fn name(&self) -> &'static str {
        "descent"
    }

    fn parse(&self, uri: &str, text: &str) -> ProtoFile {
        parser::parse_text(uri, text)
    }
}

/// The line-oriented backend. Declaration outline only.
#[derive(Debug, Default)]
pub struct OutlineParser;

impl ParseBackend for OutlineParser {
    fn name(&self) -> &'static str {
        "outline"
    }

    fn parse(&self, uri: &str, text: &str) -> ProtoFile {
        outline::parse_outline(uri, text)
    }
}

/// Counters for one backend of a [`ParserSelector`].
#[derive(Debug, Default, Clone)]
pub struct BackendStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Runs the preferred backend and falls back on failure.
///
/// A panic in the preferred backend is recorded in its stats and the
/// fallback's result is returned instead. If both backends fail the result
/// is an empty tree carrying a single parse note, so the caller always gets
/// a usable [`ProtoFile`].
pub struct ParserSelector {
    preferred: Box<dyn ParseBackend>,
    fallback: Box<dyn ParseBackend>,
    preferred_stats: BackendStats,
    fallback_stats: BackendStats,
}

impl Default for ParserSelector {
    fn default() -> Self {
        ParserSelector::new()
    }
}

impl ParserSelector {
    pub fn new() -> ParserSelector {
        ParserSelector::with_backends(Box::new(DescentParser), Box::new(OutlineParser))
    }

    pub fn with_backends(
        preferred: Box<dyn ParseBackend>,
        fallback: Box<dyn ParseBackend>,
    ) -> ParserSelector {
        ParserSelector {
            preferred,
            fallback,
            preferred_stats: BackendStats::default(),
            fallback_stats: BackendStats::default(),
        }
    }

    pub fn parse(&mut self, uri: &str, text: &str) -> ProtoFile {
        if let Some(file) = attempt(&*self.preferred, &mut self.preferred_stats, uri, text) {
            return file;
        }
        if let Some(file) = attempt(&*self.fallback, &mut self.fallback_stats, uri, text) {
            return file;
        }
        let mut file = ProtoFile::empty(uri);
        file.notes.push(ParseNote {
            message: "internal parser failure".to_string(),
            range: Range::default(),
        });
        file
    }

    /// Statistics for the (preferred, fallback) backends, in that order.
    pub fn stats(&self) -> (&BackendStats, &BackendStats) {
        (&self.preferred_stats, &self.fallback_stats)
    }
}

fn attempt(
    backend: &dyn ParseBackend,
    stats: &mut BackendStats,
    uri: &str,
    text: &str,
) -> Option<ProtoFile> {
    stats.attempts += 1;
    match panic::catch_unwind(AssertUnwindSafe(|| backend.parse(uri, text))) {
        Ok(file) => {
            stats.successes += 1;
            Some(file)
        }
        Err(payload) => {
            let message = panic_message(payload);
            warn!("parser backend '{}' failed on {uri}: {message}", backend.name());
            stats.failures += 1;
            stats.last_error = Some(message);
            None
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Parses `text` with the default backends, falling back on failure.
///
/// Stateless convenience for callers that don't track statistics.
pub fn parse(uri: &str, text: &str) -> ProtoFile {
    let descent = DescentParser;
    match panic::catch_unwind(AssertUnwindSafe(|| descent.parse(uri, text))) {
        Ok(file) => file,
        Err(_) => OutlineParser.parse(uri, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingBackend;

    impl ParseBackend for PanickingBackend {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn parse(&self, _uri: &str, _text: &str) -> ProtoFile {
            panic!("boom");
        }
    }

    #[test]
    fn selector_prefers_the_descent_backend() {
        let mut selector = ParserSelector::new();
        let file = selector.parse("file:///a.proto", "message M { int32 a = 1; }");
        assert_eq!(file.messages[0].fields.len(), 1);
        let (preferred, fallback) = selector.stats();
        assert_eq!(preferred.successes, 1);
        assert_eq!(fallback.attempts, 0);
    }

    #[test]
    fn selector_falls_back_on_panic() {
        let mut selector = ParserSelector::with_backends(
            Box::new(PanickingBackend),
            Box::new(OutlineParser),
        );
        let file = selector.parse("file:///a.proto", "message M { int32 a = 1; }");
        assert_eq!(file.messages.len(), 1);
        let (preferred, fallback) = selector.stats();
        assert_eq!(preferred.failures, 1);
        assert_eq!(preferred.last_error.as_deref(), Some("boom"));
        assert_eq!(fallback.successes, 1);
    }

    #[test]
    fn both_backends_failing_yields_an_empty_tree() {
        let mut selector = ParserSelector::with_backends(
            Box::new(PanickingBackend),
            Box::new(PanickingBackend),
        );
        let file = selector.parse("file:///a.proto", "message M {}");
        assert!(file.messages.is_empty());
        assert_eq!(file.notes.len(), 1);
    }
}
