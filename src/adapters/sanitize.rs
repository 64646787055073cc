//! Log sanitization utilities for PII/secret filtering.
//!
//! String-based redaction applied to formatted log output:
//! - Applicant emails and application/record UUIDs
//! - Session bearer tokens and JWT-shaped strings
//! - Hex-encoded key material and contextual `key=...` secrets
//! - PEM private/public key blocks
//!
//! The primary protection is that sensitive values never reach logging calls
//! in the first place (errors name fields, key types redact their Debug
//! output). This writer is defense in depth for anything that slips through.
//!
//! `sanitize()` caps the bytes it will scan per call
//! (`CLASSGLASS_SANITIZE_MAX_BYTES`, default 16 KiB) so a maliciously large
//! log line cannot turn redaction into a CPU sink.

use std::sync::OnceLock;

use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

/// Default maximum number of bytes sanitized per call.
const DEFAULT_MAX_BYTES: usize = 16 * 1024;

/// A compiled redaction rule.
struct Rule {
    regex: Regex,
    replacement: &'static str,
}

static RULES: OnceLock<Vec<Rule>> = OnceLock::new();

fn rules() -> &'static [Rule] {
    RULES.get_or_init(|| {
        // The regex crate is linear-time, so these stay cheap even on
        // hostile input; the size cap bounds total work.
        let table: &[(&str, &str)] = &[
            // Application / record identifiers
            (
                r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                "[REDACTED-UUID]",
            ),
            // Applicant email addresses
            (
                r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            // JWT-shaped bearer tokens
            (
                r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b",
                "[REDACTED-JWT]",
            ),
            // Contextual secrets: key = <base64 or hex blob>
            (
                r"(?i)\b(?:session[_-]?token|api[_-]?key|secret|password|passphrase|token|key)\b\s*[:=]\s*[A-Za-z0-9+/_-]{24,}={0,2}",
                "[REDACTED-SECRET]",
            ),
            // Bare hex key material
            (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]"),
            // Bare base64url session tokens (32 bytes encode to 43 chars)
            (r"\b[A-Za-z0-9_-]{43,}\b", "[REDACTED-TOKEN]"),
            // PEM blocks
            (
                r"(?s)-----BEGIN [A-Z0-9 ]{0,40}KEY-----[\s\S]{0,8192}-----END [A-Z0-9 ]{0,40}KEY-----",
                "[REDACTED-PEM]",
            ),
        ];

        table
            .iter()
            .map(|(pattern, replacement)| Rule {
                regex: Regex::new(pattern).expect("Valid redaction regex"),
                replacement,
            })
            .collect()
    })
}

fn max_bytes() -> usize {
    std::env::var("CLASSGLASS_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_MAX_BYTES)
}

fn truncate_to_char_boundary(input: &str, cap: usize) -> (&str, bool) {
    if input.len() <= cap {
        return (input, false);
    }
    let mut end = cap;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Redact PII and secret patterns from a string.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_bytes())
}

fn sanitize_with_limit(input: &str, cap: usize) -> String {
    let (prefix, truncated) = truncate_to_char_boundary(input, cap);

    let mut out = prefix.to_string();
    for rule in rules() {
        if rule.regex.is_match(&out) {
            out = rule.regex.replace_all(&out, rule.replacement).to_string();
        }
    }

    if truncated {
        out.push_str(" [TRUNCATED]");
    }
    out
}

/// Check whether a string matches any redaction rule.
#[must_use]
pub fn contains_pii(input: &str) -> bool {
    let (prefix, _) = truncate_to_char_boundary(input, max_bytes());
    rules().iter().any(|rule| rule.regex.is_match(prefix))
}

/// A `tracing_subscriber` writer wrapper that sanitizes formatted log output
/// before it is written to the underlying sink.
///
/// Keeps redaction centralized instead of relying on every callsite to call
/// `sanitize()` itself.
#[derive(Debug)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<M> Clone for SanitizingMakeWriter<M>
where
    M: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct SanitizingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W> SanitizingWriter<W>
where
    W: std::io::Write,
{
    fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    fn flush_complete_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.drain(..=pos).collect::<Vec<u8>>();
            let text = String::from_utf8_lossy(&line);
            self.inner.write_all(sanitize(&text).as_bytes())?;
        }
        Ok(())
    }
}

impl<W> std::io::Write for SanitizingWriter<W>
where
    W: std::io::Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A formatter emitting one huge line without newlines must not buffer
        // without bound.
        let hard_cap = max_bytes().saturating_mul(2);
        if hard_cap > 0 && self.buffer.len() > hard_cap {
            let text = String::from_utf8_lossy(&self.buffer).to_string();
            self.inner.write_all(sanitize(&text).as_bytes())?;
            self.inner.write_all(b"\n[TRUNCATED]\n")?;
            self.buffer.clear();
            return Ok(buf.len());
        }

        self.flush_complete_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_complete_lines()?;

        if !self.buffer.is_empty() {
            let text = String::from_utf8_lossy(&self.buffer).to_string();
            self.inner.write_all(sanitize(&text).as_bytes())?;
            self.buffer.clear();
        }

        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter::new(self.inner.make_writer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_uuid() {
        let input = "application 550e8400-e29b-41d4-a716-446655440000 approved";
        let sanitized = sanitize(input);
        assert!(sanitized.contains("[REDACTED-UUID]"));
        assert!(!sanitized.contains("550e8400"));
    }

    #[test]
    fn test_sanitize_email() {
        let sanitized = sanitize("submission from ada@university.edu received");
        assert!(sanitized.contains("[REDACTED-EMAIL]"));
        assert!(!sanitized.contains("ada@"));
    }

    #[test]
    fn test_sanitize_session_token() {
        // 32 CSPRNG bytes encode to 43 base64url chars.
        let token = "Zm9vYmFyLXNlc3Npb24tdG9rZW4tZm9yLXRlc3Rpbmc";
        let sanitized = sanitize(&format!("presented token {token}"));
        assert!(!sanitized.contains(token));
        assert!(sanitized.contains("[REDACTED-TOKEN]"));
    }

    #[test]
    fn test_sanitize_contextual_secret() {
        let sanitized = sanitize("passphrase=QWxhZGRpbjpvcGVuIHNlc2FtZSBsb25n");
        assert!(sanitized.contains("[REDACTED-SECRET]"));
    }

    #[test]
    fn test_sanitize_key_material() {
        let sanitized = sanitize("fp 0123456789abcdef0123456789abcdef");
        assert!(
            sanitized.contains("[REDACTED-KEY]") || sanitized.contains("[REDACTED-SECRET]")
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(sanitize("Status transition applied"), "Status transition applied");
        assert!(!contains_pii("Status transition applied"));
    }

    #[test]
    fn test_truncation_marker() {
        let long = "a".repeat(64);
        let sanitized = sanitize_with_limit(&long, 16);
        assert!(sanitized.contains("[TRUNCATED]"));
    }
}
