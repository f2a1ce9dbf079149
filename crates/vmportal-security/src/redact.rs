// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for log output and error messages.
//!
//! Two complementary mechanisms:
//! 1. **Regex-based**: hypervisor tickets, API token headers, bearer tokens.
//! 2. **Exact-match**: configured secrets registered at startup.

use std::io::Write;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;

/// Known secret formats to redact from output.
static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // API token header: PVEAPIToken=user@realm!tokenid=uuid
        Regex::new(r"PVEAPIToken=[^\s,;]+").unwrap(),
        // Login cookie: PVEAuthCookie=PVE:...
        Regex::new(r"PVEAuthCookie=[^\s,;]+").unwrap(),
        // Login and VNC tickets: PVE:user@realm:HEX::sig, PVEVNC:HEX::sig
        Regex::new(r"PVE(?:VNC)?:(?:[A-Za-z0-9@.!_\-]+:)?[A-Za-z0-9]+::[A-Za-z0-9+/=]+").unwrap(),
        // CSRF token header value
        Regex::new(r"CSRFPreventionToken[=:]\s*[A-Za-z0-9:+/=]+").unwrap(),
        // Bearer tokens in headers
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").unwrap(),
        // vncticket query parameter on upstream URLs
        Regex::new(r"vncticket=[^\s&]+").unwrap(),
    ]
});

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

/// Redact secrets from a string using regex patterns and exact-match values.
pub fn redact(input: &str, secret_values: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, REDACTED).to_string();
    }

    // Longest first so a secret containing another is replaced whole.
    let mut sorted_values: Vec<&String> = secret_values.iter().collect();
    sorted_values.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted_values {
        if !value.is_empty() {
            result = result.replace(value.as_str(), REDACTED);
        }
    }

    result
}

/// A writer wrapper that redacts secrets from output.
///
/// Used as the tracing subscriber's writer so tickets and configured secrets
/// never reach the log sink.
pub struct RedactingWriter<W> {
    inner: W,
    secret_values: Arc<RwLock<Vec<String>>>,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, secret_values: Arc<RwLock<Vec<String>>>) -> Self {
        Self {
            inner,
            secret_values,
        }
    }

    /// Register a secret for exact-match redaction.
    pub fn add_secret(secret_values: &Arc<RwLock<Vec<String>>>, value: String) {
        if value.is_empty() {
            return;
        }
        if let Ok(mut values) = secret_values.write() {
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let secrets = self
            .secret_values
            .read()
            .map(|v| v.clone())
            .unwrap_or_default();
        let redacted = redact(&input, &secrets);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
