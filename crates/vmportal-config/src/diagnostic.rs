// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette bridge for portal configuration errors.
//!
//! Every diagnostic names the TOML section it belongs to and points at the
//! offending key in the file that set it. When the key is not found in any
//! file, the help text names the `VMPORTAL_*` variable that would set it.
//! Values of credential keys are never echoed.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Keys whose values must never appear in a diagnostic.
const SECRET_KEYS: &[&str] = &["proxy_secret", "token_secret", "console_password"];

/// What each section configures, shown next to its key listing.
const SECTION_PURPOSE: &[(&str, &str)] = &[
    ("portal", "instance name and log level"),
    ("server", "listener address and allowed origins"),
    ("auth", "trusted identity proxy"),
    ("proxmox", "hypervisor API endpoint and credentials"),
    ("console", "console session lifetime and rate limits"),
    ("sync", "inventory reconciliation loop"),
    ("retention", "security event cleanup"),
    ("storage", "SQLite database"),
];

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown key `{key}` in {}", section_label(section))]
    #[diagnostic(
        code(vmportal::config::unknown_key),
        help("{}", unknown_key_help(section, suggestion.as_deref(), valid_keys, env_var.as_deref()))
    )]
    UnknownKey {
        /// Dotted section path, empty for the top level.
        section: String,
        /// The unrecognized key name.
        key: String,
        /// Suggested correction via fuzzy matching, if any.
        suggestion: Option<String>,
        /// Valid keys for the section.
        valid_keys: String,
        /// Variable that would have set the key, when no file contains it.
        env_var: Option<String>,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type or an unacceptable value.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(
        code(vmportal::config::invalid_type),
        help("{}", invalid_type_help(expected, env_var.as_deref()))
    )]
    InvalidType {
        /// Dotted key path, e.g. `server.port`.
        key: String,
        /// Description of the mismatch. Omits the value for credential keys.
        detail: String,
        /// What was expected.
        expected: String,
        env_var: Option<String>,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(vmportal::config::missing_key),
        help("add `{key} = <value>` under {} in vmportal.toml", section_label(section))
    )]
    MissingKey {
        section: String,
        key: String,
    },

    /// A validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(vmportal::config::validation))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(vmportal::config::other))]
    Other(String),
}

fn section_label(section: &str) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{section}]")
    }
}

fn section_purpose(section: &str) -> Option<&'static str> {
    SECTION_PURPOSE
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, purpose)| *purpose)
}

fn unknown_key_help(
    section: &str,
    suggestion: Option<&str>,
    valid_keys: &str,
    env_var: Option<&str>,
) -> String {
    let mut help = match suggestion {
        Some(s) => format!("did you mean `{s}`? "),
        None => String::new(),
    };
    match section_purpose(section) {
        Some(purpose) => {
            help.push_str(&format!("{} ({purpose}) accepts: {valid_keys}", section_label(section)))
        }
        None => help.push_str(&format!("{} accepts: {valid_keys}", section_label(section))),
    }
    if let Some(var) = env_var {
        help.push_str(&format!("; check the environment for `{var}`"));
    }
    help
}

fn invalid_type_help(expected: &str, env_var: Option<&str>) -> String {
    match env_var {
        Some(var) => format!("expected {expected}; check the environment for `{var}`"),
        None => format!("expected {expected}"),
    }
}

/// Whether the value at `path` is a credential.
pub fn is_secret_key(path: &[String]) -> bool {
    path.last()
        .is_some_and(|key| SECRET_KEYS.contains(&key.as_str()))
}

/// `VMPORTAL_PROXMOX_TOKEN_SECRET` for `["proxmox", "token_secret"]`.
pub fn env_var_name(path: &[String]) -> String {
    format!("VMPORTAL_{}", path.join("_").to_ascii_uppercase())
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// `toml_sources` holds `(path, content)` pairs for the files that were
/// merged, used to attach source spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    let mut errors = Vec::new();

    for error in err {
        let path: Vec<String> = error.path.clone();
        let config_error = match &error.kind {
            Kind::UnknownField(field, expected) => {
                let valid_keys: Vec<&str> = expected.to_vec();
                let (span, src) = find_source_span(&error, &path, field, toml_sources);
                let mut key_path = path.clone();
                key_path.push(field.clone());

                ConfigError::UnknownKey {
                    section: path.join("."),
                    key: field.clone(),
                    suggestion: suggest_key(field, &valid_keys),
                    valid_keys: valid_keys.join(", "),
                    env_var: span.is_none().then(|| env_var_name(&key_path)),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                section: path.join("."),
                key: field.clone().into_owned(),
            },
            Kind::InvalidType(actual, expected) | Kind::InvalidValue(actual, expected) => {
                let (section, field) = match path.split_last() {
                    Some((field, section)) => (section.to_vec(), field.clone()),
                    None => (Vec::new(), String::new()),
                };
                let (span, src) = find_source_span(&error, &section, &field, toml_sources);
                let detail = if is_secret_key(&path) {
                    format!("value withheld, expected {expected}")
                } else {
                    format!("found {actual}, expected {expected}")
                };

                ConfigError::InvalidType {
                    key: path.join("."),
                    detail,
                    expected: expected.to_string(),
                    env_var: span.is_none().then(|| env_var_name(&path)),
                    span,
                    src,
                }
            }
            _ if is_secret_key(&path) => {
                ConfigError::Other(format!("invalid value for `{}`", path.join(".")))
            }
            _ => ConfigError::Other(format!("{error}")),
        };

        errors.push(config_error);
    }

    errors
}

/// Find the span of `field` under `section` in the file that set it.
///
/// Prefers the file named by the error's metadata. Merged tables carry the
/// tag of the defaults, so otherwise the files are searched last-merged first.
fn find_source_span(
    error: &figment::error::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.as_path()),
            _ => None,
        });

    // Figment reports the resolved path; callers may pass a relative one.
    let from_origin = origin.and_then(|origin| {
        toml_sources
            .iter()
            .find(|(p, _)| origin == Path::new(p) || origin.ends_with(p))
    });
    let candidates = from_origin
        .into_iter()
        .chain(toml_sources.iter().rev());

    for (path, content) in candidates {
        if let Some(offset) = find_key_offset(content, section, field) {
            let span = SourceSpan::new(offset.into(), field.len());
            return (Some(span), Some(NamedSource::new(path, content.clone())));
        }
    }

    (None, None)
}

/// Find the byte offset of a key in TOML content, relative to a section path.
///
/// For `path = ["sync"]` and `field = "intervl_secs"`, finds the `[sync]`
/// header then the first line after it that assigns the key. An empty path
/// searches from the start.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let search_start = if path.is_empty() {
        0
    } else {
        let header = format!("[{}]", path.join("."));
        content.find(&header).map(|pos| pos + header.len())?
    };

    let mut byte_offset = search_start;
    for line in content[search_start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') && byte_offset != search_start {
            // Next section: the key is not in this one.
            return None;
        }
        if let Some(after) = trimmed.strip_prefix(field) {
            if after.trim_start().starts_with('=') {
                return Some(byte_offset + (line.len() - trimmed.len()));
            }
        }
        byte_offset += line.len();
    }

    None
}

/// Suggest a similar key name using Jaro-Winkler string similarity.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    let mut best_score = SUGGESTION_THRESHOLD;
    let mut best_match = None;

    for &key in valid_keys {
        let score = strsim::jaro_winkler(unknown, key);
        if score > best_score {
            best_score = score;
            best_match = Some(key.to_string());
        }
    }

    best_match
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}
