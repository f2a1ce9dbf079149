// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each accepts `&Database` and goes through `call()`.

pub mod security_events;
pub mod users;
pub mod vms;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

/// Timestamps are stored as fixed-width RFC 3339 text so string ordering
/// matches chronological ordering.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_ts(
    idx: usize,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

pub(crate) fn parse_uuid(idx: usize, raw: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_uuid(idx: usize, raw: Option<String>) -> Result<Option<Uuid>, rusqlite::Error> {
    raw.map(|s| parse_uuid(idx, &s)).transpose()
}

pub(crate) fn parse_enum<T>(idx: usize, raw: &str) -> Result<T, rusqlite::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
