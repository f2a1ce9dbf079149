// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User queries.

use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;
use vmportal_core::{PortalError, User};

use super::{format_ts, parse_enum, parse_ts, parse_uuid};
use crate::database::{Database, map_tr_err};

const USER_COLUMNS: &str = "id, external_id, username, email, display_name, role, created_at, is_active";

fn row_to_user(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    let id: String = row.get(0)?;
    let role: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(User {
        id: parse_uuid(0, &id)?,
        external_id: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        display_name: row.get(4)?,
        role: parse_enum(5, &role)?,
        created_at: parse_ts(6, &created_at)?,
        is_active: row.get(7)?,
    })
}

pub async fn get_user(db: &Database, id: Uuid) -> Result<Option<User>, PortalError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<User>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Look a user up by identity-provider id. Matching is case-insensitive.
pub async fn get_user_by_external_id(
    db: &Database,
    external_id: &str,
) -> Result<Option<User>, PortalError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<User>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                params![external_id],
                row_to_user,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a user or refresh its profile fields. `created_at` is kept from the first insert.
pub async fn upsert_user(db: &Database, user: &User) -> Result<(), PortalError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(id) DO UPDATE SET \
                     external_id = excluded.external_id, username = excluded.username, \
                     email = excluded.email, display_name = excluded.display_name, \
                     role = excluded.role, is_active = excluded.is_active"
                ),
                params![
                    user.id.to_string(),
                    user.external_id,
                    user.username,
                    user.email,
                    user.display_name,
                    user.role.to_string(),
                    format_ts(user.created_at),
                    user.is_active,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
