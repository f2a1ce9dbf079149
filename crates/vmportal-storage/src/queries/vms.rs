// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VM record queries.

use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;
use vmportal_core::{PortalError, VmRecord};

use super::{format_ts, parse_enum, parse_opt_ts, parse_opt_uuid, parse_uuid};
use crate::database::{Database, map_tr_err};

const VM_COLUMNS: &str = "id, node, vm_id, name, status, cpu_cores, memory_mib, disk_gib, \
     last_synced_at, last_status_change_at, total_run_time_seconds, is_disabled, disabled_at, \
     is_deleted, deleted_at, owner_user_id, max_cpu_cores, max_memory_mib, max_disk_gib";

/// SQLite integers are signed; oversized counters saturate instead of wrapping.
fn sql_int(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn row_to_vm(row: &Row<'_>) -> Result<VmRecord, rusqlite::Error> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    Ok(VmRecord {
        id: parse_uuid(0, &id)?,
        node: row.get(1)?,
        vm_id: row.get(2)?,
        name: row.get(3)?,
        status: parse_enum(4, &status)?,
        cpu_cores: row.get(5)?,
        memory_mib: row.get::<_, i64>(6)?.max(0) as u64,
        disk_gib: row.get::<_, i64>(7)?.max(0) as u64,
        last_synced_at: parse_opt_ts(8, row.get(8)?)?,
        last_status_change_at: parse_opt_ts(9, row.get(9)?)?,
        total_run_time_seconds: row.get::<_, i64>(10)?.max(0) as u64,
        is_disabled: row.get(11)?,
        disabled_at: parse_opt_ts(12, row.get(12)?)?,
        is_deleted: row.get(13)?,
        deleted_at: parse_opt_ts(14, row.get(14)?)?,
        owner_user_id: parse_opt_uuid(15, row.get(15)?)?,
        max_cpu_cores: row.get(16)?,
        max_memory_mib: row.get::<_, Option<i64>>(17)?.map(|v| v.max(0) as u64),
        max_disk_gib: row.get::<_, Option<i64>>(18)?.map(|v| v.max(0) as u64),
    })
}

/// List VM records ordered by node and VM id.
pub async fn list_vms(db: &Database, include_deleted: bool) -> Result<Vec<VmRecord>, PortalError> {
    db.connection()
        .call(move |conn| -> Result<Vec<VmRecord>, rusqlite::Error> {
            let sql = if include_deleted {
                format!("SELECT {VM_COLUMNS} FROM vms ORDER BY node, vm_id")
            } else {
                format!("SELECT {VM_COLUMNS} FROM vms WHERE is_deleted = 0 ORDER BY node, vm_id")
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_vm)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Get one VM record by its portal id.
pub async fn get_vm(db: &Database, id: Uuid) -> Result<Option<VmRecord>, PortalError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<VmRecord>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {VM_COLUMNS} FROM vms WHERE id = ?1"),
                params![id],
                row_to_vm,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert a batch of VM records inside one transaction.
///
/// Any failing row rolls the whole batch back.
pub async fn save_vms(db: &Database, vms: &[VmRecord]) -> Result<(), PortalError> {
    if vms.is_empty() {
        return Ok(());
    }
    let vms = vms.to_vec();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO vms ({VM_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19) \
                     ON CONFLICT(id) DO UPDATE SET \
                     node = excluded.node, vm_id = excluded.vm_id, name = excluded.name, \
                     status = excluded.status, cpu_cores = excluded.cpu_cores, \
                     memory_mib = excluded.memory_mib, disk_gib = excluded.disk_gib, \
                     last_synced_at = excluded.last_synced_at, \
                     last_status_change_at = excluded.last_status_change_at, \
                     total_run_time_seconds = excluded.total_run_time_seconds, \
                     is_disabled = excluded.is_disabled, disabled_at = excluded.disabled_at, \
                     is_deleted = excluded.is_deleted, deleted_at = excluded.deleted_at, \
                     owner_user_id = excluded.owner_user_id, max_cpu_cores = excluded.max_cpu_cores, \
                     max_memory_mib = excluded.max_memory_mib, max_disk_gib = excluded.max_disk_gib"
                ))?;
                for vm in &vms {
                    stmt.execute(params![
                        vm.id.to_string(),
                        vm.node,
                        vm.vm_id,
                        vm.name,
                        vm.status.to_string(),
                        vm.cpu_cores,
                        sql_int(vm.memory_mib),
                        sql_int(vm.disk_gib),
                        vm.last_synced_at.map(format_ts),
                        vm.last_status_change_at.map(format_ts),
                        sql_int(vm.total_run_time_seconds),
                        vm.is_disabled,
                        vm.disabled_at.map(format_ts),
                        vm.is_deleted,
                        vm.deleted_at.map(format_ts),
                        vm.owner_user_id.map(|id| id.to_string()),
                        vm.max_cpu_cores,
                        vm.max_memory_mib.map(sql_int),
                        vm.max_disk_gib.map(sql_int),
                    ])?;
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}
