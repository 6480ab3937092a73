//! Versioned schema for survey and response storage.
//!
//! Each step is an embedded SQL script tagged with the `PRAGMA user_version`
//! it leaves behind. Pending steps run in one transaction, so a database is
//! either fully upgraded or left untouched.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "surveys",
        sql: include_str!("0001_surveys.sql"),
    },
    SchemaStep {
        version: 2,
        name: "responses",
        sql: include_str!("0002_responses.sql"),
    },
];

/// Schema version this build writes and expects.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS
        .iter()
        .map(|step| step.version)
        .max()
        .unwrap_or(0)
}

/// Brings `conn` up to [`latest_version`] and returns the number of steps run.
///
/// Databases written by a newer build are rejected untouched.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let from_version = read_user_version(conn)?;
    let target_version = latest_version();
    if from_version > target_version {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: target_version,
        });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)
            .map_err(|source| DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            })?;
        tx.pragma_update(None, "user_version", step.version)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={from_version} to_version={target_version} steps={}",
        pending.len()
    );
    Ok(pending.len())
}

fn read_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
