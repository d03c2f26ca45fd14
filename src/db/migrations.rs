use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema steps in order; step `i` moves `user_version` from `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("schema_v1.sql", include_str!("schemas/schema_v1.sql")),
    ("schema_v2.sql", include_str!("schemas/schema_v2.sql")),
];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

fn user_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Apply every pending step. Each step commits together with its version
/// bump, so an interrupted upgrade resumes where it stopped.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version = user_version(conn)?;
    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database schema v{version} is newer than this build supports (v{CURRENT_SCHEMA_VERSION})"
        );
    }

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate().skip(version.max(0) as usize) {
        let target = index as i32 + 1;
        let tx = conn
            .transaction()
            .with_context(|| format!("failed to begin {name}"))?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to execute {name}"))?;
        tx.pragma_update(None, "user_version", target)
            .with_context(|| format!("failed to record schema v{target}"))?;
        tx.commit()
            .with_context(|| format!("failed to commit {name}"))?;
    }

    Ok(())
}
