//! Versioned schema upgrades.
//!
//! The schema version lives in `PRAGMA user_version`. Migrations run at boot,
//! before `init_db`, each inside its own transaction. Databases written by the
//! first deployment carry version 0 with tables already present; they
//! are backed up and converted by migration 2.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

pub struct Migration {
    /// Sequential, starting from 1.
    pub version: i32,
    pub description: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

/// Append new migrations at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "baseline",
        up: migration_001_baseline,
    },
    Migration {
        version: 2,
        description: "upgrade legacy tables (hashed passwords, cents, reminder tracking)",
        up: migration_002_legacy_upgrade,
    },
    Migration {
        version: 3,
        description: "normalise legacy dates, link reminder cards to invoices",
        up: migration_003_dates_and_invoice_shares,
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to back up database to {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Migration {version} failed: {message}. Backup at: {backup_path}")]
    MigrationFailed {
        version: i32,
        message: String,
        backup_path: PathBuf,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn get_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn set_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `ALTER TABLE ... ADD COLUMN` unless the column is already there.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> rusqlite::Result<bool> {
    if column_exists(conn, table, column)? {
        return Ok(false);
    }
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))?;
    tracing::info!("Added column {}.{}", table, column);
    Ok(true)
}

fn backup_prefix(db_path: &Path) -> String {
    let name = db_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    format!("{name}.backup_v")
}

fn backup_database(db_path: &str, from_version: i32) -> Result<PathBuf, MigrationError> {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = PathBuf::from(format!("{db_path}.backup_v{from_version}_{stamp}"));
    fs::copy(db_path, &path).map_err(|source| MigrationError::BackupFailed {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Backups of `db_path`, oldest first.
fn list_backups(db_path: &str) -> std::io::Result<Vec<PathBuf>> {
    let db_path = Path::new(db_path);
    let dir = match db_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = backup_prefix(db_path);

    let mut backups: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .collect();
    backups.sort();
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Keep the newest `keep` backups. Negative keeps everything.
fn prune_backups(db_path: &str, keep: i32) -> std::io::Result<()> {
    if keep < 1 {
        return Ok(());
    }
    let backups = list_backups(db_path)?;
    let excess = backups.len().saturating_sub(keep as usize);
    for path in backups.into_iter().take(excess) {
        tracing::info!("Removing old backup: {}", path.display());
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Apply every pending migration.
///
/// `backup_keep_count`: 0 disables backups, -1 keeps all of them, N keeps the newest N.
/// A database with no tables is considered fresh and never backed up.
pub fn run_migrations(
    conn: &mut Connection,
    db_path: &str,
    backup_keep_count: i32,
) -> Result<(), MigrationError> {
    let current = get_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        tracing::debug!("Database at version {} (up to date)", current);
        return Ok(());
    }

    tracing::info!(
        "Database at version {}, {} migration(s) pending",
        current,
        pending.len()
    );

    let has_data = table_exists(conn, "users")?;
    let backup_path = if backup_keep_count == 0 {
        tracing::warn!("Migration backups disabled (MIGRATION_BACKUP_COUNT=0)");
        None
    } else if !has_data {
        tracing::debug!("Fresh database, skipping backup");
        None
    } else {
        let path = backup_database(db_path, current)?;
        tracing::info!("Backup created: {}", path.display());
        Some(path)
    };

    for migration in pending {
        tracing::info!("Running migration {}: {}", migration.version, migration.description);
        let tx = conn.transaction()?;

        if let Err(e) = (migration.up)(&tx) {
            match &backup_path {
                Some(path) => tracing::error!(
                    "Migration {} failed: {}. Database unchanged. Backup at: {}",
                    migration.version,
                    e,
                    path.display()
                ),
                None => tracing::error!(
                    "Migration {} failed: {}. Database unchanged. No backup available!",
                    migration.version,
                    e
                ),
            }
            return Err(MigrationError::MigrationFailed {
                version: migration.version,
                message: e.to_string(),
                backup_path: backup_path.unwrap_or_default(),
            });
        }

        set_version(&tx, migration.version)?;
        tx.commit()?;
        tracing::info!("Migration {} completed", migration.version);
    }

    if let Err(e) = prune_backups(db_path, backup_keep_count) {
        tracing::warn!("Failed to prune old backups: {}", e);
    }

    Ok(())
}

// ============================================================================
// Migration functions
// ============================================================================

/// Baseline. Fresh databases get their tables from `init_db` after migrations.
fn migration_001_baseline(conn: &Connection) -> rusqlite::Result<()> {
    if table_exists(conn, "users")? {
        tracing::debug!("Existing database detected, baseline migration is no-op");
    } else {
        tracing::debug!("Fresh database, schema will be created by init_db");
    }
    Ok(())
}

/// Converts tables written by the legacy deployment:
///
/// - users: plaintext `password` becomes an argon2 `password_hash`, plus
///   `is_master`, `owner_id`, `asaas_customer_id`; the lowest-id admin becomes master
/// - clients/subscriptions: REAL `value` becomes integer `value_cents`;
///   invoices gain cpf, paid_at and reminder tracking
/// - shares/tickets: textual timestamps become unix seconds
///
/// Tenant SMTP passwords stay as text here; they are encrypted at boot by
/// `queries::encrypt_legacy_smtp_passwords` because that needs the master key.
fn migration_002_legacy_upgrade(conn: &Connection) -> rusqlite::Result<()> {
    if !table_exists(conn, "users")? {
        return Ok(());
    }

    upgrade_users(conn)?;

    if table_exists(conn, "clients")? {
        add_column_if_missing(conn, "clients", "cpf", "TEXT")?;
        add_column_if_missing(conn, "clients", "paid_at", "TEXT")?;
        add_column_if_missing(conn, "clients", "last_reminder_on", "TEXT")?;
        add_column_if_missing(conn, "clients", "last_reminder_kind", "TEXT")?;
        convert_value_to_cents(conn, "clients")?;
        // Legacy rows without an owner belonged to the first account
        conn.execute(
            "UPDATE clients SET user_id = (SELECT MIN(id) FROM users) WHERE user_id IS NULL",
            [],
        )?;
    }

    if table_exists(conn, "subscriptions")? {
        add_column_if_missing(conn, "subscriptions", "last_generated_month", "TEXT")?;
        convert_value_to_cents(conn, "subscriptions")?;
    }

    for (table, columns) in [
        ("invoice_shares", &["created_at"][..]),
        ("tickets", &["created_at", "updated_at"][..]),
        ("ticket_messages", &["created_at"][..]),
    ] {
        if !table_exists(conn, table)? {
            continue;
        }
        for column in columns {
            conn.execute_batch(&format!(
                "UPDATE {table} SET {column} = CAST(strftime('%s', {column}) AS INTEGER)
                 WHERE typeof({column}) = 'text'"
            ))?;
        }
    }

    Ok(())
}

fn upgrade_users(conn: &Connection) -> rusqlite::Result<()> {
    for (column, decl) in [
        ("whatsapp", "TEXT"),
        ("cpf", "TEXT"),
        ("plan", "TEXT NOT NULL DEFAULT 'free'"),
        ("status", "TEXT NOT NULL DEFAULT 'active'"),
        ("role", "TEXT NOT NULL DEFAULT 'user'"),
        ("payment_method", "TEXT NOT NULL DEFAULT 'whatsapp'"),
        ("payment_pix_key", "TEXT"),
        ("payment_instructions", "TEXT"),
        ("logo", "TEXT"),
        ("smtp_user", "TEXT"),
        ("smtp_pass", "BLOB"),
        ("created_at", "TEXT"),
        ("payment_status", "TEXT NOT NULL DEFAULT 'pending'"),
        ("due_date", "TEXT"),
        ("password_hash", "TEXT"),
        ("is_master", "INTEGER NOT NULL DEFAULT 0"),
        ("owner_id", "INTEGER"),
        ("asaas_customer_id", "TEXT"),
    ] {
        add_column_if_missing(conn, "users", column, decl)?;
    }

    conn.execute_batch(
        "UPDATE users SET
            plan = COALESCE(plan, 'free'),
            status = COALESCE(status, 'active'),
            role = COALESCE(role, 'user'),
            payment_method = COALESCE(payment_method, 'whatsapp'),
            payment_status = COALESCE(payment_status, 'pending');
         UPDATE users SET name = email WHERE name IS NULL OR name = '';",
    )?;

    if column_exists(conn, "users", "password")? {
        let rows: Vec<(i64, Option<String>)> = {
            let mut stmt =
                conn.prepare("SELECT id, password FROM users WHERE password_hash IS NULL")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?
        };
        for (id, plaintext) in rows {
            // Accounts without a password get an unguessable one and must reset
            let plaintext = plaintext
                .filter(|p| !p.is_empty())
                .unwrap_or_else(crate::crypto::generate_session_token);
            let hash = crate::crypto::hash_password(&plaintext)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash, id],
            )?;
        }
        conn.execute_batch("ALTER TABLE users DROP COLUMN password")?;
        tracing::info!("Hashed legacy plaintext passwords");
    }

    let has_master: bool =
        conn.query_row("SELECT COUNT(*) > 0 FROM users WHERE is_master = 1", [], |row| row.get(0))?;
    if !has_master {
        let first_admin: Option<i64> = conn
            .query_row(
                "SELECT MIN(id) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        if let Some(id) = first_admin {
            conn.execute("UPDATE users SET is_master = 1 WHERE id = ?1", [id])?;
            tracing::info!("User {} marked as master admin", id);
        }
    }

    Ok(())
}

/// Rewrites every stored date as `YYYY-MM-DD`. Unreadable optional dates are
/// cleared; an unreadable invoice due date is left as is and logged.
fn migration_003_dates_and_invoice_shares(conn: &Connection) -> rusqlite::Result<()> {
    normalize_date_column(conn, "users", "due_date", true)?;
    normalize_date_column(conn, "users", "created_at", true)?;
    normalize_date_column(conn, "clients", "due_date", false)?;
    normalize_date_column(conn, "clients", "paid_at", true)?;

    if table_exists(conn, "invoice_shares")? {
        add_column_if_missing(
            conn,
            "invoice_shares",
            "invoice_id",
            "INTEGER REFERENCES clients(id) ON DELETE CASCADE",
        )?;
    }
    Ok(())
}

/// Legacy dates were free text: ISO dates or timestamps, `dd/mm/yyyy`,
/// unpadded days from the old generator (`2024-03-5`) and JSON blobs such
/// as `{"date":"2024-03-10"}`.
pub(crate) fn normalize_legacy_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        return normalize_legacy_date(value.get("date")?.as_str()?);
    }
    let candidates = [raw.get(..10), raw.split_whitespace().next(), Some(raw)];
    candidates
        .into_iter()
        .flatten()
        .find_map(|text| {
            ["%Y-%m-%d", "%d/%m/%Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn normalize_date_column(
    conn: &Connection,
    table: &str,
    column: &str,
    nullable: bool,
) -> rusqlite::Result<usize> {
    if !table_exists(conn, table)? || !column_exists(conn, table, column)? {
        return Ok(0);
    }
    let rows: Vec<(i64, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, CAST({column} AS TEXT) FROM {table} WHERE {column} IS NOT NULL"
        ))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?
    };

    let mut changed = 0;
    for (id, raw) in rows {
        let normalized = normalize_legacy_date(&raw);
        if normalized.as_deref() == Some(raw.as_str()) {
            continue;
        }
        match normalized {
            Some(date) => conn.execute(
                &format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2"),
                params![date, id],
            )?,
            None if nullable => conn.execute(
                &format!("UPDATE {table} SET {column} = NULL WHERE id = ?1"),
                [id],
            )?,
            None => {
                tracing::warn!("{}.{} of row {} is not a date: {:?}", table, column, id, raw);
                continue;
            }
        };
        changed += 1;
    }
    if changed > 0 {
        tracing::info!("Normalised {} value(s) of {}.{}", changed, table, column);
    }
    Ok(changed)
}

/// Replace a REAL `value` column with integer `value_cents`.
fn convert_value_to_cents(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    add_column_if_missing(conn, table, "value_cents", "INTEGER NOT NULL DEFAULT 0")?;
    if column_exists(conn, table, "value")? {
        conn.execute_batch(&format!(
            "UPDATE {table} SET value_cents = CAST(ROUND(COALESCE(value, 0) * 100) AS INTEGER);
             ALTER TABLE {table} DROP COLUMN value;"
        ))?;
        tracing::info!("Converted {}.value to cents", table);
    }
    Ok(())
}
