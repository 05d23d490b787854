use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;
use crate::models::backup_run::{
    BackendStatistics, BackupRun, BackupStatus, FileCounts, RunFlags, SizeStats,
};
use crate::models::machine::Machine;
use crate::utils::{format_timestamp, parse_timestamp};

/// Persistence contract the collector writes through.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Creates the machine or renames it; idempotent by id.
    async fn upsert_machine(&self, machine: &Machine) -> Result<(), StoreError>;

    async fn backup_run_exists(
        &self,
        machine_id: &str,
        backup_name: &str,
        start_time: &DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when a run with the same dedup triple is already stored.
    async fn insert_backup_run(&self, run: &BackupRun) -> Result<bool, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS machines (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    machine_id TEXT NOT NULL REFERENCES machines(id),
    backup_job_id TEXT NOT NULL,
    backup_name TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    status TEXT NOT NULL,
    duration_seconds INTEGER NOT NULL DEFAULT 0,
    examined_files INTEGER NOT NULL DEFAULT 0,
    opened_files INTEGER NOT NULL DEFAULT 0,
    added_files INTEGER NOT NULL DEFAULT 0,
    modified_files INTEGER NOT NULL DEFAULT 0,
    deleted_files INTEGER NOT NULL DEFAULT 0,
    added_folders INTEGER NOT NULL DEFAULT 0,
    modified_folders INTEGER NOT NULL DEFAULT 0,
    deleted_folders INTEGER NOT NULL DEFAULT 0,
    added_symlinks INTEGER NOT NULL DEFAULT 0,
    modified_symlinks INTEGER NOT NULL DEFAULT 0,
    deleted_symlinks INTEGER NOT NULL DEFAULT 0,
    files_with_error INTEGER NOT NULL DEFAULT 0,
    too_large_files INTEGER NOT NULL DEFAULT 0,
    not_processed_files INTEGER NOT NULL DEFAULT 0,
    size_of_examined_files INTEGER NOT NULL DEFAULT 0,
    size_of_added_files INTEGER NOT NULL DEFAULT 0,
    size_of_modified_files INTEGER NOT NULL DEFAULT 0,
    size_of_opened_files INTEGER NOT NULL DEFAULT 0,
    uploaded_size INTEGER NOT NULL DEFAULT 0,
    downloaded_size INTEGER NOT NULL DEFAULT 0,
    partial_backup INTEGER NOT NULL DEFAULT 0,
    dry_run INTEGER NOT NULL DEFAULT 0,
    interrupted INTEGER NOT NULL DEFAULT 0,
    version TEXT NOT NULL DEFAULT '',
    warnings_actual_length INTEGER NOT NULL DEFAULT 0,
    errors_actual_length INTEGER NOT NULL DEFAULT 0,
    messages_json TEXT,
    warnings_json TEXT,
    errors_json TEXT,
    backend_duration_seconds INTEGER NOT NULL DEFAULT 0,
    backend_parsed_result TEXT NOT NULL DEFAULT '',
    backend_version TEXT NOT NULL DEFAULT '',
    backend_interrupted INTEGER NOT NULL DEFAULT 0,
    backend_reported_quota_warning INTEGER NOT NULL DEFAULT 0,
    backend_reported_quota_error INTEGER NOT NULL DEFAULT 0,
    backend_last_backup_date TEXT,
    backend_remote_calls INTEGER NOT NULL DEFAULT 0,
    backend_files_uploaded INTEGER NOT NULL DEFAULT 0,
    backend_files_downloaded INTEGER NOT NULL DEFAULT 0,
    backend_known_file_count INTEGER NOT NULL DEFAULT 0,
    backend_known_file_size INTEGER NOT NULL DEFAULT 0,
    backend_backup_list_count INTEGER NOT NULL DEFAULT 0,
    backend_total_quota_space INTEGER NOT NULL DEFAULT 0,
    backend_free_quota_space INTEGER NOT NULL DEFAULT 0,
    backend_assigned_quota_space INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (machine_id, backup_name, start_time)
);

CREATE INDEX IF NOT EXISTS idx_backups_machine_start ON backups (machine_id, start_time);
";

/// Column order shared by INSERT and SELECT; `created_at` is appended on insert only.
const RUN_COLUMNS: [&str; 52] = [
    "machine_id",
    "backup_job_id",
    "backup_name",
    "start_time",
    "end_time",
    "status",
    "duration_seconds",
    "examined_files",
    "opened_files",
    "added_files",
    "modified_files",
    "deleted_files",
    "added_folders",
    "modified_folders",
    "deleted_folders",
    "added_symlinks",
    "modified_symlinks",
    "deleted_symlinks",
    "files_with_error",
    "too_large_files",
    "not_processed_files",
    "size_of_examined_files",
    "size_of_added_files",
    "size_of_modified_files",
    "size_of_opened_files",
    "uploaded_size",
    "downloaded_size",
    "partial_backup",
    "dry_run",
    "interrupted",
    "version",
    "warnings_actual_length",
    "errors_actual_length",
    "messages_json",
    "warnings_json",
    "errors_json",
    "backend_duration_seconds",
    "backend_parsed_result",
    "backend_version",
    "backend_interrupted",
    "backend_reported_quota_warning",
    "backend_reported_quota_error",
    "backend_last_backup_date",
    "backend_remote_calls",
    "backend_files_uploaded",
    "backend_files_downloaded",
    "backend_known_file_count",
    "backend_known_file_size",
    "backend_backup_list_count",
    "backend_total_quota_space",
    "backend_free_quota_space",
    "backend_assigned_quota_space",
];

/// Stored machine plus a small roll-up of its runs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MachineSummary {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub last_seen_at: String,
    pub run_count: i64,
    pub last_run_start: Option<String>,
}

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        info!("Opened backup database {:?}", path);
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub async fn list_machines(&self) -> Result<Vec<MachineSummary>, StoreError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT m.id, m.name, m.created_at, m.last_seen_at,
                    COUNT(b.id), MAX(b.start_time)
             FROM machines m
             LEFT JOIN backups b ON b.machine_id = m.id
             GROUP BY m.id
             ORDER BY m.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MachineSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
                last_seen_at: row.get(3)?,
                run_count: row.get(4)?,
                last_run_start: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn get_machine(&self, machine_id: &str) -> Result<Option<Machine>, StoreError> {
        let db = self.db.lock().await;
        let machine = db
            .query_row(
                "SELECT id, name FROM machines WHERE id = ?1",
                params![machine_id],
                |row| {
                    Ok(Machine {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(machine)
    }

    /// Runs of one machine, newest first.
    pub async fn list_backup_runs(&self, machine_id: &str) -> Result<Vec<BackupRun>, StoreError> {
        let db = self.db.lock().await;
        let sql = format!(
            "SELECT {} FROM backups WHERE machine_id = ?1 ORDER BY start_time DESC, id DESC",
            RUN_COLUMNS.join(", ")
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(params![machine_id], row_to_run)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(StoreError::InvalidValue(format!("timestamp {:?}", text))),
        )
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<BackupRun> {
    let status: String = row.get(5)?;
    let last_backup_date: Option<String> = row.get(42)?;
    Ok(BackupRun {
        machine_id: row.get(0)?,
        backup_job_id: row.get(1)?,
        backup_name: row.get(2)?,
        start_time: timestamp_column(row, 3)?,
        end_time: timestamp_column(row, 4)?,
        status: status.parse().unwrap_or(BackupStatus::Unknown),
        duration_seconds: row.get(6)?,
        counts: FileCounts {
            examined_files: row.get(7)?,
            opened_files: row.get(8)?,
            added_files: row.get(9)?,
            modified_files: row.get(10)?,
            deleted_files: row.get(11)?,
            added_folders: row.get(12)?,
            modified_folders: row.get(13)?,
            deleted_folders: row.get(14)?,
            added_symlinks: row.get(15)?,
            modified_symlinks: row.get(16)?,
            deleted_symlinks: row.get(17)?,
            files_with_error: row.get(18)?,
            too_large_files: row.get(19)?,
            not_processed_files: row.get(20)?,
        },
        sizes: SizeStats {
            examined_bytes: row.get(21)?,
            added_bytes: row.get(22)?,
            modified_bytes: row.get(23)?,
            opened_bytes: row.get(24)?,
            uploaded_bytes: row.get(25)?,
            downloaded_bytes: row.get(26)?,
        },
        flags: RunFlags {
            partial: row.get(27)?,
            dry_run: row.get(28)?,
            interrupted: row.get(29)?,
        },
        version: row.get(30)?,
        warnings_count: row.get(31)?,
        errors_count: row.get(32)?,
        messages_json: row.get(33)?,
        warnings_json: row.get(34)?,
        errors_json: row.get(35)?,
        backend: BackendStatistics {
            duration_seconds: row.get(36)?,
            parsed_result: row.get(37)?,
            version: row.get(38)?,
            interrupted: row.get(39)?,
            reported_quota_warning: row.get(40)?,
            reported_quota_error: row.get(41)?,
            last_backup_date: last_backup_date.as_deref().and_then(parse_timestamp),
            remote_calls: row.get(43)?,
            files_uploaded: row.get(44)?,
            files_downloaded: row.get(45)?,
            known_file_count: row.get(46)?,
            known_file_size: row.get(47)?,
            backup_list_count: row.get(48)?,
            total_quota_space: row.get(49)?,
            free_quota_space: row.get(50)?,
            assigned_quota_space: row.get(51)?,
        },
    })
}

#[async_trait]
impl BackupStore for SqliteStore {
    async fn upsert_machine(&self, machine: &Machine) -> Result<(), StoreError> {
        let now = format_timestamp(&Utc::now());
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO machines (id, name, created_at, last_seen_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, last_seen_at = excluded.last_seen_at",
            params![machine.id, machine.name, now],
        )?;
        Ok(())
    }

    async fn backup_run_exists(
        &self,
        machine_id: &str,
        backup_name: &str,
        start_time: &DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let db = self.db.lock().await;
        let exists: bool = db.query_row(
            "SELECT EXISTS(SELECT 1 FROM backups
                           WHERE machine_id = ?1 AND backup_name = ?2 AND start_time = ?3)",
            params![machine_id, backup_name, format_timestamp(start_time)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn insert_backup_run(&self, run: &BackupRun) -> Result<bool, StoreError> {
        let placeholders = (1..=RUN_COLUMNS.len() + 1)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO backups ({}, created_at) VALUES ({})",
            RUN_COLUMNS.join(", "),
            placeholders
        );
        let backend = &run.backend;
        let last_backup_date = backend.last_backup_date.as_ref().map(format_timestamp);

        let db = self.db.lock().await;
        let changed = db.execute(
            &sql,
            params![
                run.machine_id,
                run.backup_job_id,
                run.backup_name,
                format_timestamp(&run.start_time),
                format_timestamp(&run.end_time),
                run.status.as_str(),
                run.duration_seconds,
                run.counts.examined_files,
                run.counts.opened_files,
                run.counts.added_files,
                run.counts.modified_files,
                run.counts.deleted_files,
                run.counts.added_folders,
                run.counts.modified_folders,
                run.counts.deleted_folders,
                run.counts.added_symlinks,
                run.counts.modified_symlinks,
                run.counts.deleted_symlinks,
                run.counts.files_with_error,
                run.counts.too_large_files,
                run.counts.not_processed_files,
                run.sizes.examined_bytes,
                run.sizes.added_bytes,
                run.sizes.modified_bytes,
                run.sizes.opened_bytes,
                run.sizes.uploaded_bytes,
                run.sizes.downloaded_bytes,
                run.flags.partial,
                run.flags.dry_run,
                run.flags.interrupted,
                run.version,
                run.warnings_count,
                run.errors_count,
                run.messages_json,
                run.warnings_json,
                run.errors_json,
                backend.duration_seconds,
                backend.parsed_result,
                backend.version,
                backend.interrupted,
                backend.reported_quota_warning,
                backend.reported_quota_error,
                last_backup_date,
                backend.remote_calls,
                backend.files_uploaded,
                backend.files_downloaded,
                backend.known_file_count,
                backend.known_file_size,
                backend.backup_list_count,
                backend.total_quota_space,
                backend.free_quota_space,
                backend.assigned_quota_space,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(changed == 1)
    }
}
