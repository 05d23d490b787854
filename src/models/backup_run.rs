use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    Success,
    Warning,
    Error,
    Fatal,
    Unknown,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Success => "Success",
            BackupStatus::Warning => "Warning",
            BackupStatus::Error => "Error",
            BackupStatus::Fatal => "Fatal",
            BackupStatus::Unknown => "Unknown",
        }
    }

    /// Maps the server's `ParsedResult` text; anything unrecognized is `Unknown`.
    pub fn from_parsed_result(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse::<BackupStatus>().ok())
            .unwrap_or(BackupStatus::Unknown)
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Success" => Ok(BackupStatus::Success),
            "Warning" => Ok(BackupStatus::Warning),
            "Error" => Ok(BackupStatus::Error),
            "Fatal" => Ok(BackupStatus::Fatal),
            "Unknown" => Ok(BackupStatus::Unknown),
            other => Err(format!("unknown backup status {:?}", other)),
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounts {
    pub examined_files: i64,
    pub opened_files: i64,
    pub added_files: i64,
    pub modified_files: i64,
    pub deleted_files: i64,
    pub added_folders: i64,
    pub modified_folders: i64,
    pub deleted_folders: i64,
    pub added_symlinks: i64,
    pub modified_symlinks: i64,
    pub deleted_symlinks: i64,
    pub files_with_error: i64,
    pub too_large_files: i64,
    pub not_processed_files: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeStats {
    pub examined_bytes: i64,
    pub added_bytes: i64,
    pub modified_bytes: i64,
    pub opened_bytes: i64,
    pub uploaded_bytes: i64,
    pub downloaded_bytes: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    pub partial: bool,
    pub dry_run: bool,
    pub interrupted: bool,
}

/// Storage destination metadata reported alongside a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatistics {
    pub duration_seconds: i64,
    /// The backend's own result string, verbatim (empty when absent).
    pub parsed_result: String,
    pub version: String,
    pub interrupted: bool,
    pub reported_quota_warning: bool,
    pub reported_quota_error: bool,
    pub last_backup_date: Option<DateTime<Utc>>,
    pub remote_calls: i64,
    pub files_uploaded: i64,
    pub files_downloaded: i64,
    pub known_file_count: i64,
    pub known_file_size: i64,
    pub backup_list_count: i64,
    pub total_quota_space: i64,
    pub free_quota_space: i64,
    pub assigned_quota_space: i64,
}

/// One execution of one backup job: the unit this crate persists.
///
/// Identity is `(machine_id, backup_name, start_time)`; the server has no
/// stable id per historical run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRun {
    pub machine_id: String,
    pub backup_job_id: String,
    pub backup_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BackupStatus,
    pub duration_seconds: i64,
    pub counts: FileCounts,
    pub sizes: SizeStats,
    pub flags: RunFlags,
    pub version: String,
    pub warnings_count: i64,
    pub errors_count: i64,
    pub messages_json: Option<String>,
    pub warnings_json: Option<String>,
    pub errors_json: Option<String>,
    pub backend: BackendStatistics,
}

impl BackupRun {
    pub fn dedup_key(&self) -> (&str, &str, DateTime<Utc>) {
        (&self.machine_id, &self.backup_name, self.start_time)
    }
}
