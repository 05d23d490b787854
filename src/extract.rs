//! Turns raw log entries into normalized [`BackupRun`] records.
//!
//! Entries that are not backup results are log noise and are dropped without
//! being counted. A backup result with unusable timestamps fails the whole job.

use serde_json::Value;
use tracing::debug;

use crate::error::CollectError;
use crate::models::backup_job::BackupJob;
use crate::models::backup_run::{
    BackendStatistics, BackupRun, BackupStatus, FileCounts, RunFlags, SizeStats,
};
use crate::models::log_entry::{BackendStatisticsPayload, Flag, RawLogEntry, RunPayload};
use crate::models::machine::Machine;
use crate::utils::{parse_duration_seconds, parse_timestamp};

pub const BACKUP_OPERATION: &str = "Backup";

/// Why an entry was left out. Never surfaced as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingMessage,
    Undecodable(String),
    NotBackup(Option<String>),
}

/// Decodes an entry's message and keeps it only if it reports a backup operation.
pub fn decode_entry(entry: &RawLogEntry) -> Result<RunPayload, SkipReason> {
    let message = entry
        .message
        .as_deref()
        .ok_or(SkipReason::MissingMessage)?;
    let payload: RunPayload =
        serde_json::from_str(message).map_err(|e| SkipReason::Undecodable(e.to_string()))?;
    match payload.main_operation.as_deref() {
        Some(BACKUP_OPERATION) => Ok(payload),
        other => Err(SkipReason::NotBackup(other.map(str::to_string))),
    }
}

/// Stored status: the server's result, except a "Success" that carried
/// warnings is recorded as "Warning". No other result is reclassified.
pub fn derive_status(parsed_result: Option<&str>, warnings_length: i64) -> BackupStatus {
    match BackupStatus::from_parsed_result(parsed_result) {
        BackupStatus::Success if warnings_length > 0 => BackupStatus::Warning,
        status => status,
    }
}

fn flag(value: Option<Flag>) -> bool {
    value.map(|f| f.0).unwrap_or(false)
}

fn num(value: Option<i64>) -> i64 {
    value.unwrap_or(0)
}

fn opaque(value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(value) => serde_json::to_string(value).ok(),
    }
}

fn required_timestamp(
    field: &str,
    value: Option<&str>,
    job: &BackupJob,
) -> Result<chrono::DateTime<chrono::Utc>, CollectError> {
    let raw = value.ok_or_else(|| {
        CollectError::Data(format!("backup {:?}: log entry has no {}", job.name, field))
    })?;
    parse_timestamp(raw).ok_or_else(|| {
        CollectError::Data(format!(
            "backup {:?}: unparsable {} {:?}",
            job.name, field, raw
        ))
    })
}

fn backend_statistics(payload: Option<&BackendStatisticsPayload>) -> BackendStatistics {
    let Some(stats) = payload else {
        return BackendStatistics::default();
    };
    BackendStatistics {
        duration_seconds: parse_duration_seconds(stats.duration.as_deref()),
        parsed_result: stats.parsed_result.clone().unwrap_or_default(),
        version: stats.version.clone().unwrap_or_default(),
        interrupted: flag(stats.interrupted),
        reported_quota_warning: flag(stats.reported_quota_warning),
        reported_quota_error: flag(stats.reported_quota_error),
        last_backup_date: stats.last_backup_date.as_deref().and_then(parse_timestamp),
        remote_calls: num(stats.remote_calls),
        files_uploaded: num(stats.files_uploaded),
        files_downloaded: num(stats.files_downloaded),
        known_file_count: num(stats.known_file_count),
        known_file_size: num(stats.known_file_size),
        backup_list_count: num(stats.backup_list_count),
        total_quota_space: num(stats.total_quota_space),
        free_quota_space: num(stats.free_quota_space),
        assigned_quota_space: num(stats.assigned_quota_space),
    }
}

/// Builds the canonical record for one backup result.
pub fn normalize_run(
    machine: &Machine,
    job: &BackupJob,
    payload: &RunPayload,
) -> Result<BackupRun, CollectError> {
    let start_time = required_timestamp("BeginTime", payload.begin_time.as_deref(), job)?;
    let end_time = required_timestamp("EndTime", payload.end_time.as_deref(), job)?;
    let warnings_count = num(payload.warnings_actual_length);
    let backend_payload = payload.backend_statistics.as_ref();

    Ok(BackupRun {
        machine_id: machine.id.clone(),
        backup_job_id: job.id.clone(),
        backup_name: job.name.clone(),
        start_time,
        end_time,
        status: derive_status(payload.parsed_result.as_deref(), warnings_count),
        duration_seconds: parse_duration_seconds(payload.duration.as_deref()),
        counts: FileCounts {
            examined_files: num(payload.examined_files),
            opened_files: num(payload.opened_files),
            added_files: num(payload.added_files),
            modified_files: num(payload.modified_files),
            deleted_files: num(payload.deleted_files),
            added_folders: num(payload.added_folders),
            modified_folders: num(payload.modified_folders),
            deleted_folders: num(payload.deleted_folders),
            added_symlinks: num(payload.added_symlinks),
            modified_symlinks: num(payload.modified_symlinks),
            deleted_symlinks: num(payload.deleted_symlinks),
            files_with_error: num(payload.files_with_error),
            too_large_files: num(payload.too_large_files),
            not_processed_files: num(payload.not_processed_files),
        },
        sizes: SizeStats {
            examined_bytes: num(payload.size_of_examined_files),
            added_bytes: num(payload.size_of_added_files),
            modified_bytes: num(payload.size_of_modified_files),
            opened_bytes: num(payload.size_of_opened_files),
            uploaded_bytes: num(backend_payload.and_then(|b| b.bytes_uploaded)),
            downloaded_bytes: num(backend_payload.and_then(|b| b.bytes_downloaded)),
        },
        flags: RunFlags {
            partial: flag(payload.partial_backup),
            dry_run: flag(payload.dryrun),
            interrupted: flag(payload.interrupted),
        },
        version: payload.version.clone().unwrap_or_default(),
        warnings_count,
        errors_count: num(payload.errors_actual_length),
        messages_json: opaque(&payload.messages),
        warnings_json: opaque(&payload.warnings),
        errors_json: opaque(&payload.errors),
        backend: backend_statistics(backend_payload),
    })
}

/// Turns one log entry into a run. Entries that are not backup results give `None`.
pub fn extract_run(
    machine: &Machine,
    job: &BackupJob,
    index: usize,
    entry: &RawLogEntry,
) -> Result<Option<BackupRun>, CollectError> {
    match decode_entry(entry) {
        Ok(payload) => normalize_run(machine, job, &payload).map(Some),
        Err(reason) => {
            debug!(
                "Skipping log entry {} of backup {:?}: {:?}",
                index, job.name, reason
            );
            Ok(None)
        }
    }
}

/// Extracts every backup run of one job, in log order.
pub fn extract_runs(
    machine: &Machine,
    job: &BackupJob,
    entries: &[RawLogEntry],
) -> Result<Vec<BackupRun>, CollectError> {
    let mut runs = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if let Some(run) = extract_run(machine, job, index, entry)? {
            runs.push(run);
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine() -> Machine {
        Machine::new("m-1", "nas01")
    }

    fn job() -> BackupJob {
        BackupJob::new("3", "Documents")
    }

    fn entry(message: Value) -> RawLogEntry {
        RawLogEntry::new(&message.to_string())
    }

    fn backup_message(parsed_result: &str, warnings: i64) -> Value {
        json!({
            "MainOperation": "Backup",
            "ParsedResult": parsed_result,
            "BeginTime": "2024-05-01T08:00:00Z",
            "EndTime": "2024-05-01T08:05:12Z",
            "Duration": "00:05:12.6291557",
            "WarningsActualLength": warnings,
            "ErrorsActualLength": 0,
        })
    }

    #[test]
    fn success_with_warnings_becomes_warning() {
        let runs = extract_runs(&machine(), &job(), &[entry(backup_message("Success", 2))]).unwrap();
        assert_eq!(runs[0].status, BackupStatus::Warning);
        assert_eq!(runs[0].warnings_count, 2);
    }

    #[test]
    fn success_without_warnings_stays_success() {
        let runs = extract_runs(&machine(), &job(), &[entry(backup_message("Success", 0))]).unwrap();
        assert_eq!(runs[0].status, BackupStatus::Success);
    }

    #[test]
    fn other_results_pass_through_even_with_warnings() {
        for (result, expected) in [
            ("Error", BackupStatus::Error),
            ("Fatal", BackupStatus::Fatal),
            ("Warning", BackupStatus::Warning),
            ("Unknown", BackupStatus::Unknown),
        ] {
            let runs =
                extract_runs(&machine(), &job(), &[entry(backup_message(result, 5))]).unwrap();
            assert_eq!(runs[0].status, expected);
        }
        assert_eq!(derive_status(Some("Error"), 0), BackupStatus::Error);
    }

    #[test]
    fn missing_numbers_default_to_zero() {
        let message = json!({
            "MainOperation": "Backup",
            "BeginTime": "2024-05-01T08:00:00Z",
            "EndTime": "2024-05-01T08:00:01Z",
        });
        let run = &extract_runs(&machine(), &job(), &[entry(message)]).unwrap()[0];
        assert_eq!(run.counts, FileCounts::default());
        assert_eq!(run.sizes, SizeStats::default());
        assert_eq!(run.flags, RunFlags::default());
        assert_eq!(run.backend, BackendStatistics::default());
        assert_eq!(run.duration_seconds, 0);
        assert_eq!(run.status, BackupStatus::Unknown);
        assert_eq!(run.version, "");
        assert!(run.messages_json.is_none());
    }

    #[test]
    fn non_backup_and_garbage_entries_are_skipped() {
        let entries = vec![
            entry(json!({"MainOperation": "Compact", "BeginTime": "bad"})),
            entry(json!({"MainOperation": "backup"})),
            RawLogEntry::new("not json at all"),
            RawLogEntry::default(),
            entry(backup_message("Success", 0)),
        ];
        let runs = extract_runs(&machine(), &job(), &entries).unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[test]
    fn decode_reports_skip_reason() {
        let compact = entry(json!({"MainOperation": "Compact"}));
        assert_eq!(
            decode_entry(&compact).unwrap_err(),
            SkipReason::NotBackup(Some("Compact".to_string()))
        );
        assert_eq!(
            decode_entry(&RawLogEntry::default()).unwrap_err(),
            SkipReason::MissingMessage
        );
    }

    #[test]
    fn malformed_begin_time_fails_the_job() {
        let message = json!({
            "MainOperation": "Backup",
            "BeginTime": "01/05/2024 8:00",
            "EndTime": "2024-05-01T08:00:01Z",
        });
        let result = extract_runs(&machine(), &job(), &[entry(message)]);
        assert!(matches!(result, Err(CollectError::Data(_))));
    }

    #[test]
    fn full_payload_is_normalized() {
        let message = json!({
            "MainOperation": "Backup",
            "ParsedResult": "Error",
            "Version": "2.0.8.1 (2.0.8.1_beta_2024-05-07)",
            "BeginTime": "2024-05-01T10:00:00+02:00",
            "EndTime": "2024-05-01T10:30:00+02:00",
            "Duration": "1.02:03:04",
            "ExaminedFiles": 1200,
            "OpenedFiles": 30,
            "AddedFiles": 12,
            "ModifiedFiles": "4",
            "DeletedFiles": 1,
            "AddedFolders": 2,
            "FilesWithError": 3,
            "TooLargeFiles": 0,
            "NotProcessedFiles": 5,
            "SizeOfExaminedFiles": 987654321,
            "SizeOfAddedFiles": 4096,
            "PartialBackup": "True",
            "Dryrun": false,
            "Interrupted": 1,
            "ErrorsActualLength": 3,
            "Messages": ["started", "finished"],
            "Warnings": [],
            "Errors": ["disk full"],
            "BackendStatistics": {
                "BytesUploaded": 2048,
                "BytesDownloaded": 512,
                "KnownFileCount": 40,
                "TotalQuotaSpace": -1,
                "ReportedQuotaWarning": true,
                "LastBackupDate": "2024-04-30T10:00:00+02:00",
                "Duration": "00:00:10",
                "ParsedResult": "Success",
                "Version": "2.0.8.1"
            }
        });
        let run = &extract_runs(&machine(), &job(), &[entry(message)]).unwrap()[0];
        assert_eq!(run.machine_id, "m-1");
        assert_eq!(run.backup_job_id, "3");
        assert_eq!(run.backup_name, "Documents");
        assert_eq!(run.start_time.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert_eq!(run.end_time.to_rfc3339(), "2024-05-01T08:30:00+00:00");
        assert_eq!(run.status, BackupStatus::Error);
        assert_eq!(run.duration_seconds, 93_784);
        assert_eq!(run.counts.examined_files, 1200);
        assert_eq!(run.counts.modified_files, 4);
        assert_eq!(run.counts.not_processed_files, 5);
        assert_eq!(run.sizes.examined_bytes, 987_654_321);
        assert_eq!(run.sizes.uploaded_bytes, 2048);
        assert_eq!(run.sizes.downloaded_bytes, 512);
        assert!(run.flags.partial);
        assert!(!run.flags.dry_run);
        assert!(run.flags.interrupted);
        assert_eq!(run.errors_count, 3);
        assert_eq!(run.messages_json.as_deref(), Some(r#"["started","finished"]"#));
        assert_eq!(run.warnings_json.as_deref(), Some("[]"));
        assert_eq!(run.errors_json.as_deref(), Some(r#"["disk full"]"#));
        assert_eq!(run.backend.known_file_count, 40);
        assert_eq!(run.backend.total_quota_space, -1);
        assert!(run.backend.reported_quota_warning);
        assert!(!run.backend.reported_quota_error);
        assert_eq!(run.backend.duration_seconds, 10);
        assert_eq!(run.backend.parsed_result, "Success");
        assert_eq!(
            run.backend.last_backup_date.map(|d| d.to_rfc3339()),
            Some("2024-04-30T08:00:00+00:00".to_string())
        );
    }
}
