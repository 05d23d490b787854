use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError, DisplayFromStr, PickFirst};

/// One item of `GET /api/v1/backup/{id}/log`. Only the embedded message matters.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RawLogEntry {
    #[serde(default)]
    pub message: Option<String>,
}

impl RawLogEntry {
    pub fn new(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
        }
    }
}

/// Two-valued flag decoded from whatever the server happened to send:
/// bool, number (non-zero is true) or text ("true"/"1", any case).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flag(pub bool);

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let flag = match value {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            _ => false,
        };
        Ok(Flag(flag))
    }
}

/// Decoded `Message` of a log entry. Every field carries its own presence;
/// defaults are applied once, when the payload becomes a `BackupRun`.
#[serde_as]
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct RunPayload {
    #[serde_as(as = "DefaultOnError")]
    pub main_operation: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub parsed_result: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub version: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub begin_time: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub end_time: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub duration: Option<String>,

    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub examined_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub opened_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub added_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub modified_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub deleted_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub added_folders: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub modified_folders: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub deleted_folders: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub added_symlinks: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub modified_symlinks: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub deleted_symlinks: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub files_with_error: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub too_large_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub not_processed_files: Option<i64>,

    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub size_of_examined_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub size_of_added_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub size_of_modified_files: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub size_of_opened_files: Option<i64>,

    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub warnings_actual_length: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub errors_actual_length: Option<i64>,

    pub partial_backup: Option<Flag>,
    #[serde(rename = "Dryrun")]
    pub dryrun: Option<Flag>,
    pub interrupted: Option<Flag>,

    pub messages: Option<Value>,
    pub warnings: Option<Value>,
    pub errors: Option<Value>,

    #[serde_as(as = "DefaultOnError")]
    pub backend_statistics: Option<BackendStatisticsPayload>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct BackendStatisticsPayload {
    #[serde_as(as = "DefaultOnError")]
    pub parsed_result: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub version: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub duration: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub last_backup_date: Option<String>,

    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub remote_calls: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub bytes_uploaded: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub bytes_downloaded: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub files_uploaded: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub files_downloaded: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub known_file_count: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub known_file_size: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub backup_list_count: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub total_quota_space: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub free_quota_space: Option<i64>,
    #[serde_as(as = "DefaultOnError<Option<PickFirst<(_, DisplayFromStr)>>>")]
    pub assigned_quota_space: Option<i64>,

    pub interrupted: Option<Flag>,
    pub reported_quota_warning: Option<Flag>,
    pub reported_quota_error: Option<Flag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_loose_representations() {
        let flags: Vec<Flag> =
            serde_json::from_str(r#"[true, false, 1, 0, "True", "false", "1", null, {}]"#).unwrap();
        let values: Vec<bool> = flags.into_iter().map(|f| f.0).collect();
        assert_eq!(
            values,
            vec![true, false, true, false, true, false, true, false, false]
        );
    }

    #[test]
    fn numbers_accept_numeric_strings_and_drop_garbage() {
        let payload: RunPayload = serde_json::from_str(
            r#"{"AddedFiles": "42", "DeletedFiles": 7, "ModifiedFiles": "lots", "OpenedFiles": null}"#,
        )
        .unwrap();
        assert_eq!(payload.added_files, Some(42));
        assert_eq!(payload.deleted_files, Some(7));
        assert_eq!(payload.modified_files, None);
        assert_eq!(payload.opened_files, None);
        assert_eq!(payload.examined_files, None);
    }

    #[test]
    fn dryrun_uses_server_spelling() {
        let payload: RunPayload = serde_json::from_str(r#"{"Dryrun": true}"#).unwrap();
        assert_eq!(payload.dryrun, Some(Flag(true)));
    }

    #[test]
    fn malformed_backend_statistics_is_absent() {
        let payload: RunPayload =
            serde_json::from_str(r#"{"MainOperation": "Backup", "BackendStatistics": "n/a"}"#)
                .unwrap();
        assert_eq!(payload.main_operation.as_deref(), Some("Backup"));
        assert!(payload.backend_statistics.is_none());
    }
}
