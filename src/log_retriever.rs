use tracing::debug;

use crate::api_client::ApiClient;
use crate::error::CollectError;
use crate::models::log_entry::RawLogEntry;
use crate::session::Session;

/// One page, sized past any realistic job history. Older entries beyond it
/// are not reachable; there is no paging loop.
pub const LOG_PAGE_SIZE: usize = 999;

pub fn log_path(job_id: &str) -> String {
    format!("/api/v1/backup/{}/log?pagesize={}", job_id, LOG_PAGE_SIZE)
}

pub async fn log_entries(
    client: &ApiClient,
    session: &Session,
    job_id: &str,
) -> Result<Vec<RawLogEntry>, CollectError> {
    let response = client.get(&log_path(job_id), session).await?;
    if !response.is_success() {
        return Err(CollectError::Fetch(format!(
            "log request for backup {} failed with status {}",
            job_id,
            response.get_status()
        )));
    }
    let entries = response
        .json::<Vec<RawLogEntry>>()
        .map_err(|e| CollectError::Data(format!("malformed log list for backup {job_id}: {e}")))?;
    debug!("Backup {} returned {} log entries", job_id, entries.len());
    Ok(entries)
}
