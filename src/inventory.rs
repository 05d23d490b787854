use tracing::info;

use crate::api_client::ApiClient;
use crate::error::CollectError;
use crate::models::backup_job::{BackupJob, BackupListItem};
use crate::models::machine::Machine;
use crate::models::server_info::{SystemInfo, MACHINE_ID_OPTION};
use crate::session::Session;

pub const SYSTEM_INFO_PATH: &str = "/api/v1/systeminfo";
pub const BACKUPS_PATH: &str = "/api/v1/backups";

pub async fn machine_info(client: &ApiClient, session: &Session) -> Result<Machine, CollectError> {
    let response = client.get(SYSTEM_INFO_PATH, session).await?;
    if !response.is_success() {
        return Err(CollectError::Data(format!(
            "system info request failed with status {}",
            response.get_status()
        )));
    }
    let info = response
        .json::<SystemInfo>()
        .map_err(|e| CollectError::Data(format!("malformed system info: {e}")))?;
    machine_from_system_info(&info)
}

pub fn machine_from_system_info(info: &SystemInfo) -> Result<Machine, CollectError> {
    let name = info
        .get_machine_name()
        .ok_or_else(|| CollectError::Data("system info has no machine name".to_string()))?;
    let id = info.get_machine_id().ok_or_else(|| {
        CollectError::Data(format!(
            "system info has no {:?} option",
            MACHINE_ID_OPTION
        ))
    })?;
    info!("Remote machine {} (id={})", name, id);
    Ok(Machine::new(id, name))
}

pub async fn list_backup_jobs(
    client: &ApiClient,
    session: &Session,
) -> Result<Vec<BackupJob>, CollectError> {
    let response = client.get(BACKUPS_PATH, session).await?;
    if !response.is_success() {
        return Err(CollectError::Data(format!(
            "backup list request failed with status {}",
            response.get_status()
        )));
    }
    let items = response
        .json::<Vec<BackupListItem>>()
        .map_err(|e| CollectError::Data(format!("malformed backup list: {e}")))?;
    let jobs = items.into_iter().map(BackupJob::from).collect::<Vec<_>>();
    info!("Remote server lists {} backup job(s)", jobs.len());
    Ok(jobs)
}
