use std::fmt;

use async_trait::async_trait;
use human_bytes::human_bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api_client::ApiClient;
use crate::conf::{ServerTarget, TargetSettings};
use crate::error::CollectError;
use crate::extract::extract_run;
use crate::inventory;
use crate::log_retriever;
use crate::models::backup_job::BackupJob;
use crate::models::log_entry::RawLogEntry;
use crate::models::machine::Machine;
use crate::session::{self, Session};
use crate::store::BackupStore;

/// Remote side of a collection: everything the collector asks the backup server.
#[async_trait]
pub trait BackupSource: Send + Sync {
    async fn authenticate(&self, password: &str) -> Result<Session, CollectError>;
    async fn machine_info(&self, session: &Session) -> Result<Machine, CollectError>;
    async fn list_backup_jobs(&self, session: &Session) -> Result<Vec<BackupJob>, CollectError>;
    async fn log_entries(
        &self,
        session: &Session,
        job_id: &str,
    ) -> Result<Vec<RawLogEntry>, CollectError>;
}

#[async_trait]
impl BackupSource for ApiClient {
    async fn authenticate(&self, password: &str) -> Result<Session, CollectError> {
        session::authenticate(self, password).await
    }
    async fn machine_info(&self, session: &Session) -> Result<Machine, CollectError> {
        inventory::machine_info(self, session).await
    }
    async fn list_backup_jobs(&self, session: &Session) -> Result<Vec<BackupJob>, CollectError> {
        inventory::list_backup_jobs(self, session).await
    }
    async fn log_entries(
        &self,
        session: &Session,
        job_id: &str,
    ) -> Result<Vec<RawLogEntry>, CollectError> {
        log_retriever::log_entries(self, session, job_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Idle,
    Authenticating,
    FetchingInventory,
    NoBackups,
    ProcessingJobs,
    Done,
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionState::Idle => "idle",
            CollectionState::Authenticating => "authenticating",
            CollectionState::FetchingInventory => "fetching_inventory",
            CollectionState::NoBackups => "no_backups",
            CollectionState::ProcessingJobs => "processing_jobs",
            CollectionState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionResult {
    pub processed_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
}

impl CollectionResult {
    fn absorb(&mut self, outcome: &JobOutcome) {
        self.processed_count += outcome.processed;
        self.skipped_count += outcome.skipped;
        if outcome.error.is_some() {
            self.error_count += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionOutcome {
    /// The server lists no backup jobs at all.
    NoBackups { machine: Machine },
    Completed(CollectionResult),
}

/// What one job contributed. Runs stored before a failure still count.
#[derive(Debug, Default)]
pub struct JobOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub error: Option<CollectError>,
}

pub struct Collector<'a, S: BackupSource, T: BackupStore> {
    source: &'a S,
    store: &'a T,
    state: CollectionState,
}

impl<'a, S: BackupSource, T: BackupStore> Collector<'a, S, T> {
    pub fn new(source: &'a S, store: &'a T) -> Self {
        Self {
            source,
            store,
            state: CollectionState::Idle,
        }
    }

    pub fn get_state(&self) -> CollectionState {
        self.state
    }

    fn transition(&mut self, next: CollectionState) {
        debug!("Collection state {} -> {}", self.state, next);
        self.state = next;
    }

    pub async fn run(&mut self, password: &str) -> Result<CollectionOutcome, CollectError> {
        self.transition(CollectionState::Authenticating);
        let session = self.source.authenticate(password).await?;

        self.transition(CollectionState::FetchingInventory);
        let machine = self.source.machine_info(&session).await?;
        self.store.upsert_machine(&machine).await?;
        let jobs = self.source.list_backup_jobs(&session).await?;

        if jobs.is_empty() {
            self.transition(CollectionState::NoBackups);
            info!("No backups found on machine {}", machine.name);
            return Ok(CollectionOutcome::NoBackups { machine });
        }

        self.transition(CollectionState::ProcessingJobs);
        let mut result = CollectionResult::default();
        for job in &jobs {
            let outcome = self.process_job(&session, &machine, job).await;
            if let Some(error) = &outcome.error {
                warn!("Backup {:?} (id={}) failed: {}", job.name, job.id, error);
            }
            result.absorb(&outcome);
        }

        self.transition(CollectionState::Done);
        info!(
            "Collection finished for {}: processed={}, skipped={}, errors={}",
            machine.name, result.processed_count, result.skipped_count, result.error_count
        );
        Ok(CollectionOutcome::Completed(result))
    }

    pub async fn process_job(
        &self,
        session: &Session,
        machine: &Machine,
        job: &BackupJob,
    ) -> JobOutcome {
        let mut outcome = JobOutcome::default();

        let entries = match self.source.log_entries(session, &job.id).await {
            Ok(entries) => entries,
            Err(e) => {
                outcome.error = Some(e);
                return outcome;
            }
        };

        for (index, entry) in entries.iter().enumerate() {
            let run = match extract_run(machine, job, index, entry) {
                Ok(Some(run)) => run,
                Ok(None) => continue,
                Err(e) => {
                    outcome.error = Some(e);
                    return outcome;
                }
            };
            let (machine_id, backup_name, start_time) = run.dedup_key();
            match self
                .store
                .backup_run_exists(machine_id, backup_name, &start_time)
                .await
            {
                Ok(true) => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    outcome.error = Some(e.into());
                    return outcome;
                }
            }

            match self.store.insert_backup_run(&run).await {
                Ok(true) => {
                    outcome.processed += 1;
                    debug!(
                        "Stored run {:?} started {} status={} uploaded={}",
                        run.backup_name,
                        run.start_time,
                        run.status,
                        human_bytes(run.sizes.uploaded_bytes.max(0) as f64)
                    );
                }
                // lost a race with a concurrent collection; the unique constraint held
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    outcome.error = Some(e.into());
                    return outcome;
                }
            }
        }

        outcome
    }
}

/// One collection invocation against one remote server.
///
/// Configuration problems are reported before any network traffic.
pub async fn collect<T: BackupStore>(
    settings: &TargetSettings,
    password: &str,
    store: &T,
) -> Result<CollectionOutcome, CollectError> {
    let target = ServerTarget::from_settings(settings)?;
    if password.is_empty() {
        return Err(CollectError::Configuration(
            "password must be set".to_string(),
        ));
    }
    info!("Collecting backups from {}", target.base_url());
    let client = ApiClient::new(target)?;
    Collector::new(&client, store).run(password).await
}
