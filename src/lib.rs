//! Backup collection pipeline for a Duplicati-style remote backup server.
//!
//! One invocation of [`collect`] logs in, reads the machine identity and the
//! list of backup jobs, pulls each job's operation log, normalizes every
//! backup result into a [`BackupRun`] and stores the ones not seen before.
//!
//! - `api_client` - HTTP plumbing and per-target TLS trust
//! - `session` - password login
//! - `inventory` - machine identity and backup jobs
//! - `log_retriever` - per-job log page
//! - `extract` - log entry to `BackupRun` normalization
//! - `store` - SQLite persistence and the dedup lookup
//! - `collector` - orchestration and the processed/skipped/error tally

pub mod api_client;
pub mod collector;
pub mod conf;
pub mod error;
pub mod extract;
pub mod inventory;
pub mod log_retriever;
pub mod models;
pub mod session;
pub mod store;
pub mod utils;

pub use collector::{collect, BackupSource, CollectionOutcome, CollectionResult, Collector};
pub use conf::{Config, Scheme, ServerTarget, TargetSettings};
pub use error::{CollectError, StoreError};
pub use models::backup_run::{BackupRun, BackupStatus};
pub use models::machine::Machine;
pub use store::{BackupStore, SqliteStore};
