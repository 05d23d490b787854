pub mod backup_job;
pub mod backup_run;
pub mod log_entry;
pub mod machine;
pub mod server_info;
