use serde::{Deserialize, Serialize};

/// One configured backup definition, as listed by `GET /api/v1/backups`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub id: String,
    pub name: String,
}

impl BackupJob {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Wire shape: each list item wraps the job under `Backup`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupListItem {
    pub backup: BackupDescriptor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupDescriptor {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
}

impl From<BackupListItem> for BackupJob {
    fn from(item: BackupListItem) -> Self {
        Self {
            id: item.backup.id,
            name: item.backup.name,
        }
    }
}
