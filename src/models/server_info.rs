use serde::Deserialize;
use serde_with::{serde_as, DefaultOnError};

pub const MACHINE_ID_OPTION: &str = "machine-id";

/// `GET /api/v1/systeminfo` body, reduced to what identifies the machine.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default)]
    machine_name: Option<String>,
    #[serde(default)]
    options: Vec<SystemOption>,
}

/// Option values are not always strings; anything else counts as absent.
#[serde_as]
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemOption {
    name: String,
    #[serde_as(as = "DefaultOnError")]
    default_value: Option<String>,
}

impl SystemInfo {
    pub fn get_machine_name(&self) -> Option<&str> {
        self.machine_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.name == name)
            .and_then(|option| option.default_value.as_deref())
    }
    pub fn get_machine_id(&self) -> Option<&str> {
        self.option_value(MACHINE_ID_OPTION)
            .filter(|id| !id.is_empty())
    }
}
