use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use twelf::config;
use twelf::reexports::serde::{Deserialize, Serialize};

use crate::error::CollectError;

pub const DEFAULT_PORT: u16 = 8200;
pub const ENV_PREFIX: &str = "BACKUP_MONITOR_";

#[config]
#[derive(Debug, Default)]
pub struct Config {
    #[serde(default)]
    hostname: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_scheme")]
    scheme: String,
    #[serde(default)]
    allow_self_signed: bool,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_database")]
    database: PathBuf,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_scheme() -> String {
    Scheme::Http.as_str().to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("backup-monitor.db")
}

impl Config {
    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }
    pub fn get_database(&self) -> &PathBuf {
        &self.database
    }
    pub fn target_settings(&self) -> TargetSettings {
        TargetSettings {
            hostname: self.hostname.clone(),
            port: self.port,
            scheme: self.scheme.clone(),
            allow_self_signed: self.allow_self_signed,
        }
    }
}

/// Remote server coordinates as typed by the operator, before validation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TargetSettings {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub allow_self_signed: bool,
}

impl TargetSettings {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port: DEFAULT_PORT,
            scheme: default_scheme(),
            allow_self_signed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl FromStr for Scheme {
    type Err = CollectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(CollectError::Configuration(format!(
                "invalid scheme {:?}, expected \"http\" or \"https\"",
                other
            ))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated remote backup server, immutable for the whole invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    hostname: String,
    port: u16,
    scheme: Scheme,
    allow_self_signed: bool,
}

impl ServerTarget {
    pub fn from_settings(settings: &TargetSettings) -> Result<Self, CollectError> {
        let hostname = settings.hostname.trim();
        if hostname.is_empty() {
            return Err(CollectError::Configuration(
                "hostname must be set".to_string(),
            ));
        }
        let scheme = settings.scheme.trim().parse::<Scheme>()?;
        Ok(Self {
            hostname: hostname.to_string(),
            port: settings.port,
            scheme,
            allow_self_signed: settings.allow_self_signed,
        })
    }

    pub fn get_hostname(&self) -> &str {
        &self.hostname
    }
    pub fn get_port(&self) -> u16 {
        self.port
    }
    pub fn get_scheme(&self) -> Scheme {
        self.scheme
    }
    pub fn is_allow_self_signed(&self) -> bool {
        self.allow_self_signed
    }
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.hostname, self.port)
    }
}
