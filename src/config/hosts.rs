use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::validation;

/// How the browser-supplied credential is interpreted for a host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// The credential is the account password
    Password,
    /// The credential is a PEM/OpenSSH private key
    Key,
}

impl AuthKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthKind::Password => "password",
            AuthKind::Key => "key",
        }
    }
}

fn default_port() -> u16 {
    22
}

/// A saved SSH target owned by one user.
///
/// `encrypted_credential` and `credential_iv` are opaque to the proxy: they
/// are carried for the browser, which holds the key that decrypts them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub auth_kind: AuthKind,
    #[serde(default)]
    pub encrypted_credential: String,
    #[serde(default)]
    pub credential_iv: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Host {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        hostname: impl Into<String>,
        username: impl Into<String>,
        auth_kind: AuthKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            hostname: hostname.into(),
            port: default_port(),
            username: username.into(),
            auth_kind,
            encrypted_credential: String::new(),
            credential_iv: String::new(),
            tags: Vec::new(),
            icon: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `hostname:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

/// Root of the hosts inventory file (`[[hosts]]` tables).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostsFile {
    #[serde(default)]
    pub hosts: Vec<Host>,
}

impl HostsFile {
    /// Load and validate an inventory file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file = Self::parse(&content)?;
        tracing::info!(path = %path.display(), hosts = file.hosts.len(), "Loaded host inventory");
        Ok(file)
    }

    /// Parse inventory text. Unknown `auth_kind` values fail here, so a host
    /// with an unusable credential kind never reaches a session.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: HostsFile = toml::from_str(content)?;

        let mut seen = HashSet::new();
        for host in &file.hosts {
            validation::validate_host(host).map_err(|source| ConfigError::InvalidHost {
                name: host.name.clone(),
                source,
            })?;
            if !seen.insert(host.id) {
                return Err(ConfigError::DuplicateHost(host.id));
            }
        }

        Ok(file)
    }
}
