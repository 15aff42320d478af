use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation;

pub const BIND_ENV: &str = "SHELLGATE_BIND";
pub const ORIGINS_ENV: &str = "SHELLGATE_ALLOWED_ORIGINS";

/// Root of `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Host inventory; defaults to `hosts.toml` next to the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
    /// Close a stream after this long without client input. 0 disables.
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_origins(),
            idle_timeout_secs: 0,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_timeout")]
    pub connection_timeout_secs: u64,
    /// 0 disables keepalives
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    /// Upper bound for a single `get`, which is buffered in memory
    #[serde(default = "default_max_transfer")]
    pub max_transfer_bytes: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_timeout(),
            keepalive_interval_secs: default_keepalive(),
            host_key_policy: HostKeyPolicy::default(),
            max_transfer_bytes: default_max_transfer(),
        }
    }
}

fn default_timeout() -> u64 {
    15
}

fn default_keepalive() -> u64 {
    60
}

fn default_max_transfer() -> u64 {
    64 * 1024 * 1024
}

/// How remote host keys are checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents
    #[default]
    AcceptAny,
    /// Require the key to be listed in an OpenSSH known_hosts file
    KnownHosts { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

/// A bearer token accepted by the static identity provider. Only the
/// SHA-256 digest of the token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token_sha256: String,
    pub user_id: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl ServerConfig {
    /// Load from `path`, or from the default location. A missing file yields
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(super::paths::config_file);

        let mut config = match path {
            Some(path) if path.exists() => {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
                        path: path.clone(),
                        source: e,
                    })?;
                let mut config: ServerConfig = toml::from_str(&content)?;
                if config.hosts_file.is_none() {
                    config.hosts_file = path.parent().map(|dir| dir.join("hosts.toml"));
                }
                tracing::info!(path = %path.display(), "Loaded config");
                config
            }
            _ => {
                tracing::info!("No config file found, using defaults");
                ServerConfig {
                    hosts_file: super::paths::hosts_file(),
                    ..ServerConfig::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHELLGATE_BIND` and `SHELLGATE_ALLOWED_ORIGINS` (comma separated).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bind) = lookup(BIND_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
        if let Some(raw) = lookup(ORIGINS_ENV) {
            self.server.allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "server.bind".to_string(),
                reason: e.to_string(),
            })?;

        for origin in &self.server.allowed_origins {
            validation::validate_origin(origin).map_err(|e| ConfigError::InvalidValue {
                key: "server.allowed_origins".to_string(),
                reason: e.message,
            })?;
        }

        for grant in &self.identity.tokens {
            let valid = data_encoding::HEXLOWER_PERMISSIVE
                .decode(grant.token_sha256.as_bytes())
                .is_ok_and(|digest| digest.len() == 32);
            if !valid {
                return Err(ConfigError::InvalidValue {
                    key: "identity.tokens.token_sha256".to_string(),
                    reason: format!("not a SHA-256 hex digest (user {})", grant.user_id),
                });
            }
        }

        if self.ssh.connection_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ssh.connection_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connection_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.server.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.server.idle_timeout_secs))
    }
}
