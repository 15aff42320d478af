//! Validation for host records, whether loaded from the inventory file or
//! submitted over the hosts API, and for the allowed-origin list.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::hosts::Host;

/// Validation error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

static DNS_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").unwrap());

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_.-]{0,31}$").unwrap());

static ORIGIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/\s?#]+$").unwrap());

/// Validate every field of a host inventory entry.
///
/// # Errors
///
/// Returns the first field that fails validation.
pub fn validate_host(host: &Host) -> Result<(), ValidationError> {
    if host.name.trim().is_empty() {
        return Err(ValidationError::new("name", "Display name is required"));
    }
    if host.owner_id.trim().is_empty() {
        return Err(ValidationError::new("owner_id", "Owner is required"));
    }
    validate_hostname(&host.hostname)?;
    validate_port(host.port)?;
    validate_username(&host.username)
}

/// Validate a hostname (DNS name or IP address).
///
/// # Errors
///
/// Returns `ValidationError` if the hostname is empty, too long, or malformed.
pub fn validate_hostname(hostname: &str) -> Result<(), ValidationError> {
    let hostname = hostname.trim();

    if hostname.is_empty() {
        return Err(ValidationError::new("hostname", "Hostname is required"));
    }

    // DNS max is 253 characters
    if hostname.len() > 253 {
        return Err(ValidationError::new(
            "hostname",
            "Hostname exceeds maximum length of 253 characters",
        ));
    }

    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    for label in hostname.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ValidationError::new(
                "hostname",
                "Hostname labels must be 1-63 characters",
            ));
        }
        if !DNS_LABEL_REGEX.is_match(label) {
            return Err(ValidationError::new(
                "hostname",
                format!("Invalid hostname label '{label}'"),
            ));
        }
    }

    Ok(())
}

/// Port 0 is never dialable.
pub fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::new(
            "port",
            "Port must be between 1 and 65535",
        ));
    }
    Ok(())
}

/// Validate the remote login name. Unlike an interactive client there is no
/// local account to fall back on, so an empty name is rejected.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::new("username", "Username is required"));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::new(
            "username",
            "Username must start with letter or underscore, and contain only alphanumeric, dot, underscore, or hyphen (max 32)",
        ));
    }

    Ok(())
}

/// Validate a browser origin as it appears in the `Origin` header,
/// e.g. `https://console.example.com:8443`.
pub fn validate_origin(origin: &str) -> Result<(), ValidationError> {
    if !ORIGIN_REGEX.is_match(origin) {
        return Err(ValidationError::new(
            "allowed_origins",
            format!("'{origin}' is not a scheme://host[:port] origin"),
        ));
    }
    Ok(())
}
