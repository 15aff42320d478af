//! Saved hosts, scoped to the calling user.
//!
//! The encrypted credential and its IV are checked for shape only. The
//! proxy never holds the key that opens them.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use data_encoding::BASE64;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::{AuthKind, Host};
use crate::error::StoreError;
use crate::proxy::gate::HOST_NOT_FOUND;
use crate::security_log;
use crate::validation;

use super::{AppState, Caller, json_error};

/// Nonce length of the browser's AES-GCM credential encryption.
pub const CREDENTIAL_IV_LEN: usize = 12;

/// Body of `POST /api/hosts` and `PUT /api/hosts/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HostRequest {
    pub name: String,
    pub hostname: String,
    /// 0 means 22
    pub port: u16,
    pub username: String,
    pub auth_kind: String,
    /// Standard base64
    pub encrypted_credential: String,
    /// Standard base64, [`CREDENTIAL_IV_LEN`] bytes once decoded
    pub credential_iv: String,
    pub tags: Vec<String>,
    pub icon: Option<String>,
}

impl HostRequest {
    /// Build the host this request describes. The error is the text for the
    /// client.
    pub fn into_host(self, id: Uuid, owner_id: &str) -> Result<Host, String> {
        for (field, value) in [
            ("name", &self.name),
            ("hostname", &self.hostname),
            ("username", &self.username),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} is required"));
            }
        }
        let auth_kind = match self.auth_kind.as_str() {
            "password" => AuthKind::Password,
            "key" => AuthKind::Key,
            _ => return Err("auth_kind must be 'password' or 'key'".to_string()),
        };
        if self.encrypted_credential.is_empty() {
            return Err("encrypted_credential is required".to_string());
        }
        if self.credential_iv.is_empty() {
            return Err("credential_iv is required".to_string());
        }
        BASE64
            .decode(self.encrypted_credential.as_bytes())
            .map_err(|_| "invalid encrypted_credential encoding".to_string())?;
        let iv = BASE64
            .decode(self.credential_iv.as_bytes())
            .map_err(|_| "invalid credential_iv encoding".to_string())?;
        if iv.len() != CREDENTIAL_IV_LEN {
            return Err(format!("credential_iv must be {CREDENTIAL_IV_LEN} bytes"));
        }

        let mut host = Host::new(
            owner_id,
            self.name.trim(),
            self.hostname.trim(),
            self.username.trim(),
            auth_kind,
        );
        host.id = id;
        if self.port != 0 {
            host.port = self.port;
        }
        host.encrypted_credential = self.encrypted_credential;
        host.credential_iv = self.credential_iv;
        host.tags = self.tags;
        host.icon = self.icon.filter(|icon| !icon.is_empty());

        validation::validate_host(&host).map_err(|e| e.to_string())?;
        Ok(host)
    }
}

fn request_host(
    body: Result<Json<HostRequest>, JsonRejection>,
    id: Uuid,
    owner_id: &str,
) -> Result<Host, Response> {
    let Json(request) = body.map_err(|e| {
        tracing::debug!("Rejecting host body: {}", e);
        json_error(StatusCode::BAD_REQUEST, "invalid request body")
    })?;
    request
        .into_host(id, owner_id)
        .map_err(|message| json_error(StatusCode::BAD_REQUEST, &message))
}

fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, HOST_NOT_FOUND)
}

fn store_failure(e: StoreError) -> Response {
    tracing::error!("Host store failed: {}", e);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

pub async fn list(Caller(caller): Caller, State(state): State<AppState>) -> Response {
    match state.proxy.store.list_hosts(&caller.user_id).await {
        Ok(hosts) => Json(hosts).into_response(),
        Err(e) => store_failure(e),
    }
}

pub async fn create(
    Caller(caller): Caller,
    State(state): State<AppState>,
    body: Result<Json<HostRequest>, JsonRejection>,
) -> Response {
    let host = match request_host(body, Uuid::new_v4(), &caller.user_id) {
        Ok(host) => host,
        Err(response) => return response,
    };

    match state.proxy.store.create_host(host).await {
        Ok(host) => {
            security_log::log_host_changed(&caller.user_id, host.id, "created");
            (StatusCode::CREATED, Json(host)).into_response()
        }
        Err(e) => store_failure(e),
    }
}

/// Ids that do not parse are reported like any other unknown host.
pub async fn get_one(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found();
    };

    match state.proxy.store.get_host_by_id(id, &caller.user_id).await {
        Ok(host) => Json(host).into_response(),
        Err(StoreError::NotFound) => not_found(),
        Err(e) => store_failure(e),
    }
}

pub async fn update(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<HostRequest>, JsonRejection>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return not_found();
    };
    let host = match request_host(body, id, &caller.user_id) {
        Ok(host) => host,
        Err(response) => return response,
    };

    match state.proxy.store.update_host(host).await {
        Ok(host) => {
            security_log::log_host_changed(&caller.user_id, host.id, "updated");
            Json(host).into_response()
        }
        Err(StoreError::NotFound) => not_found(),
        Err(e) => store_failure(e),
    }
}

/// Always 204 unless the store fails, whether or not the caller held the
/// host.
pub async fn delete(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match state.proxy.store.delete_host(id, &caller.user_id).await {
        Ok(()) => {
            security_log::log_host_changed(&caller.user_id, id, "deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_failure(e),
    }
}
