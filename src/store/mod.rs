//! Per-owner host inventory and the session audit trail.

pub mod memory;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Host;
use crate::error::StoreError;

pub use memory::MemoryStore;

/// One terminal session, from confirmed shell to close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub host_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub client_addr: String,
}

/// Listing row for the admin endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub record: SessionRecord,
    /// Display name of the host, if it still exists
    pub host_name: Option<String>,
}

pub trait SessionStore: Send + Sync {
    /// Host `host_id` if and only if it belongs to `owner_id`. A host owned
    /// by someone else is reported exactly like a missing one.
    fn get_host_by_id<'a>(
        &'a self,
        host_id: Uuid,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<Host, StoreError>>;

    /// Hosts owned by `owner_id`, most recently created first.
    fn list_hosts<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<Vec<Host>, StoreError>>;

    fn create_host(&self, host: Host) -> BoxFuture<'_, Result<Host, StoreError>>;

    /// Replace the editable fields of the host with `host.id`, if it belongs
    /// to `host.owner_id`. `created_at` is kept and `updated_at` refreshed.
    fn update_host(&self, host: Host) -> BoxFuture<'_, Result<Host, StoreError>>;

    /// Remove a host the owner holds. Removing a missing or foreign host is
    /// a no-op.
    fn delete_host<'a>(
        &'a self,
        host_id: Uuid,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn create_session_record<'a>(
        &'a self,
        owner_id: &'a str,
        host_id: Uuid,
        client_addr: &'a str,
    ) -> BoxFuture<'a, Result<SessionRecord, StoreError>>;

    /// Set the end time. Closing an already closed record is an error.
    fn close_session_record(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Most recent first.
    fn list_session_records(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>, StoreError>>;
}
