use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::Host;
use crate::error::StoreError;

use super::{SessionRecord, SessionStore, SessionSummary};

const DEFAULT_RETENTION: usize = 10_000;

/// In-process store, seeded from the host inventory file.
///
/// Closed session history is bounded: once `retention` records exist, the
/// oldest closed record is evicted to make room. Open records are never
/// evicted, so while every retained record is still open the history grows
/// past `retention` until sessions end.
pub struct MemoryStore {
    hosts: RwLock<HashMap<Uuid, Host>>,
    sessions: RwLock<VecDeque<SessionRecord>>,
    retention: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            sessions: RwLock::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    pub fn with_hosts(hosts: impl IntoIterator<Item = Host>) -> Self {
        let store = Self::new();
        for host in hosts {
            store.insert_host(host);
        }
        store
    }

    pub fn insert_host(&self, host: Host) {
        self.hosts.write().insert(host.id, host);
    }

    pub fn host_count(&self) -> usize {
        self.hosts.read().len()
    }

    /// Snapshot of one record, for inspection.
    pub fn session(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.sessions
            .read()
            .iter()
            .find(|r| r.id == session_id)
            .cloned()
    }

    fn lookup(&self, host_id: Uuid, owner_id: &str) -> Result<Host, StoreError> {
        self.hosts
            .read()
            .get(&host_id)
            .filter(|host| host.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn hosts_of(&self, owner_id: &str) -> Vec<Host> {
        let mut hosts: Vec<Host> = self
            .hosts
            .read()
            .values()
            .filter(|host| host.owner_id == owner_id)
            .cloned()
            .collect();
        hosts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hosts
    }

    fn add_host(&self, host: Host) -> Result<Host, StoreError> {
        let mut hosts = self.hosts.write();
        if hosts.contains_key(&host.id) {
            return Err(StoreError::Conflict(host.id));
        }
        hosts.insert(host.id, host.clone());
        Ok(host)
    }

    fn replace_host(&self, mut host: Host) -> Result<Host, StoreError> {
        let mut hosts = self.hosts.write();
        let current = hosts
            .get_mut(&host.id)
            .filter(|current| current.owner_id == host.owner_id)
            .ok_or(StoreError::NotFound)?;
        host.created_at = current.created_at;
        host.updated_at = Utc::now();
        *current = host.clone();
        Ok(host)
    }

    fn remove_host(&self, host_id: Uuid, owner_id: &str) {
        let mut hosts = self.hosts.write();
        if hosts.get(&host_id).is_some_and(|host| host.owner_id == owner_id) {
            hosts.remove(&host_id);
        }
    }

    fn create(&self, owner_id: &str, host_id: Uuid, client_addr: &str) -> SessionRecord {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            host_id,
            started_at: Utc::now(),
            ended_at: None,
            client_addr: client_addr.to_string(),
        };

        let mut sessions = self.sessions.write();
        if sessions.len() >= self.retention {
            match sessions.iter().position(|r| r.ended_at.is_some()) {
                Some(idx) => {
                    sessions.remove(idx);
                }
                None => tracing::warn!(
                    retention = self.retention,
                    open = sessions.len(),
                    "Session history over retention; all records still open"
                ),
            }
        }
        sessions.push_back(record.clone());
        record
    }

    fn close(&self, session_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        let record = sessions
            .iter_mut()
            .find(|r| r.id == session_id)
            .ok_or(StoreError::NotFound)?;
        if record.ended_at.is_some() {
            return Err(StoreError::AlreadyClosed(session_id));
        }
        record.ended_at = Some(ended_at);
        Ok(())
    }

    fn list(&self, limit: usize) -> Vec<SessionSummary> {
        let hosts = self.hosts.read();
        let mut records: Vec<SessionRecord> = self.sessions.read().iter().cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
            .into_iter()
            .take(limit)
            .map(|record| SessionSummary {
                host_name: hosts.get(&record.host_id).map(|h| h.name.clone()),
                record,
            })
            .collect()
    }
}

impl SessionStore for MemoryStore {
    fn get_host_by_id<'a>(
        &'a self,
        host_id: Uuid,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<Host, StoreError>> {
        ready(self.lookup(host_id, owner_id)).boxed()
    }

    fn list_hosts<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<Vec<Host>, StoreError>> {
        ready(Ok(self.hosts_of(owner_id))).boxed()
    }

    fn create_host(&self, host: Host) -> BoxFuture<'_, Result<Host, StoreError>> {
        ready(self.add_host(host)).boxed()
    }

    fn update_host(&self, host: Host) -> BoxFuture<'_, Result<Host, StoreError>> {
        ready(self.replace_host(host)).boxed()
    }

    fn delete_host<'a>(
        &'a self,
        host_id: Uuid,
        owner_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        self.remove_host(host_id, owner_id);
        ready(Ok(())).boxed()
    }

    fn create_session_record<'a>(
        &'a self,
        owner_id: &'a str,
        host_id: Uuid,
        client_addr: &'a str,
    ) -> BoxFuture<'a, Result<SessionRecord, StoreError>> {
        ready(Ok(self.create(owner_id, host_id, client_addr))).boxed()
    }

    fn close_session_record(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        ready(self.close(session_id, ended_at)).boxed()
    }

    fn list_session_records(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>, StoreError>> {
        ready(Ok(self.list(limit))).boxed()
    }
}
