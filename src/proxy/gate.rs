use uuid::Uuid;

use crate::config::Host;
use crate::error::StoreError;
use crate::store::SessionStore;

/// The only text a caller ever sees for a host they cannot use.
pub const HOST_NOT_FOUND: &str = "host not found";

/// Resolve `host_id` for `user_id`.
///
/// A malformed id, a missing host, a host owned by someone else and a store
/// failure all come back as `Err(HOST_NOT_FOUND)`, so the response does not
/// reveal whether the id exists.
pub async fn resolve_host(
    store: &dyn SessionStore,
    host_id: &str,
    user_id: &str,
) -> Result<Host, &'static str> {
    let Ok(id) = Uuid::parse_str(host_id.trim()) else {
        tracing::debug!(host_id = %host_id, "Rejecting malformed host id");
        return Err(HOST_NOT_FOUND);
    };

    match store.get_host_by_id(id, user_id).await {
        Ok(host) => Ok(host),
        Err(StoreError::NotFound) => Err(HOST_NOT_FOUND),
        Err(e) => {
            tracing::warn!(host_id = %id, "Host lookup failed: {}", e);
            Err(HOST_NOT_FOUND)
        }
    }
}
