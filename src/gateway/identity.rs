use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use sha2::{Digest, Sha256};

use crate::config::IdentityConfig;

/// Cookie the session layer sets after login.
pub const TOKEN_COOKIE: &str = "access_token";

/// An identity established by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub user_id: String,
    pub is_admin: bool,
}

/// Turns request headers into a caller. Token issuing lives elsewhere.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Option<AuthenticatedCaller>;
}

struct Grant {
    digest: [u8; 32],
    caller: AuthenticatedCaller,
}

/// Accepts a fixed set of tokens, known only by their SHA-256 digests.
pub struct StaticTokenIdentity {
    grants: Vec<Grant>,
}

impl StaticTokenIdentity {
    /// Grants with a malformed digest are skipped; config validation rejects
    /// them before this point.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let grants = config
            .tokens
            .iter()
            .filter_map(|grant| {
                let bytes = data_encoding::HEXLOWER_PERMISSIVE
                    .decode(grant.token_sha256.as_bytes())
                    .ok()?;
                let digest: [u8; 32] = bytes.try_into().ok()?;
                Some(Grant {
                    digest,
                    caller: AuthenticatedCaller {
                        user_id: grant.user_id.clone(),
                        is_admin: grant.is_admin,
                    },
                })
            })
            .collect();
        Self { grants }
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    fn lookup(&self, token: &str) -> Option<AuthenticatedCaller> {
        let digest = Sha256::digest(token.as_bytes());
        self.grants
            .iter()
            .find(|grant| digests_equal(&grant.digest, digest.as_slice()))
            .map(|grant| grant.caller.clone())
    }
}

impl IdentityProvider for StaticTokenIdentity {
    fn identify(&self, headers: &HeaderMap) -> Option<AuthenticatedCaller> {
        let token = cookie_token(headers).or_else(|| bearer_token(headers))?;
        self.lookup(token)
    }
}

/// Hex SHA-256 of a token, as stored in `identity.tokens`.
pub fn token_digest(token: &str) -> String {
    data_encoding::HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}

fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
