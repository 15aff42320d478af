//! Time-based one-time codes (RFC 6238) with single-use enforcement.
//!
//! A code is accepted at most once: after a successful check the pair
//! `secret:code` is remembered for [`REPLAY_TTL`], which covers every window
//! in which the same code could validate again.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use data_encoding::{BASE32_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::security_log;

pub const STEP_SECS: u64 = 30;
pub const DIGITS: usize = 6;
/// Steps accepted either side of the current one
pub const SKEW_STEPS: u64 = 1;
pub const REPLAY_TTL: Duration = Duration::from_secs(90);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Check a 6-digit code against a base32 secret at `unix_time`.
pub fn verify_totp(secret_b32: &str, code: &str, unix_time: u64) -> bool {
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some(key) = decode_secret(secret_b32) else {
        return false;
    };

    let counter = unix_time / STEP_SECS;
    let first = counter.saturating_sub(SKEW_STEPS);
    let last = counter.saturating_add(SKEW_STEPS);

    let mut matched = false;
    for step in first..=last {
        if let Some(expected) = hotp(&key, step) {
            matched |= codes_equal(expected.as_bytes(), code.as_bytes());
        }
    }
    matched
}

/// RFC 4226 HOTP value for `counter`, zero padded.
fn hotp(key: &[u8], counter: u64) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        hash[offset] & 0x7f,
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]);
    let value = binary % 10u32.pow(DIGITS as u32);
    Some(format!("{value:0width$}", width = DIGITS))
}

/// Authenticator apps show secrets in groups and sometimes lower case.
fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return None;
    }
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

fn codes_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Codes already consumed, keyed by a digest of `secret:code` so secrets are
/// not held in the map.
pub struct ReplayGuard {
    used: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl ReplayGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            used: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record the pair and return `true` if it was not already recorded.
    pub fn check_and_mark(&self, secret: &str, code: &str) -> bool {
        let key = replay_key(secret, code);
        let now = Instant::now();
        let mut used = self.used.lock();

        match used.get(&key) {
            Some(expires_at) if *expires_at > now => false,
            _ => {
                used.insert(key, now + self.ttl);
                true
            }
        }
    }

    /// Drop expired entries. Returns how many remain.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut used = self.used.lock();
        used.retain(|_, expires_at| *expires_at > now);
        used.len()
    }

    pub fn len(&self) -> usize {
        self.used.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.lock().is_empty()
    }

    /// Sweep every `interval` until the guard is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let guard: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(guard) = guard.upgrade() else {
                    break;
                };
                let remaining = guard.sweep();
                tracing::trace!(remaining, "Swept one-time code replay set");
            }
        })
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(REPLAY_TTL)
    }
}

fn replay_key(secret: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    HEXLOWER.encode(&hasher.finalize())
}

/// TOTP validation plus single use.
#[derive(Clone, Default)]
pub struct OneTimeCodeVerifier {
    guard: Arc<ReplayGuard>,
}

impl OneTimeCodeVerifier {
    pub fn new(guard: Arc<ReplayGuard>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<ReplayGuard> {
        &self.guard
    }

    pub fn verify(&self, secret_b32: &str, code: &str) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.verify_at(secret_b32, code, now)
    }

    pub fn verify_at(&self, secret_b32: &str, code: &str, unix_time: u64) -> bool {
        if !verify_totp(secret_b32, code, unix_time) {
            return false;
        }
        if !self.guard.check_and_mark(secret_b32, code) {
            security_log::log_otp_replay_rejected();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ASCII "12345678901234567890", the RFC 6238 SHA-1 seed
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn rfc6238_vectors() {
        assert!(verify_totp(RFC_SECRET, "287082", 59));
        assert!(verify_totp(RFC_SECRET, "081804", 1_111_111_109));
        assert!(verify_totp(RFC_SECRET, "050471", 1_111_111_111));
        assert!(verify_totp(RFC_SECRET, "005924", 1_234_567_890));
    }

    #[test]
    fn adjacent_step_accepted_and_far_step_rejected() {
        // 287082 belongs to the step covering T=59
        assert!(verify_totp(RFC_SECRET, "287082", 59 + 30));
        assert!(!verify_totp(RFC_SECRET, "287082", 59 + 90));
    }

    #[test]
    fn malformed_input_rejected() {
        assert!(!verify_totp(RFC_SECRET, "28708", 59));
        assert!(!verify_totp(RFC_SECRET, "28708a", 59));
        assert!(!verify_totp("not base32!", "287082", 59));
        assert!(!verify_totp("", "287082", 59));
    }

    #[test]
    fn secret_normalization() {
        let grouped = "gezd gnbv gy3t qojq gezd gnbv gy3t qojq";
        assert!(verify_totp(grouped, "287082", 59));
    }

    #[test]
    fn code_is_single_use() {
        let verifier = OneTimeCodeVerifier::default();
        assert!(verifier.verify_at(RFC_SECRET, "287082", 59));
        assert!(!verifier.verify_at(RFC_SECRET, "287082", 60));
        assert_eq!(verifier.guard().len(), 1);
    }

    #[test]
    fn replay_entries_expire() {
        let guard = ReplayGuard::new(Duration::from_millis(0));
        assert!(guard.check_and_mark("s", "123456"));
        assert!(guard.check_and_mark("s", "123456"));
        assert_eq!(guard.sweep(), 0);
    }

    #[tokio::test]
    async fn sweeper_stops_with_guard() {
        let guard = Arc::new(ReplayGuard::default());
        let handle = guard.spawn_sweeper(Duration::from_millis(10));
        drop(guard);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
