//! Turning the browser-supplied plaintext credential into an SSH auth method.
//!
//! The plaintext lives in exactly one buffer, [`InFlightCredential`], from
//! the moment the connect frame is decoded until [`build_auth`] returns.
//! That buffer is overwritten with zeros on every exit path of `build_auth`
//! and again when dropped.

use std::sync::Arc;

use russh::keys::{HashAlg, PrivateKeyWithHashAlg};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use zeroize::Zeroize;

use crate::config::AuthKind;
use crate::error::SshError;

/// Resolved authentication for an SSH connection
pub enum ResolvedAuth {
    /// Password authentication with zeroized secret string
    Password(SecretString),
    /// Public key authentication with decoded key
    PublicKey(PrivateKeyWithHashAlg),
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            ResolvedAuth::PublicKey(_) => f.debug_tuple("PublicKey").field(&"[KEY]").finish(),
        }
    }
}

impl ResolvedAuth {
    pub fn method_name(&self) -> &'static str {
        match self {
            ResolvedAuth::Password(_) => "password",
            ResolvedAuth::PublicKey(_) => "publickey",
        }
    }
}

/// The plaintext credential as received from the browser.
///
/// Deserializes from a JSON string. `Debug` never prints the contents.
#[derive(Default)]
pub struct InFlightCredential {
    bytes: Vec<u8>,
}

impl InFlightCredential {
    pub fn new(secret: String) -> Self {
        Self {
            bytes: secret.into_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True once every byte has been overwritten.
    pub fn is_wiped(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    /// Overwrite the contents in place. The length is kept so a wiped
    /// buffer stays observable.
    pub fn wipe(&mut self) {
        self.bytes.as_mut_slice().zeroize();
    }

    fn expose(&self) -> Result<&str, SshError> {
        std::str::from_utf8(&self.bytes).map_err(|_| SshError::InvalidPrivateKey)
    }
}

impl Drop for InFlightCredential {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for InFlightCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightCredential")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl<'de> Deserialize<'de> for InFlightCredential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Wipes the credential when dropped, so early returns and unwinding are
/// covered the same as the success path.
struct WipeOnDrop<'a>(&'a mut InFlightCredential);

impl Drop for WipeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.wipe();
    }
}

/// Build the SSH auth method for `kind` from the in-flight credential.
///
/// The credential is wiped before this returns, whether or not the build
/// succeeded.
///
/// # Errors
///
/// [`SshError::InvalidPrivateKey`] when `kind` is [`AuthKind::Key`] and the
/// credential is not an unencrypted private key.
pub fn build_auth(
    kind: AuthKind,
    credential: &mut InFlightCredential,
) -> Result<ResolvedAuth, SshError> {
    let guard = WipeOnDrop(credential);

    match kind {
        AuthKind::Password => {
            let password = guard.0.expose()?;
            Ok(ResolvedAuth::Password(SecretString::from(password)))
        }
        AuthKind::Key => {
            let pem = guard.0.expose()?;
            let key = russh::keys::decode_secret_key(pem, None).map_err(|e| {
                tracing::debug!("Private key rejected: {}", e);
                SshError::InvalidPrivateKey
            })?;

            // SHA-512 only applies to RSA; other key types sign natively
            let hash_alg = if key.algorithm().is_rsa() {
                Some(HashAlg::Sha512)
            } else {
                None
            };
            Ok(ResolvedAuth::PublicKey(PrivateKeyWithHashAlg::new(
                Arc::new(key),
                hash_alg,
            )))
        }
    }
}
