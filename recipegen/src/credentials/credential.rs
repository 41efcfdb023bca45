//! Opaque access credential.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// An access key for the external generation service.
///
/// The raw value is only reachable through [`Credential::expose`]; `Debug`
/// and `Display` print a short fingerprint so keys never reach the logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps a raw key.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Arc::from(raw.into()))
    }

    /// Returns the raw key for building a request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the first eight hex digits of the key's SHA-256.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }

    /// Returns true for an empty or whitespace-only key.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.fingerprint()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.fingerprint())
    }
}

impl From<&str> for Credential {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Credential {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}
