//! Access credentials for the external generation service.
//!
//! This module provides:
//! - Credential, a key that only ever prints its fingerprint
//! - CredentialSource, the seam the retrying client depends on
//! - CredentialPool, the lock-free round-robin implementation

mod credential;
mod pool;

pub use credential::Credential;
pub use pool::{CredentialPool, CredentialSource, Lease};
