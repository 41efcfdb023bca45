//! Round-robin credential pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ConfigError;

use super::credential::Credential;

/// A credential handed out together with the slot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Index of the credential in the pool.
    pub position: usize,
    /// The credential itself.
    pub credential: Credential,
}

/// Source of credentials for the retrying client.
///
/// Implemented by [`CredentialPool`]; tests can substitute a scripted source.
pub trait CredentialSource: Send + Sync {
    /// Returns the current credential. Never blocks.
    fn current(&self) -> Lease;

    /// Moves to the next credential, wrapping at the end.
    fn advance(&self);

    /// Moves past `position` only if it is still current.
    ///
    /// Returns true if this call moved the index. Two runs that both saw the
    /// same rejected credential advance the pool once between them.
    fn advance_past(&self, position: usize) -> bool;

    /// Number of credentials.
    fn len(&self) -> usize;

    /// Always false; pools hold at least one credential.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the current credential.
    fn position(&self) -> usize;
}

/// An ordered, never-shrinking list of credentials with an atomic cursor.
///
/// Rejected credentials are not removed; they come round again on the next
/// full cycle.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    index: AtomicUsize,
}

impl CredentialPool {
    /// Creates a pool. Blank keys are dropped; an empty result is an error.
    pub fn new<I, C>(credentials: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Credential>,
    {
        let credentials: Vec<Credential> = credentials
            .into_iter()
            .map(Into::into)
            .filter(|c| !c.is_blank())
            .collect();
        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        Ok(Self {
            credentials,
            index: AtomicUsize::new(0),
        })
    }

    /// Creates a pool holding one personal credential.
    #[must_use]
    pub fn single(credential: Credential) -> Self {
        Self {
            credentials: vec![credential],
            index: AtomicUsize::new(0),
        }
    }

    /// Returns the credentials in pool order.
    #[must_use]
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}

impl CredentialSource for CredentialPool {
    fn current(&self) -> Lease {
        let position = self.index.load(Ordering::Acquire);
        Lease {
            position,
            credential: self.credentials[position].clone(),
        }
    }

    fn advance(&self) {
        let len = self.credentials.len();
        // fetch_update only fails when the closure returns None.
        let _ = self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len));
    }

    fn advance_past(&self, position: usize) -> bool {
        let next = (position + 1) % self.credentials.len();
        self.index
            .compare_exchange(position, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn len(&self) -> usize {
        self.credentials.len()
    }

    fn position(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool(keys: &[&str]) -> CredentialPool {
        CredentialPool::new(keys.iter().copied()).unwrap()
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let err = CredentialPool::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials));

        let err = CredentialPool::new(["", "  "]).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials));
    }

    #[test]
    fn test_advance_wraps() {
        let pool = pool(&["a", "b", "c"]);
        assert_eq!(pool.current().credential.expose(), "a");
        pool.advance();
        assert_eq!(pool.current().credential.expose(), "b");
        pool.advance();
        pool.advance();
        assert_eq!(pool.current().position, 0);
        assert_eq!(pool.current().credential.expose(), "a");
    }

    #[test]
    fn test_current_does_not_move_index() {
        let pool = pool(&["a", "b"]);
        let _ = pool.current();
        let _ = pool.current();
        assert_eq!(pool.position(), 0);
    }

    #[test]
    fn test_advance_past_is_compare_and_swap() {
        let pool = pool(&["a", "b", "c"]);
        let lease = pool.current();

        assert!(pool.advance_past(lease.position));
        // A second run that saw the same credential does not skip "b".
        assert!(!pool.advance_past(lease.position));
        assert_eq!(pool.current().credential.expose(), "b");
    }

    #[test]
    fn test_single_pool_stays_put() {
        let pool = CredentialPool::single(Credential::new("mine"));
        assert!(pool.advance_past(0));
        assert_eq!(pool.position(), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_advance_keeps_index_in_range() {
        let pool = Arc::new(pool(&["a", "b", "c", "d", "e"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        pool.advance();
                        assert!(pool.current().position < 5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        // 8000 advances over 5 slots.
        assert_eq!(pool.position(), 8000 % 5);
    }
}
