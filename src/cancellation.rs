//! Cooperative, one-shot cancellation.
//!
//! A [`CancellationToken`] is a single boolean flag a routine checks at its
//! suspension points. A [`CancellationHandle`] aggregates every token in a
//! network so a caller (or the timeout routine) can request cancellation of
//! the whole pipeline with one call.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };

use parking_lot::Mutex;

/// One routine's cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn request_cancellation(&self) {
        self.requested.store(true, Ordering::Release);
    }
}

/// Aggregates every routine's [`CancellationToken`] in a network. Cloning a
/// handle shares the same underlying set: requesting cancellation through any
/// clone cancels every routine registered so far.
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle {
    tokens: Arc<Mutex<Vec<CancellationToken>>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a routine's token. Called once per routine at push time.
    pub(crate) fn push(&self, token: CancellationToken) {
        self.tokens.lock().push(token);
    }

    /// Requests cancellation of every routine registered so far.
    pub fn request_cancellation(&self) {
        for token in self.tokens.lock().iter() {
            token.request_cancellation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancellation_requested());
    }

    #[test]
    fn requesting_cancellation_is_observed_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.request_cancellation();
        assert!(token.is_cancellation_requested());
    }

    #[test]
    fn handle_cancels_every_registered_token() {
        let handle = CancellationHandle::new();
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        handle.push(a.clone());
        handle.push(b.clone());
        handle.request_cancellation();
        assert!(a.is_cancellation_requested());
        assert!(b.is_cancellation_requested());
    }
}
