//! Shared cancellation scope for command execution
//!
//! Every command started through a [`Session`](crate::Session) waits on the
//! token returned by [`CancelScope::current`]. Cancelling fires that token and
//! immediately installs a fresh one, so cancellation interrupts in-flight work
//! without blocking commands started afterwards.

use std::sync::{Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CancelScope {
    current: Mutex<CancellationToken>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The token commands started now should wait on
    pub fn current(&self) -> CancellationToken {
        self.lock().clone()
    }

    /// Install a child of `parent` as the current scope.
    ///
    /// The previous token is dropped without being cancelled. Cancelling
    /// `parent` (e.g. from a deadline timer) cancels the new scope.
    pub fn replace(&self, parent: &CancellationToken) {
        *self.lock() = parent.child_token();
    }

    /// Cancel every command waiting on the current scope and start a new one
    pub fn cancel(&self) {
        let mut current = self.lock();
        current.cancel();
        *current = CancellationToken::new();
        debug!("cancellation scope reset");
    }
}
