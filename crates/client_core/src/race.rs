use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use shared::error::RemoteCallError;
use thiserror::Error;
use tracing::debug;

use crate::error::SyncError;

#[derive(Debug, Default)]
pub struct RaceGuard {
    counter: AtomicU64,
}

impl RaceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> GuardToken<'_> {
        let token = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        GuardToken { guard: self, token }
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Signal that a guarded write was superseded. Not a user-facing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation {token} superseded by {current}")]
pub struct StaleOperationAbort {
    pub token: u64,
    pub current: u64,
}

#[derive(Debug, Error)]
pub enum GuardedError {
    #[error(transparent)]
    Stale(#[from] StaleOperationAbort),
    #[error(transparent)]
    Failed(#[from] SyncError),
}

impl From<RemoteCallError> for GuardedError {
    fn from(value: RemoteCallError) -> Self {
        Self::Failed(SyncError::Remote(value))
    }
}

#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a RaceGuard,
    token: u64,
}

impl GuardToken<'_> {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_current(&self) -> bool {
        self.guard.current() == self.token
    }

    pub fn ensure_current(&self) -> Result<(), StaleOperationAbort> {
        let current = self.guard.current();
        if current == self.token {
            Ok(())
        } else {
            Err(StaleOperationAbort {
                token: self.token,
                current,
            })
        }
    }

    pub async fn step<T, E, F>(&self, fut: F) -> Result<T, GuardedError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<GuardedError>,
    {
        self.ensure_current()?;
        let value = fut.await.map_err(Into::into)?;
        self.ensure_current()?;
        Ok(value)
    }
}

/// Collapses a guarded outcome at the setter boundary: a stale abort is a
/// quiet success, real failures propagate.
pub fn settle(name: &str, result: Result<(), GuardedError>) -> Result<(), SyncError> {
    match result {
        Ok(()) => Ok(()),
        Err(GuardedError::Stale(abort)) => {
            debug!(
                name,
                token = abort.token,
                current = abort.current,
                "guarded write superseded"
            );
            Ok(())
        }
        Err(GuardedError::Failed(err)) => Err(err),
    }
}

#[cfg(test)]
#[path = "tests/race_tests.rs"]
mod tests;
