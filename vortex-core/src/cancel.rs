//! Cooperative cancellation and deadlines for long-running queries and
//! rebuilds (spec.md §5).
//!
//! Checked at coarse granularity only: between candidate batches, between
//! tree-node expansions, between rebuild phases. Neither type blocks or
//! spawns anything; they are polled by the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};

/// A cooperative cancel flag, cheap to clone and share across threads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// An optional wall-clock deadline for a query or rebuild.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: std::time::Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Returns `Err(Error::DeadlineExceeded)` if the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(Error::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Bundles cancellation and deadline checks so hot loops only make one call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    pub token: Option<CancellationToken>,
    pub deadline: Option<Deadline>,
}

impl ExecutionGuard {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn check(&self) -> Result<()> {
        if let Some(token) = &self.token {
            token.check()?;
        }
        if let Some(deadline) = &self.deadline {
            deadline.check()?;
        }
        Ok(())
    }
}
