// crates/dataset-core/src/core/context.rs
// ============================================================================
// Module: Operation Context
// Description: Cooperative cancellation and deadlines for service calls.
// Purpose: Let long-running loops stop between pages and lock renewals.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Every service call takes an [`OpContext`]. A context carries a
//! [`CancelToken`] and an optional deadline. Child contexts are cancelled
//! when their parent is; distributed locks hand out child contexts that are
//! cancelled when renewal stops. Loops call [`OpContext::check`] between
//! pages and [`OpContext::sleep`] for backoff so cancellation is prompt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::error::DatasetError;

// ============================================================================
// SECTION: Cancel Token
// ============================================================================

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Shared cancellation flag with parent-to-child propagation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Creates an uncancelled root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token cancelled whenever `self` is cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock().unwrap_or_else(PoisonError::into_inner);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancels the token and every child.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once the token was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// SECTION: Operation Context
// ============================================================================

/// Cancellation and deadline scope for one service call.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// Creates a root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child context sharing the deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child(),
            deadline: self.deadline,
        }
    }

    /// Creates a child context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Creates a child context that expires at `deadline` (or earlier parent deadline).
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = self.deadline.map_or(deadline, |current| current.min(deadline));
        Self {
            token: self.token.child(),
            deadline: Some(deadline),
        }
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the context and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the context error once cancelled or past the deadline.
    #[must_use]
    pub fn err(&self) -> Option<DatasetError> {
        if self.token.is_cancelled() {
            return Some(DatasetError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DatasetError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fails when the context is done.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Cancelled`] or [`DatasetError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), DatasetError> {
        self.err().map_or(Ok(()), Err)
    }

    /// Resolves once the context is cancelled or past its deadline.
    pub async fn done(&self) -> DatasetError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => DatasetError::Cancelled,
                () = tokio::time::sleep_until(deadline) => DatasetError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                DatasetError::Cancelled
            }
        }
    }

    /// Sleeps for `duration` unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns the context error when cancelled or past the deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), DatasetError> {
        self.check()?;
        tokio::select! {
            err = self.done() => Err(err),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Runs `future` unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns the context error when cancelled or past the deadline, or the
    /// future's own error.
    pub async fn run<T, F>(&self, future: F) -> Result<T, DatasetError>
    where
        F: Future<Output = Result<T, DatasetError>>,
    {
        self.check()?;
        tokio::select! {
            err = self.done() => Err(err),
            result = future => result,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use super::*;

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = OpContext::new();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.err(), Some(DatasetError::Cancelled));
        assert_eq!(child.done().await, DatasetError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_sleep() {
        let ctx = OpContext::new().with_timeout(Duration::from_millis(100));
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert_eq!(result, Err(DatasetError::DeadlineExceeded));
    }
}
