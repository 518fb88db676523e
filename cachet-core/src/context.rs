//! Per-call cancellation and deadlines.
//!
//! Every [`Cache`](crate::Cache) operation receives a [`Context`]. Backends
//! check it before doing work and race their I/O against it, so a cancelled
//! caller or an elapsed deadline surfaces as [`CacheError::Cancelled`] or
//! [`CacheError::Timeout`] instead of an indefinite wait.
//!
//! ```
//! use cachet_core::Context;
//! use std::time::Duration;
//!
//! let ctx = Context::background().with_timeout(Duration::from_millis(250));
//! assert!(ctx.deadline().is_some());
//!
//! let child = ctx.child();
//! ctx.cancel();
//! assert!(child.is_done());
//! ```

use crate::error::{CacheError, CacheResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancellation scope and optional deadline for a cache operation.
///
/// Cloning a context is cheap; clones share the same cancellation state.
/// Derived contexts ([`child`](Self::child), [`with_timeout`](Self::with_timeout),
/// [`with_deadline`](Self::with_deadline)) are cancelled together with their
/// parent but can be cancelled on their own without affecting it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that is cancelled when this one is.
    pub fn child(&self) -> Self {
        let state = Arc::new(CancelState::default());
        {
            let mut children = self.state.children.lock();
            if self.state.is_cancelled() {
                state.cancelled.store(true, Ordering::SeqCst);
            } else {
                children.retain(|c| c.strong_count() > 0);
                children.push(Arc::downgrade(&state));
            }
        }

        Self {
            state,
            deadline: self.deadline,
        }
    }

    /// Derive a context that expires `timeout` from now.
    ///
    /// A timeout too large to represent adds no deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Derive a context that expires at `deadline`.
    ///
    /// The earlier of the parent's deadline and `deadline` wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.child();
        ctx.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        ctx
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The reason this context is done, if it is.
    pub fn err(&self) -> Option<CacheError> {
        if self.state.is_cancelled() {
            return Some(CacheError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CacheError::Timeout),
            _ => None,
        }
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> CacheResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait until the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.state.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.state.cancelled().await,
        }
    }

    /// Run `fut` to completion unless the context finishes first.
    ///
    /// Backends wrap their I/O in this so that cancellation and deadlines
    /// abort the wait with the matching error.
    pub async fn run<F, T>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        self.check()?;

        tokio::select! {
            biased;
            _ = self.done() => Err(self.err().unwrap_or(CacheError::Cancelled)),
            result = fut => result,
        }
    }
}
