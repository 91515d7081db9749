// src/cancel.rs

//! Cooperative cancellation for long-running catalog operations.
//!
//! The engine is single-threaded; cancellation is checked at the top of each
//! per-reference iteration during render and between packages during
//! dependency resolution. A token carries an optional deadline and a manual
//! cancel flag, and is cheap to clone across call sites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

struct Inner {
    canceled: AtomicBool,
    deadline: Option<Instant>,
}

/// A cloneable cancellation token with an optional deadline.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// A token that never expires on its own.
    pub fn new() -> Self {
        CancelToken {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        CancelToken {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Cancel the token manually. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        if self.inner.canceled.load(Ordering::SeqCst) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Return [`Error::Canceled`] if the token is canceled or expired.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
