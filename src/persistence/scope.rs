//! Transaction scope
//!
//! The slot holding a unit of work's open transaction, shared between the
//! unit and the repositories it hands out.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared slot for an open transaction of type `T`.
///
/// `None` means idle: repositories fall back to autocommit.
pub(crate) struct TransactionScope<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for TransactionScope<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + 'static> TransactionScope<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().await
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Guard that discards the open transaction when dropped armed.
    pub fn release_guard(&self) -> ScopeGuard {
        let slot = Arc::clone(&self.slot);
        ScopeGuard::new(move || match slot.try_lock() {
            Ok(mut open) => {
                if open.take().is_some() {
                    tracing::warn!("Transaction abandoned before completion, rolling back");
                }
            }
            Err(_) => {
                tracing::error!("Transaction scope busy during release; rollback deferred to drop");
            }
        })
    }
}

/// Runs a release action on drop unless disarmed.
///
/// Returned by `UnitOfWork::release_guard`; `transaction` holds one across
/// the caller's work so that cancellation still resolves the boundary.
#[must_use = "the guard releases the scope as soon as it is dropped"]
pub struct ScopeGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ScopeGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Keep the scope as it is
    pub fn disarm(mut self) {
        self.release = None;
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
