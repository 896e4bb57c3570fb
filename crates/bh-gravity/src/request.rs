//! Out-of-band reload requests.
//!
//! A [`ReloadRequest`] only flips an atomic flag, so [`ReloadRequest::request`]
//! is safe to call from a signal handler or another thread. The engine owner
//! drains the flag between queries and performs the reload itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ReloadRequest {
    pending: Arc<AtomicBool>,
}

impl ReloadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the owner to reload at its next safe point.
    #[inline]
    pub fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether a reload was requested.
    #[inline]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}
