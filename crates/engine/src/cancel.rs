//! Cooperative cancellation flag for one job (spec §4.8 `stop_job`, §5
//! "Cancellation & timeouts"). Checked at batch boundaries and during the
//! rate-limit sleep; never interrupts in-flight I/O directly — that is
//! handled by closing the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
