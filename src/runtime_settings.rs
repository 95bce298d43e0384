//! Signals shared between the host and the delivery thread.

use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct RuntimeSettings {
    active: AtomicBool,
    reload_requested: AtomicBool,
    reload_count: AtomicU64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeSettings {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            reload_requested: AtomicBool::new(false),
            reload_count: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        debug!("session active: {}", active);
        self.active.store(active, Ordering::Release);
    }

    /// Signal that the configuration should be re-read
    pub fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::Release);
        self.reload_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume a pending reload signal
    pub fn take_reload_request(&self) -> bool {
        self.reload_requested.swap(false, Ordering::AcqRel)
    }

    /// Reload signals raised so far
    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::Relaxed)
    }
}
