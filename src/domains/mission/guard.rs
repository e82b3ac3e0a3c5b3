use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Allows at most one mission run per vehicle at a time.
#[derive(Debug, Clone, Default)]
pub struct MissionRunGuard {
    active: Arc<AtomicBool>,
}

impl MissionRunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` while another run holds the permit.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                active: self.active.clone(),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Released on drop, including when the run task panics.
#[derive(Debug)]
pub struct RunPermit {
    active: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
