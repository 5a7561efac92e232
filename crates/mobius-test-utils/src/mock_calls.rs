//! Mock call manager.

use mobius_registration::call_manager::CallManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Call manager whose active call count is set by the test.
#[derive(Debug, Default)]
pub struct MockCallManager {
    active_calls: AtomicUsize,
    active_mobius_updates: Mutex<Vec<String>>,
}

impl MockCallManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_calls(&self, count: usize) {
        self.active_calls.store(count, Ordering::SeqCst);
    }

    /// URLs passed to `update_active_mobius`, in order.
    #[must_use]
    pub fn active_mobius_updates(&self) -> Vec<String> {
        self.active_mobius_updates.lock().unwrap().clone()
    }
}

impl CallManager for MockCallManager {
    fn active_call_count(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    fn update_active_mobius(&self, url: &str) {
        self.active_mobius_updates
            .lock()
            .unwrap()
            .push(url.to_string());
    }
}
