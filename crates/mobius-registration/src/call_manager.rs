//! Seam to the call manager that owns the line's calls.
//!
//! The engine only reads the active call count before reconnect and failback
//! decisions, and tells the call manager which Mobius server calls should go
//! to. It never changes call state.

/// Read-only view of the line's calls.
pub trait CallManager: Send + Sync {
    /// Number of calls currently in progress on this line.
    fn active_call_count(&self) -> usize;

    /// The line is now bound to `url`; new call signaling should go there.
    fn update_active_mobius(&self, url: &str) {
        let _ = url;
    }
}

/// Call manager for a line that never carries calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCalls;

impl CallManager for NoCalls {
    fn active_call_count(&self) -> usize {
        0
    }
}
