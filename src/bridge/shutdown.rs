//! Process-level interrupt flag shared between the signal handler and the
//! forwarding thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared interrupt flag
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt is pending
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Clear a handled interrupt
    pub fn reset(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }
}
