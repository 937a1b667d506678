use crate::device::DeviceCanceller;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide request to stop acquiring. Set once, never cleared.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns true for the call that actually raised it.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an external stop request needs to touch: the cancel flag the
/// acquisition loop polls and the abort handle of the open device.
#[derive(Debug, Clone)]
pub struct CancelContext {
    flag: CancelFlag,
    device: DeviceCanceller,
}

impl CancelContext {
    pub fn new(flag: CancelFlag, device: DeviceCanceller) -> Self {
        Self { flag, device }
    }

    /// Stop the run: raise the flag, then abort any blocking read.
    ///
    /// Only touches atomics, so it is safe to call from a signal handler
    /// thread while the engine is streaming.
    pub fn trigger(&self) -> bool {
        let first = self.flag.set();
        self.device.cancel();
        first
    }

    pub fn flag(&self) -> &CancelFlag {
        &self.flag
    }
}
