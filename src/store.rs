use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::frame::Frame;

/// Latest published frame. The lock covers only the swap or the copy.
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        *self.slot() = Some(frame);
    }

    pub fn snapshot(&self) -> Option<Frame> {
        self.slot().clone()
    }

    // A panicking writer can only have left a whole frame or none behind.
    fn slot(&self) -> MutexGuard<'_, Option<Frame>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
