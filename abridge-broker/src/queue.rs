use abridge_command::InboundCommand;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

/// Thread-safe FIFO buffer of validated inbound commands awaiting
/// collection by the caller. Clones share the underlying buffer, which
/// is how the router (producer side) and the handle (consumer side)
/// see the same queue. Unbounded on purpose; see the crate docs
#[derive(Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<InboundCommand>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: InboundCommand) {
        self.lock().push_back(command);
    }

    /// Atomically drains everything currently queued, preserving
    /// arrival order. Empty vec when nothing is pending
    pub fn drain(&self) -> Vec<InboundCommand> {
        self.lock().drain(..).collect()
    }

    /// Non-blocking peek
    pub fn pending(&self) -> bool {
        !self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InboundCommand>> {
        // a poisoned lock still holds a coherent queue
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
