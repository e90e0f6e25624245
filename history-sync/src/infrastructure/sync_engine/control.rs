//! Run control token
//! Cloneable handle used to ask a running loop to pause or stop. The loop polls it
//! at the top of every iteration and right after each write.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlSignal {
    #[default]
    Run,
    Pause,
    Stop,
}

#[derive(Debug, Clone)]
pub struct SyncControl {
    tx: Arc<watch::Sender<ControlSignal>>,
}

impl Default for SyncControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControlSignal::Run);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.raise(ControlSignal::Pause);
    }

    /// Stop wins over pause and cannot be downgraded back to a pause.
    pub fn stop(&self) {
        self.tx.send_replace(ControlSignal::Stop);
    }

    pub fn signal(&self) -> ControlSignal {
        *self.tx.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.signal() == ControlSignal::Pause
    }

    pub fn is_stopped(&self) -> bool {
        self.signal() == ControlSignal::Stop
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSignal> {
        self.tx.subscribe()
    }

    /// Called by the orchestrator when a run (re)starts.
    pub(crate) fn reset(&self) {
        self.tx.send_replace(ControlSignal::Run);
    }

    fn raise(&self, signal: ControlSignal) {
        self.tx.send_if_modified(|current| {
            if *current == ControlSignal::Stop || *current == signal {
                return false;
            }
            *current = signal;
            true
        });
    }
}
