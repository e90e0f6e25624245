//! History Sync Engine
//!
//! One cooperative task walks the source rows, fetches each point's history and
//! reconciles it into the target table. The run can be paused, resumed (even after a
//! restart, from the saved checkpoint) and stopped.
//!
//! Primary Components:
//! 1. SyncOrchestrator: owns the run state machine and the row loop
//! 2. SyncControl: cloneable token used to pause or stop a running loop
//! 3. Reconciler: field provisioning and upsert matching against the target table

pub mod control;
pub mod orchestrator;
pub mod reconciler;

pub use control::{ControlSignal, SyncControl};
pub use orchestrator::{RunOutcome, SyncContext, SyncOrchestrator};
pub use reconciler::{ReconcileReport, Reconciler, TargetFields, TimeFormatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}
