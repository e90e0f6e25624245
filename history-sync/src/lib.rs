pub mod application;
pub mod common {
    pub mod errors;
}
pub mod domain {
    pub mod synchronization;
}
pub mod infrastructure {
    pub mod checkpoint;
    pub mod sync_engine;
    pub mod table;
    pub mod web;
    // Re-export
    pub use sync_engine::{RunOutcome, SyncContext, SyncControl, SyncOrchestrator, SyncState};
}
