//! Synchronization Progress
//! The resumability state of one run. Mutated only by the orchestrator; everyone
//! else gets snapshots.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{identifier::CanonicalId, table_store::RowId};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncProgress {
    /// Next unprocessed position in `record_id_list`.
    pub current_index: usize,
    pub record_id_list: Vec<RowId>,
    pub total: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub is_writing: bool,
    pub current_point_id: Option<CanonicalId>,
    /// Epoch milliseconds of the last save.
    pub saved_at: i64,
}

impl SyncProgress {
    /// Fresh progress over a snapshot of source rows.
    pub fn with_snapshot(record_id_list: Vec<RowId>) -> Self {
        let total = record_id_list.len();
        Self {
            record_id_list,
            total,
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.current_index)
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.total
    }

    pub fn touch(&mut self) {
        self.saved_at = Utc::now().timestamp_millis();
    }

    /// Clamps fields read from an older or hand-edited checkpoint back inside the invariants.
    pub fn sanitized(mut self) -> Self {
        self.total = self.record_id_list.len();
        self.current_index = self.current_index.min(self.total);
        self.is_writing = false;
        self
    }

    pub fn clear_in_flight(&mut self) {
        self.is_writing = false;
        self.current_point_id = None;
    }
}
