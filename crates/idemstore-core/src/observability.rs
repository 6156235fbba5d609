use serde::{Deserialize, Serialize};

/// Entry counts by state.
///
/// `expired` counts completed entries past their expiry that no reader or
/// sweep has removed yet. They are logically absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub pending: usize,
    pub completed: usize,
    pub expired: usize,
}

impl StoreCounts {
    pub fn total(&self) -> usize {
        self.pending + self.completed + self.expired
    }
}
