use std::sync::{Arc, Mutex, MutexGuard};

use crate::record::ResultRecord;

/// Append-only collector shared by every virtual user of a run.
///
/// Clones share the same storage. Appends from one worker keep their order;
/// appends from different workers interleave arbitrarily. `snapshot` is meant
/// to be called once all writers have been joined.
#[derive(Debug, Clone, Default)]
pub struct ResultSink {
    records: Arc<Mutex<Vec<ResultRecord>>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record.
    pub fn append(&self, record: ResultRecord) {
        self.lock().push(record);
    }

    /// Copies out every record accumulated so far.
    pub fn snapshot(&self) -> Vec<ResultRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A worker that panicked while holding the lock must not make the other
    // workers' records unreachable; a Vec push cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Vec<ResultRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
