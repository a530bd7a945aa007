use std::{collections::BTreeMap, sync::Arc};

use super::model::{CustomerReference, PreparedRecord};

/// Disposable client-side view derived from the remote collections.
///
/// Nothing in here is authoritative; it is rebuilt from subscriptions on every attach.
#[derive(Debug, Clone, Default)]
pub struct ProjectionState {
    pub active_count: u64,
    pub prepared_today_count: u64,
    pub returned_today_count: u64,
    /// Today's prepared records by record key; always as large as `prepared_today_count`.
    pub prepared_today: BTreeMap<String, PreparedRecord>,
    /// Today's scans per user.
    pub scan_tallies: BTreeMap<String, u64>,
    pub customers: Arc<[CustomerReference]>,
    pub last_sync: Option<String>,
    pub connected: bool,
}

impl ProjectionState {
    /// Zeroes every counter and cache so that a fresh replay does not double-count.
    pub fn reset_counters(&mut self) {
        self.active_count = 0;
        self.prepared_today_count = 0;
        self.returned_today_count = 0;
        self.prepared_today.clear();
        self.scan_tallies.clear();
    }

    pub fn clear_prepared_today(&mut self) {
        self.prepared_today_count = 0;
        self.prepared_today.clear();
    }

    /// Latest prepared record per bowl code.
    pub fn prepared_today_by_code(&self) -> BTreeMap<&str, &PreparedRecord> {
        let mut by_code = BTreeMap::new();
        for record in self.prepared_today.values() {
            by_code
                .entry(record.code.as_str())
                .and_modify(|it: &mut &PreparedRecord| {
                    if record.timestamp > it.timestamp {
                        *it = record;
                    }
                })
                .or_insert(record);
        }
        by_code
    }

    pub fn tally_for(&self, user: &str) -> u64 {
        self.scan_tallies.get(user).copied().unwrap_or_default()
    }
}
