//! Collections below the database root.

use super::store::{StoreError, StorePath};

pub const ACTIVE_BOWLS: &str = "activeBowls";
pub const PREPARED_BOWLS: &str = "preparedBowls";
pub const RETURNED_BOWLS: &str = "returnedBowls";
pub const MY_SCANS: &str = "myScans";
pub const SCAN_HISTORY: &str = "scanHistory";
pub const CUSTOMER_DATA: &str = "customerData";
pub const LAST_SYNC: &str = "lastSync";

pub fn collection(name: &'static str) -> Result<StorePath, StoreError> {
    StorePath::root().child(name)
}

pub fn entry(collection_name: &'static str, key: &str) -> Result<StorePath, StoreError> {
    collection(collection_name)?.child(key)
}
