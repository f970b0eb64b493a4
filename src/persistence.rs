//! Snapshot plumbing shared by the components.
//!
//! Storage itself lives outside this crate; components hand out serde-friendly
//! snapshots and accept them back record by record. A malformed record is skipped
//! and counted, the rest of the restore proceeds.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const SNAPSHOT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

impl ImportReport {
    pub fn merge(self, other: ImportReport) -> ImportReport {
        ImportReport {
            imported: self.imported + other.imported,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Decode each element of a JSON array independently.
///
/// Returns the records that decoded plus the number that did not. A non-array value
/// counts as a single skipped record.
pub fn decode_records<T: DeserializeOwned>(value: &Value, kind: &str) -> (Vec<T>, usize) {
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            warn!(kind, "expected an array of records, skipping section");
            return (Vec::new(), 1);
        }
        return (Vec::new(), 0);
    };

    let mut decoded = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => decoded.push(record),
            Err(err) => {
                skipped += 1;
                warn!(kind, index, error = %err, "skipping malformed record");
            }
        }
    }
    (decoded, skipped)
}
