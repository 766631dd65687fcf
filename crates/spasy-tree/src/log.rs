//! Bounded log of recent tree mutations.
//!
//! The log is a priority-ordered buffer keyed by timestamp. Once it reaches
//! capacity, recording a new entry first evicts the record with the oldest
//! timestamp currently held, even when the incoming record is older still.
//! A peer whose root hash is at most `capacity` mutations behind can catch
//! up from the log alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of records kept per tree.
pub const DEFAULT_LOG_CAPACITY: usize = 64;

/// The kind of mutation recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Insert,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "insert",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(Action::Insert),
            "delete" => Ok(Action::Delete),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// One recorded mutation. Equality, hashing and ordering cover the whole
/// tuple, timestamp first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub timestamp: u64,
    pub action: Action,
    pub name: String,
}

impl UpdateRecord {
    pub fn new(timestamp: u64, action: Action, name: impl Into<String>) -> Self {
        UpdateRecord {
            timestamp,
            action,
            name: name.into(),
        }
    }

    pub fn insert(timestamp: u64, name: impl Into<String>) -> Self {
        Self::new(timestamp, Action::Insert, name)
    }

    pub fn delete(timestamp: u64, name: impl Into<String>) -> Self {
        Self::new(timestamp, Action::Delete, name)
    }
}

/// Wall-clock time in nanoseconds since the Unix epoch.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Capacity-limited, timestamp-ordered record of recent mutations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLog {
    capacity: usize,
    records: BTreeSet<UpdateRecord>,
}

impl UpdateLog {
    pub fn new(capacity: usize) -> Self {
        UpdateLog {
            capacity,
            records: BTreeSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, record: &UpdateRecord) -> bool {
        self.records.contains(record)
    }

    /// Record a mutation stamped with the current time.
    pub fn record(&mut self, action: Action, name: impl Into<String>) -> Option<UpdateRecord> {
        self.push(UpdateRecord::new(now(), action, name))
    }

    /// Append a record, evicting the oldest-by-timestamp entry first when
    /// the log is full. Returns the evicted record, if any.
    pub fn push(&mut self, record: UpdateRecord) -> Option<UpdateRecord> {
        if self.capacity == 0 || self.records.contains(&record) {
            return None;
        }

        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_first()
        } else {
            None
        };
        self.records.insert(record);
        evicted
    }

    /// Records in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &UpdateRecord> {
        self.records.iter()
    }

    /// Read-only copy of the records in timestamp order.
    pub fn snapshot(&self) -> Vec<UpdateRecord> {
        self.records.iter().cloned().collect()
    }

    /// Timestamp of the newest record.
    pub fn latest(&self) -> Option<u64> {
        self.records.last().map(|r| r.timestamp)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Serialize the records for transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.snapshot())
    }

    /// Decode records produced by [`UpdateLog::to_bytes`].
    pub fn records_from_bytes(bytes: &[u8]) -> Result<Vec<UpdateRecord>, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Default for UpdateLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = UpdateLog::new(2);
        assert_eq!(log.push(UpdateRecord::insert(10, "/a/dpwhwt0000")), None);
        assert_eq!(log.push(UpdateRecord::insert(20, "/b/dpwhwt0000")), None);

        let evicted = log.push(UpdateRecord::insert(30, "/c/dpwhwt0000"));
        assert_eq!(evicted, Some(UpdateRecord::insert(10, "/a/dpwhwt0000")));
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest(), Some(30));
    }

    #[test]
    fn test_out_of_order_insert_evicts_newer_record() {
        let mut log = UpdateLog::new(2);
        log.push(UpdateRecord::insert(20, "/b/dpwhwt0000"));
        log.push(UpdateRecord::insert(30, "/c/dpwhwt0000"));

        // The incoming record is the oldest of all, yet the held minimum goes.
        let evicted = log.push(UpdateRecord::insert(5, "/a/dpwhwt0000"));
        assert_eq!(evicted, Some(UpdateRecord::insert(20, "/b/dpwhwt0000")));
        assert!(log.contains(&UpdateRecord::insert(5, "/a/dpwhwt0000")));
        assert!(log.contains(&UpdateRecord::insert(30, "/c/dpwhwt0000")));
    }

    #[test]
    fn test_duplicate_record_does_not_evict() {
        let mut log = UpdateLog::new(1);
        log.push(UpdateRecord::insert(1, "/a/dpwhwt0000"));
        assert_eq!(log.push(UpdateRecord::insert(1, "/a/dpwhwt0000")), None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut log = UpdateLog::new(0);
        log.record(Action::Insert, "/a/dpwhwt0000");
        assert!(log.is_empty());
    }

    #[test]
    fn test_records_differing_only_in_action_are_distinct() {
        let mut log = UpdateLog::new(4);
        log.push(UpdateRecord::insert(1, "/a/dpwhwt0000"));
        log.push(UpdateRecord::delete(1, "/a/dpwhwt0000"));
        assert_eq!(log.len(), 2);
        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].action, Action::Insert);
        assert_eq!(snapshot[1].action, Action::Delete);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut log = UpdateLog::new(4);
        log.push(UpdateRecord::insert(1, "/a/dpwhwt0000"));
        log.push(UpdateRecord::delete(2, "/a/dpwhwt0000"));
        let bytes = log.to_bytes().unwrap();
        let records = UpdateLog::records_from_bytes(&bytes).unwrap();
        assert_eq!(records, log.snapshot());
        assert_eq!("DELETE".parse::<Action>(), Ok(Action::Delete));
        assert!("upsert".parse::<Action>().is_err());
    }
}
