//! Append-only lifecycle history of an instance.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use hive_types::ManifestKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HiveResult;
use crate::hive::Hive;
use crate::meta::MetaManifest;

/// Meta kind under which history is stored.
pub const HISTORY_KIND: &str = "history";

/// Lifecycle transition recorded in an instance history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    Create,
    Install,
    Uninstall,
    Activate,
    Deactivate,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        };
        f.pad(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub action: HistoryAction,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub user: String,
    pub comment: String,
}

impl HistoryRecord {
    pub fn new(action: HistoryAction, timestamp: i64, user: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            action,
            timestamp,
            user: user.into(),
            comment: comment.into(),
        }
    }
}

impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Utc.timestamp_millis_opt(self.timestamp).single() {
            Some(at) => write!(f, "{} ", at.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{} ", self.timestamp),
        }?;
        write!(f, "{:<10} {}", self.action, self.user)?;
        if !self.comment.is_empty() {
            write!(f, ": {}", self.comment)?;
        }
        Ok(())
    }
}

/// History log of one instance manifest.
///
/// Every append holds a per-instance guard across the whole
/// read-modify-append-write, so concurrent callers sharing this value never
/// lose a record. Share it behind an `Arc` rather than creating one per
/// caller: separate values for the same instance do not share the guard.
pub struct InstanceHistory {
    hive: Arc<Hive>,
    meta: MetaManifest<Vec<HistoryRecord>>,
    guard: Mutex<()>,
}

impl InstanceHistory {
    pub fn new(hive: Arc<Hive>, instance: &ManifestKey) -> HiveResult<Self> {
        Ok(Self {
            hive,
            meta: MetaManifest::new(instance, HISTORY_KIND)?,
            guard: Mutex::new(()),
        })
    }

    /// Append an event stamped with the current time.
    pub fn record_event(
        &self,
        action: HistoryAction,
        user: impl Into<String>,
        comment: impl Into<String>,
    ) -> HiveResult<HistoryRecord> {
        let record = HistoryRecord::new(action, Utc::now().timestamp_millis(), user, comment);
        self.record(record.clone())?;
        Ok(record)
    }

    /// Append `record` as given.
    pub fn record(&self, record: HistoryRecord) -> HiveResult<()> {
        let _guard = self
            .guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let action = record.action;
        let len = self.meta.append(&self.hive, record)?;
        debug!(history = self.meta.name(), %action, len, "history event recorded");
        Ok(())
    }

    /// Every record in the order it was appended.
    pub fn full_history(&self) -> HiveResult<Vec<HistoryRecord>> {
        self.meta.read_or_default(self.hive.as_ref())
    }

    /// The matching record with the greatest timestamp.
    pub fn find_most_recent(&self, action: HistoryAction) -> HiveResult<Option<HistoryRecord>> {
        Ok(self
            .full_history()?
            .into_iter()
            .filter(|r| r.action == action)
            .max_by_key(|r| r.timestamp))
    }

    /// The first matching record in log order.
    pub fn find_first(&self, action: HistoryAction) -> HiveResult<Option<HistoryRecord>> {
        Ok(self
            .full_history()?
            .into_iter()
            .find(|r| r.action == action))
    }

    pub fn meta(&self) -> &MetaManifest<Vec<HistoryRecord>> {
        &self.meta
    }
}

impl fmt::Debug for InstanceHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHistory")
            .field("hive", &self.hive.name())
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> InstanceHistory {
        let hive = Arc::new(Hive::in_memory("t"));
        InstanceHistory::new(hive, &ManifestKey::new("app", "1.0")).unwrap()
    }

    #[test]
    fn empty_history() {
        let h = history();
        assert!(h.full_history().unwrap().is_empty());
        assert!(h.find_first(HistoryAction::Install).unwrap().is_none());
        assert!(h.find_most_recent(HistoryAction::Install).unwrap().is_none());
    }

    #[test]
    fn most_recent_is_by_timestamp_first_is_by_order() {
        let h = history();
        h.record(HistoryRecord::new(HistoryAction::Install, 300, "a", "")).unwrap();
        h.record(HistoryRecord::new(HistoryAction::Activate, 100, "b", "")).unwrap();
        h.record(HistoryRecord::new(HistoryAction::Install, 200, "c", "late clock")).unwrap();

        assert_eq!(h.find_first(HistoryAction::Install).unwrap().unwrap().user, "a");
        assert_eq!(h.find_most_recent(HistoryAction::Install).unwrap().unwrap().timestamp, 300);
        assert_eq!(h.find_most_recent(HistoryAction::Activate).unwrap().unwrap().user, "b");

        let users: Vec<_> = h.full_history().unwrap().into_iter().map(|r| r.user).collect();
        assert_eq!(users, ["a", "b", "c"]);
    }

    #[test]
    fn record_event_stamps_now() {
        let h = history();
        let before = Utc::now().timestamp_millis();
        let rec = h.record_event(HistoryAction::Create, "ops", "initial").unwrap();
        assert!(rec.timestamp >= before);
        assert_eq!(h.full_history().unwrap(), vec![rec]);
    }

    #[test]
    fn display_is_readable() {
        let rec = HistoryRecord::new(HistoryAction::Install, 0, "ops", "first");
        assert_eq!(rec.to_string(), "1970-01-01 00:00:00 install    ops: first");
    }
}
