//! Rolling per-day client usage counters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use hive_types::ManifestKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HiveResult;
use crate::hive::Hive;
use crate::meta::MetaManifest;

pub const USAGE_KIND: &str = "client-usage";
/// Number of distinct days retained.
pub const MAX_DAYS: usize = 30;

/// `day -> application -> hostname -> count`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientUsageData {
    days: BTreeMap<NaiveDate, BTreeMap<String, BTreeMap<String, u64>>>,
}

impl ClientUsageData {
    /// Count one use and evict all but the [`MAX_DAYS`] most recent days.
    pub fn increment(&mut self, day: NaiveDate, application: &str, hostname: &str) {
        *self
            .days
            .entry(day)
            .or_default()
            .entry(application.to_string())
            .or_default()
            .entry(hostname.to_string())
            .or_default() += 1;
        while self.days.len() > MAX_DAYS {
            self.days.pop_first();
        }
    }

    pub fn count(&self, day: NaiveDate, application: &str, hostname: &str) -> u64 {
        self.days
            .get(&day)
            .and_then(|apps| apps.get(application))
            .and_then(|hosts| hosts.get(hostname))
            .copied()
            .unwrap_or(0)
    }

    /// Uses of `application` across every retained day and host.
    pub fn total(&self, application: &str) -> u64 {
        self.days
            .values()
            .filter_map(|apps| apps.get(application))
            .flat_map(|hosts| hosts.values())
            .sum()
    }

    /// Retained days, oldest first.
    pub fn days(&self) -> impl Iterator<Item = &NaiveDate> {
        self.days.keys()
    }

    /// Every `(day, application, hostname, count)`, oldest day first.
    pub fn entries(&self) -> impl Iterator<Item = (NaiveDate, &str, &str, u64)> + '_ {
        self.days.iter().flat_map(|(day, apps)| {
            apps.iter().flat_map(move |(app, hosts)| {
                hosts
                    .iter()
                    .map(move |(host, count)| (*day, app.as_str(), host.as_str(), *count))
            })
        })
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Usage counters of one instance, stored as a single-value meta document.
pub struct ClientUsage {
    hive: Arc<Hive>,
    meta: MetaManifest<ClientUsageData>,
    guard: Mutex<()>,
}

impl ClientUsage {
    pub fn new(hive: Arc<Hive>, instance: &ManifestKey) -> HiveResult<Self> {
        Ok(Self {
            hive,
            meta: MetaManifest::new(instance, USAGE_KIND)?,
            guard: Mutex::new(()),
        })
    }

    /// Count one use of `application` from `hostname` on `day`.
    pub fn increment(&self, application: &str, hostname: &str, day: NaiveDate) -> HiveResult<()> {
        let _guard = self
            .guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.hive.transaction(|tx| {
            let mut data = self.meta.read_or_default(tx)?;
            data.increment(day, application, hostname);
            self.meta.write_in(tx, &data)?;
            debug!(%day, application, hostname, days = data.len(), "client usage counted");
            Ok(())
        })
    }

    /// Count one use today (UTC).
    pub fn increment_today(&self, application: &str, hostname: &str) -> HiveResult<()> {
        self.increment(application, hostname, Utc::now().date_naive())
    }

    pub fn read(&self) -> HiveResult<ClientUsageData> {
        self.meta.read_or_default(self.hive.as_ref())
    }
}

impl fmt::Debug for ClientUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientUsage")
            .field("hive", &self.hive.name())
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(n)
    }

    #[test]
    fn counts_accumulate_per_host() {
        let mut data = ClientUsageData::default();
        data.increment(day(0), "app", "h1");
        data.increment(day(0), "app", "h1");
        data.increment(day(0), "app", "h2");
        data.increment(day(1), "other", "h1");
        assert_eq!(data.count(day(0), "app", "h1"), 2);
        assert_eq!(data.count(day(0), "app", "h2"), 1);
        assert_eq!(data.count(day(1), "app", "h1"), 0);
        assert_eq!(data.total("app"), 3);
        let entries: Vec<_> = data.entries().collect();
        assert_eq!(entries[0], (day(0), "app", "h1", 2));
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn document_serializes_by_day() {
        let mut data = ClientUsageData::default();
        data.increment(day(0), "app", "h1");
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"2024-01-01":{"app":{"h1":1}}}"#);
        let back: ClientUsageData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn stored_usage_keeps_thirty_days() {
        let hive = Arc::new(Hive::in_memory("t"));
        let usage = ClientUsage::new(hive.clone(), &ManifestKey::new("app", "1")).unwrap();
        for n in 0..31 {
            usage.increment("app", "host", day(n)).unwrap();
        }
        let data = usage.read().unwrap();
        assert_eq!(data.len(), MAX_DAYS);
        assert_eq!(data.days().next(), Some(&day(1)));
        assert_eq!(data.count(day(0), "app", "host"), 0);
        assert_eq!(data.count(day(30), "app", "host"), 1);
        // one live version of the document
        assert_eq!(hive.list_tags(&format!("app/.meta/{USAGE_KIND}/1")).unwrap().len(), 1);
    }
}
