//! Structured audit records for operations on the namespace and meta layer.
//!
//! Each auditable operation declares its fields explicitly through
//! [`Auditable`], choosing per field how the value is rendered: in full, as
//! its size, or as a peek at the first few elements. Records are handed to an
//! [`AuditSink`]; the hive never interprets them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::sync::Mutex;

use hive_types::{ManifestKey, ObjectId};
use serde::Serialize;
use tracing::info;

/// How a field value is rendered into an audit record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditStrategy {
    /// The complete value.
    Full,
    /// Only the number of elements (or bytes, for strings).
    Size,
    /// The first `n` elements, followed by `...` if there were more.
    Peek(usize),
}

/// A value that can be rendered under every [`AuditStrategy`].
pub trait AuditValue {
    fn render_full(&self) -> String;
    fn audit_size(&self) -> usize;
    fn render_peek(&self, n: usize) -> String;

    fn render(&self, strategy: AuditStrategy) -> String {
        match strategy {
            AuditStrategy::Full => self.render_full(),
            AuditStrategy::Size => self.audit_size().to_string(),
            AuditStrategy::Peek(n) => self.render_peek(n),
        }
    }
}

fn peek_items<I>(items: I, total: usize, n: usize) -> String
where
    I: Iterator<Item = String>,
{
    let mut out = items.take(n).collect::<Vec<_>>().join(", ");
    if total > n {
        out.push_str(", ...");
    }
    format!("[{out}]")
}

impl AuditValue for str {
    fn render_full(&self) -> String {
        self.to_string()
    }

    fn audit_size(&self) -> usize {
        self.len()
    }

    fn render_peek(&self, n: usize) -> String {
        let mut out: String = self.chars().take(n).collect();
        if self.chars().count() > n {
            out.push_str("...");
        }
        out
    }
}

impl AuditValue for String {
    fn render_full(&self) -> String {
        self.as_str().render_full()
    }

    fn audit_size(&self) -> usize {
        self.as_str().audit_size()
    }

    fn render_peek(&self, n: usize) -> String {
        self.as_str().render_peek(n)
    }
}

macro_rules! scalar_audit_value {
    ($($ty:ty),*) => {
        $(
            impl AuditValue for $ty {
                fn render_full(&self) -> String {
                    self.to_string()
                }

                fn audit_size(&self) -> usize {
                    1
                }

                fn render_peek(&self, _n: usize) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

scalar_audit_value!(ObjectId, ManifestKey, u64, i64, usize, bool);

impl<T: Display> AuditValue for [T] {
    fn render_full(&self) -> String {
        peek_items(self.iter().map(ToString::to_string), self.len(), self.len())
    }

    fn audit_size(&self) -> usize {
        self.len()
    }

    fn render_peek(&self, n: usize) -> String {
        peek_items(self.iter().map(ToString::to_string), self.len(), n)
    }
}

impl<T: Display> AuditValue for Vec<T> {
    fn render_full(&self) -> String {
        self.as_slice().render_full()
    }

    fn audit_size(&self) -> usize {
        self.len()
    }

    fn render_peek(&self, n: usize) -> String {
        self.as_slice().render_peek(n)
    }
}

impl<T: Display> AuditValue for BTreeSet<T> {
    fn render_full(&self) -> String {
        self.render_peek(self.len())
    }

    fn audit_size(&self) -> usize {
        self.len()
    }

    fn render_peek(&self, n: usize) -> String {
        peek_items(self.iter().map(ToString::to_string), self.len(), n)
    }
}

impl<K: Display, V: Display> AuditValue for BTreeMap<K, V> {
    fn render_full(&self) -> String {
        self.render_peek(self.len())
    }

    fn audit_size(&self) -> usize {
        self.len()
    }

    fn render_peek(&self, n: usize) -> String {
        peek_items(
            self.iter().map(|(k, v)| format!("{k}={v}")),
            self.len(),
            n,
        )
    }
}

/// One rendered field of an audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditField {
    pub name: &'static str,
    pub value: String,
}

impl AuditField {
    pub fn new<V: AuditValue + ?Sized>(name: &'static str, strategy: AuditStrategy, value: &V) -> Self {
        Self {
            name,
            value: value.render(strategy),
        }
    }

    pub fn full<V: AuditValue + ?Sized>(name: &'static str, value: &V) -> Self {
        Self::new(name, AuditStrategy::Full, value)
    }

    pub fn size<V: AuditValue + ?Sized>(name: &'static str, value: &V) -> Self {
        Self::new(name, AuditStrategy::Size, value)
    }

    pub fn peek<V: AuditValue + ?Sized>(name: &'static str, n: usize, value: &V) -> Self {
        Self::new(name, AuditStrategy::Peek(n), value)
    }
}

/// The output handed to an [`AuditSink`]: operation name plus ordered fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub operation: &'static str,
    pub fields: Vec<AuditField>,
}

impl AuditRecord {
    /// Value of the first field named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// An operation that can describe itself for auditing.
pub trait Auditable {
    fn operation(&self) -> &'static str;

    /// Fields in the order they should appear in the record.
    fn audit_fields(&self) -> Vec<AuditField>;

    fn audit_record(&self) -> AuditRecord {
        AuditRecord {
            operation: self.operation(),
            fields: self.audit_fields(),
        }
    }
}

/// Receiver of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits every record as a structured `tracing` event on the `hive::audit`
/// target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let fields = record
            .fields
            .iter()
            .map(|f| format!("{}={}", f.name, f.value))
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "hive::audit", operation = record.operation, %fields, "audit");
    }
}

/// Collects records in memory; used by tests and embedders that forward
/// records in batches.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Deploy {
        target: ManifestKey,
        nodes: Vec<String>,
        payload: String,
    }

    impl Auditable for Deploy {
        fn operation(&self) -> &'static str {
            "deploy"
        }

        fn audit_fields(&self) -> Vec<AuditField> {
            vec![
                AuditField::full("target", &self.target),
                AuditField::peek("nodes", 2, &self.nodes),
                AuditField::size("payload", &self.payload),
            ]
        }
    }

    #[test]
    fn strategies_render_as_declared() {
        let op = Deploy {
            target: ManifestKey::new("app", "1.0"),
            nodes: vec!["a".into(), "b".into(), "c".into()],
            payload: "0123456789".into(),
        };
        let record = op.audit_record();
        assert_eq!(record.operation, "deploy");
        let names: Vec<_> = record.fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["target", "nodes", "payload"]);
        assert_eq!(record.get("target"), Some("app:1.0"));
        assert_eq!(record.get("nodes"), Some("[a, b, ...]"));
        assert_eq!(record.get("payload"), Some("10"));
    }

    #[test]
    fn peek_without_overflow_has_no_ellipsis() {
        let v = vec![1u64, 2];
        assert_eq!(v.render(AuditStrategy::Peek(5)), "[1, 2]");
        assert_eq!(v.render(AuditStrategy::Full), "[1, 2]");
        assert_eq!("abcdef".render(AuditStrategy::Peek(3)), "abc...");
    }

    #[test]
    fn maps_render_pairs() {
        let mut labels = BTreeMap::new();
        labels.insert("a", "1");
        labels.insert("b", "2");
        assert_eq!(labels.render(AuditStrategy::Full), "[a=1, b=2]");
        assert_eq!(labels.render(AuditStrategy::Size), "2");
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        sink.record(&AuditRecord {
            operation: "x",
            fields: vec![],
        });
        TracingAuditSink.record(&AuditRecord {
            operation: "y",
            fields: vec![AuditField::full("k", "v")],
        });
        assert_eq!(sink.records().len(), 1);
    }
}
