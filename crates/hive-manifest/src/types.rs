//! The manifest record.

use std::collections::BTreeMap;

use hive_types::{ManifestKey, ObjectId};
use serde::{Deserialize, Serialize};

/// A named, tagged pointer to a root tree plus labels.
///
/// The manifest owns a reference to its root, not a copy: many manifests may
/// share subtrees and blobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub key: ManifestKey,
    pub root: ObjectId,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(key: ManifestKey, root: ObjectId) -> Self {
        Self {
            key,
            root,
            labels: BTreeMap::new(),
        }
    }

    /// Attach a label. Only meaningful before the manifest is inserted.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_kept() {
        let m = Manifest::new(ManifestKey::new("app", "1"), ObjectId::digest(b"root"))
            .with_label("product", "demo")
            .with_label("arch", "x86_64");
        assert_eq!(m.label("product"), Some("demo"));
        assert_eq!(m.label("missing"), None);
        assert_eq!(m.labels.len(), 2);
    }

    #[test]
    fn missing_labels_deserialize_empty() {
        let root = ObjectId::digest(b"root");
        let json = format!(r#"{{"key":{{"name":"a","tag":"1"}},"root":"{root}"}}"#);
        let m: Manifest = serde_json::from_str(&json).unwrap();
        assert!(m.labels.is_empty());
        assert_eq!(m.root, root);
    }
}
