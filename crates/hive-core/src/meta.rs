//! Sidecar documents attached to a manifest key.
//!
//! A [`MetaManifest`] stores one serialized document of type `T` under a
//! name derived from a target: `{name}/.meta/{kind}` for a manifest name, or
//! `{name}/.meta/{kind}/{tag}` for one specific manifest. Each write creates
//! a new version (tag `latest + 1`) whose root tree holds a single
//! `document.json` blob, and deletes the previous versions in the same
//! transaction. The superseded trees become garbage once collected.
//!
//! Two writers computing the same next version race through the manifest
//! conflict rule: the loser's commit fails with
//! [`HiveError::Conflict`](crate::HiveError::Conflict). Within one process,
//! callers doing read-modify-write must serialize themselves (see
//! [`InstanceHistory`](crate::InstanceHistory)).

use std::fmt;
use std::marker::PhantomData;

use hive_manifest::{validate_name, validate_tag, Manifest};
use hive_store::{EntryType, TreeBuilder};
use hive_types::ManifestKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{HiveError, HiveResult};
use crate::hive::{Hive, HiveRead};
use crate::ops::MetaWrite;
use crate::transaction::Transaction;

/// Name of the single entry in a meta document's root tree.
pub const DOCUMENT_ENTRY: &str = "document.json";
/// Label recording the kind on every meta manifest.
pub const KIND_LABEL: &str = "hive.meta.kind";

const META_SEGMENT: &str = ".meta";

/// Typed handle on a versioned sidecar document.
pub struct MetaManifest<T> {
    name: String,
    kind: String,
    _document: PhantomData<fn() -> T>,
}

impl<T> MetaManifest<T> {
    /// Document attached to one manifest (`name` and `tag`).
    pub fn new(target: &ManifestKey, kind: &str) -> HiveResult<Self> {
        Self::with_name(
            format!("{}/{META_SEGMENT}/{kind}/{}", target.name, target.tag),
            kind,
        )
    }

    /// Document attached to every tag of `name`.
    pub fn for_name(name: &str, kind: &str) -> HiveResult<Self> {
        Self::with_name(format!("{name}/{META_SEGMENT}/{kind}"), kind)
    }

    fn with_name(name: String, kind: &str) -> HiveResult<Self> {
        validate_tag(kind)?;
        validate_name(&name)?;
        Ok(Self {
            name,
            kind: kind.to_string(),
            _document: PhantomData,
        })
    }

    /// Manifest name the versions are stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Highest stored version, if any.
    pub fn latest_version<R: HiveRead + ?Sized>(&self, hive: &R) -> HiveResult<Option<u64>> {
        Ok(self.versions(hive)?.into_iter().max())
    }

    fn versions<R: HiveRead + ?Sized>(&self, hive: &R) -> HiveResult<Vec<u64>> {
        Ok(hive
            .list_tags(&self.name)?
            .iter()
            .filter_map(|tag| tag.parse().ok())
            .collect())
    }

    fn key(&self, version: u64) -> ManifestKey {
        ManifestKey::new(self.name.as_str(), version.to_string())
    }
}

impl<T: Serialize + DeserializeOwned> MetaManifest<T> {
    /// The current document, or `None` if none was ever written.
    ///
    /// Accepts a [`Hive`] (committed state) or a [`Transaction`] (staged
    /// state included).
    pub fn read<R: HiveRead + ?Sized>(&self, hive: &R) -> HiveResult<Option<T>> {
        let Some(version) = self.latest_version(hive)? else {
            return Ok(None);
        };
        let manifest = hive.resolve(&self.key(version))?;
        let tree = hive.read_tree(&manifest.root)?;
        let entry = tree.get(DOCUMENT_ENTRY).ok_or_else(|| {
            HiveError::InvalidDocument(format!("{} has no {DOCUMENT_ENTRY}", manifest.key))
        })?;
        let data = hive.get(&entry.object_id)?;
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| HiveError::InvalidDocument(format!("{}: {e}", manifest.key)))
    }

    /// The current document, or `T::default()`.
    pub fn read_or_default<R: HiveRead + ?Sized>(&self, hive: &R) -> HiveResult<T>
    where
        T: Default,
    {
        Ok(self.read(hive)?.unwrap_or_default())
    }

    /// Replace the document in its own transaction.
    pub fn write(&self, hive: &Hive, value: &T) -> HiveResult<ManifestKey> {
        hive.transaction(|tx| self.write_in(tx, value))
    }

    /// Stage a new version of the document in `tx` and stage deletion of
    /// every older version. Returns the new version's key.
    pub fn write_in(&self, tx: &Transaction<'_>, value: &T) -> HiveResult<ManifestKey> {
        let previous = self.versions(tx)?;
        let next = previous.iter().max().map_or(1, |v| v + 1);

        let document = serde_json::to_vec_pretty(value)?;
        let blob = tx.put(&document)?;
        let tree = TreeBuilder::new()
            .add(DOCUMENT_ENTRY, blob, EntryType::Blob)
            .build()?;
        let root = tx.put_tree(&tree)?;

        let key = self.key(next);
        tx.insert_manifest(Manifest::new(key.clone(), root).with_label(KIND_LABEL, self.kind.as_str()))?;
        for version in &previous {
            tx.delete_manifest(&self.key(*version))?;
        }

        debug!(key = %key, bytes = document.len(), superseded = previous.len(), "meta document staged");
        tx.audit_on_commit(&MetaWrite {
            key: &key,
            document_bytes: document.len(),
            superseded: previous.iter().map(u64::to_string).collect(),
        })?;
        Ok(key)
    }
}

impl<R: Serialize + DeserializeOwned> MetaManifest<Vec<R>> {
    /// Append `record` to the log in its own transaction and return the new
    /// length.
    ///
    /// The read-modify-append-write is not safe against concurrent appenders
    /// on its own; callers serialize appends to one document.
    pub fn append(&self, hive: &Hive, record: R) -> HiveResult<usize> {
        hive.transaction(|tx| self.append_in(tx, record))
    }

    pub fn append_in(&self, tx: &Transaction<'_>, record: R) -> HiveResult<usize> {
        let mut records = self.read(tx)?.unwrap_or_default();
        records.push(record);
        self.write_in(tx, &records)?;
        Ok(records.len())
    }
}

impl<T> fmt::Debug for MetaManifest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaManifest")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T> Clone for MetaManifest<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            _document: PhantomData,
        }
    }
}
