
use hive_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

// ---------------------------------------------------------------------------
// EntryType
// ---------------------------------------------------------------------------

/// What a tree entry points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Normal file.
    Blob,
    /// File with the executable bit set on export.
    ExecutableBlob,
    /// Subtree / directory.
    Tree,
    /// Symbolic link; the blob holds the link target.
    Symlink,
}

impl EntryType {
    /// Returns `true` if the entry refers to another tree.
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Blob => "blob",
            Self::ExecutableBlob => "exec",
            Self::Tree => "tree",
            Self::Symlink => "link",
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name (filename or directory name).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub object_id: ObjectId,
    /// Kind of the referenced object.
    pub entry_type: EntryType,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, object_id: ObjectId, entry_type: EntryType) -> Self {
        Self {
            name: name.into(),
            object_id,
            entry_type,
        }
    }
}

/// Immutable directory listing.
///
/// Entries are kept sorted by name so the serialized form, and therefore the
/// tree's own id, is deterministic. A tree can only reference ids that were
/// computed before it, so a tree graph can never contain a cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a tree from entries, validating names.
    ///
    /// Entries are sorted by name for deterministic hashing. Duplicate or
    /// invalid names are rejected.
    pub fn new(mut entries: Vec<TreeEntry>) -> StoreResult<Self> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }
        if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(StoreError::InvalidTree(format!(
                "duplicate entry name: {}",
                pair[0].name
            )));
        }
        Ok(Self { entries })
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Serialize to the canonical byte form that is hashed and stored.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode from stored bytes.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let raw: Tree =
            serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Re-validate: stored bytes may come from an older or foreign writer.
        Self::new(raw.entries)
    }

    /// The id this tree gets when stored.
    pub fn id(&self) -> StoreResult<ObjectId> {
        Ok(ObjectId::digest(&self.encode()?))
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Entries in name order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Ids of entries that are themselves trees.
    pub fn subtrees(&self) -> impl Iterator<Item = &ObjectId> {
        self.entries
            .iter()
            .filter(|e| e.entry_type.is_tree())
            .map(|e| &e.object_id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StoreError::InvalidTree(format!(
            "invalid entry name: {name:?}"
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(StoreError::InvalidTree(format!(
            "entry name must not contain '/' or NUL: {name:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TreeBuilder
// ---------------------------------------------------------------------------

/// Incremental tree construction.
///
/// Names are checked by [`build`](Self::build), which rejects duplicates
/// and invalid names the same way [`Tree::new`] does.
#[derive(Clone, Debug, Default)]
pub struct TreeBuilder {
    entries: Vec<TreeEntry>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, id: ObjectId, entry_type: EntryType) -> Self {
        self.insert(name, id, entry_type);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, id: ObjectId, entry_type: EntryType) {
        self.entries.push(TreeEntry::new(name, id, entry_type));
    }

    pub fn build(self) -> StoreResult<Tree> {
        Tree::new(self.entries)
    }
}
