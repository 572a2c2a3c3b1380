//! Scoped, all-or-nothing batches of writes against one hive.
//!
//! A [`Transaction`] stages object and manifest writes in memory. Nothing is
//! visible to readers outside the transaction until the outermost handle
//! commits. Handles obtained through [`Transaction::join`] (or
//! [`Hive::begin_or_join`](crate::Hive::begin_or_join)) share the outer
//! scope: their writes land in the same staging area and their `commit` is
//! only a boundary.
//!
//! Staging a manifest insert also stages the full closure of its root, so
//! the commit rewrites every object the manifest reaches. A root that was
//! already committed therefore gets a fresh write time and cannot be swept
//! as old garbage while the new manifest is being published.
//!
//! Commit runs under the hive's write lock:
//!
//! 1. every staged manifest insert is re-checked against committed state;
//!    any conflict aborts the commit before anything is written,
//! 2. staged objects are written,
//! 3. staged deletes are applied, then staged inserts,
//! 4. audit records deferred to commit are emitted.
//!
//! Dropping an uncommitted outermost handle rolls the transaction back.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use hive_manifest::{validate_key, Manifest};
use hive_store::Tree;
use hive_types::{ManifestKey, ObjectId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecord, Auditable};
use crate::error::{HiveError, HiveResult};
use crate::hive::{Hive, HiveRead};
use crate::ops::{CommitTransaction, DeleteManifest, InsertManifest};

#[derive(Debug, Default)]
struct Staged {
    objects: HashMap<ObjectId, Vec<u8>>,
    /// Staged inserts in the order they were made.
    inserts: Vec<Manifest>,
    deletes: BTreeSet<ManifestKey>,
    /// Records emitted only if the transaction commits.
    audits: Vec<AuditRecord>,
    closed: bool,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }

    fn staged_insert(&self, key: &ManifestKey) -> Option<&Manifest> {
        self.inserts.iter().find(|m| &m.key == key)
    }
}

/// A handle on an open transaction.
pub struct Transaction<'h> {
    hive: &'h Hive,
    id: Uuid,
    staged: Arc<Mutex<Staged>>,
    outermost: bool,
    finished: bool,
}

impl<'h> Transaction<'h> {
    pub(crate) fn begin(hive: &'h Hive) -> Self {
        let id = Uuid::now_v7();
        debug!(transaction = %id, hive = hive.name(), "transaction opened");
        Self {
            hive,
            id,
            staged: Arc::new(Mutex::new(Staged::default())),
            outermost: true,
            finished: false,
        }
    }

    /// A nested handle sharing this transaction's scope.
    pub fn join(&self) -> Transaction<'h> {
        Transaction {
            hive: self.hive,
            id: self.id,
            staged: Arc::clone(&self.staged),
            outermost: false,
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn hive(&self) -> &'h Hive {
        self.hive
    }

    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    fn lock(&self) -> HiveResult<MutexGuard<'_, Staged>> {
        let staged = self
            .staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if staged.closed {
            return Err(HiveError::TransactionClosed(self.id));
        }
        Ok(staged)
    }

    // ---- Writes ----

    /// Stage an object and return its id.
    pub fn put(&self, data: &[u8]) -> HiveResult<ObjectId> {
        let id = ObjectId::digest(data);
        self.lock()?
            .objects
            .entry(id)
            .or_insert_with(|| data.to_vec());
        Ok(id)
    }

    /// Stage the encoding of `tree` and return its id.
    pub fn put_tree(&self, tree: &Tree) -> HiveResult<ObjectId> {
        self.put(&tree.encode()?)
    }

    /// Stage a manifest insert.
    ///
    /// Returns `false` if the identical manifest is already visible. Fails
    /// with [`HiveError::Conflict`] if the key is bound to a different root
    /// and with [`HiveError::ObjectNotFound`] if any object reachable from
    /// the root is neither staged nor committed.
    pub fn insert_manifest(&self, manifest: Manifest) -> HiveResult<bool> {
        validate_key(&manifest.key)?;
        let mut staged = self.lock()?;

        if let Some(existing) = staged.staged_insert(&manifest.key) {
            return check_root(existing, &manifest).map(|()| false);
        }
        if !staged.deletes.contains(&manifest.key) {
            if let Some(existing) = self.hive.read_manifest(&manifest.key)? {
                return check_root(&existing, &manifest).map(|()| false);
            }
        }
        self.stage_closure(&mut staged, manifest.root)?;

        staged.inserts.push(manifest);
        Ok(true)
    }

    /// Stage every object reachable from `root`, copying committed ones into
    /// the staging area.
    fn stage_closure(&self, staged: &mut Staged, root: ObjectId) -> HiveResult<()> {
        let mut pending = vec![(root, true)];
        let mut seen = BTreeSet::new();
        while let Some((id, maybe_tree)) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let data = match staged.objects.get(&id) {
                Some(data) => data.clone(),
                None => {
                    let data = self.hive.get(&id)?;
                    staged.objects.insert(id, data.clone());
                    data
                }
            };
            if !maybe_tree {
                continue;
            }
            // A root may be a plain blob.
            if let Ok(tree) = Tree::decode(&data) {
                pending.extend(
                    tree.entries()
                        .iter()
                        .map(|e| (e.object_id, e.entry_type.is_tree())),
                );
            }
        }
        Ok(())
    }

    /// Emit `op` to the hive's audit sink once the transaction commits.
    pub(crate) fn audit_on_commit(&self, op: &dyn Auditable) -> HiveResult<()> {
        self.lock()?.audits.push(op.audit_record());
        Ok(())
    }

    /// Stage removal of a manifest binding. Returns whether the key was
    /// visible to this transaction.
    pub fn delete_manifest(&self, key: &ManifestKey) -> HiveResult<bool> {
        let mut staged = self.lock()?;
        let before = staged.inserts.len();
        staged.inserts.retain(|m| &m.key != key);
        let was_staged = staged.inserts.len() != before;

        let committed = self.hive.read_manifest(key)?.is_some();
        let was_committed = committed && !staged.deletes.contains(key);
        if committed {
            staged.deletes.insert(key.clone());
        }
        Ok(was_staged || was_committed)
    }

    // ---- Reads (staged, then committed) ----

    pub fn get(&self, id: &ObjectId) -> HiveResult<Vec<u8>> {
        if let Some(data) = self.lock()?.objects.get(id) {
            return Ok(data.clone());
        }
        self.hive.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> HiveResult<bool> {
        if self.lock()?.objects.contains_key(id) {
            return Ok(true);
        }
        self.hive.contains(id)
    }

    pub fn read_tree(&self, id: &ObjectId) -> HiveResult<Tree> {
        HiveRead::read_tree(self, id)
    }

    pub fn read_manifest(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        let staged = self.lock()?;
        if let Some(m) = staged.staged_insert(key) {
            return Ok(Some(m.clone()));
        }
        if staged.deletes.contains(key) {
            return Ok(None);
        }
        self.hive.read_manifest(key)
    }

    pub fn resolve(&self, key: &ManifestKey) -> HiveResult<Manifest> {
        HiveRead::resolve(self, key)
    }

    /// Committed tags of `name` minus staged deletes, followed by staged
    /// inserts, in insertion order.
    pub fn list_tags(&self, name: &str) -> HiveResult<Vec<String>> {
        let staged = self.lock()?;
        let mut tags: Vec<String> = self
            .hive
            .list_tags(name)?
            .into_iter()
            .filter(|tag| !staged.deletes.contains(&ManifestKey::new(name, tag.as_str())))
            .collect();
        tags.extend(
            staged
                .inserts
                .iter()
                .filter(|m| m.key.name == name)
                .map(|m| m.key.tag.clone()),
        );
        Ok(tags)
    }

    // ---- Scope exit ----

    /// Close this handle.
    ///
    /// On the outermost handle this applies every staged write. On a nested
    /// handle it only marks the end of the nested scope.
    pub fn commit(mut self) -> HiveResult<()> {
        self.finished = true;
        if !self.outermost {
            return Ok(());
        }

        let staged = {
            let mut guard = self.lock()?;
            let staged = std::mem::take(&mut *guard);
            guard.closed = true;
            staged
        };
        self.apply(staged)
    }

    /// Discard every staged write. On a nested handle this discards the
    /// writes of the whole shared scope.
    pub fn rollback(mut self) {
        self.finished = true;
        self.discard();
    }

    fn discard(&self) {
        let mut staged = self
            .staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if staged.closed {
            return;
        }
        if !staged.is_empty() {
            debug!(
                transaction = %self.id,
                objects = staged.objects.len(),
                inserts = staged.inserts.len(),
                deletes = staged.deletes.len(),
                "transaction rolled back"
            );
        }
        *staged = Staged {
            closed: true,
            ..Staged::default()
        };
    }

    fn apply(&self, staged: Staged) -> HiveResult<()> {
        if staged.is_empty() {
            return Ok(());
        }
        let _write = self.hive.lock_writes()?;

        let mut inserts = Vec::with_capacity(staged.inserts.len());
        for manifest in staged.inserts {
            if !staged.deletes.contains(&manifest.key) {
                if let Some(existing) = self.hive.read_manifest(&manifest.key)? {
                    check_root(&existing, &manifest)?;
                    continue;
                }
            }
            inserts.push(manifest);
        }

        let objects: Vec<ObjectId> = staged.objects.keys().copied().collect();
        for data in staged.objects.values() {
            self.hive.objects().write(data)?;
        }

        let mut deleted = Vec::with_capacity(staged.deletes.len());
        for key in &staged.deletes {
            if self.hive.manifests().delete(key)? {
                self.hive.emit(&DeleteManifest {
                    transaction: self.id,
                    key,
                });
                deleted.push(key.clone());
            }
        }

        let mut inserted = Vec::with_capacity(inserts.len());
        for manifest in &inserts {
            if self.hive.manifests().insert(manifest)? {
                self.hive.emit(&InsertManifest {
                    transaction: self.id,
                    manifest,
                });
                inserted.push(manifest.key.clone());
            }
        }

        for record in &staged.audits {
            self.hive.emit_record(record);
        }
        info!(
            transaction = %self.id,
            hive = self.hive.name(),
            objects = objects.len(),
            inserted = inserted.len(),
            deleted = deleted.len(),
            "transaction committed"
        );
        self.hive.emit(&CommitTransaction {
            transaction: self.id,
            objects,
            inserted,
            deleted,
        });
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || !self.outermost {
            return;
        }
        let pending = {
            let staged = self
                .staged
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            !staged.closed && !staged.is_empty()
        };
        if pending {
            warn!(transaction = %self.id, hive = self.hive.name(), "transaction dropped without commit, rolling back");
        }
        self.discard();
    }
}

impl HiveRead for Transaction<'_> {
    fn get(&self, id: &ObjectId) -> HiveResult<Vec<u8>> {
        Transaction::get(self, id)
    }

    fn contains(&self, id: &ObjectId) -> HiveResult<bool> {
        Transaction::contains(self, id)
    }

    fn read_manifest(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        Transaction::read_manifest(self, key)
    }

    fn list_tags(&self, name: &str) -> HiveResult<Vec<String>> {
        Transaction::list_tags(self, name)
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("hive", &self.hive.name())
            .field("outermost", &self.outermost)
            .finish()
    }
}

fn check_root(existing: &Manifest, attempted: &Manifest) -> HiveResult<()> {
    if existing.root == attempted.root {
        Ok(())
    } else {
        Err(HiveError::Conflict {
            key: attempted.key.clone(),
            existing: existing.root,
            attempted: attempted.root,
        })
    }
}
