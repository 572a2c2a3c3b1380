//! Auditable namespace and meta operations emitted by the hive.

use hive_manifest::Manifest;
use hive_types::{ManifestKey, ObjectId};
use uuid::Uuid;

use crate::audit::{AuditField, Auditable};

/// A manifest became visible through a commit.
#[derive(Debug)]
pub struct InsertManifest<'a> {
    pub transaction: Uuid,
    pub manifest: &'a Manifest,
}

impl Auditable for InsertManifest<'_> {
    fn operation(&self) -> &'static str {
        "manifest.insert"
    }

    fn audit_fields(&self) -> Vec<AuditField> {
        vec![
            AuditField::full("transaction", &self.transaction.to_string()),
            AuditField::full("key", &self.manifest.key),
            AuditField::full("root", &self.manifest.root),
            AuditField::full("labels", &self.manifest.labels),
        ]
    }
}

/// A manifest binding was removed through a commit.
#[derive(Debug)]
pub struct DeleteManifest<'a> {
    pub transaction: Uuid,
    pub key: &'a ManifestKey,
}

impl Auditable for DeleteManifest<'_> {
    fn operation(&self) -> &'static str {
        "manifest.delete"
    }

    fn audit_fields(&self) -> Vec<AuditField> {
        vec![
            AuditField::full("transaction", &self.transaction.to_string()),
            AuditField::full("key", self.key),
        ]
    }
}

/// Summary of one outermost commit.
#[derive(Debug)]
pub struct CommitTransaction {
    pub transaction: Uuid,
    pub objects: Vec<ObjectId>,
    pub inserted: Vec<ManifestKey>,
    pub deleted: Vec<ManifestKey>,
}

impl Auditable for CommitTransaction {
    fn operation(&self) -> &'static str {
        "transaction.commit"
    }

    fn audit_fields(&self) -> Vec<AuditField> {
        vec![
            AuditField::full("transaction", &self.transaction.to_string()),
            AuditField::size("objects", &self.objects),
            AuditField::peek("inserted", 5, &self.inserted),
            AuditField::peek("deleted", 5, &self.deleted),
        ]
    }
}

/// A new version of a meta document was committed.
#[derive(Debug)]
pub struct MetaWrite<'a> {
    pub key: &'a ManifestKey,
    pub document_bytes: usize,
    pub superseded: Vec<String>,
}

impl Auditable for MetaWrite<'_> {
    fn operation(&self) -> &'static str {
        "meta.write"
    }

    fn audit_fields(&self) -> Vec<AuditField> {
        vec![
            AuditField::full("key", self.key),
            AuditField::full("document_bytes", &self.document_bytes),
            AuditField::full("superseded", &self.superseded),
        ]
    }
}
