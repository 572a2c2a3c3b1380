//! Content-addressed object storage for Hive.
//!
//! Every file of a deployed application bundle, and every directory listing
//! describing how those files are arranged, is stored as an immutable object
//! identified by the BLAKE3 hash of its bytes. Identical content is stored
//! once per hive no matter how many trees or manifests reference it.
//!
//! # Object Types
//!
//! - raw blobs -- file contents, stored as-is
//! - [`Tree`] -- directory listing mapping names to `(ObjectId, EntryType)`
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- fan-out directory layout on a local filesystem
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Every read re-hashes the content; a mismatch is reported as
//!    [`StoreError::Corrupt`], never returned as data.
//! 3. Deletion is reserved for garbage collection.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod filesystem;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use filesystem::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{EntryType, Tree, TreeBuilder, TreeEntry};
pub use traits::{ObjectInfo, ObjectStore};
