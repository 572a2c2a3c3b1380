//! Manifest namespace for Hive.
//!
//! A manifest gives an immutable root tree a human-meaningful `(name, tag)`
//! key plus free-form labels. Names group the versions of one deployable
//! product; tags are its append-only version axis.
//!
//! # Rules
//!
//! - A key, once written, always points at the same root tree. Re-inserting
//!   it with the same root is a no-op, with a different root a
//!   [`ManifestError::Conflict`].
//! - Labels are fixed at creation.
//! - Deleting a manifest removes the name binding only; the objects it
//!   referenced are reclaimed by garbage collection.
//!
//! # Modules
//!
//! - [`error`]: Error types for manifest operations
//! - [`types`]: [`Manifest`]
//! - [`traits`]: The [`ManifestStore`] trait
//! - [`names`]: Name and tag validation
//! - [`memory`]: In-memory [`InMemoryManifestStore`] for tests
//! - [`filesystem`]: On-disk [`FsManifestStore`]

pub mod error;
pub mod filesystem;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{ManifestError, Result};
pub use filesystem::FsManifestStore;
pub use memory::InMemoryManifestStore;
pub use names::{validate_key, validate_name, validate_tag};
pub use traits::ManifestStore;
pub use types::Manifest;
