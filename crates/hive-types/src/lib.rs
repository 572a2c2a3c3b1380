//! Foundation types for Hive, the content-addressed deployment store.
//!
//! Every other Hive crate depends on `hive-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash of raw bytes)
//! - [`ManifestKey`]: `(name, tag)` pair naming one manifest version

pub mod error;
pub mod key;
pub mod object;

pub use error::TypeError;
pub use key::ManifestKey;
pub use object::ObjectId;
