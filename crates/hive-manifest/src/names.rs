//! Manifest name and tag validation.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain control characters or `\`
//! - Must not start or end with `/`, or contain empty components (`//`)
//! - Must not contain `.` or `..` components
//!
//! Tags follow the same rules and additionally must not contain `/`.

use hive_types::ManifestKey;

use crate::error::{ManifestError, Result};

fn invalid(field: &'static str, value: &str, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidName {
        field,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn validate_component_path(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(field, value, "must not be empty"));
    }
    if let Some(ch) = value.chars().find(|c| c.is_control() || *c == '\\') {
        return Err(invalid(field, value, format!("contains forbidden character: {ch:?}")));
    }
    if value.starts_with('/') || value.ends_with('/') {
        return Err(invalid(field, value, "must not start or end with '/'"));
    }
    for component in value.split('/') {
        match component {
            "" => return Err(invalid(field, value, "must not contain '//'")),
            "." | ".." => return Err(invalid(field, value, "must not contain '.' or '..' components")),
            _ => {}
        }
    }
    Ok(())
}

/// Validate a manifest name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use hive_manifest::names::validate_name;
///
/// assert!(validate_name("app").is_ok());
/// assert!(validate_name("group/app/.meta/history").is_ok());
/// assert!(validate_name("").is_err());
/// assert!(validate_name("a/../b").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    validate_component_path("name", name)
}

/// Validate a manifest tag, returning `Ok(())` if valid.
pub fn validate_tag(tag: &str) -> Result<()> {
    validate_component_path("tag", tag)?;
    if tag.contains('/') {
        return Err(invalid("tag", tag, "must not contain '/'"));
    }
    Ok(())
}

/// Validate both parts of a key.
pub fn validate_key(key: &ManifestKey) -> Result<()> {
    validate_name(&key.name)?;
    validate_tag(&key.tag)
}
