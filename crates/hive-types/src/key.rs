use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of one manifest version: a `name` grouping related versions and
/// a per-name `tag`.
///
/// Keys order by name first, then tag (lexically). Insertion order of tags is
/// tracked separately by the manifest store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestKey {
    pub name: String,
    pub tag: String,
}

impl ManifestKey {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Parses `name:tag`. The split happens at the last `:` so names may contain
/// colons; tags may not.
impl FromStr for ManifestKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, tag) = s
            .rsplit_once(':')
            .ok_or_else(|| TypeError::InvalidKey(format!("expected name:tag, got {s:?}")))?;
        if name.is_empty() || tag.is_empty() {
            return Err(TypeError::InvalidKey(format!(
                "name and tag must be non-empty in {s:?}"
            )));
        }
        Ok(Self::new(name, tag))
    }
}
