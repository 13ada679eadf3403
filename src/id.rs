//! Stable resource identifiers of the form `prefix:local-id`
//!
//! `prefix` names the owning mount (its `mount_point_id`); `local-id` is
//! private to the backend. Neither part may be empty or contain the
//! separator, which keeps `split` the exact inverse of `join`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StorageError};

/// Separator between prefix and local id
pub const SEPARATOR: char = ':';

/// A parsed `prefix:local-id` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    prefix: String,
    local_id: String,
}

impl ResourceId {
    pub fn new(prefix: impl Into<String>, local_id: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let local_id = local_id.into();
        validate_part(&prefix, "prefix", &prefix, &local_id)?;
        validate_part(&local_id, "local id", &prefix, &local_id)?;
        Ok(Self { prefix, local_id })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn into_parts(self) -> (String, String) {
        (self.prefix, self.local_id)
    }
}

fn validate_part(part: &str, what: &str, prefix: &str, local_id: &str) -> Result<()> {
    if part.is_empty() {
        return Err(StorageError::MalformedIdentifier(format!(
            "empty {} in {:?}",
            what,
            format!("{}{}{}", prefix, SEPARATOR, local_id)
        )));
    }
    if part.contains(SEPARATOR) {
        return Err(StorageError::MalformedIdentifier(format!(
            "{} {:?} contains '{}'",
            what, part, SEPARATOR
        )));
    }
    Ok(())
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, SEPARATOR, self.local_id)
    }
}

impl FromStr for ResourceId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, local_id) = s.split_once(SEPARATOR).ok_or_else(|| {
            StorageError::MalformedIdentifier(format!("missing '{}' in {:?}", SEPARATOR, s))
        })?;
        Self::new(prefix, local_id)
    }
}

/// Join a prefix and a local id into `prefix:local-id`
pub fn join(prefix: &str, local_id: &str) -> Result<String> {
    ResourceId::new(prefix, local_id).map(|id| id.to_string())
}

/// Split `prefix:local-id` into its two parts
pub fn split(identifier: &str) -> Result<(String, String)> {
    identifier.parse::<ResourceId>().map(ResourceId::into_parts)
}
