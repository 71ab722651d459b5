//! Permission identifiers (`namespace:name`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised when constructing or parsing a [`PermissionId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionIdError {
    #[error("'{0}' must not contain ':'")]
    IllegalColon(String),
    #[error("permission id part must not be blank")]
    Blank,
    #[error("'{0}' is not a valid permission id, expected 'namespace:name'")]
    Malformed(String),
}

/// Identity of a [`Permission`](super::Permission): a namespace plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionId {
    namespace: String,
    name: String,
}

impl PermissionId {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, PermissionIdError> {
        let namespace = namespace.into();
        let name = name.into();
        for part in [&namespace, &name] {
            if part.trim().is_empty() {
                return Err(PermissionIdError::Blank);
            }
            if part.contains(':') {
                return Err(PermissionIdError::IllegalColon(part.clone()));
            }
        }
        Ok(Self { namespace, name })
    }

    /// The id of the root permission, `*:*`.
    pub fn root() -> Self {
        Self {
            namespace: "*".to_string(),
            name: "*".to_string(),
        }
    }

    /// Allocate an id owned by a plugin; both parts are lower-cased.
    pub fn for_plugin(owner: &str, name: &str) -> Result<Self, PermissionIdError> {
        Self::new(owner.to_lowercase(), name.to_lowercase())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.namespace == "*" && self.name == "*"
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for PermissionId {
    type Err = PermissionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::root());
        }
        match s.split_once(':') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Err(PermissionIdError::Malformed(s.to_string())),
        }
    }
}
