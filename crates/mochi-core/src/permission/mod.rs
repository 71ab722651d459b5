//! Hierarchical permissions.
//!
//! - [`PermissionId`]: `namespace:name` identifiers
//! - [`PermitteeId`]: who permissions are granted to, arranged in a DAG
//! - [`PermissionService`]: registration, grants and checks

mod id;
mod permittee;
mod service;

pub use id::{PermissionId, PermissionIdError};
pub use permittee::{Permittee, PermitteeId, PermitteeIdError};
pub use service::{Permission, PermissionError, PermissionService};
