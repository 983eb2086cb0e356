//! RBAC Resolution Engine
//!
//! The engine answers questions about the permissions granted by a cluster's RBAC resources. It
//! operates on a [`Snapshot`]: a point-in-time catalog of the following resources, together with
//! indexes derived from it:
//!
//! - Each `Role` holds rules that apply within its namespace.
//! - Each `ClusterRole` holds rules that may apply cluster-wide.
//! - Each `RoleBinding` grants a `Role` or `ClusterRole` to a list of subjects, scoped to the
//!   binding's namespace.
//! - Each `ClusterRoleBinding` grants a `ClusterRole` to a list of subjects, cluster-wide.
//!
//! ```text
//! [ Role | ClusterRole ] <- [ RoleBinding | ClusterRoleBinding ] -> [ Subject ]
//! ```
//!
//! The graph is two levels deep and acyclic, so resolution always terminates. A snapshot is
//! immutable once built and may be shared freely between concurrent queries. Snapshots are not
//! retained: each request obtains a fresh catalog and builds a new snapshot.
//!
//! Bindings that reference roles missing from the catalog are reported as inconsistencies and
//! otherwise ignored, since the catalog may be briefly inconsistent between writes.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod resolve;
pub mod resources;
mod simulate;
mod snapshot;


pub use self::{resources::Resources, snapshot::Snapshot};
