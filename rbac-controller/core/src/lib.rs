#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod catalog;
pub mod resolution;
pub mod simulation;
mod subject;
mod verb;

pub use self::{
    catalog::{Catalog, DiscoverCatalog, PolicyRule, RoleKind, RoleRef},
    resolution::{BindingRef, GrantedRule, Inconsistency, InconsistencyReason, Resolution, Scope},
    simulation::{
        DiscoverResources, SimulateError, SimulateRequest, SimulateResponse, ValidationError,
        Verdict,
    },
    subject::{Subject, SubjectDirectory},
    verb::{InvalidVerb, Verb},
};

/// The API group of all RBAC resources.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Matches any verb, resource or API group in a policy rule.
pub const WILDCARD: &str = "*";
