//! Types describing what-if authorization checks.

use crate::{InvalidVerb, Subject, Verb};
use ahash::AHashSet as HashSet;
use anyhow::Result;
use std::collections::BTreeMap;
use thiserror::Error;

/// Asks whether a subject, by way of a named role, holds each `(verb, resource)` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulateRequest {
    pub subject: Subject,
    pub role: String,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulateResponse {
    /// True iff every requested pair is allowed.
    pub authorized: bool,
    pub verdicts: BTreeMap<(Verb, String), Verdict>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

/// Lists the resource types served by the cluster.
///
/// Resource names are plural, lowercase names (e.g. `pods`) and may also be qualified by their
/// API group (e.g. `deployments.apps`).
#[async_trait::async_trait]
pub trait DiscoverResources {
    async fn resources(&self) -> Result<HashSet<String>>;
}

/// Describes a simulation request that cannot be evaluated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown subject: {0}")]
    UnknownSubject(Subject),

    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown role: no Role {name} in namespace {namespace} and no ClusterRole {name}")]
    UnknownRole { namespace: String, name: String },

    #[error("no {0} requested")]
    Empty(&'static str),
}

#[derive(Debug, Error)]
pub enum SimulateError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("dependency failure: {0}")]
    Collaborator(#[source] anyhow::Error),
}

/// Formats a `(verb, resource)` pair as displayed to users, e.g. `get-pods`.
pub fn pair_name(verb: Verb, resource: &str) -> String {
    format!("{verb}-{resource}")
}

// === impl SimulateResponse ===

impl SimulateResponse {
    pub fn from_verdicts(verdicts: BTreeMap<(Verb, String), Verdict>) -> Self {
        Self {
            authorized: verdicts.values().all(|v| v.allowed),
            verdicts,
        }
    }

    pub fn verdict(&self, verb: Verb, resource: &str) -> Option<&Verdict> {
        self.verdicts.get(&(verb, resource.to_string()))
    }
}

// === impl ValidationError ===

impl From<InvalidVerb> for ValidationError {
    fn from(InvalidVerb(verb): InvalidVerb) -> Self {
        Self::UnknownVerb(verb)
    }
}
