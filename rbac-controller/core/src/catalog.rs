//! The policy objects resolved by the engine.
//!
//! These are read-only values converted from the cluster's RBAC resources. A [`Catalog`] is a
//! point-in-time snapshot of every Role, ClusterRole, RoleBinding and ClusterRoleBinding visible to
//! a single request.

use crate::{Subject, RBAC_API_GROUP, WILDCARD};
use anyhow::Result;
use std::fmt;

/// A point-in-time view of all RBAC objects visible to a query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    pub roles: Vec<Role>,
    pub cluster_roles: Vec<ClusterRole>,
    pub role_bindings: Vec<RoleBinding>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
}

/// Obtains a catalog snapshot from the system of record.
///
/// When a namespace is provided, only Roles and RoleBindings in that namespace need be returned.
/// ClusterRoles and ClusterRoleBindings are always returned.
#[async_trait::async_trait]
pub trait DiscoverCatalog {
    async fn catalog(&self, namespace: Option<&str>) -> Result<Catalog>;
}

/// Grants the cross product of its verbs, API groups and resources.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyRule {
    pub verbs: Vec<String>,
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,

    /// When set, the rule only applies to the named objects.
    pub resource_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub namespace: String,
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRole {
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleBinding {
    pub namespace: String,
    pub name: String,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRoleBinding {
    pub name: String,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

/// Names the role granted by a binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleRef {
    pub kind: RoleKind,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKind {
    Role,
    ClusterRole,

    /// A reference outside the RBAC API group or of a kind the API server would not accept.
    /// Retained so that it may be reported when the binding is resolved.
    Unknown { api_group: String, kind: String },
}

// === impl Catalog ===

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.cluster_roles.is_empty()
            && self.role_bindings.is_empty()
            && self.cluster_role_bindings.is_empty()
    }

    pub fn role(&self, namespace: &str, name: &str) -> Option<&Role> {
        self.roles
            .iter()
            .find(|r| r.namespace == namespace && r.name == name)
    }

    pub fn cluster_role(&self, name: &str) -> Option<&ClusterRole> {
        self.cluster_roles.iter().find(|r| r.name == name)
    }
}

// === impl PolicyRule ===

impl PolicyRule {
    /// Returns true if the rule grants the verb, either by name or by wildcard.
    pub fn matches_verb(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb || v == WILDCARD)
    }

    /// Returns true if the rule grants the resource. When `group` is `None` the rule may grant the
    /// resource in any of its API groups.
    ///
    /// Rules restricted to named objects never match a resource type as a whole.
    pub fn matches_resource(&self, resource: &str, group: Option<&str>) -> bool {
        if !self.resource_names.is_empty() {
            return false;
        }
        let resource_matches = self
            .resources
            .iter()
            .any(|r| r == resource || r == WILDCARD);
        let group_matches = match group {
            None => true,
            Some(group) => self.groups().any(|g| g == group || g == WILDCARD),
        };
        resource_matches && group_matches
    }

    /// Iterates over each `(verb, api group, resource)` granted by the rule.
    ///
    /// A rule without API groups applies to the core group.
    pub fn expand(&self) -> impl Iterator<Item = (&str, &str, &str)> + '_ {
        self.verbs.iter().flat_map(move |verb| {
            self.groups().flat_map(move |group| {
                self.resources
                    .iter()
                    .map(move |resource| (verb.as_str(), group, resource.as_str()))
            })
        })
    }

    fn groups(&self) -> impl Iterator<Item = &str> + '_ {
        let core = if self.api_groups.is_empty() {
            Some("")
        } else {
            None
        };
        self.api_groups.iter().map(String::as_str).chain(core)
    }
}

// === impl RoleRef ===

impl RoleRef {
    pub fn role(name: impl ToString) -> Self {
        Self {
            kind: RoleKind::Role,
            name: name.to_string(),
        }
    }

    pub fn cluster_role(name: impl ToString) -> Self {
        Self {
            kind: RoleKind::ClusterRole,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

// === impl RoleKind ===

impl RoleKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

impl From<&str> for RoleKind {
    fn from(kind: &str) -> Self {
        match kind {
            "Role" => Self::Role,
            "ClusterRole" => Self::ClusterRole,
            kind => Self::Unknown {
                api_group: RBAC_API_GROUP.to_string(),
                kind: kind.to_string(),
            },
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(verbs: &[&str], groups: &[&str], resources: &[&str]) -> PolicyRule {
        PolicyRule {
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            api_groups: groups.iter().map(|s| s.to_string()).collect(),
            resources: resources.iter().map(|s| s.to_string()).collect(),
            resource_names: vec![],
        }
    }

    #[test]
    fn expands_cross_product() {
        let r = rule(&["get", "list"], &["", "apps"], &["pods"]);
        assert_eq!(
            r.expand().collect::<Vec<_>>(),
            vec![
                ("get", "", "pods"),
                ("get", "apps", "pods"),
                ("list", "", "pods"),
                ("list", "apps", "pods"),
            ]
        );
    }

    #[test]
    fn missing_api_groups_expand_as_core() {
        let r = rule(&["get"], &[], &["pods", "secrets"]);
        assert_eq!(
            r.expand().collect::<Vec<_>>(),
            vec![("get", "", "pods"), ("get", "", "secrets")]
        );
    }

    #[test]
    fn rules_without_resources_grant_nothing() {
        let r = rule(&["get"], &[""], &[]);
        assert_eq!(r.expand().count(), 0);
    }

    #[test]
    fn wildcards_match() {
        let r = rule(&["*"], &["*"], &["*"]);
        assert!(r.matches_verb("deletecollection"));
        assert!(r.matches_resource("deployments", Some("apps")));

        let r = rule(&["get"], &["apps"], &["deployments"]);
        assert!(r.matches_verb("get"));
        assert!(!r.matches_verb("list"));
        assert!(r.matches_resource("deployments", None));
        assert!(r.matches_resource("deployments", Some("apps")));
        assert!(!r.matches_resource("deployments", Some("extensions")));
        assert!(!r.matches_resource("pods", None));
    }

    #[test]
    fn named_objects_do_not_match_resource_types() {
        let r = PolicyRule {
            resource_names: vec!["kube-root-ca.crt".to_string()],
            ..rule(&["get"], &[""], &["configmaps"])
        };
        assert!(!r.matches_resource("configmaps", None));
        assert_eq!(r.expand().count(), 1);
    }

    #[test]
    fn role_kinds() {
        assert_eq!(RoleKind::from("Role"), RoleKind::Role);
        assert_eq!(RoleKind::from("ClusterRole"), RoleKind::ClusterRole);
        assert_eq!(
            RoleKind::from("Clusterrole"),
            RoleKind::Unknown {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "Clusterrole".to_string(),
            }
        );
        assert_eq!(RoleRef::cluster_role("viewer").to_string(), "ClusterRole viewer");
    }
}
