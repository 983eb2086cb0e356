use crate::RoleRef;
use std::fmt;

/// Where a granted permission applies.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Namespace(String),
    Cluster,
}

/// Identifies the binding that granted a permission.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingRef {
    RoleBinding { namespace: String, name: String },
    ClusterRoleBinding { name: String },
}

/// A single permission held by a subject, with its provenance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantedRule {
    pub verb: String,
    pub api_group: String,
    pub resource: String,

    /// Limits the grant to the named objects. Empty when the grant applies to every object.
    pub resource_names: Vec<String>,

    pub scope: Scope,
    pub granted_by: BindingRef,
    pub via: RoleRef,
}

/// A binding that could not be resolved against the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Inconsistency {
    pub binding: BindingRef,
    pub reason: InconsistencyReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InconsistencyReason {
    /// The referenced role does not exist.
    DanglingRoleRef(RoleRef),

    /// The binding's roleRef has an empty name.
    MissingRoleRefName,

    /// The binding's roleRef is neither a Role nor a ClusterRole of the RBAC API group.
    UnsupportedRoleRef { api_group: String, kind: String },

    /// A ClusterRoleBinding references a namespaced Role.
    ClusterBindingToRole(String),
}

/// The permissions held by a subject.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub grants: Vec<GrantedRule>,
    pub inconsistencies: Vec<Inconsistency>,
}

// === impl Scope ===

impl Scope {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Namespace(ns) => Some(ns),
            Self::Cluster => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace(ns) => write!(f, "namespace/{ns}"),
            Self::Cluster => f.write_str("cluster"),
        }
    }
}

// === impl BindingRef ===

impl BindingRef {
    pub fn name(&self) -> &str {
        match self {
            Self::RoleBinding { name, .. } | Self::ClusterRoleBinding { name } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoleBinding { .. } => "RoleBinding",
            Self::ClusterRoleBinding { .. } => "ClusterRoleBinding",
        }
    }

    /// The scope of the permissions granted by this binding.
    pub fn scope(&self) -> Scope {
        match self {
            Self::RoleBinding { namespace, .. } => Scope::Namespace(namespace.clone()),
            Self::ClusterRoleBinding { .. } => Scope::Cluster,
        }
    }
}

impl fmt::Display for BindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleBinding { namespace, name } => write!(f, "RoleBinding {namespace}/{name}"),
            Self::ClusterRoleBinding { name } => write!(f, "ClusterRoleBinding {name}"),
        }
    }
}

// === impl Inconsistency ===

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            InconsistencyReason::DanglingRoleRef(role) => {
                write!(f, "{} references missing {}", self.binding, role)
            }
            InconsistencyReason::MissingRoleRefName => {
                write!(f, "{} has a roleRef without a name", self.binding)
            }
            InconsistencyReason::UnsupportedRoleRef { api_group, kind }
                if api_group != crate::RBAC_API_GROUP =>
            {
                write!(
                    f,
                    "{} references {} in unsupported API group {:?}",
                    self.binding, kind, api_group
                )
            }
            InconsistencyReason::UnsupportedRoleRef { kind, .. } => {
                write!(f, "{} references unsupported kind {}", self.binding, kind)
            }
            InconsistencyReason::ClusterBindingToRole(name) => {
                write!(f, "{} references namespaced Role {}", self.binding, name)
            }
        }
    }
}

// === impl Resolution ===

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty() && self.inconsistencies.is_empty()
    }

    pub fn cluster_grants(&self) -> impl Iterator<Item = &GrantedRule> {
        self.grants.iter().filter(|g| g.scope == Scope::Cluster)
    }
}
