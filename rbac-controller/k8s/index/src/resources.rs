//! Converts the cluster's RBAC resources into catalog values.
//!
//! Conversion never fails. Malformed references are retained so that they may be reported when a
//! binding is resolved; subjects of kinds the engine does not model are dropped.

use rbac_controller_core::{
    catalog::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    Catalog, PolicyRule, RoleKind, RoleRef, Subject,
};
use rbac_controller_k8s_api::{
    self as k8s,
    rbac::{role_ref_targets_kind, service_account_namespace},
    ResourceExt,
};

/// The RBAC resources listed from the cluster.
#[derive(Clone, Debug, Default)]
pub struct Resources {
    pub roles: Vec<k8s::Role>,
    pub cluster_roles: Vec<k8s::ClusterRole>,
    pub role_bindings: Vec<k8s::RoleBinding>,
    pub cluster_role_bindings: Vec<k8s::ClusterRoleBinding>,
}

// === impl Resources ===

impl Resources {
    pub fn into_catalog(self) -> Catalog {
        let Self {
            roles,
            cluster_roles,
            role_bindings,
            cluster_role_bindings,
        } = self;
        Catalog {
            roles: roles.into_iter().map(role).collect(),
            cluster_roles: cluster_roles.into_iter().map(cluster_role).collect(),
            role_bindings: role_bindings.into_iter().map(role_binding).collect(),
            cluster_role_bindings: cluster_role_bindings
                .into_iter()
                .map(cluster_role_binding)
                .collect(),
        }
    }
}

impl From<Resources> for Catalog {
    fn from(resources: Resources) -> Self {
        resources.into_catalog()
    }
}

pub fn role(role: k8s::Role) -> Role {
    Role {
        namespace: role.namespace().unwrap_or_default(),
        name: role.name_any(),
        rules: rules(role.rules),
    }
}

pub fn cluster_role(role: k8s::ClusterRole) -> ClusterRole {
    ClusterRole {
        name: role.name_any(),
        rules: rules(role.rules),
    }
}

pub fn role_binding(binding: k8s::RoleBinding) -> RoleBinding {
    let namespace = binding.namespace().unwrap_or_default();
    let name = binding.name_any();
    let subjects = subjects(binding.subjects.unwrap_or_default(), Some(&namespace));
    RoleBinding {
        namespace,
        name,
        role_ref: role_ref(binding.role_ref),
        subjects,
    }
}

pub fn cluster_role_binding(binding: k8s::ClusterRoleBinding) -> ClusterRoleBinding {
    ClusterRoleBinding {
        name: binding.name_any(),
        role_ref: role_ref(binding.role_ref),
        subjects: subjects(binding.subjects.unwrap_or_default(), None),
    }
}

fn rules(rules: Option<Vec<k8s::PolicyRule>>) -> Vec<PolicyRule> {
    rules
        .into_iter()
        .flatten()
        .map(|rule| PolicyRule {
            verbs: rule.verbs,
            api_groups: rule.api_groups.unwrap_or_default(),
            resources: rule.resources.unwrap_or_default(),
            resource_names: rule.resource_names.unwrap_or_default(),
        })
        .collect()
}

fn role_ref(role_ref: k8s::RoleRef) -> RoleRef {
    let kind = if role_ref_targets_kind::<k8s::Role>(&role_ref) {
        RoleKind::Role
    } else if role_ref_targets_kind::<k8s::ClusterRole>(&role_ref) {
        RoleKind::ClusterRole
    } else {
        RoleKind::Unknown {
            api_group: role_ref.api_group,
            kind: role_ref.kind,
        }
    };
    RoleRef {
        kind,
        name: role_ref.name,
    }
}

fn subjects(subjects: Vec<k8s::Subject>, binding_ns: Option<&str>) -> Vec<Subject> {
    subjects
        .iter()
        .filter_map(|s| match s.kind.as_str() {
            Subject::USER => Some(Subject::User(s.name.clone())),
            Subject::GROUP => Some(Subject::Group(s.name.clone())),
            Subject::SERVICE_ACCOUNT => service_account_namespace(s, binding_ns)
                .map(|ns| Subject::service_account(ns, &s.name)),
            kind => {
                tracing::debug!(%kind, name = %s.name, "ignoring subject of unknown kind");
                None
            }
        })
        .collect()
}
