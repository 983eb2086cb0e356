pub use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::Resource;

/// Checks whether the roleRef references the given resource type.
pub fn role_ref_targets_kind<T>(role_ref: &RoleRef) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    *role_ref.api_group == *T::group(&dt) && *role_ref.kind == *T::kind(&dt)
}

/// Returns the namespace of a service account subject.
///
/// The API server defaults a missing namespace to that of the enclosing RoleBinding; there is no
/// such default for ClusterRoleBindings.
pub fn service_account_namespace<'s>(
    subject: &'s Subject,
    binding_ns: Option<&'s str>,
) -> Option<&'s str> {
    match subject.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => Some(ns),
        _ => {
            if binding_ns.is_none() {
                tracing::debug!(name = %subject.name, "service account subject without a namespace");
            }
            binding_ns
        }
    }
}
