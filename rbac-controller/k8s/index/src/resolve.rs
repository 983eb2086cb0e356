use crate::snapshot::{Binding, Snapshot};
use rbac_controller_core::{
    GrantedRule, Inconsistency, InconsistencyReason, PolicyRule, Resolution, RoleKind, Subject,
};

// === impl Snapshot ===

impl Snapshot {
    /// Computes every permission granted to the subject.
    ///
    /// Each grant carries the binding and role that produced it, so the same permission may be
    /// listed more than once. Bindings that cannot be resolved are reported as inconsistencies.
    /// A subject that is not bound resolves to an empty set.
    pub fn resolve(&self, subject: &Subject) -> Resolution {
        let mut resolution = Resolution::default();
        for binding in self.bindings(subject) {
            let rules = match self.rules(binding) {
                Ok(rules) => rules,
                Err(reason) => {
                    let inconsistency = Inconsistency {
                        binding: binding.reference(),
                        reason,
                    };
                    tracing::warn!(%subject, %inconsistency, "skipping binding");
                    resolution.inconsistencies.push(inconsistency);
                    continue;
                }
            };

            let granted_by = binding.reference();
            let scope = binding.scope();
            let via = binding.role_ref();
            for rule in rules {
                resolution
                    .grants
                    .extend(rule.expand().map(|(verb, api_group, resource)| GrantedRule {
                        verb: verb.to_string(),
                        api_group: api_group.to_string(),
                        resource: resource.to_string(),
                        resource_names: rule.resource_names.clone(),
                        scope: scope.clone(),
                        granted_by: granted_by.clone(),
                        via: via.clone(),
                    }));
            }
        }

        tracing::debug!(
            %subject,
            grants = resolution.grants.len(),
            inconsistencies = resolution.inconsistencies.len(),
            "resolved"
        );
        resolution
    }

    /// Resolves a binding's roleRef to the rules of the referenced role.
    ///
    /// A RoleBinding may only reference a Role in its own namespace; a ClusterRoleBinding may only
    /// reference a ClusterRole.
    pub(crate) fn rules<'s>(
        &'s self,
        binding: Binding<'s>,
    ) -> Result<&'s [PolicyRule], InconsistencyReason> {
        let role_ref = binding.role_ref();
        if role_ref.name.is_empty() {
            return Err(InconsistencyReason::MissingRoleRefName);
        }

        let rules = match (&role_ref.kind, binding.namespace()) {
            (RoleKind::Role, Some(ns)) => self
                .catalog
                .role(ns, &role_ref.name)
                .map(|r| r.rules.as_slice()),
            (RoleKind::Role, None) => {
                return Err(InconsistencyReason::ClusterBindingToRole(
                    role_ref.name.clone(),
                ))
            }
            (RoleKind::ClusterRole, _) => self
                .catalog
                .cluster_role(&role_ref.name)
                .map(|r| r.rules.as_slice()),
            (RoleKind::Unknown { api_group, kind }, _) => {
                return Err(InconsistencyReason::UnsupportedRoleRef {
                    api_group: api_group.clone(),
                    kind: kind.clone(),
                })
            }
        };

        rules.ok_or_else(|| InconsistencyReason::DanglingRoleRef(role_ref.clone()))
    }
}
