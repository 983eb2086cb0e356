use crate::snapshot::{Binding, Snapshot};
use anyhow::Result;
use rbac_controller_core::{
    simulation::pair_name, DiscoverResources, PolicyRule, SimulateError, SimulateRequest,
    SimulateResponse, Subject, SubjectDirectory, ValidationError, Verb, Verdict,
};
use std::collections::{BTreeMap, BTreeSet};

/// A binding that grants the simulated role to the subject, with the role's rules.
struct Candidate<'s> {
    binding: Binding<'s>,
    rules: &'s [PolicyRule],
}

// === impl Snapshot ===

impl Snapshot {
    /// Evaluates whether the subject holds each requested `(verb, resource)` pair by way of an
    /// existing binding to the named role.
    ///
    /// Candidate bindings are RoleBindings in the request's namespace and all ClusterRoleBindings
    /// whose roleRef names the role and whose subjects include the subject. No binding is
    /// synthesized: a subject that is not already bound to the role is not authorized.
    ///
    /// Input is validated in order (subject, verbs, resources, role) before anything is
    /// evaluated, and the first invalid input is returned.
    pub async fn simulate<D, R>(
        &self,
        directory: &D,
        discovery: &R,
        req: &SimulateRequest,
    ) -> Result<SimulateResponse, SimulateError>
    where
        D: SubjectDirectory + ?Sized + Sync,
        R: DiscoverResources + ?Sized + Sync,
    {
        let SimulateRequest {
            subject,
            role,
            actions,
            resources,
            namespace,
        } = req;

        if !directory
            .is_known(subject)
            .await
            .map_err(SimulateError::Collaborator)?
        {
            return Err(ValidationError::UnknownSubject(subject.clone()).into());
        }

        if actions.is_empty() {
            return Err(ValidationError::Empty("actions").into());
        }
        let verbs = actions
            .iter()
            .map(|a| a.parse::<Verb>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(ValidationError::from)?;

        if resources.is_empty() {
            return Err(ValidationError::Empty("resources").into());
        }
        let known = discovery
            .resources()
            .await
            .map_err(SimulateError::Collaborator)?;
        if let Some(unknown) = resources.iter().find(|r| !known.contains(r.as_str())) {
            return Err(ValidationError::UnknownResource(unknown.clone()).into());
        }

        if self.catalog.role(namespace, role).is_none() && self.catalog.cluster_role(role).is_none()
        {
            return Err(ValidationError::UnknownRole {
                namespace: namespace.clone(),
                name: role.clone(),
            }
            .into());
        }

        let candidates = self.candidates(subject, role, namespace);
        tracing::debug!(
            %subject,
            %role,
            %namespace,
            candidates = candidates.len(),
            "simulating"
        );

        let mut verdicts = BTreeMap::new();
        for verb in verbs {
            for resource in resources {
                let verdict = evaluate(&candidates, subject, role, namespace, verb, resource);
                verdicts.insert((verb, resource.clone()), verdict);
            }
        }
        Ok(SimulateResponse::from_verdicts(verdicts))
    }

    fn candidates<'s>(
        &'s self,
        subject: &Subject,
        role: &str,
        namespace: &str,
    ) -> Vec<Candidate<'s>> {
        let mut candidates = Vec::new();
        for binding in self.bindings(subject) {
            if binding.role_ref().name != role {
                continue;
            }
            if let Some(ns) = binding.namespace() {
                if ns != namespace {
                    continue;
                }
            }
            match self.rules(binding) {
                Ok(rules) => candidates.push(Candidate { binding, rules }),
                Err(reason) => {
                    tracing::warn!(binding = %binding.reference(), ?reason, "skipping binding");
                }
            }
        }
        candidates
    }
}

#[async_trait::async_trait]
impl SubjectDirectory for Snapshot {
    /// A subject is known if any binding in the snapshot names it.
    async fn is_known(&self, subject: &Subject) -> Result<bool> {
        Ok(self.is_bound(subject))
    }
}

fn evaluate(
    candidates: &[Candidate<'_>],
    subject: &Subject,
    role: &str,
    namespace: &str,
    verb: Verb,
    resource: &str,
) -> Verdict {
    let pair = pair_name(verb, resource);
    let (name, group) = match resource.split_once('.') {
        Some((name, group)) => (name, Some(group)),
        None => (resource, None),
    };

    let grant = candidates.iter().find(|c| {
        c.rules
            .iter()
            .any(|r| r.matches_verb(verb.as_str()) && r.matches_resource(name, group))
    });
    if let Some(Candidate { binding, .. }) = grant {
        return Verdict {
            allowed: true,
            reason: format!(
                "{pair} granted by {} via {}",
                binding.reference(),
                binding.role_ref()
            ),
        };
    }

    let reason = match candidates.first() {
        None => format!(
            "missing permission for {pair}: {subject} is not bound to {role} in namespace {namespace}"
        ),
        Some(c) => format!(
            "missing permission for {pair}: {} does not grant it",
            c.binding.role_ref()
        ),
    };
    Verdict {
        allowed: false,
        reason,
    }
}
