//! Collaborators backed by the Kubernetes API.

use crate::{
    core::{Catalog, DiscoverCatalog, DiscoverResources, Subject, SubjectDirectory},
    index::{Resources, Snapshot},
    k8s::{self, Api, Client, ListParams},
};
use ahash::AHashSet as HashSet;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Lists RBAC resources from the API server.
#[derive(Clone)]
pub(crate) struct ClusterCatalog(Client);

/// Lists the resource types served by the API server.
#[derive(Clone)]
pub(crate) struct ClusterResources(Client);

/// Subjects known to the cluster.
///
/// Kubernetes does not store users or groups, so they are known when configured explicitly or
/// when named by a binding in the snapshot. The snapshot must cover every namespace, or a subject
/// bound only elsewhere would be reported as unknown. Service accounts are known when the
/// ServiceAccount exists.
pub(crate) struct ClusterDirectory<'s, S = Client> {
    service_accounts: S,
    known: Arc<KnownSubjects>,
    snapshot: &'s Snapshot,
}

/// Looks up ServiceAccount objects.
#[async_trait::async_trait]
pub(crate) trait ServiceAccounts {
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Users and groups configured at startup.
#[derive(Debug, Default)]
pub(crate) struct KnownSubjects {
    pub users: HashSet<String>,
    pub groups: HashSet<String>,
}

// === impl ClusterCatalog ===

impl ClusterCatalog {
    pub(crate) fn new(client: Client) -> Self {
        Self(client)
    }
}

#[async_trait::async_trait]
impl DiscoverCatalog for ClusterCatalog {
    async fn catalog(&self, namespace: Option<&str>) -> Result<Catalog> {
        let params = ListParams::default();
        let (roles, role_bindings): (Api<k8s::Role>, Api<k8s::RoleBinding>) = match namespace {
            Some(ns) => (
                Api::namespaced(self.0.clone(), ns),
                Api::namespaced(self.0.clone(), ns),
            ),
            None => (Api::all(self.0.clone()), Api::all(self.0.clone())),
        };
        let cluster_roles = Api::<k8s::ClusterRole>::all(self.0.clone());
        let cluster_role_bindings = Api::<k8s::ClusterRoleBinding>::all(self.0.clone());

        let (roles, cluster_roles, role_bindings, cluster_role_bindings) = tokio::try_join!(
            roles.list(&params),
            cluster_roles.list(&params),
            role_bindings.list(&params),
            cluster_role_bindings.list(&params),
        )
        .context("failed to list RBAC resources")?;

        let resources = Resources {
            roles: roles.items,
            cluster_roles: cluster_roles.items,
            role_bindings: role_bindings.items,
            cluster_role_bindings: cluster_role_bindings.items,
        };
        tracing::debug!(
            namespace = namespace.unwrap_or("*"),
            roles = resources.roles.len(),
            cluster_roles = resources.cluster_roles.len(),
            role_bindings = resources.role_bindings.len(),
            cluster_role_bindings = resources.cluster_role_bindings.len(),
            "listed RBAC resources"
        );
        Ok(resources.into_catalog())
    }
}

// === impl ClusterResources ===

impl ClusterResources {
    pub(crate) fn new(client: Client) -> Self {
        Self(client)
    }
}

#[async_trait::async_trait]
impl DiscoverResources for ClusterResources {
    async fn resources(&self) -> Result<HashSet<String>> {
        let discovery = kube::Discovery::new(self.0.clone())
            .run()
            .await
            .context("failed to discover API resources")?;

        let mut resources = HashSet::default();
        for group in discovery.groups() {
            for (ar, _caps) in group.recommended_resources() {
                if !ar.group.is_empty() {
                    resources.insert(format!("{}.{}", ar.plural, ar.group));
                }
                resources.insert(ar.plural);
            }
        }
        tracing::debug!(resources = resources.len(), "discovered API resources");
        Ok(resources)
    }
}

// === impl ClusterDirectory ===

impl<'s, S> ClusterDirectory<'s, S> {
    pub(crate) fn new(
        service_accounts: S,
        known: Arc<KnownSubjects>,
        snapshot: &'s Snapshot,
    ) -> Self {
        Self {
            service_accounts,
            known,
            snapshot,
        }
    }
}

#[async_trait::async_trait]
impl<S> SubjectDirectory for ClusterDirectory<'_, S>
where
    S: ServiceAccounts + Send + Sync,
{
    async fn is_known(&self, subject: &Subject) -> Result<bool> {
        match subject {
            Subject::User(name) if self.known.users.contains(name) => Ok(true),
            Subject::Group(name) if self.known.groups.contains(name) => Ok(true),
            Subject::User(_) | Subject::Group(_) => self.snapshot.is_known(subject).await,
            Subject::ServiceAccount { namespace, name } => {
                self.service_accounts.exists(namespace, name).await
            }
        }
    }
}

#[async_trait::async_trait]
impl ServiceAccounts for Client {
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let api = Api::<k8s::ServiceAccount>::namespaced(self.clone(), namespace);
        let sa = api
            .get_opt(name)
            .await
            .with_context(|| format!("failed to get serviceaccount {namespace}/{name}"))?;
        Ok(sa.is_some())
    }
}

// === impl KnownSubjects ===

impl KnownSubjects {
    pub(crate) fn new(
        users: impl IntoIterator<Item = String>,
        groups: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            users: users.into_iter().collect(),
            groups: groups.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        catalog::{ClusterRole, Role, RoleBinding},
        PolicyRule, RoleRef, SimulateError, SimulateRequest, ValidationError,
    };
    use tokio_test::block_on;

    /// Serves a fixed set of ServiceAccounts.
    struct Accounts(&'static [(&'static str, &'static str)]);

    /// Fixed resource discovery.
    struct Pods;

    #[async_trait::async_trait]
    impl ServiceAccounts for Accounts {
        async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
            Ok(self.0.iter().any(|&(ns, n)| ns == namespace && n == name))
        }
    }

    #[async_trait::async_trait]
    impl DiscoverResources for Pods {
        async fn resources(&self) -> Result<HashSet<String>> {
            Ok(Some("pods".to_string()).into_iter().collect())
        }
    }

    /// `alice` is bound to the `viewer` ClusterRole only in `team-b`; `team-a` has a `viewer`
    /// Role bound to nobody.
    fn catalog() -> Catalog {
        let viewer = PolicyRule {
            verbs: vec!["get".to_string()],
            api_groups: vec!["".to_string()],
            resources: vec!["pods".to_string()],
            resource_names: vec![],
        };
        Catalog {
            roles: vec![Role {
                namespace: "team-a".to_string(),
                name: "viewer".to_string(),
                rules: vec![viewer.clone()],
            }],
            cluster_roles: vec![ClusterRole {
                name: "viewer".to_string(),
                rules: vec![viewer],
            }],
            role_bindings: vec![RoleBinding {
                namespace: "team-b".to_string(),
                name: "viewers".to_string(),
                role_ref: RoleRef::cluster_role("viewer"),
                subjects: vec![Subject::user("alice")],
            }],
            ..Default::default()
        }
    }

    fn directory(known: KnownSubjects, snapshot: &Snapshot) -> ClusterDirectory<'_, Accounts> {
        ClusterDirectory::new(Accounts(&[("ci", "builder")]), Arc::new(known), snapshot)
    }

    #[test]
    fn users_bound_in_other_namespaces_are_known() {
        let snapshot = Snapshot::new(catalog());
        let directory = directory(KnownSubjects::default(), &snapshot);
        let req = SimulateRequest {
            subject: Subject::user("alice"),
            role: "viewer".to_string(),
            actions: vec!["get".to_string()],
            resources: vec!["pods".to_string()],
            namespace: "team-a".to_string(),
        };

        let rsp = block_on(snapshot.simulate(&directory, &Pods, &req))
            .expect("simulation must succeed");
        assert!(!rsp.authorized);
        let verdict = rsp.verdict(crate::core::Verb::Get, "pods").expect("verdict");
        assert!(!verdict.allowed);
        assert!(
            verdict.reason.contains("is not bound to viewer in namespace team-a"),
            "{}",
            verdict.reason
        );
    }

    #[test]
    fn unbound_users_are_unknown() {
        let snapshot = Snapshot::new(catalog());
        let directory = directory(KnownSubjects::default(), &snapshot);
        let req = SimulateRequest {
            subject: Subject::user("mallory"),
            role: "viewer".to_string(),
            actions: vec!["get".to_string()],
            resources: vec!["pods".to_string()],
            namespace: "team-a".to_string(),
        };

        match block_on(snapshot.simulate(&directory, &Pods, &req)) {
            Err(SimulateError::Invalid(ValidationError::UnknownSubject(subject))) => {
                assert_eq!(subject, Subject::user("mallory"))
            }
            res => panic!("unexpected result: {res:?}"),
        }
    }

    #[test]
    fn configured_subjects_are_known() {
        let snapshot = Snapshot::new(Catalog::default());
        let directory = directory(
            KnownSubjects::new(["bob".to_string()], ["auditors".to_string()]),
            &snapshot,
        );

        assert!(block_on(directory.is_known(&Subject::user("bob"))).unwrap());
        assert!(block_on(directory.is_known(&Subject::group("auditors"))).unwrap());
        assert!(!block_on(directory.is_known(&Subject::user("auditors"))).unwrap());
        assert!(!block_on(directory.is_known(&Subject::group("bob"))).unwrap());
    }

    #[test]
    fn service_accounts_are_looked_up() {
        let snapshot = Snapshot::new(catalog());
        let directory = directory(
            KnownSubjects::new(["builder".to_string()], None),
            &snapshot,
        );

        assert!(block_on(directory.is_known(&Subject::service_account("ci", "builder"))).unwrap());
        assert!(
            !block_on(directory.is_known(&Subject::service_account("team-a", "builder"))).unwrap()
        );
    }
}
