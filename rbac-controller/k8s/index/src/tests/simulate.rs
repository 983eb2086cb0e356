use super::*;
use ahash::AHashSet as HashSet;
use anyhow::{bail, Result};
use rbac_controller_core::{
    DiscoverResources, SimulateError, SimulateRequest, Subject, SubjectDirectory,
    ValidationError, Verb,
};
use tokio_test::block_on;

/// Serves a fixed set of resource names.
struct Discovery(&'static [&'static str]);

/// Fails every lookup.
struct Unavailable;

const RESOURCES: &[&str] = &[
    "pods",
    "secrets",
    "configmaps",
    "deployments",
    "deployments.apps",
];

#[async_trait::async_trait]
impl DiscoverResources for Discovery {
    async fn resources(&self) -> Result<HashSet<String>> {
        Ok(self.0.iter().map(|r| r.to_string()).collect())
    }
}

#[async_trait::async_trait]
impl DiscoverResources for Unavailable {
    async fn resources(&self) -> Result<HashSet<String>> {
        bail!("discovery unavailable")
    }
}

#[async_trait::async_trait]
impl SubjectDirectory for Unavailable {
    async fn is_known(&self, _: &Subject) -> Result<bool> {
        bail!("directory unavailable")
    }
}

fn request(
    subject: Subject,
    role: &str,
    actions: &[&str],
    resources: &[&str],
    namespace: &str,
) -> SimulateRequest {
    SimulateRequest {
        subject,
        role: role.to_string(),
        actions: actions.iter().map(|a| a.to_string()).collect(),
        resources: resources.iter().map(|r| r.to_string()).collect(),
        namespace: namespace.to_string(),
    }
}

fn simulate(
    snapshot: &Snapshot,
    req: SimulateRequest,
) -> Result<rbac_controller_core::SimulateResponse, SimulateError> {
    block_on(snapshot.simulate(snapshot, &Discovery(RESOURCES), &req))
}

#[test]
fn authorizes_granted_pairs() {
    let _tracing = init_tracing();
    let snapshot = snapshot(viewer_resources());

    let rsp = simulate(
        &snapshot,
        request(Subject::user("alice"), "viewer", &["get"], &["pods"], "team-a"),
    )
    .expect("request must be valid");
    assert!(rsp.authorized);
    let verdict = rsp.verdict(Verb::Get, "pods").unwrap();
    assert!(verdict.allowed);
    assert_eq!(
        verdict.reason,
        "get-pods granted by RoleBinding team-a/b1 via ClusterRole viewer"
    );
}

#[test]
fn denies_missing_pairs() {
    let _tracing = init_tracing();
    let snapshot = snapshot(viewer_resources());

    let rsp = simulate(
        &snapshot,
        request(Subject::user("alice"), "viewer", &["get"], &["secrets"], "team-a"),
    )
    .expect("request must be valid");
    assert!(!rsp.authorized);
    let verdict = rsp.verdict(Verb::Get, "secrets").unwrap();
    assert!(!verdict.allowed);
    assert!(
        verdict
            .reason
            .starts_with("missing permission for get-secrets"),
        "{}",
        verdict.reason
    );
}

#[test]
fn authorized_requires_every_pair() {
    let snapshot = snapshot(viewer_resources());

    let rsp = simulate(
        &snapshot,
        request(
            Subject::user("alice"),
            "viewer",
            &["get", "list", "delete"],
            &["pods"],
            "team-a",
        ),
    )
    .unwrap();
    assert!(!rsp.authorized);
    assert_eq!(rsp.verdicts.len(), 3);
    assert!(rsp.verdict(Verb::Get, "pods").unwrap().allowed);
    assert!(rsp.verdict(Verb::List, "pods").unwrap().allowed);
    assert!(!rsp.verdict(Verb::Delete, "pods").unwrap().allowed);
}

#[test]
fn rejects_unknown_verbs_before_resolution() {
    let snapshot = snapshot(viewer_resources());
    let req = request(
        Subject::user("alice"),
        "viewer",
        &["get", "frobnicate"],
        &["pods"],
        "team-a",
    );

    // Discovery is never consulted, so its failure is not observed.
    match block_on(snapshot.simulate(&snapshot, &Unavailable, &req)) {
        Err(SimulateError::Invalid(ValidationError::UnknownVerb(verb))) => {
            assert_eq!(verb, "frobnicate")
        }
        res => panic!("unexpected result: {res:?}"),
    }
}

#[test]
fn rejects_unknown_resources() {
    let snapshot = snapshot(viewer_resources());
    match simulate(
        &snapshot,
        request(
            Subject::user("alice"),
            "viewer",
            &["get"],
            &["pods", "widgets"],
            "team-a",
        ),
    ) {
        Err(SimulateError::Invalid(ValidationError::UnknownResource(r))) => {
            assert_eq!(r, "widgets")
        }
        res => panic!("unexpected result: {res:?}"),
    }
}

#[test]
fn rejects_unknown_subjects() {
    let snapshot = snapshot(viewer_resources());
    match simulate(
        &snapshot,
        request(Subject::user("mallory"), "viewer", &["get"], &["pods"], "team-a"),
    ) {
        Err(SimulateError::Invalid(ValidationError::UnknownSubject(s))) => {
            assert_eq!(s, Subject::user("mallory"))
        }
        res => panic!("unexpected result: {res:?}"),
    }
}

#[test]
fn rejects_unknown_roles() {
    let snapshot = snapshot(viewer_resources());
    let err = simulate(
        &snapshot,
        request(Subject::user("alice"), "admin", &["get"], &["pods"], "team-a"),
    )
    .expect_err("role must not exist");
    assert_eq!(
        err.to_string(),
        "unknown role: no Role admin in namespace team-a and no ClusterRole admin"
    );
}

#[test]
fn rejects_empty_requests() {
    let snapshot = snapshot(viewer_resources());
    assert!(matches!(
        simulate(
            &snapshot,
            request(Subject::user("alice"), "viewer", &[], &["pods"], "team-a"),
        ),
        Err(SimulateError::Invalid(ValidationError::Empty("actions")))
    ));
    assert!(matches!(
        simulate(
            &snapshot,
            request(Subject::user("alice"), "viewer", &["get"], &[], "team-a"),
        ),
        Err(SimulateError::Invalid(ValidationError::Empty("resources")))
    ));
}

#[test]
fn collaborator_failures_are_distinct() {
    let snapshot = snapshot(viewer_resources());
    let req = request(Subject::user("alice"), "viewer", &["get"], &["pods"], "team-a");

    let err = block_on(snapshot.simulate(&Unavailable, &Discovery(RESOURCES), &req))
        .expect_err("directory must fail");
    assert!(matches!(err, SimulateError::Collaborator(_)));

    let err = block_on(snapshot.simulate(&snapshot, &Unavailable, &req))
        .expect_err("discovery must fail");
    assert!(matches!(err, SimulateError::Collaborator(_)));
}

#[test]
fn ignores_bindings_in_other_namespaces() {
    let _tracing = init_tracing();
    let snapshot = snapshot(viewer_resources());

    let rsp = simulate(
        &snapshot,
        request(Subject::user("alice"), "viewer", &["get"], &["pods"], "team-b"),
    )
    .unwrap();
    assert!(!rsp.authorized);
    assert_eq!(
        rsp.verdict(Verb::Get, "pods").unwrap().reason,
        "missing permission for get-pods: User alice is not bound to viewer in namespace team-b"
    );
}

#[test]
fn cluster_bindings_apply_in_every_namespace() {
    let snapshot = snapshot(Resources {
        cluster_roles: vec![mk_cluster_role("cluster-admin", Some(mk_rule(["*"], ["*"], ["*"])))],
        cluster_role_bindings: vec![mk_cluster_role_binding(
            "admins",
            "cluster-admin",
            Some(group("system:masters")),
        )],
        ..Default::default()
    });

    let rsp = simulate(
        &snapshot,
        request(
            Subject::group("system:masters"),
            "cluster-admin",
            &["deletecollection", "watch"],
            &["secrets", "deployments.apps"],
            "anywhere",
        ),
    )
    .unwrap();
    assert!(rsp.authorized);
    assert_eq!(rsp.verdicts.len(), 4);
}

#[test]
fn qualified_resources_match_api_groups() {
    let snapshot = snapshot(Resources {
        roles: vec![mk_role(
            "ci",
            "deployer",
            Some(mk_rule(["update"], ["apps"], ["deployments"])),
        )],
        role_bindings: vec![mk_role_binding(
            "ci",
            "deployers",
            mk_role_ref("Role", "deployer"),
            Some(service_account("ci", "builder")),
        )],
        ..Default::default()
    });
    let builder = Subject::service_account("ci", "builder");

    let rsp = simulate(
        &snapshot,
        request(
            builder.clone(),
            "deployer",
            &["update"],
            &["deployments", "deployments.apps"],
            "ci",
        ),
    )
    .unwrap();
    assert!(rsp.authorized);

    let rsp = simulate(
        &snapshot,
        request(builder, "deployer", &["update"], &["pods"], "ci"),
    )
    .unwrap();
    assert!(!rsp.authorized);
    assert_eq!(
        rsp.verdict(Verb::Update, "pods").unwrap().reason,
        "missing permission for update-pods: Role deployer does not grant it"
    );
}

#[test]
fn simulation_is_idempotent() {
    let snapshot = snapshot(viewer_resources());
    let req = request(
        Subject::user("alice"),
        "viewer",
        &["get", "watch"],
        &["pods", "secrets"],
        "team-a",
    );
    let first = simulate(&snapshot, req.clone()).unwrap();
    let second = simulate(&snapshot, req).unwrap();
    assert_eq!(first, second);
}
