//! Serves resolution and simulation queries as JSON over HTTP.
//!
//! Every request lists a fresh catalog from the API server and indexes it; nothing is retained
//! between requests.

use crate::{
    core::{
        simulation::pair_name, BindingRef, DiscoverCatalog, GrantedRule, Inconsistency,
        PolicyRule, Resolution, RoleRef, SimulateError, SimulateRequest, SimulateResponse,
        Subject,
    },
    discover::{ClusterCatalog, ClusterDirectory, ClusterResources, KnownSubjects},
    index::Snapshot,
    k8s::Client,
    metrics::{ApiMetrics, Outcome},
};
use anyhow::{bail, Result};
use futures::future;
use http_body_util::BodyExt;
use hyper::{
    http::{self, StatusCode},
    Request, Response,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Clone)]
pub(crate) struct ApiService {
    client: Client,
    known: Arc<KnownSubjects>,
    default_namespace: Arc<str>,
    metrics: ApiMetrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Body = http_body_util::Full<bytes::Bytes>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Route {
    Permissions(Subject),
    Roles { namespace: String },
    ClusterRoles,
    Simulate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionJson {
    grants: Vec<GrantJson>,
    inconsistencies: Vec<InconsistencyJson>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GrantJson {
    verb: String,
    api_group: String,
    resource: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resource_names: Vec<String>,
    scope: String,
    granted_by: BindingJson,
    via: RoleRefJson,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct BindingJson {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    name: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct RoleRefJson {
    kind: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct InconsistencyJson {
    binding: BindingJson,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleJson {
    verbs: Vec<String>,
    api_groups: Vec<String>,
    resources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    resource_names: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RoleJson {
    name: String,
    namespace: String,
    rules: Vec<RuleJson>,
    active: bool,
}

#[derive(Debug, Serialize)]
struct ClusterRoleJson {
    name: String,
    rules: Vec<RuleJson>,
    active: bool,
    references: Vec<BindingJson>,
}

#[derive(Debug, Deserialize)]
struct SubjectJson {
    kind: String,
    name: String,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimulateRequestJson {
    subject: SubjectJson,
    role: String,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    resources: Vec<String>,
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulateResponseJson {
    authorized: bool,
    verdicts: BTreeMap<String, VerdictJson>,
}

#[derive(Debug, Serialize)]
struct VerdictJson {
    allowed: bool,
    reason: String,
}

#[derive(Debug, Serialize)]
struct ErrorJson {
    error: String,
}

// === impl ApiService ===

impl tower::Service<Request<hyper::body::Incoming>> for ApiService {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        let route = match Route::parse(req.method(), req.uri().path()) {
            Some(route) => route,
            None => {
                debug!(method = %req.method(), path = %req.uri().path(), "no route");
                return Box::pin(future::ok(not_found(&self.metrics)));
            }
        };

        let api = self.clone();
        Box::pin(async move {
            let name = route.name();
            let rsp = match api.handle(route, req).await {
                Ok(rsp) => rsp,
                Err(error) => {
                    debug!(route = name, %error);
                    api.metrics.request_failed(name);
                    return Err(error);
                }
            };
            debug!(route = name, status = %rsp.status());
            api.metrics.request(name, rsp.status());
            Ok(rsp)
        })
    }
}

impl ApiService {
    pub(crate) fn new(
        client: Client,
        known: KnownSubjects,
        default_namespace: &str,
        metrics: ApiMetrics,
    ) -> Self {
        Self {
            client,
            known: Arc::new(known),
            default_namespace: default_namespace.into(),
            metrics,
        }
    }

    async fn handle(
        &self,
        route: Route,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Body>, Error> {
        match route {
            Route::Permissions(subject) => {
                let snapshot = match self.snapshot(None).await {
                    Ok(snapshot) => snapshot,
                    Err(error) => return unavailable(error),
                };
                let resolution = snapshot.resolve(&subject);
                self.metrics
                    .inconsistencies(resolution.inconsistencies.len());
                json_response(StatusCode::OK, &ResolutionJson::from(resolution))
            }

            Route::Roles { namespace } => {
                let snapshot = match self.snapshot(Some(&namespace)).await {
                    Ok(snapshot) => snapshot,
                    Err(error) => return unavailable(error),
                };
                json_response(StatusCode::OK, &roles(&snapshot, &namespace))
            }

            Route::ClusterRoles => {
                let snapshot = match self.snapshot(None).await {
                    Ok(snapshot) => snapshot,
                    Err(error) => return unavailable(error),
                };
                json_response(StatusCode::OK, &cluster_roles(&snapshot))
            }

            Route::Simulate => {
                use bytes::Buf;
                let bytes = req.into_body().collect().await?.to_bytes();
                let sim = serde_json::from_reader::<_, SimulateRequestJson>(bytes.reader())
                    .map_err(anyhow::Error::from)
                    .and_then(|json| json.into_request(&self.default_namespace));
                let sim = match sim {
                    Ok(sim) => sim,
                    Err(error) => {
                        info!(%error, "invalid simulation request");
                        self.metrics.simulation(Outcome::Rejected);
                        return error_response(StatusCode::BAD_REQUEST, error);
                    }
                };
                self.simulate(sim).await
            }
        }
    }

    async fn simulate(&self, req: SimulateRequest) -> Result<Response<Body>, Error> {
        // The directory treats any bound user or group as known, so it needs bindings from every
        // namespace. Candidates are still limited to the request namespace.
        let snapshot = match self.snapshot(None).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.metrics.simulation(Outcome::Failed);
                return unavailable(error);
            }
        };
        let directory = ClusterDirectory::new(self.client.clone(), self.known.clone(), &snapshot);
        let discovery = ClusterResources::new(self.client.clone());

        match snapshot.simulate(&directory, &discovery, &req).await {
            Ok(rsp) => {
                let outcome = if rsp.authorized {
                    Outcome::Authorized
                } else {
                    Outcome::Denied
                };
                self.metrics.simulation(outcome);
                json_response(StatusCode::OK, &SimulateResponseJson::from(rsp))
            }
            Err(SimulateError::Invalid(error)) => {
                info!(%error, subject = %req.subject, role = %req.role, "rejected simulation");
                self.metrics.simulation(Outcome::Rejected);
                error_response(StatusCode::UNPROCESSABLE_ENTITY, error)
            }
            Err(SimulateError::Collaborator(error)) => {
                self.metrics.simulation(Outcome::Failed);
                unavailable(error)
            }
        }
    }

    async fn snapshot(&self, namespace: Option<&str>) -> Result<Snapshot> {
        let catalog = ClusterCatalog::new(self.client.clone())
            .catalog(namespace)
            .await?;
        Ok(Snapshot::new(catalog))
    }
}

fn not_found(metrics: &ApiMetrics) -> Response<Body> {
    metrics.request(Route::UNKNOWN, StatusCode::NOT_FOUND);
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::default())
        .expect("not found response must be valid")
}

fn unavailable(error: anyhow::Error) -> Result<Response<Body>, Error> {
    let error = format!("{error:#}");
    warn!(%error, "dependency failure");
    error_response(StatusCode::BAD_GATEWAY, error)
}

fn error_response(status: StatusCode, error: impl fmt::Display) -> Result<Response<Body>, Error> {
    json_response(
        status,
        &ErrorJson {
            error: error.to_string(),
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(body)?;
    Ok(Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("json response must be valid"))
}

fn roles(snapshot: &Snapshot, namespace: &str) -> Vec<RoleJson> {
    snapshot
        .catalog()
        .roles
        .iter()
        .filter(|r| r.namespace == namespace)
        .map(|r| RoleJson {
            name: r.name.clone(),
            namespace: r.namespace.clone(),
            rules: r.rules.iter().map(RuleJson::from).collect(),
            active: snapshot.is_role_active(&r.name, &r.namespace),
        })
        .collect()
}

fn cluster_roles(snapshot: &Snapshot) -> Vec<ClusterRoleJson> {
    snapshot
        .catalog()
        .cluster_roles
        .iter()
        .map(|r| ClusterRoleJson {
            name: r.name.clone(),
            rules: r.rules.iter().map(RuleJson::from).collect(),
            active: snapshot.is_cluster_role_active(&r.name),
            references: snapshot
                .cluster_role_references(&r.name)
                .into_iter()
                .map(BindingJson::from)
                .collect(),
        })
        .collect()
}

// === impl Route ===

impl Route {
    /// Labels requests that match no route.
    const UNKNOWN: &'static str = "unknown";

    /// Matches a request against the API's routes. Path segments are percent-decoded after
    /// splitting, so an encoded `/` may appear in a subject name.
    fn parse(method: &http::Method, path: &str) -> Option<Self> {
        let segments = path
            .trim_matches('/')
            .split('/')
            .map(urlencoding::decode)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let segments = segments.iter().map(|s| s.as_ref()).collect::<Vec<&str>>();
        let route = match segments.as_slice() {
            ["api", "v1", "users", name, "permissions"] => Self::Permissions(Subject::user(name)),
            ["api", "v1", "groups", name, "permissions"] => {
                Self::Permissions(Subject::group(name))
            }
            ["api", "v1", "namespaces", ns, "serviceaccounts", name, "permissions"] => {
                Self::Permissions(Subject::service_account(ns, name))
            }
            ["api", "v1", "namespaces", ns, "roles"] => Self::Roles {
                namespace: ns.to_string(),
            },
            ["api", "v1", "clusterroles"] => Self::ClusterRoles,
            ["api", "v1", "simulate"] => Self::Simulate,
            _ => return None,
        };

        let expected = match route {
            Self::Simulate => http::Method::POST,
            _ => http::Method::GET,
        };
        if *method != expected {
            return None;
        }
        Some(route)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Permissions(Subject::User(_)) => "user_permissions",
            Self::Permissions(Subject::Group(_)) => "group_permissions",
            Self::Permissions(Subject::ServiceAccount { .. }) => "serviceaccount_permissions",
            Self::Roles { .. } => "roles",
            Self::ClusterRoles => "clusterroles",
            Self::Simulate => "simulate",
        }
    }
}

// === impl SimulateRequestJson ===

impl SimulateRequestJson {
    fn into_request(self, default_namespace: &str) -> Result<SimulateRequest> {
        Ok(SimulateRequest {
            subject: self.subject.try_into()?,
            role: self.role,
            actions: self.actions,
            resources: self.resources,
            namespace: self
                .namespace
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| default_namespace.to_string()),
        })
    }
}

impl TryFrom<SubjectJson> for Subject {
    type Error = anyhow::Error;

    fn try_from(SubjectJson { kind, name, namespace }: SubjectJson) -> Result<Self> {
        if name.is_empty() {
            bail!("subject name must not be empty");
        }
        match kind.as_str() {
            Subject::USER => Ok(Subject::User(name)),
            Subject::GROUP => Ok(Subject::Group(name)),
            Subject::SERVICE_ACCOUNT => match namespace {
                Some(namespace) if !namespace.is_empty() => {
                    Ok(Subject::ServiceAccount { namespace, name })
                }
                _ => bail!("ServiceAccount subject {name} must specify a namespace"),
            },
            kind => bail!("unsupported subject kind: {kind}"),
        }
    }
}

// === conversions ===

impl From<Resolution> for ResolutionJson {
    fn from(resolution: Resolution) -> Self {
        Self {
            grants: resolution.grants.into_iter().map(Into::into).collect(),
            inconsistencies: resolution
                .inconsistencies
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

impl From<GrantedRule> for GrantJson {
    fn from(grant: GrantedRule) -> Self {
        Self {
            verb: grant.verb,
            api_group: grant.api_group,
            resource: grant.resource,
            resource_names: grant.resource_names,
            scope: grant.scope.to_string(),
            granted_by: grant.granted_by.into(),
            via: grant.via.into(),
        }
    }
}

impl From<BindingRef> for BindingJson {
    fn from(binding: BindingRef) -> Self {
        let kind = binding.kind();
        match binding {
            BindingRef::RoleBinding { namespace, name } => Self {
                kind,
                namespace: Some(namespace),
                name,
            },
            BindingRef::ClusterRoleBinding { name } => Self {
                kind,
                namespace: None,
                name,
            },
        }
    }
}

impl From<RoleRef> for RoleRefJson {
    fn from(role_ref: RoleRef) -> Self {
        Self {
            kind: role_ref.kind.to_string(),
            name: role_ref.name,
        }
    }
}

impl From<Inconsistency> for InconsistencyJson {
    fn from(inconsistency: Inconsistency) -> Self {
        Self {
            message: inconsistency.to_string(),
            binding: inconsistency.binding.into(),
        }
    }
}

impl From<&PolicyRule> for RuleJson {
    fn from(rule: &PolicyRule) -> Self {
        Self {
            verbs: rule.verbs.clone(),
            api_groups: rule.api_groups.clone(),
            resources: rule.resources.clone(),
            resource_names: rule.resource_names.clone(),
        }
    }
}

impl From<SimulateResponse> for SimulateResponseJson {
    fn from(rsp: SimulateResponse) -> Self {
        Self {
            authorized: rsp.authorized,
            verdicts: rsp
                .verdicts
                .into_iter()
                .map(|((verb, resource), v)| {
                    (
                        pair_name(verb, &resource),
                        VerdictJson {
                            allowed: v.allowed,
                            reason: v.reason,
                        },
                    )
                })
                .collect(),
        }
    }
}
