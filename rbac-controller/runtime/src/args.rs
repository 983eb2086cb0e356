use crate::{api::ApiService, discover::KnownSubjects, metrics::ApiMetrics};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "rbac", about = "Resolves effective RBAC permissions")]
pub struct Args {
    #[clap(long, default_value = "rbac=info,warn", env = "RBAC_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Users that may be simulated even when no binding names them.
    #[clap(long, value_delimiter = ',')]
    known_users: Vec<String>,

    /// Groups that may be simulated even when no binding names them.
    #[clap(long, value_delimiter = ',')]
    known_groups: Vec<String>,

    /// The namespace used by simulation requests that do not specify one.
    #[clap(long, default_value = "default")]
    simulation_namespace: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            known_users,
            known_groups,
            simulation_namespace,
        } = self;

        let mut prom = <Registry>::default();
        let api_metrics = ApiMetrics::register(prom.sub_registry_with_prefix("rbac_api"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(Some(server))
            .build()
            .await?;

        let known = KnownSubjects::new(
            known_users.into_iter().filter(|u| !u.is_empty()),
            known_groups.into_iter().filter(|g| !g.is_empty()),
        );
        info!(
            users = known.users.len(),
            groups = known.groups.len(),
            namespace = %simulation_namespace,
            "serving RBAC API"
        );

        // Each request lists the catalog through the runtime's client; no resources are watched.
        let api = ApiService::new(
            runtime.client(),
            known,
            &simulation_namespace,
            api_metrics,
        );
        let runtime = runtime.spawn_server(move || api);

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

