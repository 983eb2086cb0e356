use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub(crate) struct ApiMetrics {
    requests: Family<RequestLabels, Counter>,
    simulations: Family<SimulationLabels, Counter>,
    inconsistencies: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct RequestLabels {
    route: &'static str,
    status: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct SimulationLabels {
    outcome: &'static str,
}

/// The result of a simulation request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Authorized,
    Denied,
    Rejected,
    Failed,
}

// === impl ApiMetrics ===

impl ApiMetrics {
    pub(crate) fn register(reg: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        reg.register(
            "requests",
            "Total number of API requests, by route and response status (`error` when no response was produced)",
            requests.clone(),
        );

        let simulations = Family::<SimulationLabels, Counter>::default();
        reg.register(
            "simulations",
            "Total number of simulation requests, by outcome",
            simulations.clone(),
        );

        let inconsistencies = Counter::default();
        reg.register(
            "inconsistencies",
            "Total number of unresolvable bindings observed while resolving permissions",
            inconsistencies.clone(),
        );

        Self {
            requests,
            simulations,
            inconsistencies,
        }
    }

    pub(crate) fn request(&self, route: &'static str, status: hyper::http::StatusCode) {
        self.requests
            .get_or_create(&RequestLabels {
                route,
                status: status.as_u16().to_string(),
            })
            .inc();
    }

    /// Records a request that failed before a response was produced.
    pub(crate) fn request_failed(&self, route: &'static str) {
        self.requests
            .get_or_create(&RequestLabels {
                route,
                status: "error".to_string(),
            })
            .inc();
    }

    pub(crate) fn simulation(&self, outcome: Outcome) {
        let outcome = match outcome {
            Outcome::Authorized => "authorized",
            Outcome::Denied => "denied",
            Outcome::Rejected => "rejected",
            Outcome::Failed => "failed",
        };
        self.simulations
            .get_or_create(&SimulationLabels { outcome })
            .inc();
    }

    pub(crate) fn inconsistencies(&self, n: usize) {
        self.inconsistencies.inc_by(n as u64);
    }
}

