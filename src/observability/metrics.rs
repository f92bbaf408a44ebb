use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trips_requested_total: IntCounter,
    pub match_attempts_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub match_queue_depth: IntGauge,
    pub live_connections: IntGaugeVec,
    pub notifications_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trips_requested_total =
            IntCounter::new("trips_requested_total", "Total trips requested by riders")
                .expect("valid trips_requested_total metric");

        let match_attempts_total = IntCounterVec::new(
            Opts::new("match_attempts_total", "Matching attempts by outcome"),
            &["outcome"],
        )
        .expect("valid match_attempts_total metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Latency of a matching attempt in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let match_queue_depth =
            IntGauge::new("match_queue_depth", "Trips waiting for the matching worker")
                .expect("valid match_queue_depth metric");

        let live_connections = IntGaugeVec::new(
            Opts::new("live_connections", "Open live channels by role"),
            &["role"],
        )
        .expect("valid live_connections metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Pushed notifications by role and delivery"),
            &["role", "outcome"],
        )
        .expect("valid notifications_total metric");

        registry
            .register(Box::new(trips_requested_total.clone()))
            .expect("register trips_requested_total");
        registry
            .register(Box::new(match_attempts_total.clone()))
            .expect("register match_attempts_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(match_queue_depth.clone()))
            .expect("register match_queue_depth");
        registry
            .register(Box::new(live_connections.clone()))
            .expect("register live_connections");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");

        Self {
            registry,
            trips_requested_total,
            match_attempts_total,
            match_latency_seconds,
            match_queue_depth,
            live_connections,
            notifications_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
