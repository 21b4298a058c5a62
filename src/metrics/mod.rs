use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;


lazy_static! {
    /// Subscribers registered with every dispatcher in the process
    pub static ref ACTIVE_SUBSCRIBERS: IntGauge = IntGauge::new(
        "cds_active_subscribers",
        "Streaming subscribers currently registered, summed over all servers in the process"
    )
    .expect("metric can not be created");

    /// Configurations held by every store in the process. Each dispatcher adds
    /// its own changes and withdraws its contents when dropped.
    pub static ref STORE_SIZE: IntGauge = IntGauge::new(
        "cds_store_size",
        "Configurations held, summed over all servers in the process"
    )
    .expect("metric can not be created");

    pub static ref CONFIG_UPDATES: IntCounterVec = IntCounterVec::new(
        Opts::new("cds_config_updates", "Bulk config updates by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref MESSAGES_ENQUEUED: IntCounter =
        IntCounter::new("cds_messages_enqueued", "Entries pushed onto subscriber queues")
            .expect("metric can not be created");

    pub static ref MESSAGES_COALESCED: IntCounter = IntCounter::new(
        "cds_messages_coalesced",
        "Pending entries replaced by a newer value for the same id"
    )
    .expect("metric can not be created");

    pub static ref MESSAGES_SENT: IntCounter =
        IntCounter::new("cds_messages_sent", "Entries written to streaming connections")
            .expect("metric can not be created");

    pub static ref CONNECTIONS_CLOSED: IntCounterVec = IntCounterVec::new(
        Opts::new("cds_connections_closed", "Streaming connections closed by reason"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(ACTIVE_SUBSCRIBERS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STORE_SIZE.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CONFIG_UPDATES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MESSAGES_ENQUEUED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MESSAGES_COALESCED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MESSAGES_SENT.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CONNECTIONS_CLOSED.clone()))
        .expect("collector can be registered");
}

/// Register the custom collectors; safe to call more than once
pub fn init_metrics() {
    lazy_static::initialize(&REGISTRY);
}

/// Render custom and autometrics metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    res.push_str(&get_metrics_body());
    res
}

/// Export autometrics-instrumented function metrics
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
