use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static BOOT_COUNTER: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("tmms_boot_total", "server boots"))
        .expect("valid metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static BIND_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "tmms_bind_requests_total",
            "node to manifest bind requests by outcome",
        ),
        &["result"],
    )
    .expect("valid metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static BUILDS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("tmms_builds_total", "image builds by outcome"),
        &["result"],
    )
    .expect("valid metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static BINDING_PERSIST_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "tmms_binding_persist_errors_total",
        "failed writes of the node binding file",
    ))
    .expect("valid metric opts");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "metrics encode error");
    }
    buffer
}
