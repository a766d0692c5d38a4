//! Prometheus collectors for the pipeline stages.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

pub static TICKS_INGESTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "finstream_ticks_ingested_total",
        "Ticks decoded from the exchange stream"
    )
    .unwrap()
});

pub static TICKS_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "finstream_ticks_published_total",
        "Ticks published to the internal bus"
    )
    .unwrap()
});

pub static TICKS_RECORDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "finstream_ticks_recorded_total",
        "Ticks appended to sliding windows"
    )
    .unwrap()
});

pub static SNAPSHOTS_GENERATED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "finstream_snapshots_generated_total",
        "Market snapshots generated by the analytics scheduler"
    )
    .unwrap()
});

pub static FRAMES_BROADCAST: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "finstream_frames_broadcast_total",
        "Snapshot frames pushed to WebSocket sessions"
    )
    .unwrap()
});

pub static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "finstream_active_sessions",
        "Currently connected WebSocket sessions"
    )
    .unwrap()
});
