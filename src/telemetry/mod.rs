// telemetry/mod.rs
use crate::commands::Command;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn setup_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to setup metrics: {}", e))
}

pub fn record_poll(device: &str) {
    metrics::counter!("projector_polls_total", "device" => device.to_string()).increment(1);
}

pub fn record_link_failure(device: &str, stage: &'static str) {
    metrics::counter!(
        "projector_link_failures_total",
        "device" => device.to_string(),
        "stage" => stage
    )
    .increment(1);
}

pub fn record_command(device: &str, command: Command, outcome: &'static str) {
    metrics::counter!(
        "projector_commands_total",
        "device" => device.to_string(),
        "command" => command.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn set_ws_clients(count: usize) {
    metrics::gauge!("projector_ws_clients").set(count as f64);
}
