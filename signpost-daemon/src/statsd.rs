//! StatsD metrics recorder installation.
//!
//! Installs the global `metrics` recorder pointed at the collector from
//! `global.metrics.statsd`. After this, all `metrics::counter!()`,
//! `metrics::gauge!()`, `metrics::histogram!()` calls are shipped as
//! StatsD datagrams.

use anyhow::Result;
use metrics_exporter_statsd::StatsdBuilder;

/// Install the global StatsD metrics recorder.
///
/// This function should be called once per process.
///
/// # Arguments
///
/// * `statsd_addr` - Collector address in `host:port` form
///
/// # Errors
///
/// - The address cannot be split into host and port
/// - The UDP socket cannot be created
/// - A global recorder is already installed
pub fn install_metrics_recorder(statsd_addr: &str) -> Result<()> {
    let (host, port) = statsd_addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid statsd address '{statsd_addr}': expected 'host:port'"))?;
    let port: u16 = port
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid statsd port in '{statsd_addr}': {e}"))?;

    let recorder = StatsdBuilder::from(host, port)
        .histogram_is_distribution()
        .build(Some("signpost"))
        .map_err(|e| anyhow::anyhow!("failed to create statsd recorder: {e}"))?;

    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    // Register metric descriptions
    signpost_core::metrics::describe_all();

    tracing::info!(statsd = statsd_addr, "StatsD metrics recorder installed");
    Ok(())
}
