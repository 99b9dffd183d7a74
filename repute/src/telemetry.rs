//! OTLP export of the dispatch counters

use anyhow::Context;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use repute_common::internal;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
    /// Push counters to `endpoint`. Off unless asked for
    #[serde(default)]
    pub enabled: bool,

    /// OTLP/HTTP metrics endpoint, usually an OpenTelemetry Collector
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
        }
    }
}

impl MetricsConfig {
    /// Install the global meter provider
    ///
    /// Must run before the worker pool is built, as instruments bind to the
    /// provider that is installed when they are created. Returns `None` when
    /// export is disabled.
    ///
    /// # Errors
    ///
    /// If the OTLP exporter cannot be built
    pub fn install(&self) -> anyhow::Result<Option<SdkMeterProvider>> {
        if !self.enabled {
            internal!(level = DEBUG, "Metrics export is disabled");
            return Ok(None);
        }

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_endpoint(self.endpoint.as_str())
            .build()
            .with_context(|| format!("Failed to build OTLP exporter for {}", self.endpoint))?;

        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter).build())
            .build();

        opentelemetry::global::set_meter_provider(provider.clone());
        internal!(level = INFO, "Exporting metrics to {}", self.endpoint);

        Ok(Some(provider))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn disabled_by_default() {
        let config: MetricsConfig = ron::from_str("()").expect("Failed to parse");

        assert_eq!(config, MetricsConfig::default());
        assert!(config.install().expect("Failed to install").is_none());
    }

    #[test]
    fn endpoint_is_configurable() {
        let config: MetricsConfig =
            ron::from_str(r#"( enabled: true, endpoint: "http://collector:4318/v1/metrics" )"#)
                .expect("Failed to parse");

        assert!(config.enabled);
        assert_eq!(config.endpoint, "http://collector:4318/v1/metrics");
    }
}
