use apmbench_metrics::sinks::HistogramSink;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{MetricExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SERVICE_NAME: &str = "apmbench";
pub const EXPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Where emitted means are shipped. Read once from the environment at startup.
///
/// - `OTEL_COLLECTOR`: collector base url, `/v1/metrics` is appended
/// - `API_TOKEN`: sent as `authorization: Bearer <token>`
/// - `SERVICE_NAME`: `service.name` resource attribute
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub collector: Option<String>,
    pub api_token: Option<String>,
    pub service_name: String,
    pub export_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            collector: None,
            api_token: None,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            export_interval: EXPORT_INTERVAL,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> TelemetryConfig {
        TelemetryConfig::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> TelemetryConfig {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        TelemetryConfig {
            collector: non_empty("OTEL_COLLECTOR"),
            api_token: non_empty("API_TOKEN"),
            service_name: non_empty("SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            export_interval: EXPORT_INTERVAL,
        }
    }

    pub fn metrics_endpoint(&self) -> Option<String> {
        self.collector
            .as_ref()
            .map(|c| format!("{}/v1/metrics", c.trim_end_matches('/')))
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(ref token) = self.api_token {
            headers.insert("authorization".to_string(), format!("Bearer {}", token));
        }
        headers
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_attributes([
                KeyValue::new("service.name", self.service_name.clone()),
                KeyValue::new("sw.data.module", "apm"),
                KeyValue::new("sw.apm.version", "0.0.0"),
            ])
            .build()
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Could not build OTLP metric exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
}

/// Owns the meter provider for the lifetime of the run.
pub struct Telemetry {
    provider: SdkMeterProvider,
    endpoint: Option<String>,
}

impl Telemetry {
    /// Build the meter provider. Without a collector the provider has no
    /// reader, so recorded means stay local to the process.
    pub fn init(config: &TelemetryConfig, logger: &slog::Logger) -> Result<Telemetry, TelemetryError> {
        let endpoint = config.metrics_endpoint();
        let mut builder = SdkMeterProvider::builder().with_resource(config.resource());
        match endpoint {
            Some(ref url) => {
                let exporter = MetricExporter::builder()
                    .with_http()
                    .with_endpoint(url.clone())
                    .with_headers(config.headers())
                    .build()?;
                let reader = PeriodicReader::builder(exporter)
                    .with_interval(config.export_interval)
                    .build();
                builder = builder.with_reader(reader);
                slog::info!(logger, "Exporting metrics";
                    "endpoint" => url.as_str(),
                    "service" => config.service_name.as_str(),
                    "interval" => ?config.export_interval,
                    "authenticated" => config.api_token.is_some());
            }
            None => {
                slog::warn!(logger, "OTEL_COLLECTOR not set, metrics will not be exported");
            }
        }
        Ok(Telemetry {
            provider: builder.build(),
            endpoint,
        })
    }

    pub fn sink(&self) -> HistogramSink {
        HistogramSink::from_provider(&self.provider)
    }

    pub fn exporting(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Push whatever is still buffered and stop the exporter.
    pub fn shutdown(self, logger: &slog::Logger) {
        if let Err(e) = self.provider.shutdown() {
            slog::error!(logger, "Metric provider shutdown failed: {}", e);
        } else if self.exporting() {
            slog::debug!(logger, "Flushed metrics to collector");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn reads_environment() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("OTEL_COLLECTOR", "https://otel.collector.example.com:443/"),
            ("API_TOKEN", "s3cret"),
            ("SERVICE_NAME", "php-apm-benchmark"),
        ]));
        assert_eq!(
            config.metrics_endpoint().as_deref(),
            Some("https://otel.collector.example.com:443/v1/metrics")
        );
        assert_eq!(config.service_name, "php-apm-benchmark");
        assert_eq!(
            config.headers().get("authorization").map(String::as_str),
            Some("Bearer s3cret")
        );
        assert_eq!(config.export_interval, Duration::from_secs(5));
    }

    #[test]
    fn defaults_without_environment() {
        let config = TelemetryConfig::from_lookup(lookup(&[("SERVICE_NAME", "  ")]));
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.metrics_endpoint(), None);
        assert!(config.headers().is_empty());
    }

    #[test]
    fn resource_identifies_the_reporter() {
        let config = TelemetryConfig {
            service_name: "bench".into(),
            ..TelemetryConfig::default()
        };
        let resource = config.resource();
        let get = |k: &'static str| resource.get(&opentelemetry::Key::from_static_str(k));
        assert_eq!(get("service.name").map(|v| v.to_string()), Some("bench".into()));
        assert_eq!(get("sw.data.module").map(|v| v.to_string()), Some("apm".into()));
        assert_eq!(get("sw.apm.version").map(|v| v.to_string()), Some("0.0.0".into()));
    }

    #[test]
    fn local_only_without_collector() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let telemetry = Telemetry::init(&TelemetryConfig::default(), &logger).unwrap();
        assert!(!telemetry.exporting());
        apmbench_metrics::sinks::Sink::emit(&telemetry.sink(), "otel", 10);
        telemetry.shutdown(&logger);
    }
}
