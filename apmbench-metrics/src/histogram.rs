use crate::sink::Sink;
use opentelemetry::metrics::{Histogram, Meter, MeterProvider};
use opentelemetry::KeyValue;

pub const METER_NAME: &str = "apm-php-benchmark";
pub const HISTOGRAM_NAME: &str = "apm.php.benchmark.response.time";
pub const HISTOGRAM_DESCRIPTION: &str = "measures the duration of the inbound HTTP request";
pub const HISTOGRAM_UNIT: &str = "ms";
/// Attribute carrying the variant id on every data point.
pub const VARIANT_ATTRIBUTE: &str = "benchmark.app.kind";

/// Records each emitted mean on an OpenTelemetry histogram.
///
/// Recording only touches the SDK's in-memory aggregation; batching and
/// shipping to the collector happen on the reader's own schedule.
#[derive(Clone)]
pub struct HistogramSink {
    histogram: Histogram<u64>,
}

impl HistogramSink {
    pub fn new(meter: &Meter) -> HistogramSink {
        let histogram = meter
            .u64_histogram(HISTOGRAM_NAME)
            .with_description(HISTOGRAM_DESCRIPTION)
            .with_unit(HISTOGRAM_UNIT)
            .build();
        HistogramSink { histogram }
    }

    pub fn from_provider<P: MeterProvider + ?Sized>(provider: &P) -> HistogramSink {
        HistogramSink::new(&provider.meter(METER_NAME))
    }
}

impl Sink for HistogramSink {
    fn emit(&self, variant: &str, mean_ms: u64) {
        self.histogram
            .record(mean_ms, &[KeyValue::new(VARIANT_ATTRIBUTE, variant.to_string())]);
    }
}
