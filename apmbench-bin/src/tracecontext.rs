use http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use rand::Rng;

pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");
pub const TRACESTATE: HeaderName = HeaderName::from_static("tracestate");
pub const TRACE_OPTIONS: HeaderName = HeaderName::from_static("x-trace-options");

const VERSION: &str = "00";
const SAMPLED: &str = "01";

/// A fresh W3C trace context, so an instrumented target starts a new trace
/// for every request instead of making its own sampling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: u128,
    span_id: u64,
    state_span_id: u64,
}

impl TraceContext {
    pub fn random<R: Rng>(rng: &mut R) -> TraceContext {
        TraceContext {
            trace_id: rng.random(),
            span_id: rng.random(),
            state_span_id: rng.random(),
        }
    }

    pub fn traceparent(&self) -> String {
        format!(
            "{}-{:032x}-{:016x}-{}",
            VERSION, self.trace_id, self.span_id, SAMPLED
        )
    }

    pub fn tracestate(&self) -> String {
        format!("sw={:016x}-{}", self.state_span_id, SAMPLED)
    }

    /// Insert `traceparent`, `tracestate` and `x-trace-options`, replacing any already present.
    pub fn apply(
        &self,
        headers: &mut HeaderMap,
        trace_options: &str,
    ) -> Result<(), InvalidHeaderValue> {
        headers.insert(TRACEPARENT, HeaderValue::from_str(&self.traceparent())?);
        headers.insert(TRACESTATE, HeaderValue::from_str(&self.tracestate())?);
        headers.insert(TRACE_OPTIONS, HeaderValue::from_str(trace_options)?);
        Ok(())
    }
}
