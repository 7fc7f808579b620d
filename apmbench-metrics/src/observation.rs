use crate::util;
use std::time::Duration;

/// One completed request, labelled with the variant it was sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    variant: String,
    elapsed: Duration,
}

impl Observation {
    pub fn new<S: Into<String>>(variant: S, elapsed: Duration) -> Observation {
        Observation {
            variant: variant.into(),
            elapsed,
        }
    }

    /// Get the variant of this `Observation`
    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Elapsed time truncated to whole milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        util::dur_to_millis(self.elapsed)
    }
}

/// A mean that was handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub variant: String,
    pub mean_ms: u64,
}

impl Emission {
    pub fn new<S: Into<String>>(variant: S, mean_ms: u64) -> Emission {
        Emission {
            variant: variant.into(),
            mean_ms,
        }
    }
}
