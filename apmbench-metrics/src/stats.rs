/// Running totals for one benchmark variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantStats {
    request_count: u64,
    total_response_time_ms: u64,
}

impl VariantStats {
    /// Create a zeroed `VariantStats`
    pub fn new() -> VariantStats {
        VariantStats::default()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn total_response_time_ms(&self) -> u64 {
        self.total_response_time_ms
    }

    /// Floor of the cumulative mean, or `None` before the first observation.
    pub fn mean_response_time_ms(&self) -> Option<u64> {
        self.total_response_time_ms.checked_div(self.request_count)
    }

    /// Count one request of `elapsed_ms` and return the new mean.
    pub(crate) fn observe(&mut self, elapsed_ms: u64) -> u64 {
        self.request_count += 1;
        self.total_response_time_ms = self.total_response_time_ms.saturating_add(elapsed_ms);
        self.total_response_time_ms / self.request_count
    }
}
