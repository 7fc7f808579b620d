use crate::error::UnknownVariant;
use crate::observation::Observation;
use crate::observer::Observer;
use crate::sink::Sink;
use crate::stats::VariantStats;
use crate::table::StatsTable;
use crate::util;
use std::time::Duration;

/// Cumulative mean response time per variant.
///
/// Every observation updates the variant's entry and emits the new mean to the
/// sink. Update and emission happen under the entry's lock, so for any one
/// variant the sink sees the means in the order their counts were reached.
pub struct Aggregator<S> {
    table: StatsTable,
    sink: S,
}

impl<S: Sink> Aggregator<S> {
    /// Create an aggregator with a zeroed entry for each of the given variants
    pub fn new<I, V>(variants: I, sink: S) -> Aggregator<S>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Aggregator {
            table: StatsTable::new(variants),
            sink,
        }
    }

    /// Fold one completed request into the variant's mean and emit it.
    ///
    /// Fails without touching the table or the sink when `variant` was not
    /// registered up front.
    pub fn record_observation(
        &self,
        variant: &str,
        elapsed: Duration,
    ) -> Result<VariantStats, UnknownVariant> {
        let elapsed_ms = util::dur_to_millis(elapsed);
        self.table.with_entry(variant, |stats| {
            let mean = stats.observe(elapsed_ms);
            self.sink.emit(variant, mean);
            *stats
        })
    }

    pub fn record(&self, observation: &Observation) -> Result<VariantStats, UnknownVariant> {
        self.record_observation(observation.variant(), observation.elapsed())
    }
}

impl<S> Aggregator<S> {
    pub fn snapshot(&self, variant: &str) -> Option<VariantStats> {
        self.table.get(variant)
    }

    /// Stats for every registered variant, in registration order
    pub fn snapshot_all(&self) -> Vec<(String, VariantStats)> {
        self.table
            .variants()
            .filter_map(|v| self.table.get(v).map(|s| (v.to_string(), s)))
            .collect()
    }

    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.table.variants()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: Sink> Observer for Aggregator<S> {
    fn on_request_complete(
        &self,
        variant: &str,
        elapsed: Duration,
    ) -> Result<VariantStats, UnknownVariant> {
        self.record_observation(variant, elapsed)
    }
}
