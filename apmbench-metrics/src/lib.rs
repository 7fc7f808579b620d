mod aggregator;
mod error;
mod histogram;
mod observation;
mod observer;
mod sink;
mod stats;
mod stopwatch;
mod table;
mod util;

pub use self::aggregator::Aggregator;
pub use self::error::UnknownVariant;
pub use self::observer::Observer;
pub use self::stopwatch::Stopwatch;
pub use self::table::StatsTable;
pub mod sinks {
    pub use crate::histogram::{
        HistogramSink, HISTOGRAM_DESCRIPTION, HISTOGRAM_NAME, HISTOGRAM_UNIT, METER_NAME,
        VARIANT_ATTRIBUTE,
    };
    pub use crate::sink::{ChannelSink, EmissionQueue, Fanout, Sink};
}
pub mod data {
    pub use crate::observation::{Emission, Observation};
    pub use crate::stats::VariantStats;
}
