use crate::error::UnknownVariant;
use crate::stats::VariantStats;
use std::sync::Arc;
use std::time::Duration;

/// Receives one call per completed request from the load driver.
///
/// Called concurrently from every virtual user, hence `Send + Sync`.
pub trait Observer: Send + Sync {
    fn on_request_complete(
        &self,
        variant: &str,
        elapsed: Duration,
    ) -> Result<VariantStats, UnknownVariant>;
}

impl<O: Observer + ?Sized> Observer for Arc<O> {
    fn on_request_complete(
        &self,
        variant: &str,
        elapsed: Duration,
    ) -> Result<VariantStats, UnknownVariant> {
        (**self).on_request_complete(variant, elapsed)
    }
}
