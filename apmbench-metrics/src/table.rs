use crate::error::UnknownVariant;
use crate::stats::VariantStats;
use fnv::FnvHashMap;
use std::sync::{Mutex, PoisonError};

/// Per-variant stats with a fixed key set.
///
/// Keys are registered once, at construction. Every entry sits behind its own
/// lock, so updates to different variants never contend and the map itself is
/// only ever read after it is built.
#[derive(Debug)]
pub struct StatsTable {
    order: Vec<String>,
    data: FnvHashMap<String, Mutex<VariantStats>>,
}

impl StatsTable {
    /// Create a table with one zeroed entry per variant. Repeated names collapse into one entry.
    pub fn new<I, S>(variants: I) -> StatsTable
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        let mut data = FnvHashMap::default();
        for v in variants {
            let v = v.into();
            if !data.contains_key(&v) {
                data.insert(v.clone(), Mutex::new(VariantStats::new()));
                order.push(v);
            }
        }
        StatsTable { order, data }
    }

    /// Check if the given variant has been registered with this table
    pub fn contains(&self, variant: &str) -> bool {
        self.data.contains_key(variant)
    }

    /// Registered variants, in registration order
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Run `f` on the entry for `variant` while holding that entry's lock.
    pub fn with_entry<F, R>(&self, variant: &str, f: F) -> Result<R, UnknownVariant>
    where
        F: FnOnce(&mut VariantStats) -> R,
    {
        let entry = self
            .data
            .get(variant)
            .ok_or_else(|| UnknownVariant(variant.to_string()))?;
        // Entries are plain counters, so a panic elsewhere cannot leave one half-written.
        let mut stats = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut stats))
    }

    /// Get a copy of the stats for the given variant, if it is registered
    pub fn get(&self, variant: &str) -> Option<VariantStats> {
        self.with_entry(variant, |s| *s).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_zeroed_in_registration_order() {
        let table = StatsTable::new(vec!["otel", "alpha", "otel", "dev"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.variants().collect::<Vec<_>>(), vec!["otel", "alpha", "dev"]);
        for v in table.variants() {
            assert_eq!(table.get(v), Some(VariantStats::new()));
        }
    }

    #[test]
    fn unknown_variant_is_an_error() {
        let table = StatsTable::new(vec!["otel"]);
        assert!(!table.contains("oboe"));
        assert_eq!(table.get("oboe"), None);
        let err = table.with_entry("oboe", |s| s.observe(1)).unwrap_err();
        assert_eq!(err.variant(), "oboe");
    }

    #[test]
    fn empty_table() {
        let table = StatsTable::new(Vec::<String>::new());
        assert!(table.is_empty());
    }
}
