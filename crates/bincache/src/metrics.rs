//! Prometheus export of bin statistics
//!
//! Counters are labelled by bin. [`PrometheusExporter::observe`] brings them
//! up to date with a [`BinStatsSnapshot`]; call it before every scrape.

use crate::stats::BinStatsSnapshot;
use prometheus::{IntCounterVec, Opts, Registry};

/// Prometheus metrics exporter for cache bins
#[derive(Clone)]
pub struct PrometheusExporter {
    registry: Registry,
    gets: IntCounterVec,
    hits: IntCounterVec,
    misses: IntCounterVec,
    invalidated: IntCounterVec,
    lazy_deletes: IntCounterVec,
    sets: IntCounterVec,
    preventive_deletes: IntCounterVec,
    floor_bumps: IntCounterVec,
    bulk_deletes: IntCounterVec,
    key_deletes: IntCounterVec,
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter").finish_non_exhaustive()
    }
}

fn bin_counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["bin"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl PrometheusExporter {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the bin counters in an existing registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            gets: bin_counter(&registry, "bincache_gets_total", "Entries requested")?,
            hits: bin_counter(&registry, "bincache_hits_total", "Entries returned")?,
            misses: bin_counter(&registry, "bincache_misses_total", "Entries not returned")?,
            invalidated: bin_counter(
                &registry,
                "bincache_invalidated_total",
                "Entries found expired, flushed or corrupt on read",
            )?,
            lazy_deletes: bin_counter(
                &registry,
                "bincache_lazy_deletes_total",
                "Dead entries deleted by the read path",
            )?,
            sets: bin_counter(&registry, "bincache_sets_total", "Entries written")?,
            preventive_deletes: bin_counter(
                &registry,
                "bincache_preventive_deletes_total",
                "Writes replaced by a delete because the expiry had passed",
            )?,
            floor_bumps: bin_counter(
                &registry,
                "bincache_floor_bumps_total",
                "Flush floor advances",
            )?,
            bulk_deletes: bin_counter(
                &registry,
                "bincache_bulk_deletes_total",
                "Server-side scan-deletes issued",
            )?,
            key_deletes: bin_counter(
                &registry,
                "bincache_key_deletes_total",
                "Entries deleted by id",
            )?,
            registry,
        })
    }

    /// Advance the counters of `bin` to the values in `snapshot`
    pub fn observe(&self, bin: &str, snapshot: &BinStatsSnapshot) {
        let pairs = [
            (&self.gets, snapshot.gets),
            (&self.hits, snapshot.hits),
            (&self.misses, snapshot.misses),
            (&self.invalidated, snapshot.invalidated),
            (&self.lazy_deletes, snapshot.lazy_deletes),
            (&self.sets, snapshot.sets),
            (&self.preventive_deletes, snapshot.preventive_deletes),
            (&self.floor_bumps, snapshot.floor_bumps),
            (&self.bulk_deletes, snapshot.bulk_deletes),
            (&self.key_deletes, snapshot.key_deletes),
        ];
        for (vec, value) in pairs {
            let counter = vec.with_label_values(&[bin]);
            let current = counter.get();
            if value > current {
                counter.inc_by(value - current);
            }
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_is_idempotent_per_snapshot() {
        let exporter = PrometheusExporter::new().unwrap();
        let snapshot = BinStatsSnapshot {
            gets: 10,
            hits: 7,
            misses: 3,
            floor_bumps: 2,
            ..BinStatsSnapshot::default()
        };

        exporter.observe("cache_page", &snapshot);
        exporter.observe("cache_page", &snapshot);
        assert_eq!(exporter.hits.with_label_values(&["cache_page"]).get(), 7);

        let later = BinStatsSnapshot {
            hits: 9,
            ..snapshot
        };
        exporter.observe("cache_page", &later);
        assert_eq!(exporter.hits.with_label_values(&["cache_page"]).get(), 9);

        let text = exporter.gather();
        assert!(text.contains("bincache_hits_total{bin=\"cache_page\"} 9"));
        assert!(text.contains("bincache_floor_bumps_total"));
    }
}
