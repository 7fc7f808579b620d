use crate::registry::TargetRegistry;
use crate::swarm::{RunStats, VariantRun};
use apmbench_metrics::data::VariantStats;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

fn fmt_duration(d: &Duration) -> String {
    if d.as_secs() >= 5 {
        let s: f64 = d.as_secs() as f64 + (d.subsec_millis() as f64 / 1000.0);
        format!("{:.3}s", s)
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn fmt_mean(stats: &VariantStats) -> String {
    match stats.mean_response_time_ms() {
        Some(ms) => fmt_duration(&Duration::from_millis(ms)),
        None => "-".into(),
    }
}

struct Row {
    variant: String,
    enabled: bool,
    stats: VariantStats,
    run: VariantRun,
}

/// End of run report: one line per declared variant, in declaration order.
pub struct Summary {
    rows: Vec<Row>,
    elapsed: Duration,
    rejected: u64,
}

impl Summary {
    pub fn new(
        registry: &TargetRegistry,
        snapshots: Vec<(String, VariantStats)>,
        run: &RunStats,
    ) -> Summary {
        let rows = snapshots
            .into_iter()
            .map(|(variant, stats)| Row {
                enabled: registry.get(&variant).map_or(false, |t| t.enabled),
                run: run.variants.get(&variant).copied().unwrap_or_default(),
                variant,
                stats,
            })
            .collect();
        Summary {
            rows,
            elapsed: run.elapsed,
            rejected: run.rejected,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.rows.iter().map(|r| r.stats.request_count()).sum()
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let width = self.rows.iter().map(|r| r.variant.len()).max().unwrap_or(0);
        write!(
            f,
            "{} requests in {}",
            self.total_requests(),
            fmt_duration(&self.elapsed)
        )?;
        for r in &self.rows {
            write!(f, "\n* {:width$} ", r.variant, width = width)?;
            if !r.enabled && r.stats.request_count() == 0 {
                write!(f, "disabled")?;
                continue;
            }
            write!(
                f,
                "count {}/mean {}",
                r.stats.request_count(),
                fmt_mean(&r.stats)
            )?;
            if r.run.failures > 0 {
                write!(f, "/failed {}", r.run.failures)?;
            }
        }
        if self.rejected > 0 {
            write!(f, "\n{} observations rejected", self.rejected)?;
        }
        Ok(())
    }
}
