use apmbench_metrics::data::Emission;
use crossbeam::channel::Receiver;
use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

/// Logs every emitted mean as it happens.
///
/// Runs until every sender feeding the receiver is dropped, which is when the
/// aggregator goes away.
pub struct Progress {
    handle: JoinHandle<BTreeMap<String, u64>>,
}

impl Progress {
    pub fn spawn(rx: Receiver<Emission>, logger: slog::Logger) -> std::io::Result<Progress> {
        let handle = thread::Builder::new()
            .name("progress".into())
            .spawn(move || watch(rx, &logger))?;
        Ok(Progress { handle })
    }

    /// Wait for the channel to close. Returns how many emissions each variant saw.
    pub fn join(self) -> BTreeMap<String, u64> {
        self.handle.join().unwrap_or_default()
    }
}

fn watch(rx: Receiver<Emission>, logger: &slog::Logger) -> BTreeMap<String, u64> {
    let mut seen: BTreeMap<String, u64> = BTreeMap::new();
    for e in rx.iter() {
        let count = seen.entry(e.variant.clone()).or_default();
        *count += 1;
        slog::debug!(logger, "Mean updated";
            "variant" => e.variant.as_str(),
            "mean_ms" => e.mean_ms,
            "observations" => *count);
    }
    seen
}

#[cfg(test)]
mod test {
    use super::*;
    use apmbench_metrics::sinks::{EmissionQueue, Sink};

    #[test]
    fn counts_until_senders_are_gone() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let queue = EmissionQueue::new();
        let sink = queue.sink();
        let progress = Progress::spawn(queue.receiver(), logger).unwrap();
        drop(queue);

        sink.emit("otel", 100);
        sink.emit("alpha", 50);
        sink.emit("otel", 150);
        drop(sink);

        let seen = progress.join();
        assert_eq!(seen.get("otel"), Some(&2));
        assert_eq!(seen.get("alpha"), Some(&1));
        assert_eq!(seen.len(), 2);
    }
}
