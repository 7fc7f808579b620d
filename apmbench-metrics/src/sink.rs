use crate::observation::Emission;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;

/// Destination for updated means.
///
/// `emit` is called from inside the aggregator's per-variant critical section
/// and must not block.
pub trait Sink: Send + Sync {
    fn emit(&self, variant: &str, mean_ms: u64);
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn emit(&self, variant: &str, mean_ms: u64) {
        (**self).emit(variant, mean_ms)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn emit(&self, variant: &str, mean_ms: u64) {
        (**self).emit(variant, mean_ms)
    }
}

/// Owns both ends of an unbounded emission channel. Hand out senders with
/// [`EmissionQueue::sink`] and drain on the consuming side.
pub struct EmissionQueue {
    tx: Sender<Emission>,
    rx: Receiver<Emission>,
}

impl Default for EmissionQueue {
    fn default() -> Self {
        EmissionQueue::new()
    }
}

impl EmissionQueue {
    pub fn new() -> EmissionQueue {
        let (tx, rx) = unbounded();
        EmissionQueue { tx, rx }
    }

    pub fn sink(&self) -> ChannelSink {
        ChannelSink {
            sender: self.tx.clone(),
        }
    }

    pub fn receiver(&self) -> Receiver<Emission> {
        self.rx.clone()
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<Emission> {
        self.rx.try_iter().collect()
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Emission>,
}

impl Sink for ChannelSink {
    fn emit(&self, variant: &str, mean_ms: u64) {
        // Unbounded, so this only fails once every receiver is gone.
        let _ = self.sender.try_send(Emission::new(variant, mean_ms));
    }
}

/// Forwards every emission to each inner sink in order.
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Box<dyn Sink>>,
}

impl Fanout {
    pub fn new() -> Fanout {
        Fanout::default()
    }

    pub fn with<S: Sink + 'static>(mut self, sink: S) -> Fanout {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push<S: Sink + 'static>(&mut self, sink: S) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for Fanout {
    fn emit(&self, variant: &str, mean_ms: u64) {
        for s in &self.sinks {
            s.emit(variant, mean_ms);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_sink_queues_in_order() {
        let queue = EmissionQueue::new();
        let sink = queue.sink();
        sink.emit("otel", 100);
        sink.emit("alpha", 50);
        assert_eq!(
            queue.drain(),
            vec![Emission::new("otel", 100), Emission::new("alpha", 50)]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn channel_sink_outlives_receiver() {
        let sink = EmissionQueue::new().sink();
        sink.emit("otel", 1);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = EmissionQueue::new();
        let second = EmissionQueue::new();
        let fanout = Fanout::new().with(first.sink()).with(Arc::new(second.sink()));
        assert_eq!(fanout.len(), 2);
        fanout.emit("dev", 7);
        assert_eq!(first.drain(), vec![Emission::new("dev", 7)]);
        assert_eq!(second.drain(), vec![Emission::new("dev", 7)]);
    }
}
