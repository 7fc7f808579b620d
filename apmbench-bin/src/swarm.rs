use crate::config::{LoadConfig, PayloadConfig, VariantConfig, WaitTime};
use crate::interrupt::Interrupted;
use crate::registry::TargetRegistry;
use crate::tracecontext::TraceContext;
use anyhow::{Context, Error};
use apmbench_client::{Body, Bytes, Client};
use apmbench_metrics::Observer;
use futures::future;
use http::header::HeaderMap;
use http::{Method, Request, Uri};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use slog::o;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Requests sent to one variant during a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VariantRun {
    pub requests: u64,
    /// Transport errors, timeouts and non-2xx responses
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub variants: BTreeMap<String, VariantRun>,
    /// Observations the observer refused
    pub rejected: u64,
    pub elapsed: Duration,
}

impl RunStats {
    fn merge(&mut self, other: RunStats) {
        for (variant, run) in other.variants {
            let entry = self.variants.entry(variant).or_default();
            entry.requests += run.requests;
            entry.failures += run.failures;
        }
        self.rejected += other.rejected;
    }

    pub fn requests(&self) -> u64 {
        self.variants.values().map(|r| r.requests).sum()
    }

    pub fn failures(&self) -> u64 {
        self.variants.values().map(|r| r.failures).sum()
    }
}

struct Target {
    variant: String,
    url: Uri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
    trace_options: Option<String>,
}

impl Target {
    fn from_config(config: &VariantConfig) -> Result<Target, Error> {
        let body = match config.payload {
            None => Bytes::new(),
            Some(PayloadConfig::Value { ref value }) => Bytes::from(value.clone()),
            Some(PayloadConfig::File { ref file }) => load_payload_body(file)
                .with_context(|| format!("Could not load payload for '{}'", config.name))?
                .into(),
        };
        Ok(Target {
            variant: config.name.clone(),
            url: config.url.clone(),
            method: config.method.clone(),
            headers: config.headers.iter().cloned().collect(),
            body,
            trace_options: config.trace_options.clone(),
        })
    }

    fn request<R: Rng>(&self, rng: &mut R) -> Result<Request<Body>, Error> {
        let mut headers = self.headers.clone();
        if let Some(ref options) = self.trace_options {
            TraceContext::random(rng).apply(&mut headers, options)?;
        }
        let mut builder = Request::builder()
            .uri(self.url.clone())
            .method(self.method.clone());
        if let Some(h) = builder.headers_mut() {
            h.extend(headers);
        }
        Ok(builder.body(Body::new(self.body.clone()))?)
    }
}

fn load_payload_body<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, Error> {
    let mut f = File::open(path.as_ref())?;
    let mut contents = Vec::new();
    f.read_to_end(&mut contents)?;
    Ok(contents)
}

fn think_time<R: Rng>(wait: &WaitTime, rng: &mut R) -> Duration {
    if wait.max <= wait.min {
        return wait.min;
    }
    rng.random_range(wait.min..=wait.max)
}

/// When virtual users should stop picking up new requests.
#[derive(Clone)]
struct Stop {
    interrupted: Interrupted,
    deadline: Option<Instant>,
    budget: Option<Arc<AtomicU64>>,
}

impl Stop {
    fn stopped(&self) -> bool {
        self.interrupted.interrupted() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Claim one request from the budget, if there is a budget.
    fn take_request(&self) -> bool {
        match self.budget {
            None => true,
            Some(ref b) => b
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    /// Shorten a pause so it never runs past the deadline.
    fn clamp(&self, pause: Duration) -> Duration {
        match self.deadline {
            Some(d) => pause.min(d.saturating_duration_since(Instant::now())),
            None => pause,
        }
    }
}

struct Shared {
    targets: Vec<Target>,
    weights: Option<WeightedIndex<u32>>,
    wait_time: WaitTime,
    client: Client,
    observer: Arc<dyn Observer>,
}

impl Shared {
    fn pick<R: Rng>(&self, rng: &mut R) -> Option<&Target> {
        self.weights
            .as_ref()
            .and_then(|w| self.targets.get(w.sample(rng)))
    }
}

/// Drives the enabled variants with a fixed number of virtual users.
///
/// Each user loops: pick a variant by weight, send its request, hand the
/// elapsed time to the observer, pause for a random think time.
pub struct Swarm {
    shared: Arc<Shared>,
    load: LoadConfig,
    logger: slog::Logger,
}

impl Swarm {
    pub fn new(
        registry: &TargetRegistry,
        load: LoadConfig,
        client: Client,
        observer: Arc<dyn Observer>,
        logger: slog::Logger,
    ) -> Result<Swarm, Error> {
        let targets = registry
            .enabled()
            .map(Target::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let weights = if targets.is_empty() {
            None
        } else {
            let w = registry.enabled().map(|t| t.weight);
            Some(WeightedIndex::new(w)?)
        };
        let shared = Shared {
            targets,
            weights,
            wait_time: load.wait_time,
            client,
            observer,
        };
        Ok(Swarm {
            shared: Arc::new(shared),
            load,
            logger,
        })
    }

    pub async fn run(self, interrupted: Interrupted) -> RunStats {
        let started = Instant::now();
        if self.shared.targets.is_empty() {
            slog::warn!(self.logger, "No variants enabled, not sending any requests");
            return RunStats::default();
        }
        let stop = Stop {
            interrupted,
            // A run time too far out to represent is the same as no deadline.
            deadline: self.load.run_time.and_then(|d| started.checked_add(d)),
            budget: self.load.requests.map(|n| Arc::new(AtomicU64::new(n))),
        };
        slog::info!(self.logger, "Starting virtual users";
            "users" => self.load.users,
            "variants" => self.shared.targets.len(),
            "run_time" => ?self.load.run_time,
            "requests" => ?self.load.requests);

        let users = (0..self.load.users).map(|id| {
            let logger = self.logger.new(o!("user" => id));
            tokio::spawn(virtual_user(self.shared.clone(), stop.clone(), logger))
        });
        let mut stats = RunStats::default();
        for result in future::join_all(users).await {
            match result {
                Ok(s) => stats.merge(s),
                Err(e) => slog::error!(self.logger, "Virtual user failed: {}", e),
            }
        }
        stats.elapsed = started.elapsed();
        stats
    }
}

async fn virtual_user(shared: Arc<Shared>, stop: Stop, logger: slog::Logger) -> RunStats {
    let mut rng = SmallRng::from_os_rng();
    let mut stats = RunStats::default();
    while !stop.stopped() && stop.take_request() {
        let target = match shared.pick(&mut rng) {
            Some(t) => t,
            None => break,
        };
        let req = match target.request(&mut rng) {
            Ok(r) => r,
            Err(e) => {
                slog::error!(logger, "Could not build request for '{}': {}", target.variant, e);
                break;
            }
        };
        let completion = shared.client.timed(req).await;

        let run = stats.variants.entry(target.variant.clone()).or_default();
        run.requests += 1;
        if !completion.is_success() {
            run.failures += 1;
            slog::debug!(logger, "{}: {}", target.variant, completion);
        }

        match shared
            .observer
            .on_request_complete(&target.variant, completion.elapsed)
        {
            Ok(s) => slog::trace!(logger, "Observed";
                "variant" => target.variant.as_str(),
                "count" => s.request_count(),
                "mean_ms" => s.mean_response_time_ms()),
            Err(e) => {
                stats.rejected += 1;
                slog::error!(logger, "Observation rejected: {}", e);
            }
        }

        if stop.stopped() {
            break;
        }
        tokio::time::sleep(stop.clamp(think_time(&shared.wait_time, &mut rng))).await;
    }
    stats
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use apmbench_metrics::data::VariantStats;
    use apmbench_metrics::sinks::{ChannelSink, EmissionQueue};
    use apmbench_metrics::Aggregator;
    use std::net::TcpListener;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    /// A local address nothing listens on, so every request fails fast.
    fn closed_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    fn registry(extra: &str) -> TargetRegistry {
        let doc = format!(
            r#"
url_template = "http://{}/{{variant}}"
{}

[[variants]]
name = "otel"

[[variants]]
name = "alpha"
weight = 2
trace_context = true

[[variants]]
name = "dev"
enabled = false
"#,
            closed_addr(),
            extra
        );
        let config = Config::parse(&doc, "/").unwrap();
        TargetRegistry::new(config.variants).unwrap()
    }

    fn no_wait(requests: Option<u64>, run_time: Option<Duration>) -> LoadConfig {
        LoadConfig {
            users: 4,
            run_time,
            requests,
            wait_time: WaitTime {
                min: Duration::ZERO,
                max: Duration::ZERO,
            },
            request_timeout: Some(Duration::from_secs(2)),
            keep_alive: false,
        }
    }

    fn swarm(registry: &TargetRegistry, load: LoadConfig, observer: Arc<dyn Observer>) -> Swarm {
        let client = Client::builder()
            .timeout(load.request_timeout)
            .build()
            .unwrap();
        Swarm::new(registry, load, client, observer, logger()).unwrap()
    }

    fn aggregator(registry: &TargetRegistry) -> (Arc<Aggregator<ChannelSink>>, EmissionQueue) {
        let queue = EmissionQueue::new();
        let agg = Arc::new(Aggregator::new(registry.variant_ids(), queue.sink()));
        (agg, queue)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_requests_are_still_observed() {
        let registry = registry("");
        let (agg, queue) = aggregator(&registry);
        let stats = swarm(&registry, no_wait(Some(12), None), agg.clone())
            .run(Interrupted::new())
            .await;

        assert_eq!(stats.requests(), 12);
        assert_eq!(stats.failures(), 12);
        assert_eq!(stats.rejected, 0);
        let observed: u64 = agg
            .snapshot_all()
            .iter()
            .map(|(_, s)| s.request_count())
            .sum();
        assert_eq!(observed, 12);
        assert_eq!(queue.drain().len(), 12);
        assert_eq!(agg.snapshot("dev"), Some(VariantStats::new()));
        assert!(!stats.variants.contains_key("dev"));
    }

    #[tokio::test]
    async fn stops_at_run_time() {
        let registry = registry("");
        let (agg, _queue) = aggregator(&registry);
        let mut load = no_wait(None, Some(Duration::from_millis(150)));
        load.wait_time.max = Duration::from_millis(20);
        let started = Instant::now();
        let stats = swarm(&registry, load, agg).run(Interrupted::new()).await;
        assert!(stats.requests() > 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unrepresentable_run_time_means_no_deadline() {
        let registry = registry("");
        let (agg, _queue) = aggregator(&registry);
        let load = no_wait(Some(3), Some(Duration::from_secs(u64::MAX)));
        let stats = swarm(&registry, load, agg).run(Interrupted::new()).await;
        assert_eq!(stats.requests(), 3);
    }

    #[tokio::test]
    async fn interrupted_swarm_sends_nothing() {
        let registry = registry("");
        let (agg, queue) = aggregator(&registry);
        let interrupted = Interrupted::new();
        interrupted.interrupt();
        let stats = swarm(&registry, no_wait(None, None), agg).run(interrupted).await;
        assert_eq!(stats.requests(), 0);
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn no_enabled_variants_means_no_traffic() {
        let mut registry = registry("");
        registry.enable_only(Vec::<String>::new()).unwrap();
        let (agg, queue) = aggregator(&registry);
        let stats = swarm(&registry, no_wait(None, None), agg).run(Interrupted::new()).await;
        assert_eq!(stats.requests(), 0);
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn rejected_observations_are_counted() {
        let registry = registry("");
        // Table built without "alpha"
        let queue = EmissionQueue::new();
        let agg = Arc::new(Aggregator::new(vec!["otel", "dev"], queue.sink()));
        let stats = swarm(&registry, no_wait(Some(30), None), agg.clone())
            .run(Interrupted::new())
            .await;
        let alpha = stats.variants.get("alpha").map_or(0, |r| r.requests);
        let otel = stats.variants.get("otel").map_or(0, |r| r.requests);
        assert_eq!(stats.rejected, alpha);
        assert_eq!(agg.snapshot("otel").unwrap().request_count(), otel);
        assert_eq!(otel + alpha, 30);
    }

    #[test]
    fn picks_only_enabled_targets() {
        let registry = registry("");
        let (agg, _queue) = aggregator(&registry);
        let client = Client::new().unwrap();
        let swarm = Swarm::new(&registry, LoadConfig::default(), client, agg, logger()).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut seen = BTreeMap::new();
        for _ in 0..3000 {
            let t = swarm.shared.pick(&mut rng).unwrap();
            *seen.entry(t.variant.as_str()).or_insert(0u32) += 1;
        }
        assert_eq!(seen.keys().copied().collect::<Vec<_>>(), vec!["alpha", "otel"]);
        // alpha carries twice the weight of otel
        assert!(seen["alpha"] > seen["otel"]);
    }

    #[test]
    fn trace_context_only_where_configured() {
        let registry = registry("");
        let mut rng = SmallRng::seed_from_u64(5);
        let otel = Target::from_config(registry.get("otel").unwrap()).unwrap();
        let alpha = Target::from_config(registry.get("alpha").unwrap()).unwrap();
        let req = otel.request(&mut rng).unwrap();
        assert!(req.headers().get("traceparent").is_none());
        let req = alpha.request(&mut rng).unwrap();
        assert!(req.headers().get("traceparent").is_some());
        assert!(req.headers().get("tracestate").is_some());
        assert!(req.headers().get("x-trace-options").is_some());
        assert!(req.uri().to_string().ends_with("/alpha"));
    }

    #[test]
    fn inline_payload_becomes_body() {
        let doc = r#"
[[variants]]
name = "otel"
url = "http://nginx-otel/complex"
method = "POST"
payload = { value = "{\"k\": 1}" }
"#;
        let config = Config::parse(doc, "/").unwrap();
        let target = Target::from_config(&config.variants[0]).unwrap();
        assert_eq!(target.body, Bytes::from_static(b"{\"k\": 1}"));
        assert_eq!(target.method, Method::POST);
    }

    #[test]
    fn missing_payload_file_is_an_error() {
        let doc = r#"
[[variants]]
name = "otel"
url = "http://nginx-otel/complex"
payload = { file = "does-not-exist.json" }
"#;
        let config = Config::parse(doc, "/nonexistent-apmbench-dir").unwrap();
        assert!(Target::from_config(&config.variants[0]).is_err());
    }

    #[test]
    fn think_time_stays_in_range() {
        let mut rng = SmallRng::seed_from_u64(9);
        let wait = WaitTime::default();
        for _ in 0..1000 {
            let t = think_time(&wait, &mut rng);
            assert!(t >= wait.min && t <= wait.max, "{:?}", t);
        }
        let fixed = WaitTime {
            min: Duration::from_millis(10),
            max: Duration::from_millis(10),
        };
        assert_eq!(think_time(&fixed, &mut rng), Duration::from_millis(10));
    }

    #[test]
    fn budget_is_shared_and_exact() {
        let stop = Stop {
            interrupted: Interrupted::new(),
            deadline: None,
            budget: Some(Arc::new(AtomicU64::new(3))),
        };
        let other = stop.clone();
        assert!(stop.take_request());
        assert!(other.take_request());
        assert!(stop.take_request());
        assert!(!other.take_request());
        assert!(!stop.take_request());
    }
}
