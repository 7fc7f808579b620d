use crate::connectors::https_connector;
use crate::error::ClientError;
use apmbench_metrics::Stopwatch;
use http::response::Parts;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use std::time::Duration;

pub type Body = Full<Bytes>;

/// How a timed request ended.
#[derive(Debug)]
pub enum Outcome {
    Response { status: StatusCode, body_len: usize },
    Failed(ClientError),
}

/// A finished request: always carries the elapsed time, whether or not the
/// server answered.
#[derive(Debug)]
pub struct Completion {
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl Completion {
    pub fn status(&self) -> Option<StatusCode> {
        match self.outcome {
            Outcome::Response { status, .. } => Some(status),
            Outcome::Failed(_) => None,
        }
    }

    /// A response arrived and its status was 2xx
    pub fn is_success(&self) -> bool {
        self.status().map_or(false, |s| s.is_success())
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.outcome {
            Outcome::Response { status, body_len } => {
                write!(f, "{} ({} bytes) in {:?}", status, body_len, self.elapsed)
            }
            Outcome::Failed(ref e) => write!(f, "failed in {:?}: {}", self.elapsed, e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientBuilder {
    keep_alive: bool,
    nodelay: bool,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            keep_alive: true,
            nodelay: true,
            connect_timeout: None,
            timeout: None,
        }
    }
}

impl ClientBuilder {
    /// Reuse pooled connections between requests (on by default)
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn connect_timeout<T: Into<Option<Duration>>>(mut self, timeout: T) -> Self {
        self.connect_timeout = timeout.into();
        self
    }

    /// Upper bound for a whole request, body included
    pub fn timeout<T: Into<Option<Duration>>>(mut self, timeout: T) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let connector = https_connector(self.nodelay, self.connect_timeout)?;
        let mut builder = HyperClient::builder(TokioExecutor::new());
        if !self.keep_alive {
            builder.pool_max_idle_per_host(0);
        }
        Ok(Client {
            client: builder.build(connector),
            timeout: self.timeout,
        })
    }
}

#[derive(Clone)]
pub struct Client {
    client: HyperClient<HttpsConnector<HttpConnector>, Body>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn new() -> Result<Client, ClientError> {
        Client::builder().build()
    }

    /// Send the request and read the full body.
    pub async fn request_fully(&self, req: Request<Body>) -> Result<(Parts, Bytes), ClientError> {
        let fut = async {
            let res = self.client.request(req).await?;
            let (parts, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, ClientError>((parts, body))
        };
        match self.timeout {
            Some(t) => tokio::time::timeout(t, fut)
                .await
                .map_err(|_| ClientError::Timeout(t))?,
            None => fut.await,
        }
    }

    /// Send the request, read the full body and time the whole exchange.
    ///
    /// Transport failures and timeouts are folded into the returned
    /// `Completion` so the caller always gets a measurement.
    pub async fn timed(&self, req: Request<Body>) -> Completion {
        let uri = req.uri().clone();
        let stopwatch = Stopwatch::new();
        let result = self.request_fully(req).await;
        let elapsed = stopwatch.elapsed();
        let outcome = match result {
            Ok((parts, body)) => {
                log::trace!("{} -> {} in {:?}", uri, parts.status, elapsed);
                Outcome::Response {
                    status: parts.status,
                    body_len: body.len(),
                }
            }
            Err(e) => {
                log::debug!("{} failed after {:?}: {}", uri, elapsed, e);
                Outcome::Failed(e)
            }
        };
        Completion { elapsed, outcome }
    }
}
