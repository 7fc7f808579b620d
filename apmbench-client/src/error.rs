use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("Reading response body failed: {0}")]
    Body(#[from] hyper::Error),
    #[error("Invalid request: {0}")]
    Http(#[from] http::Error),
    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}
