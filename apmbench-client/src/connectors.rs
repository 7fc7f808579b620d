use crate::error::ClientError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use std::time::Duration;

/// Plain TCP connector wrapped so `https://` targets negotiate TLS against the
/// webpki roots and `http://` targets pass straight through.
pub fn https_connector(
    nodelay: bool,
    connect_timeout: Option<Duration>,
) -> Result<HttpsConnector<HttpConnector>, ClientError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(nodelay);
    http.set_connect_timeout(connect_timeout);
    let connector = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);
    Ok(connector)
}
