use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid upstream uri '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("send failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("body: {0}")]
    Body(#[from] hyper::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Pooled HTTP/1.1 client shared by request forwarding and health probes.
///
/// Both `http` and `https` upstreams are reachable; server certificates are
/// verified against the bundled webpki roots.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpClient {
    pub fn new() -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self { client }
    }

    /// Sends `req` and reads the whole response body.
    pub async fn send(
        &self,
        req: Request<Full<Bytes>>,
    ) -> Result<(StatusCode, HeaderMap, Bytes), TransportError> {
        let response = self.client.request(req).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok((parts.status, parts.headers, body))
    }

    /// Issues a bodiless GET, giving up after `timeout`. Only the status is
    /// of interest; the body is discarded.
    pub async fn probe(&self, uri: &str, timeout: Duration) -> Result<StatusCode, TransportError> {
        let parsed: Uri = uri.parse().map_err(|source| TransportError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;

        let mut request = Request::new(Full::new(Bytes::new()));
        *request.uri_mut() = parsed;

        let response = tokio::time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        Ok(response.status())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
