use crate::connectors::{default_tls_config, TracingHttpsConnector};
use crate::events::{Event, EventCollector};
use crate::FutureResponse;
use futures::prelude::*;
use hyper::body::HttpBody;
use hyper::client::Client as HyperClient;
use http::response::Parts;
use http::Request;
use hyper::Body;
use rustls::ClientConfig;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("error reading response body: {0}")]
    BodyRead(#[source] BoxError),
}

/// A response whose body has been read to the end and discarded.
#[derive(Debug)]
pub struct Completed {
    pub parts: Parts,
    pub body_len: u64,
}

/// Something that can carry one request to completion while reporting
/// lifecycle events into the given collector.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        req: Request<Body>,
        collector: EventCollector,
    ) -> FutureResponse<Completed, ClientError>;
}

/// A hyper client bound to a single `EventCollector`. Pooling is off so every
/// request goes through DNS, connect and TLS again.
pub struct Client {
    client: HyperClient<TracingHttpsConnector, Body>,
    collector: EventCollector,
}

impl Client {
    pub fn with_tls_config(collector: EventCollector, tls_config: Arc<ClientConfig>) -> Client {
        let connector = TracingHttpsConnector::new(true, tls_config, collector.clone());
        let client = HyperClient::builder()
            .pool_max_idle_per_host(0)
            .build(connector);
        Client { client, collector }
    }

    /// Sends `req`, then drains the body so `FullResponse` marks the last byte.
    pub async fn request_fully(&self, req: Request<Body>) -> Result<Completed, ClientError> {
        self.collector.add(Event::Initiated);
        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| ClientError::Transport(e.into()))?;
        self.collector.add(Event::HeadersReceived);

        let (parts, mut body) = res.into_parts();
        let mut body_len = 0u64;
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|e| ClientError::BodyRead(e.into()))?;
            body_len += chunk.len() as u64;
        }
        self.collector.add(Event::FullResponse);
        log::trace!("{} drained {} body bytes", parts.status, body_len);
        Ok(Completed { parts, body_len })
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad("Client")
    }
}

/// The real network transport. Each call gets its own `Client` so timing
/// state never crosses requests; only the TLS configuration is shared.
#[derive(Clone)]
pub struct HttpTransport {
    tls_config: Arc<ClientConfig>,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport::with_tls_config(Arc::new(default_tls_config()))
    }

    pub fn with_tls_config(tls_config: Arc<ClientConfig>) -> HttpTransport {
        HttpTransport { tls_config }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new()
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        req: Request<Body>,
        collector: EventCollector,
    ) -> FutureResponse<Completed, ClientError> {
        let client = Client::with_tls_config(collector, self.tls_config.clone());
        async move { client.request_fully(req).await }.boxed()
    }
}
