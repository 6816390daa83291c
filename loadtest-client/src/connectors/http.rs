use crate::dns::TracingResolver;
use crate::events::{Event, EventCollector};
use crate::FutureResponse;
use futures::prelude::*;
use hyper::service::Service;
use hyper::Uri;
use std::io;
use std::net::SocketAddr;
use std::task::Context;
use std::task::Poll;
use tokio::net::TcpStream;

#[derive(Clone)]
pub struct TracingConnector {
    resolver: TracingResolver,
    collector: EventCollector,
    nodelay: bool,
}

impl TracingConnector {
    pub fn new(collector: EventCollector) -> TracingConnector {
        let resolver = TracingResolver::new(collector.clone());
        TracingConnector {
            resolver,
            collector,
            nodelay: false,
        }
    }

    pub fn set_nodelay(&mut self, nodelay: bool) {
        self.nodelay = nodelay;
    }
}

impl Service<Uri> for TracingConnector {
    type Response = TcpStream;
    type Error = io::Error;
    type Future = FutureResponse<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _: &mut Context) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let host = match dst.host() {
            None => {
                return future::err(io::Error::new(io::ErrorKind::InvalidInput, "Invalid Host"))
                    .boxed();
            }
            Some(host) => host.to_string(),
        };
        let is_https = dst.scheme_str() == Some("https");
        let port = dst
            .port_u16()
            .unwrap_or_else(|| if is_https { 443 } else { 80 });
        let nodelay = self.nodelay;
        let collector = self.collector.clone();
        let resolver = self.resolver.clone();
        async move {
            let addrs = resolver.resolve(&host).await.map_err(|e| {
                collector.add(Event::ConnectionError);
                e
            })?;
            let addrs: Vec<SocketAddr> = addrs.map(|a| SocketAddr::new(a, port)).collect();
            if addrs.is_empty() {
                collector.add(Event::ConnectionError);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Did not resolve an address for {}", host),
                ));
            }
            collector.add(Event::ConnectionStarted);
            let stream = match connect_first(&addrs).await {
                Ok(stream) => stream,
                Err(e) => {
                    collector.add(Event::ConnectionError);
                    return Err(e);
                }
            };
            collector.add(Event::Connected);
            stream.set_nodelay(nodelay)?;
            Ok(stream)
        }
        .boxed()
    }
}

/// Tries each address in resolver order and keeps the first connection that
/// succeeds. Fails with the last address's error.
async fn connect_first(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                log::trace!("connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "No address to connect to")
    }))
}
