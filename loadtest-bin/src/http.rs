use crate::config::RequestSpec;
use crate::timing::{InvalidEventSetError, PhaseTimings};
use loadtest_client::client::BoxError;
use loadtest_client::{ClientError, EventCollector, Transport};
use std::time::Duration;
use thiserror::Error;

/// Why a single worker produced no timings. Never fatal to the run.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Could not build request: {0}")]
    Build(#[from] http::Error),
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("Error reading response body: {0}")]
    BodyRead(#[source] BoxError),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    IncompleteTimings(#[from] InvalidEventSetError),
    #[error("Worker exited without reporting a result")]
    WorkerLost,
}

impl From<ClientError> for RequestError {
    fn from(e: ClientError) -> RequestError {
        match e {
            ClientError::Transport(source) => RequestError::Transport(source),
            ClientError::BodyRead(source) => RequestError::BodyRead(source),
        }
    }
}

/// Performs exactly one request for `spec` and measures its phases. The
/// collector is created here, so its timing state belongs to this call alone.
pub async fn execute_request<T>(spec: &RequestSpec, transport: &T) -> Result<PhaseTimings, RequestError>
where
    T: Transport + ?Sized,
{
    let req = spec.to_request()?;
    let collector = EventCollector::new();
    let exchange = transport.execute(req, collector.clone());
    match spec.timeout {
        Some(limit) => {
            tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| RequestError::Timeout(limit))??;
        }
        None => {
            exchange.await?;
        }
    }
    let events = collector.drain_events();
    Ok(PhaseTimings::from_events(&events)?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use futures::FutureExt;
    use http::{Request, Response};
    use hyper::Body;
    use loadtest_client::{ClientError, Completed, Event, EventCollector, FutureResponse, Transport};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Offsets, in milliseconds from `Initiated`, at which the fake stamps
    /// each lifecycle event.
    #[derive(Debug, Clone, Copy)]
    pub struct Script {
        pub dns: u64,
        pub connect: u64,
        pub tls: u64,
        pub server: u64,
        pub transfer: u64,
    }

    impl Script {
        pub fn server_only(server: u64) -> Script {
            Script {
                dns: 0,
                connect: 0,
                tls: 0,
                server,
                transfer: 0,
            }
        }

        /// Every event after `Initiated`, stamped relative to `base`.
        fn timeline(&self, base: Instant) -> Vec<(Event, Instant)> {
            let mut at = base;
            let mut step = |ms: u64| {
                at += Duration::from_millis(ms);
                at
            };
            vec![
                (Event::DnsResolutionStarted, base),
                (Event::DnsResolutionFinished, step(self.dns)),
                (Event::ConnectionStarted, step(0)),
                (Event::Connected, step(self.connect)),
                (Event::TlsNegotiationStarted, step(0)),
                (Event::TlsNegotiated, step(self.tls)),
                (Event::HeadersReceived, step(self.server)),
                (Event::FullResponse, step(self.transfer)),
            ]
        }
    }

    fn completed() -> Completed {
        let (parts, _) = Response::new(()).into_parts();
        Completed { parts, body_len: 0 }
    }

    /// Records requests without touching the network. Each call takes the
    /// next script from the list (cycling), and calls whose index is in
    /// `fail` report a connection reset instead.
    #[derive(Default)]
    pub struct FakeTransport {
        pub scripts: Vec<Script>,
        pub fail: Vec<usize>,
        pub hang: bool,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<Request<Body>>>,
    }

    impl FakeTransport {
        pub fn with_scripts(scripts: Vec<Script>) -> Arc<FakeTransport> {
            Arc::new(FakeTransport {
                scripts,
                ..FakeTransport::default()
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for FakeTransport {
        fn execute(
            &self,
            req: Request<Body>,
            collector: EventCollector,
        ) -> FutureResponse<Completed, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(req);
            }
            let script = if self.scripts.is_empty() {
                Script::server_only(1)
            } else {
                self.scripts[call % self.scripts.len()]
            };
            let fail = self.fail.contains(&call);
            let hang = self.hang;
            async move {
                if hang {
                    futures::future::pending::<()>().await;
                }
                let base = Instant::now();
                collector.add_at(Event::Initiated, base);
                // let other workers interleave their events with ours
                tokio::task::yield_now().await;
                if fail {
                    collector.add(Event::ConnectionError);
                    return Err(ClientError::Transport(Box::new(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    ))));
                }
                for (e, t) in script.timeline(base) {
                    collector.add_at(e, t);
                    tokio::task::yield_now().await;
                }
                Ok(completed())
            }
            .boxed()
        }
    }
}
