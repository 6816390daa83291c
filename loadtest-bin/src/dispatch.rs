use crate::config::RequestSpec;
use crate::http::{execute_request, RequestError};
use crate::reporting::DispatchSummary;
use crate::timing::PhaseTimings;
use loadtest_client::Transport;
use slog::{debug, info, o, warn};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One worker's outcome, tagged with the worker's index.
#[derive(Debug)]
pub struct WorkerResult {
    pub worker: usize,
    pub outcome: Result<PhaseTimings, RequestError>,
}

/// Fans a single request out to C workers at once and collects exactly one
/// result per worker.
pub struct Dispatcher<T: ?Sized> {
    spec: Arc<RequestSpec>,
    transport: Arc<T>,
    logger: slog::Logger,
}

impl<T> Dispatcher<T>
where
    T: Transport + ?Sized + 'static,
{
    pub fn new(spec: RequestSpec, transport: Arc<T>, logger: slog::Logger) -> Dispatcher<T> {
        Dispatcher {
            spec: Arc::new(spec),
            transport,
            logger,
        }
    }

    /// Hands every result to `on_result` as it arrives and returns once all
    /// `concurrency` workers are accounted for.
    ///
    /// A worker that panics is reported as `RequestError::WorkerLost`. That
    /// needs unwinding panics: under the release profile's `panic = "abort"`
    /// the whole process exits instead.
    pub async fn run<F>(&self, concurrency: NonZeroUsize, mut on_result: F) -> DispatchSummary
    where
        F: FnMut(&WorkerResult),
    {
        let count = concurrency.get();
        let logger = self
            .logger
            .new(o!("url" => self.spec.url.to_string(), "concurrency" => count));
        info!(logger, "dispatching requests");

        // one send per worker, so the queue never holds more than `count`
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerResult>();
        for worker in 0..count {
            let tx = tx.clone();
            let spec = self.spec.clone();
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let outcome = execute_request(&spec, &*transport).await;
                // the receiver only goes away if the dispatcher was dropped mid-run
                let _ = tx.send(WorkerResult { worker, outcome });
            });
        }
        drop(tx);

        let mut reported = vec![false; count];
        let mut summary = DispatchSummary::default();
        while summary.total() < count {
            let result = match rx.recv().await {
                Some(result) => result,
                None => break,
            };
            debug_assert!(!reported[result.worker], "worker reported twice");
            reported[result.worker] = true;
            self.deliver(&logger, result, &mut summary, &mut on_result);
        }

        // every sender is gone, so any worker still unreported panicked
        for worker in (0..count).filter(|&w| !reported[w]) {
            let result = WorkerResult {
                worker,
                outcome: Err(RequestError::WorkerLost),
            };
            self.deliver(&logger, result, &mut summary, &mut on_result);
        }

        info!(logger, "dispatch finished";
            "succeeded" => summary.succeeded, "failed" => summary.failed);
        summary
    }

    fn deliver<F>(
        &self,
        logger: &slog::Logger,
        result: WorkerResult,
        summary: &mut DispatchSummary,
        on_result: &mut F,
    ) where
        F: FnMut(&WorkerResult),
    {
        match result.outcome {
            Ok(ref timings) => debug!(logger, "request completed";
                "worker" => result.worker, "timings" => format!("{:?}", timings)),
            Err(ref e) => warn!(logger, "request failed"; "worker" => result.worker, "error" => %e),
        }
        summary.record(&result);
        on_result(&result);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::test_support::{FakeTransport, Script};
    use crate::timing::Phase;
    use std::collections::HashSet;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    fn spec() -> RequestSpec {
        RequestSpec::get("http://example.com/".parse().unwrap())
    }

    fn n(c: usize) -> NonZeroUsize {
        NonZeroUsize::new(c).unwrap()
    }

    async fn collect<T: Transport + ?Sized + 'static>(
        transport: Arc<T>,
        c: usize,
    ) -> (Vec<WorkerResult>, DispatchSummary) {
        let dispatcher = Dispatcher::new(spec(), transport, logger());
        let mut results = Vec::new();
        let summary = dispatcher
            .run(n(c), |r| {
                results.push(WorkerResult {
                    worker: r.worker,
                    outcome: match r.outcome {
                        Ok(t) => Ok(t),
                        Err(_) => Err(RequestError::WorkerLost),
                    },
                })
            })
            .await;
        (results, summary)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn yields_exactly_one_result_per_worker() {
        for &c in &[1usize, 2, 7, 32] {
            let transport = Arc::new(FakeTransport::default());
            let (results, summary) = collect(transport.clone(), c).await;
            assert_eq!(results.len(), c);
            assert_eq!(summary.total(), c);
            assert_eq!(transport.calls(), c);
            let workers: HashSet<usize> = results.iter().map(|r| r.worker).collect();
            assert_eq!(workers, (0..c).collect());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_workers_are_all_collected() {
        let transport = Arc::new(FakeTransport::default());
        let (results, summary) = collect(transport.clone(), 2_000).await;
        assert_eq!(results.len(), 2_000);
        assert!(summary.all_succeeded());
        assert_eq!(transport.calls(), 2_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_failure_does_not_stop_the_rest() {
        let transport = Arc::new(FakeTransport {
            fail: vec![2],
            ..FakeTransport::default()
        });
        let (results, summary) = collect(transport, 5).await;
        assert_eq!(results.len(), 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_never_share_timing_state() {
        // each call gets a distinct server-processing signature: 10, 20, ... 100ms
        let scripts: Vec<Script> = (1..=10).map(|i| Script::server_only(i * 10)).collect();
        let transport = FakeTransport::with_scripts(scripts);
        let (results, summary) = collect(transport, 10).await;
        assert!(summary.all_succeeded());

        let mut observed: Vec<u64> = results
            .iter()
            .map(|r| r.outcome.as_ref().unwrap().get(Phase::ServerProcessing))
            .collect();
        observed.sort_unstable();
        assert_eq!(observed, (1..=10).map(|i| i * 10).collect::<Vec<u64>>());
        for r in &results {
            let t = r.outcome.as_ref().unwrap();
            assert_eq!(t.get(Phase::ContentTransfer), 0);
            assert_eq!(t.get(Phase::DnsLookup), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lost_workers_are_reported() {
        struct Panicking;
        impl Transport for Panicking {
            fn execute(
                &self,
                _req: http::Request<hyper::Body>,
                _collector: loadtest_client::EventCollector,
            ) -> loadtest_client::FutureResponse<loadtest_client::Completed, loadtest_client::ClientError>
            {
                use futures::FutureExt;
                futures::future::lazy(
                    |_| -> Result<loadtest_client::Completed, loadtest_client::ClientError> {
                        panic!("transport blew up")
                    },
                )
                .boxed()
            }
        }

        let (results, summary) = collect(Arc::new(Panicking), 3).await;
        assert_eq!(results.len(), 3);
        assert_eq!(summary.failed, 3);
    }
}
