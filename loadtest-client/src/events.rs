use crossbeam::queue::SegQueue;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Points in the lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Initiated,
    DnsResolutionStarted,
    DnsResolutionFinished,
    ConnectionStarted,
    Connected,
    TlsNegotiationStarted,
    TlsNegotiated,
    HeadersReceived,
    FullResponse,
    ConnectionError,
}

/// Per-request timing hook. Clones share the same queue, so a collector can be
/// handed to the resolver, the connectors and the client while one owner
/// drains it afterwards.
#[derive(Debug, Default)]
pub struct EventCollector(Arc<SegQueue<(Event, Instant)>>);

impl Clone for EventCollector {
    fn clone(&self) -> EventCollector {
        EventCollector(self.0.clone())
    }
}

impl EventCollector {
    pub fn new() -> Self {
        EventCollector(Arc::new(SegQueue::new()))
    }

    pub fn add(&self, e: Event) {
        self.add_at(e, Instant::now());
    }

    /// Records an event with an explicit timestamp.
    pub fn add_at(&self, e: Event, at: Instant) {
        log::trace!("{:?} at {:?}", e, at);
        self.0.push((e, at));
    }

    pub fn drain_events(&self) -> EventSet {
        let mut r = Vec::with_capacity(self.0.len());
        while let Some((e, t)) = self.0.pop() {
            r.push((e, t));
        }
        EventSet(r)
    }
}

#[derive(Debug, Default)]
pub struct EventSet(Vec<(Event, Instant)>);

impl EventSet {
    pub fn iter(&self) -> impl Iterator<Item = &(Event, Instant)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn initiated_at(&self) -> Option<Instant> {
        self.find_event(Event::Initiated)
    }

    pub fn find_event(&self, ev: Event) -> Option<Instant> {
        self.iter().find(|&(e, _t)| *e == ev).map(|&(_e, t)| t)
    }

    pub fn contains(&self, ev: Event) -> bool {
        self.iter().any(|&(e, _t)| e == ev)
    }

    /// Time from the first `first` to the first `second`; zero if `second` came earlier.
    pub fn time_between(&self, first: Event, second: Event) -> Option<Duration> {
        let start = self.find_event(first);
        let end = self.find_event(second);
        start.and_then(|s| end.map(|e| e.saturating_duration_since(s)))
    }
}
