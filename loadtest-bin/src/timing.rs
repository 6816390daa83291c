use loadtest_client::{Event, EventSet};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    DnsLookup,
    TcpConnection,
    TlsHandshake,
    ServerProcessing,
    ContentTransfer,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::DnsLookup,
        Phase::TcpConnection,
        Phase::TlsHandshake,
        Phase::ServerProcessing,
        Phase::ContentTransfer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::DnsLookup => "DNS lookup",
            Phase::TcpConnection => "TCP connection",
            Phase::TlsHandshake => "TLS handshake",
            Phase::ServerProcessing => "Server processing",
            Phase::ContentTransfer => "Content transfer",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("Invalid Event Set: {0}")]
pub struct InvalidEventSetError(String);

/// Whole milliseconds spent in each phase of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings([u64; 5]);

fn millis(d: Duration) -> u64 {
    // as_millis truncates the sub-millisecond remainder
    d.as_millis() as u64
}

impl PhaseTimings {
    pub fn get(&self, phase: Phase) -> u64 {
        self.0[phase.index()]
    }

    pub fn set(&mut self, phase: Phase, ms: u64) {
        self.0[phase.index()] = ms;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, u64)> + '_ {
        Phase::ALL.iter().map(move |&p| (p, self.get(p)))
    }

    /// Derives the phases from a drained event set. DNS, TCP and TLS are zero
    /// when their events are absent (IP literal host, plain http). Server
    /// processing starts at the last connection milestone that was reached.
    pub fn from_events(ev: &EventSet) -> Result<PhaseTimings, InvalidEventSetError> {
        let initiated = ev
            .initiated_at()
            .ok_or_else(|| InvalidEventSetError("No Initiated event".into()))?;
        let first_byte = ev
            .find_event(Event::HeadersReceived)
            .ok_or_else(|| InvalidEventSetError("No HeadersReceived event".into()))?;
        let last_byte = ev
            .find_event(Event::FullResponse)
            .ok_or_else(|| InvalidEventSetError("No FullResponse event".into()))?;

        let ready = ev
            .find_event(Event::TlsNegotiated)
            .or_else(|| ev.find_event(Event::Connected))
            .unwrap_or(initiated);

        let mut timings = PhaseTimings::default();
        let dns = ev.time_between(Event::DnsResolutionStarted, Event::DnsResolutionFinished);
        let connection = ev.time_between(Event::ConnectionStarted, Event::Connected);
        let tls = ev.time_between(Event::TlsNegotiationStarted, Event::TlsNegotiated);
        timings.set(Phase::DnsLookup, dns.map(millis).unwrap_or(0));
        timings.set(Phase::TcpConnection, connection.map(millis).unwrap_or(0));
        timings.set(Phase::TlsHandshake, tls.map(millis).unwrap_or(0));
        timings.set(
            Phase::ServerProcessing,
            millis(first_byte.saturating_duration_since(ready)),
        );
        timings.set(
            Phase::ContentTransfer,
            millis(last_byte.saturating_duration_since(first_byte)),
        );
        Ok(timings)
    }
}

impl Display for PhaseTimings {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let mut first = true;
        for (phase, ms) in self.iter() {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}: {}ms", phase, ms)?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for PhaseTimings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Phase::ALL.len()))?;
        for (phase, ms) in self.iter() {
            map.serialize_entry(phase.name(), &ms)?;
        }
        map.end()
    }
}
