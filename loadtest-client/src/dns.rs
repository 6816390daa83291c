use crate::events::{Event, EventCollector};
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

#[derive(Clone)]
pub struct TracingResolver {
    collector: EventCollector,
}

pub struct IpAddrs {
    inner: std::vec::IntoIter<SocketAddr>,
}

impl Iterator for IpAddrs {
    type Item = IpAddr;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|s| s.ip())
    }
}

impl TracingResolver {
    pub fn new(collector: EventCollector) -> TracingResolver {
        TracingResolver { collector }
    }

    /// Resolves `host` on the blocking pool. IP literals are returned as-is
    /// and record no DNS events.
    pub async fn resolve(&self, host: &str) -> io::Result<IpAddrs> {
        if let Some(addrs) = try_parse_ipaddr(host) {
            return Ok(addrs);
        }
        let collector = self.collector.clone();
        let host = host.to_string();
        tokio::task::spawn_blocking(move || {
            collector.add(Event::DnsResolutionStarted);
            let ipaddrs = resolve(&host);
            collector.add(Event::DnsResolutionFinished);
            ipaddrs
        })
        .await?
    }
}

fn try_parse_ipaddr(host: &str) -> Option<IpAddrs> {
    // bracketed IPv6 hosts come straight from the URI authority
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>().ok().map(|addr| IpAddrs {
        inner: vec![SocketAddr::new(addr, 0)].into_iter(),
    })
}

fn resolve(host: &str) -> io::Result<IpAddrs> {
    let sockets: Vec<SocketAddr> = (host, 0).to_socket_addrs()?.collect();
    Ok(IpAddrs {
        inner: sockets.into_iter(),
    })
}
