//! Hostname resolution for mirror URLs.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use super::{HostRecord, HostTable};
use crate::url_model::Target;

/// Resolves a hostname to an IPv4 address (probing is IPv4-only).
pub trait Resolve: Sync {
    fn resolve_v4(&self, server: &str, port: u16) -> Option<Ipv4Addr>;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve_v4(&self, server: &str, port: u16) -> Option<Ipv4Addr> {
        let addrs = (server, port).to_socket_addrs().ok()?;
        addrs
            .filter_map(|a| match a {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .next()
    }
}

/// Builds the host table from mirror URLs.
///
/// Duplicate servers keep only their first URL. Lookups run concurrently, one
/// scoped thread per distinct server; URLs that fail to parse or resolve are
/// left out of the table.
pub fn resolve_targets<R: Resolve>(
    urls: &[String],
    resolver: &R,
    max_ttl: u8,
    workers: usize,
) -> HostTable {
    let mut seen = HashSet::new();
    let targets: Vec<Target> = urls
        .iter()
        .filter_map(|u| match Target::parse(u) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::debug!("skipping mirror: {:#}", e);
                None
            }
        })
        .filter(|t| seen.insert(t.server.to_ascii_lowercase()))
        .collect();

    let resolved: Vec<Option<Ipv4Addr>> = std::thread::scope(|s| {
        let handles: Vec<_> = targets
            .iter()
            .map(|t| s.spawn(move || resolver.resolve_v4(&t.server, t.port)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().ok().flatten())
            .collect()
    });

    let mut table = HostTable::with_capacity(targets.len(), workers);
    for (target, addr) in targets.iter().zip(resolved) {
        match addr {
            Some(ip) => table.push(HostRecord::new(&target.url, &target.server, ip, max_ttl)),
            None => tracing::warn!(host = %target.server, "cannot resolve mirror host"),
        }
    }
    tracing::debug!(candidates = urls.len(), resolved = table.len(), "mirror resolution done");
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver(HashMap<&'static str, Ipv4Addr>);

    impl Resolve for MapResolver {
        fn resolve_v4(&self, server: &str, _port: u16) -> Option<Ipv4Addr> {
            self.0.get(server).copied()
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicates_and_unresolvable_are_dropped() {
        let resolver = MapResolver(HashMap::from([
            ("a.example", Ipv4Addr::new(10, 0, 0, 1)),
            ("b.example", Ipv4Addr::new(10, 0, 0, 2)),
        ]));
        let table = resolve_targets(
            &urls(&[
                "http://a.example/pub/f.iso",
                "ftp://A.example/other/f.iso",
                "http://nowhere.example/f.iso",
                "garbage",
                "http://b.example/f.iso",
            ]),
            &resolver,
            30,
            4,
        );
        let servers: Vec<&str> = table.records().iter().map(|h| h.server.as_str()).collect();
        assert_eq!(servers, vec!["a.example", "b.example"]);
        assert_eq!(table.records()[0].url, "http://a.example/pub/f.iso");
        assert_eq!(table.records()[1].address, Ipv4Addr::new(10, 0, 0, 2));
        assert!(table.records().iter().all(|h| h.hops_less_than == 30 && !h.invalid));
    }

    #[test]
    fn system_resolver_handles_literal_ipv4() {
        assert_eq!(
            SystemResolver.resolve_v4("127.0.0.1", 80),
            Some(Ipv4Addr::LOCALHOST)
        );
    }
}
