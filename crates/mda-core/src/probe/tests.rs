//! Prober tests against a simulated network.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::packet::{self, IcmpKind, ProbeSpec, UNREACH_PORT};
use super::*;
use crate::hosts::{HostRecord, HostTable};

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    /// Answers with port-unreachable once the TTL reaches `hops`.
    Normal,
    /// Never answers at the destination (routers on the way still do).
    Silent,
    /// Answers with the given unreachable code.
    Code(u8),
    /// Send fails with ENETUNREACH.
    NoRoute,
}

#[derive(Debug, Clone, Copy)]
struct SimHost {
    hops: u8,
    behaviour: Behaviour,
}

/// Replies are queued at send time and handed out one per `recv`.
struct SimNet {
    hosts: HashMap<Ipv4Addr, SimHost>,
    queue: VecDeque<Vec<u8>>,
    timeout: Duration,
    timeouts_set: Vec<Duration>,
    sent: Vec<ProbeSpec>,
    noise: bool,
}

impl SimNet {
    fn new(hosts: &[(Ipv4Addr, u8, Behaviour)]) -> Self {
        Self {
            hosts: hosts
                .iter()
                .map(|&(ip, hops, behaviour)| (ip, SimHost { hops, behaviour }))
                .collect(),
            queue: VecDeque::new(),
            timeout: Duration::from_millis(1),
            timeouts_set: Vec::new(),
            sent: Vec::new(),
            noise: false,
        }
    }
}

impl ProbeTransport for SimNet {
    fn send(&mut self, probe: &ProbeSpec) -> io::Result<()> {
        let host = self.hosts[&probe.dst];
        if let Behaviour::NoRoute = host.behaviour {
            return Err(io::Error::from_raw_os_error(libc::ENETUNREACH));
        }
        self.sent.push(*probe);
        let datagram = packet::encode_probe(probe);
        if self.noise {
            // A reply to some other process's traceroute.
            let mut foreign = *probe;
            foreign.src_port = probe.src_port.wrapping_add(1);
            let foreign = packet::encode_probe(&foreign);
            self.queue.push_back(packet::encode_reply(
                IcmpKind::TimeExceeded,
                Ipv4Addr::new(10, 9, 9, 9),
                &foreign,
            ));
        }
        let reply = if probe.ttl < host.hops {
            Some(packet::encode_reply(
                IcmpKind::TimeExceeded,
                Ipv4Addr::new(10, 0, 0, probe.ttl),
                &datagram,
            ))
        } else {
            match host.behaviour {
                Behaviour::Normal => Some(packet::encode_reply(
                    IcmpKind::Unreachable(UNREACH_PORT),
                    probe.dst,
                    &datagram,
                )),
                Behaviour::Code(code) => Some(packet::encode_reply(
                    IcmpKind::Unreachable(code),
                    probe.dst,
                    &datagram,
                )),
                Behaviour::Silent | Behaviour::NoRoute => None,
            }
        };
        self.queue.extend(reply);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.queue.pop_front() {
            Some(reply) => {
                buf[..reply.len()].copy_from_slice(&reply);
                Ok(Some(reply.len()))
            }
            None => {
                std::thread::sleep(self.timeout);
                Ok(None)
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout.min(Duration::from_millis(2));
        self.timeouts_set.push(timeout);
        Ok(())
    }
}

fn fast_settings() -> ProbeSettings {
    ProbeSettings {
        resend_threshold: Duration::from_millis(5),
        recv_timeout: Duration::from_millis(1),
        ..ProbeSettings::default()
    }
}

fn ip(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 0, 2, n)
}

fn table(hosts: &[(Ipv4Addr, u8, Behaviour)]) -> HostTable {
    hosts
        .iter()
        .map(|&(addr, _, _)| {
            let name = format!("h{}.example", addr.octets()[3]);
            HostRecord::new(&format!("http://{}/f.iso", name), &name, addr, 30)
        })
        .collect()
}

const IDENT: u16 = 0x8abc;

#[test]
fn converges_on_true_hop_count() {
    let hosts = [
        (ip(1), 4, Behaviour::Normal),
        (ip(2), 11, Behaviour::Normal),
        (ip(3), 23, Behaviour::Normal),
    ];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    let summary = Prober::new(fast_settings(), IDENT)
        .run(&mut t, &mut net, &mut || {})
        .unwrap();

    assert_eq!(summary.discarded, 0);
    for (rec, &(_, hops, _)) in t.records().iter().zip(hosts.iter()) {
        assert!(!rec.invalid, "{} invalid", rec.server);
        assert!(rec.done);
        assert!(rec.hops_more_than < hops && hops <= rec.hops_less_than, "{:?}", rec);
        assert!(rec.hop_gap() <= 2 || rec.num_in >= 10);
        assert!(rec.num_in >= 1);
        assert!(rec.num_in <= rec.num_out);
    }
}

#[test]
fn bounds_move_monotonically_and_stay_ordered() {
    let hosts = [
        (ip(1), 1, Behaviour::Normal),
        (ip(2), 7, Behaviour::Normal),
        (ip(3), 30, Behaviour::Normal),
        (ip(4), 16, Behaviour::Normal),
    ];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    let mut prober = Prober::new(fast_settings(), IDENT);
    let mut prev: Vec<(u8, u8)> = t
        .records()
        .iter()
        .map(|h| (h.hops_more_than, h.hops_less_than))
        .collect();

    for _ in 0..500 {
        let undone = prober.step(&mut t, &mut net).unwrap();
        for (i, h) in t.records().iter().enumerate() {
            let true_hops = hosts[i].1;
            assert!(!h.invalid);
            assert!(h.hops_more_than <= h.hops_less_than);
            assert!(h.hops_more_than <= true_hops && true_hops <= h.hops_less_than);
            assert!(h.hops_more_than >= prev[i].0, "lower bound moved down");
            assert!(h.hops_less_than <= prev[i].1, "upper bound moved up");
            assert!(h.num_in <= h.num_out);
            prev[i] = (h.hops_more_than, h.hops_less_than);
        }
        if undone == 0 {
            break;
        }
    }
    assert!(t.records().iter().all(|h| h.done));
}

#[test]
fn sequence_is_encoded_in_ip_id_and_port() {
    let hosts = [(ip(1), 3, Behaviour::Normal), (ip(2), 5, Behaviour::Normal)];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    let settings = fast_settings();
    let base = settings.base_port;
    Prober::new(settings, IDENT).run(&mut t, &mut net, &mut || {}).unwrap();

    assert!(!net.sent.is_empty());
    for (i, p) in net.sent.iter().enumerate() {
        assert_eq!(p.seq as usize, (i + 1) % 256);
        assert_eq!(p.ip_id, IDENT.wrapping_add(p.seq as u16));
        assert_eq!(p.dst_port, base.wrapping_add(p.seq as u16));
        assert_eq!(p.src_port, IDENT);
    }
    // First probe to a fresh host uses the midpoint of [0, 30].
    assert_eq!(net.sent[0].ttl, 15);
}

#[test]
fn silent_host_is_discarded_after_retries() {
    let hosts = [(ip(1), 6, Behaviour::Normal), (ip(2), 3, Behaviour::Silent)];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    let summary = Prober::new(fast_settings(), IDENT)
        .run(&mut t, &mut net, &mut || {})
        .unwrap();

    assert!(!t.records()[0].invalid);
    assert!(t.records()[1].invalid);
    assert_eq!(summary.discarded, 1);
    let to_silent = net.sent.iter().filter(|p| p.dst == ip(2)).count();
    // Time-exceeded answers from routers do not count; three unanswered probes do.
    assert!(to_silent >= 3);
    assert!(t.records()[1].num_in == 0);
}

#[test]
fn other_unreachable_codes_discard_host() {
    let hosts = [
        (ip(1), 2, Behaviour::Normal),
        (ip(2), 2, Behaviour::Code(1)),
        (ip(3), 2, Behaviour::Code(13)),
    ];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    Prober::new(fast_settings(), IDENT).run(&mut t, &mut net, &mut || {}).unwrap();
    assert!(!t.records()[0].invalid);
    assert!(t.records()[1].invalid);
    assert!(t.records()[2].invalid);
}

#[test]
fn unreachable_on_send_discards_without_retry() {
    let hosts = [(ip(1), 2, Behaviour::Normal), (ip(2), 2, Behaviour::NoRoute)];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    Prober::new(fast_settings(), IDENT).run(&mut t, &mut net, &mut || {}).unwrap();
    assert!(t.records()[1].invalid);
    assert_eq!(t.records()[1].num_out, 1);
}

#[test]
fn host_beyond_max_ttl_is_discarded() {
    let hosts = [(ip(1), 5, Behaviour::Normal), (ip(2), 40, Behaviour::Normal)];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    Prober::new(fast_settings(), IDENT).run(&mut t, &mut net, &mut || {}).unwrap();
    assert!(!t.records()[0].invalid);
    assert!(t.records()[1].invalid);
}

#[test]
fn foreign_replies_are_ignored() {
    let hosts = [(ip(1), 4, Behaviour::Normal), (ip(2), 9, Behaviour::Normal)];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    net.noise = true;
    Prober::new(fast_settings(), IDENT).run(&mut t, &mut net, &mut || {}).unwrap();
    for (rec, &(_, hops, _)) in t.records().iter().zip(hosts.iter()) {
        assert!(!rec.invalid);
        assert!(rec.hops_more_than < hops && hops <= rec.hops_less_than);
    }
}

#[test]
fn stops_once_fewer_than_half_remain() {
    // Four reachable hosts: rounds stop when fewer than 2 are undecided.
    let hosts = [
        (ip(1), 2, Behaviour::Normal),
        (ip(2), 3, Behaviour::Normal),
        (ip(3), 4, Behaviour::Normal),
        (ip(4), 5, Behaviour::Normal),
    ];
    let mut t = table(&hosts);
    let mut net = SimNet::new(&hosts);
    let mut ticks = 0;
    let summary = Prober::new(fast_settings(), IDENT)
        .run(&mut t, &mut net, &mut || ticks += 1)
        .unwrap();
    assert_eq!(ticks, summary.rounds);
    assert!(summary.sent >= 4);
    assert!(t.records().iter().all(|h| h.done && !h.invalid));
}

#[test]
fn empty_table_is_a_no_op() {
    let mut t = HostTable::default();
    let mut net = SimNet::new(&[]);
    let summary = Prober::new(fast_settings(), IDENT).run(&mut t, &mut net, &mut || {}).unwrap();
    assert_eq!(summary, ProbeSummary::default());
    assert!(net.sent.is_empty());
}

#[test]
fn receive_timeout_tightens_on_faster_lag() {
    let mut prober = Prober::new(ProbeSettings::default(), IDENT);
    let mut net = SimNet::new(&[]);
    let mut host = HostRecord::new("http://h.example/f", "h.example", ip(1), 30);
    host.last_ttl = 15;
    host.awaiting = true;
    let sent_at = Instant::now();
    host.last_send = Some(sent_at);
    let reply = IcmpReply {
        kind: IcmpKind::Unreachable(UNREACH_PORT),
        responder: ip(1),
        quoted_dst: ip(1),
        quoted_src_port: IDENT,
        quoted_dst_port: 0,
    };

    prober
        .apply_reply(&mut host, &reply, sent_at + Duration::from_millis(40), &mut net)
        .unwrap();
    assert_eq!(prober.recv_timeout(), Duration::from_millis(20));
    assert_eq!(host.total_lag, 40);
    assert_eq!(host.hops_less_than, 15);
    assert_eq!(host.num_in, 1);

    // A slower sample leaves the timeout alone but still counts.
    host.awaiting = true;
    prober
        .apply_reply(&mut host, &reply, sent_at + Duration::from_millis(70), &mut net)
        .unwrap();
    assert_eq!(prober.recv_timeout(), Duration::from_millis(20));
    assert_eq!(host.total_lag, 110);

    // Below the noise floor: ignored for the timeout.
    prober
        .apply_reply(&mut host, &reply, sent_at + Duration::from_millis(5), &mut net)
        .unwrap();
    assert_eq!(prober.recv_timeout(), Duration::from_millis(20));
    assert_eq!(net.timeouts_set, vec![Duration::from_millis(20)]);
}
