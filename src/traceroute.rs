use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::Config;
use crate::dns::{names_for, resolve_ipv4, Resolver, SystemResolver};
use crate::error::Result;
use crate::interface::{InterfaceLookup, SystemInterfaces};
use crate::probe::{IcmpProber, ProbeResult, Prober, Response};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HopStatus {
    /// A router on the way answered with Time Exceeded
    Intermediate,
    /// The target answered with Echo Reply
    Reached,
    /// A non-loopback host answered with Destination Unreachable
    Unreachable,
}

impl HopStatus {
    fn marker(self) -> &'static str {
        match self {
            HopStatus::Reached => "[+]",
            HopStatus::Intermediate | HopStatus::Unreachable => "[-]",
        }
    }
}

/// One line of a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HopRecord {
    pub ttl: u8,
    pub status: HopStatus,
    /// Name of the local interface the reply came in on, if it could be looked up
    pub interface: Option<String>,
    /// The hop that answered
    pub source: Ipv4Addr,
    /// Local address the answer was delivered to
    pub destination: Option<Ipv4Addr>,
    /// Reverse-DNS names of `source`
    pub names: Vec<String>,
    pub reply_ttl: Option<u8>,
    pub rtt: Duration,
}

impl fmt::Display for HopRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\t{}", self.status.marker())?;
        if let Some(interface) = &self.interface {
            write!(f, " Interface: {}", interface)?;
        }
        write!(f, " Src: {}", self.source)?;
        match self.destination {
            Some(destination) => write!(f, " Dst: {}", destination)?,
            None => write!(f, " Dst: *")?,
        }
        if !self.names.is_empty() {
            write!(f, " [{}]", self.names.join(", "))?;
        }
        write!(f, " RTT: {:.3?}", self.rtt)?;
        if self.status == HopStatus::Unreachable {
            write!(f, " (destination unreachable)")?;
        }
        Ok(())
    }
}

/// Hops collected for one trace, ascending by TTL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceReport {
    pub target: Ipv4Addr,
    pub hops: Vec<HopRecord>,
}

impl TraceReport {
    pub fn new(target: Ipv4Addr) -> Self {
        TraceReport {
            target,
            hops: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Whether the target itself answered.
    pub fn reached(&self) -> bool {
        self.hops.iter().any(|hop| hop.status == HopStatus::Reached)
    }
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hop in &self.hops {
            writeln!(f, "{}", hop)?;
        }
        Ok(())
    }
}

fn hop_record<R, I>(
    ttl: u8,
    status: HopStatus,
    response: Response,
    resolver: Option<&R>,
    interfaces: &I,
) -> HopRecord
where
    R: Resolver + ?Sized,
    I: InterfaceLookup + ?Sized,
{
    let interface = response.interface_index.and_then(|index| {
        let found = interfaces.by_index(index);
        if found.is_none() {
            tracing::debug!(index, "no interface with this index");
        }
        found.map(|info| info.name)
    });
    let names = resolver
        .map(|resolver| names_for(resolver, response.responder))
        .unwrap_or_default();

    HopRecord {
        ttl,
        status,
        interface,
        source: response.responder,
        destination: response.local,
        names,
        reply_ttl: response.reply_ttl,
        rtt: response.rtt,
    }
}

/// Drive `prober` from TTL 1 up to the hop budget towards `target`.
///
/// Stops early on an Echo Reply or a non-loopback Destination Unreachable.
/// Running out of hops is not an error: whatever was collected is returned.
pub fn trace_route<P, R, I>(
    config: &Config,
    target: Ipv4Addr,
    prober: &mut P,
    resolver: &R,
    interfaces: &I,
) -> Result<TraceReport>
where
    P: Prober + ?Sized,
    R: Resolver + ?Sized,
    I: InterfaceLookup + ?Sized,
{
    let mut report = TraceReport::new(target);

    for ttl in 1..=config.max_hops {
        match prober.probe(target, ttl, u16::from(ttl))? {
            ProbeResult::Timeout => continue,
            ProbeResult::TimeExceeded(response) => {
                let hop = hop_record(
                    ttl,
                    HopStatus::Intermediate,
                    response,
                    Some(resolver),
                    interfaces,
                );
                report.hops.push(hop);
            }
            ProbeResult::EchoReply(response) => {
                let hop = hop_record(
                    ttl,
                    HopStatus::Reached,
                    response,
                    Some(resolver),
                    interfaces,
                );
                report.hops.push(hop);
                tracing::info!(%target, hops = ttl, "destination reached");
                return Ok(report);
            }
            ProbeResult::DestinationUnreachable(response) => {
                if response.responder == Ipv4Addr::LOCALHOST {
                    tracing::trace!(ttl, "ignoring unreachable from loopback");
                    continue;
                }
                let hop = hop_record(
                    ttl,
                    HopStatus::Unreachable,
                    response,
                    None::<&R>,
                    interfaces,
                );
                report.hops.push(hop);
                tracing::info!(%target, hops = ttl, "destination unreachable");
                return Ok(report);
            }
            ProbeResult::Unrecognized { icmp_type, .. } => {
                tracing::trace!(ttl, icmp_type, "ignoring ICMP message");
            }
        }
    }

    tracing::info!(%target, max_hops = config.max_hops, "hop budget exhausted");
    Ok(report)
}

/// Resolve `host`, open a prober with `open`, and trace.
///
/// The prober is dropped before returning on every path.
pub fn trace_host<P, R, I, F>(
    config: &Config,
    host: &str,
    resolver: &R,
    interfaces: &I,
    open: F,
) -> Result<TraceReport>
where
    P: Prober,
    R: Resolver + ?Sized,
    I: InterfaceLookup + ?Sized,
    F: FnOnce(&Config) -> Result<P>,
{
    let target = resolve_ipv4(resolver, host)?;
    tracing::debug!(host, %target, "tracing");

    let mut prober = open(config)?;
    trace_route(config, target, &mut prober, resolver, interfaces)
}

/// Trace the IPv4 path to `host` over a raw ICMP socket.
pub fn trace_route4(host: &str) -> Result<TraceReport> {
    trace_host(
        &Config::default(),
        host,
        &SystemResolver,
        &SystemInterfaces,
        IcmpProber::open,
    )
}

/// [`trace_route4`] rendered as text: one line per hop, a partial report on
/// an exhausted hop budget, nothing but the error on a fatal failure.
pub fn trace_route4_text(host: &str) -> Result<String> {
    trace_route4(host).map(|report| report.to_string())
}
