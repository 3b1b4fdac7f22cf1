use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::Result;
use crate::icmp::{build_echo_request, decode_datagram, IcmpKind};
use crate::socket::{IcmpChannel, Received};

/// Large enough for any reply on a standard Ethernet MTU.
const RECV_BUFFER_LEN: usize = 1500;

/// What the engine learned from one inbound ICMP message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// The host that answered the probe
    pub responder: Ipv4Addr,
    /// Local address the answer was delivered to
    pub local: Option<Ipv4Addr>,
    /// Kernel index of the interface the answer arrived on
    pub interface_index: Option<u32>,
    pub reply_ttl: Option<u8>,
    pub code: u8,
    pub rtt: Duration,
}

/// Outcome of a single probe. Exactly one is produced per TTL sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeResult {
    TimeExceeded(Response),
    EchoReply(Response),
    DestinationUnreachable(Response),
    Unrecognized { icmp_type: u8, response: Response },
    Timeout,
}

impl ProbeResult {
    pub fn from_kind(kind: IcmpKind, response: Response) -> Self {
        match kind {
            IcmpKind::TimeExceeded => ProbeResult::TimeExceeded(response),
            IcmpKind::EchoReply => ProbeResult::EchoReply(response),
            IcmpKind::DestinationUnreachable => ProbeResult::DestinationUnreachable(response),
            IcmpKind::Other(icmp_type) => ProbeResult::Unrecognized {
                icmp_type,
                response,
            },
        }
    }
}

/// One send/receive round trip per call; implementations never retry.
pub trait Prober {
    fn probe(&mut self, target: Ipv4Addr, ttl: u8, sequence: u16) -> Result<ProbeResult>;
}

/// ICMP Echo prober over a raw channel.
///
/// The channel lives as long as the prober; dropping it closes the socket.
#[derive(Debug)]
pub struct IcmpProber {
    channel: IcmpChannel,
    identifier: u16,
    payload: Vec<u8>,
    buffer: Vec<u8>,
}

impl IcmpProber {
    pub fn open(config: &Config) -> Result<Self> {
        Ok(IcmpProber {
            channel: IcmpChannel::open(config.timeout)?,
            identifier: config.identifier,
            payload: config.payload.clone(),
            buffer: vec![0u8; RECV_BUFFER_LEN],
        })
    }
}

impl Prober for IcmpProber {
    fn probe(&mut self, target: Ipv4Addr, ttl: u8, sequence: u16) -> Result<ProbeResult> {
        let packet = build_echo_request(self.identifier, sequence, &self.payload)?;
        self.channel.set_ttl(ttl)?;

        let begin = Instant::now();
        self.channel.send_to(&packet, target)?;
        tracing::debug!(%target, ttl, sequence, "probe sent");

        let received = match self.channel.recv(&mut self.buffer)? {
            Some(received) => received,
            None => {
                tracing::debug!(ttl, "probe timed out");
                return Ok(ProbeResult::Timeout);
            }
        };
        let rtt = begin.elapsed();

        let result = classify_reply(&received, &self.buffer[..received.len], rtt)?;
        tracing::debug!(ttl, ?result, "reply received");
        Ok(result)
    }
}

/// Turn one received datagram and its metadata into a `ProbeResult`.
///
/// Socket-layer metadata wins; the IPv4 header fills in the responder and
/// reply TTL when the kernel did not surface them.
pub fn classify_reply(
    received: &Received,
    datagram: &[u8],
    rtt: Duration,
) -> Result<ProbeResult> {
    let decoded = decode_datagram(datagram)?;
    let response = Response {
        responder: received.peer.unwrap_or(decoded.source),
        local: received.local,
        interface_index: received.interface_index,
        reply_ttl: received.ttl.or(Some(decoded.ttl)),
        code: decoded.code,
        rtt,
    };
    Ok(ProbeResult::from_kind(decoded.kind, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::icmp::{ICMP_HEADER_LEN, IPV4_HEADER_LEN};
    use pnet::packet::ip::IpNextHeaderProtocols;
    use pnet::packet::ipv4::MutableIpv4Packet;

    fn datagram(src: Ipv4Addr, ttl: u8, icmp_type: u8, code: u8) -> Vec<u8> {
        let mut buf = vec![0u8; IPV4_HEADER_LEN + ICMP_HEADER_LEN];
        {
            let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((IPV4_HEADER_LEN + ICMP_HEADER_LEN) as u16);
            ip.set_ttl(ttl);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
            ip.set_source(src);
            ip.set_destination(Ipv4Addr::new(192, 168, 1, 20));
        }
        buf[IPV4_HEADER_LEN] = icmp_type;
        buf[IPV4_HEADER_LEN + 1] = code;
        buf
    }

    fn response() -> Response {
        Response {
            responder: Ipv4Addr::new(10, 0, 0, 1),
            local: None,
            interface_index: None,
            reply_ttl: None,
            code: 0,
            rtt: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_from_kind() {
        assert!(matches!(
            ProbeResult::from_kind(IcmpKind::TimeExceeded, response()),
            ProbeResult::TimeExceeded(_)
        ));
        assert!(matches!(
            ProbeResult::from_kind(IcmpKind::EchoReply, response()),
            ProbeResult::EchoReply(_)
        ));
        assert!(matches!(
            ProbeResult::from_kind(IcmpKind::DestinationUnreachable, response()),
            ProbeResult::DestinationUnreachable(_)
        ));
        assert!(matches!(
            ProbeResult::from_kind(IcmpKind::Other(5), response()),
            ProbeResult::Unrecognized { icmp_type: 5, .. }
        ));
    }

    #[test]
    fn test_classify_reply_prefers_socket_metadata() {
        let buf = datagram(Ipv4Addr::new(10, 0, 0, 1), 250, 11, 0);
        let received = Received {
            len: buf.len(),
            peer: Some(Ipv4Addr::new(10, 0, 0, 9)),
            local: Some(Ipv4Addr::new(192, 168, 1, 20)),
            interface_index: Some(2),
            ttl: Some(61),
        };

        let result = classify_reply(&received, &buf, Duration::from_millis(7)).unwrap();
        let response = match result {
            ProbeResult::TimeExceeded(response) => response,
            other => panic!("expected TimeExceeded, got {:?}", other),
        };
        assert_eq!(response.responder, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(response.local, Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(response.interface_index, Some(2));
        assert_eq!(response.reply_ttl, Some(61));
        assert_eq!(response.rtt, Duration::from_millis(7));
    }

    #[test]
    fn test_classify_reply_falls_back_to_ip_header() {
        let buf = datagram(Ipv4Addr::new(10, 0, 0, 1), 57, 3, 3);
        let received = Received {
            len: buf.len(),
            ..Received::default()
        };

        let result = classify_reply(&received, &buf, Duration::from_millis(1)).unwrap();
        let response = match result {
            ProbeResult::DestinationUnreachable(response) => response,
            other => panic!("expected DestinationUnreachable, got {:?}", other),
        };
        assert_eq!(response.responder, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(response.reply_ttl, Some(57));
        assert_eq!(response.code, 3);
        assert_eq!(response.local, None);
        assert_eq!(response.interface_index, None);
    }

    #[test]
    fn test_classify_reply_echo_and_unknown_types() {
        let received = Received::default();
        let rtt = Duration::from_millis(1);
        let src = Ipv4Addr::new(192, 0, 2, 80);

        let echo = classify_reply(&received, &datagram(src, 64, 0, 0), rtt).unwrap();
        assert!(matches!(echo, ProbeResult::EchoReply(_)));

        let request = classify_reply(&received, &datagram(src, 64, 8, 0), rtt).unwrap();
        assert!(matches!(request, ProbeResult::Unrecognized { icmp_type: 8, .. }));
    }

    #[test]
    fn test_classify_reply_rejects_malformed() {
        let mut buf = datagram(Ipv4Addr::new(10, 0, 0, 1), 64, 11, 0);
        buf.truncate(IPV4_HEADER_LEN + 1);
        let received = Received {
            len: buf.len(),
            ..Received::default()
        };

        let result = classify_reply(&received, &buf, Duration::ZERO);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }
}
