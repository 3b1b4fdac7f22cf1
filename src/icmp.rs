use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{checksum, IcmpCode, IcmpPacket, IcmpType, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::MutablePacket;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// ICMP header size (fixed)
pub const ICMP_HEADER_LEN: usize = 8;
/// Minimum IPv4 header size, in bytes
pub const IPV4_HEADER_LEN: usize = 20;

/// Build an ICMP Echo Request carrying `payload`, checksum included.
pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let len = ICMP_HEADER_LEN + payload.len();
    let mut buffer = vec![0u8; len];

    {
        let mut packet = MutableEchoRequestPacket::new(&mut buffer)
            .ok_or_else(|| Error::Marshal(format!("buffer of {} bytes too small", len)))?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.payload_mut().copy_from_slice(payload);
    }

    let cksum = IcmpPacket::new(&buffer)
        .map(|icmp| checksum(&icmp))
        .ok_or_else(|| Error::Marshal("echo request shorter than ICMP header".to_string()))?;
    buffer[2..4].copy_from_slice(&cksum.to_be_bytes());

    Ok(buffer)
}

/// ICMP message classes the tracer acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IcmpKind {
    EchoReply,
    TimeExceeded,
    DestinationUnreachable,
    Other(u8),
}

impl From<IcmpType> for IcmpKind {
    fn from(icmp_type: IcmpType) -> Self {
        match icmp_type {
            IcmpTypes::EchoReply => IcmpKind::EchoReply,
            IcmpTypes::TimeExceeded => IcmpKind::TimeExceeded,
            IcmpTypes::DestinationUnreachable => IcmpKind::DestinationUnreachable,
            other => IcmpKind::Other(other.0),
        }
    }
}

/// The fields of an inbound raw datagram the probe engine needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Datagram {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub ttl: u8,
    pub kind: IcmpKind,
    pub code: u8,
}

/// Decode a datagram read from a raw IPv4 ICMP socket (IP header included).
pub fn decode_datagram(buf: &[u8]) -> Result<Datagram> {
    let ip = Ipv4Packet::new(buf).ok_or_else(|| {
        Error::Malformed(format!("{} bytes is shorter than an IPv4 header", buf.len()))
    })?;

    let header_len = ip.get_header_length() as usize * 4;
    if header_len < IPV4_HEADER_LEN || header_len > buf.len() {
        return Err(Error::Malformed(format!(
            "bad IPv4 header length {}",
            header_len
        )));
    }

    let icmp = IcmpPacket::new(&buf[header_len..])
        .ok_or_else(|| Error::Malformed("truncated ICMP header".to_string()))?;

    Ok(Datagram {
        source: ip.get_source(),
        destination: ip.get_destination(),
        ttl: ip.get_ttl(),
        kind: IcmpKind::from(icmp.get_icmp_type()),
        code: icmp.get_icmp_code().0,
    })
}
