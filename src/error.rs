//! Error types for netool

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid destination address: {host} has no IPv4 address")]
    NoIpv4Address { host: String },

    #[error("raw ICMP socket setup failed: {0}")]
    Socket(#[source] io::Error),

    #[error("setting TTL {ttl} failed: {source}")]
    SetTtl {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("could not build echo request: {0}")]
    Marshal(String),

    #[error("sending probe failed: {0}")]
    Send(#[source] io::Error),

    #[error("receiving reply failed: {0}")]
    Receive(#[source] io::Error),

    #[error("malformed ICMP datagram: {0}")]
    Malformed(String),

    #[error("raw ICMP tracing is not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, Error>;
