pub mod config;
pub mod dns;
pub mod error;
pub mod icmp;
pub mod interface;
pub mod probe;
pub mod socket;
pub mod traceroute;

pub use config::Config;
pub use error::{Error, Result};
pub use traceroute::{trace_route4, trace_route4_text, HopRecord, HopStatus, TraceReport};
