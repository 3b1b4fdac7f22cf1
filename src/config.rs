use std::time::Duration;

/// Hop budget: a trace never probes beyond this TTL.
pub const MAX_TTL: u8 = 64;
/// Receive deadline for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
/// Payload carried by every Echo Request.
pub const PROBE_PAYLOAD: &[u8] = b"netcheck";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// ICMP echo identifier, fixed for the whole trace.
    pub identifier: u16,
    pub max_hops: u8,
    pub timeout: Duration,
    pub payload: Vec<u8>,
}

impl Config {
    pub fn new(identifier: u16) -> Self {
        Config {
            identifier,
            max_hops: MAX_TTL,
            timeout: PROBE_TIMEOUT,
            payload: PROBE_PAYLOAD.to_vec(),
        }
    }

    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Config {
    /// Identifier derived from the process id, as ping does.
    fn default() -> Self {
        Config::new((std::process::id() & 0xffff) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(0x1234);
        assert_eq!(config.identifier, 0x1234);
        assert_eq!(config.max_hops, 64);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.payload, b"netcheck".to_vec());
    }

    #[test]
    fn test_default_identifier_is_process_derived() {
        let config = Config::default();
        assert_eq!(config.identifier, (std::process::id() & 0xffff) as u16);
    }

    #[test]
    fn test_builders() {
        let config = Config::new(1)
            .with_max_hops(8)
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.max_hops, 8);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }
}
