use std::io;
use std::net::{IpAddr, Ipv4Addr};

use dns_lookup::{lookup_addr, lookup_host};

use crate::error::{Error, Result};

/// Forward and reverse name resolution.
pub trait Resolver {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>>;

    /// Names for `addr`, most preferred first.
    fn lookup_addr(&self, addr: IpAddr) -> io::Result<Vec<String>>;
}

/// Resolver backed by the system's getaddrinfo/getnameinfo.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        lookup_host(host)
    }

    fn lookup_addr(&self, addr: IpAddr) -> io::Result<Vec<String>> {
        let name = lookup_addr(&addr)?;
        // getnameinfo hands back the numeric form when no PTR record exists
        if name.parse::<IpAddr>().is_ok() {
            return Ok(Vec::new());
        }
        Ok(vec![name])
    }
}

/// Resolve `target` and pick the first IPv4 candidate.
pub fn resolve_ipv4<R: Resolver + ?Sized>(resolver: &R, target: &str) -> Result<Ipv4Addr> {
    let candidates = resolver
        .lookup_host(target)
        .map_err(|source| Error::Resolve {
            host: target.to_owned(),
            source,
        })?;

    candidates
        .into_iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::NoIpv4Address {
            host: target.to_owned(),
        })
}

/// Reverse lookup that degrades to "no names" on failure.
pub fn names_for<R: Resolver + ?Sized>(resolver: &R, addr: Ipv4Addr) -> Vec<String> {
    match resolver.lookup_addr(IpAddr::V4(addr)) {
        Ok(names) => names,
        Err(err) => {
            tracing::debug!(%addr, error = %err, "reverse lookup failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<IpAddr>);

    impl Resolver for Fixed {
        fn lookup_host(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            Ok(self.0.clone())
        }

        fn lookup_addr(&self, _addr: IpAddr) -> io::Result<Vec<String>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no PTR"))
        }
    }

    struct Failing;

    impl Resolver for Failing {
        fn lookup_host(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            Err(io::Error::new(io::ErrorKind::Other, "NXDOMAIN"))
        }

        fn lookup_addr(&self, _addr: IpAddr) -> io::Result<Vec<String>> {
            Ok(vec!["never".to_string()])
        }
    }

    #[test]
    fn test_first_ipv4_wins() {
        let resolver = Fixed(vec![
            "2001:db8::1".parse().unwrap(),
            "192.0.2.7".parse().unwrap(),
            "192.0.2.8".parse().unwrap(),
        ]);
        let addr = resolve_ipv4(&resolver, "example.test").unwrap();
        assert_eq!(addr, Ipv4Addr::new(192, 0, 2, 7));
    }

    #[test]
    fn test_ipv6_only_is_invalid_destination() {
        let resolver = Fixed(vec!["2001:db8::1".parse().unwrap()]);
        let err = resolve_ipv4(&resolver, "v6.test").unwrap_err();
        assert!(matches!(err, Error::NoIpv4Address { ref host } if host == "v6.test"));
    }

    #[test]
    fn test_resolution_failure_propagates() {
        let err = resolve_ipv4(&Failing, "nowhere.test").unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }

    #[test]
    fn test_reverse_failure_yields_no_names() {
        let resolver = Fixed(Vec::new());
        assert!(names_for(&resolver, Ipv4Addr::new(10, 0, 0, 1)).is_empty());
    }
}
