//! Raw IPv4 ICMP channel with per-packet ancillary metadata.
//!
//! Replies are read with `recvmsg()` so the kernel can attach the inbound
//! interface index, the local destination address (IP_PKTINFO) and the
//! reply's TTL (IP_RECVTTL) to every datagram.

use socket2::{SockAddr, Socket};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// A datagram read from the channel plus whatever metadata the kernel surfaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Received {
    pub len: usize,
    /// Peer address from the socket layer
    pub peer: Option<Ipv4Addr>,
    /// Local address the datagram was delivered to
    pub local: Option<Ipv4Addr>,
    pub interface_index: Option<u32>,
    pub ttl: Option<u8>,
}

/// How a failed `recvmsg()` is handled.
#[derive(Debug)]
pub enum RecvFailure {
    /// The receive deadline passed
    Timeout,
    /// A signal interrupted the wait; retry within the remaining time
    Interrupted,
    Fatal(io::Error),
}

pub fn classify_recv_error(err: io::Error) -> RecvFailure {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RecvFailure::Timeout,
        io::ErrorKind::Interrupted => RecvFailure::Interrupted,
        _ => RecvFailure::Fatal(err),
    }
}

/// Time left before `deadline`, `None` once it has passed.
pub fn remaining_until(deadline: Instant, now: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(now)
        .filter(|left| !left.is_zero())
}

#[derive(Debug)]
pub struct IcmpChannel {
    socket: Socket,
    timeout: Duration,
}

impl IcmpChannel {
    /// Open a raw ICMP socket on the wildcard address with a receive deadline of `timeout`.
    #[cfg(target_os = "linux")]
    pub fn open(timeout: Duration) -> Result<Self> {
        use socket2::{Domain, Protocol, Type};

        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(Error::Socket)?;

        socket.set_nonblocking(false).map_err(Error::Socket)?;
        socket.set_read_timeout(Some(timeout)).map_err(Error::Socket)?;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
            .map_err(Error::Socket)?;

        enable_option(&socket, libc::IP_PKTINFO).map_err(Error::Socket)?;
        enable_option(&socket, libc::IP_RECVTTL).map_err(Error::Socket)?;

        tracing::debug!(?timeout, "opened raw ICMP channel");
        Ok(IcmpChannel { socket, timeout })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(_timeout: Duration) -> Result<Self> {
        Err(Error::Unsupported)
    }

    /// TTL for the next outbound packet.
    pub fn set_ttl(&self, ttl: u8) -> Result<()> {
        self.socket
            .set_ttl(u32::from(ttl))
            .map_err(|source| Error::SetTtl { ttl, source })
    }

    pub fn send_to(&self, packet: &[u8], target: Ipv4Addr) -> Result<()> {
        self.socket
            .send_to(packet, &SockAddr::from(SocketAddrV4::new(target, 0)))
            .map(|_| ())
            .map_err(Error::Send)
    }

    /// Block until a datagram arrives. `Ok(None)` means the receive deadline passed.
    ///
    /// The deadline covers the whole call, including waits resumed after a signal.
    #[cfg(target_os = "linux")]
    pub fn recv(&self, buffer: &mut [u8]) -> Result<Option<Received>> {
        let deadline = Instant::now() + self.timeout;
        let mut wait = self.timeout;
        loop {
            self.socket
                .set_read_timeout(Some(wait))
                .map_err(Error::Receive)?;
            let err = match recv_with_pktinfo(&self.socket, buffer) {
                Ok(received) => return Ok(Some(received)),
                Err(err) => err,
            };
            match classify_recv_error(err) {
                RecvFailure::Timeout => return Ok(None),
                RecvFailure::Interrupted => match remaining_until(deadline, Instant::now()) {
                    Some(left) => wait = left,
                    None => return Ok(None),
                },
                RecvFailure::Fatal(err) => return Err(Error::Receive(err)),
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn recv(&self, _buffer: &mut [u8]) -> Result<Option<Received>> {
        let _ = self.timeout;
        Err(Error::Unsupported)
    }
}

#[cfg(target_os = "linux")]
fn enable_option(socket: &Socket, optname: libc::c_int) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let val: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            optname,
            &val as *const _ as *const libc::c_void,
            std::mem::size_of_val(&val) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn recv_with_pktinfo(socket: &Socket, buffer: &mut [u8]) -> io::Result<Received> {
    use std::os::unix::io::AsRawFd;

    let mut iov = libc::iovec {
        iov_base: buffer.as_mut_ptr() as *mut libc::c_void,
        iov_len: buffer.len(),
    };

    // u64 backing keeps the control buffer aligned for cmsghdr
    let mut cmsg_buf = [0u64; 16];
    let mut peer: libc::sockaddr_in = unsafe { std::mem::zeroed() };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = &mut peer as *mut _ as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = std::mem::size_of_val(&cmsg_buf) as _;

    let len = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
    if len < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut received = Received {
        len: len as usize,
        ..Received::default()
    };
    if peer.sin_family as libc::c_int == libc::AF_INET {
        received.peer = Some(Ipv4Addr::from(u32::from_be(peer.sin_addr.s_addr)));
    }

    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::IPPROTO_IP {
                let data = libc::CMSG_DATA(cmsg);
                match hdr.cmsg_type {
                    libc::IP_PKTINFO => {
                        let info = std::ptr::read_unaligned(data as *const libc::in_pktinfo);
                        received.interface_index = Some(info.ipi_ifindex as u32);
                        let local = u32::from_be(info.ipi_addr.s_addr);
                        received.local = Some(Ipv4Addr::from(local));
                    }
                    libc::IP_TTL => {
                        let ttl = std::ptr::read_unaligned(data as *const libc::c_int);
                        received.ttl = Some(ttl as u8);
                    }
                    _ => {}
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok(received)
}
