//! Linux raw ICMP socket transport.

use async_trait::async_trait;
use pnet_packet::ipv4::Ipv4Packet;
use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Instant;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use traceroute_core::{ControlMessage, Transport, TracerouteError};
use tracing::trace;

// Constants from linux headers
const SOL_RAW: i32 = 255;
const ICMP_FILTER: i32 = 1;

// ICMP types let through the socket filter
const ICMP_ECHO_REPLY: u32 = 0;
const ICMP_DEST_UNREACH: u32 = 3;
const ICMP_TIME_EXCEEDED: u32 = 11;
const ICMP_PARAMETER_PROB: u32 = 12;

/// Room for IP_PKTINFO and IP_TTL control messages.
const CONTROL_BUFFER_WORDS: usize = 16;

/// Raw `IPPROTO_ICMP` socket with per-send TTL and receive metadata.
///
/// The kernel builds the IP header on send. Received messages include the IP
/// header, which is stripped before they are handed to the caller.
pub struct RawIcmpTransport {
    fd: AsyncFd<OwnedFd>,
    read_deadline: Option<Instant>,
}

impl RawIcmpTransport {
    /// Opens the socket. Requires `CAP_NET_RAW`.
    pub fn new() -> Result<Self, TracerouteError> {
        let raw = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::IPPROTO_ICMP,
            )
        };

        if raw < 0 {
            return Err(TracerouteError::SocketCreation(io::Error::last_os_error()));
        }

        // Owned from here on, so every early return closes it.
        let owned = unsafe { OwnedFd::from_raw_fd(raw) };

        set_option(raw, libc::IPPROTO_IP, libc::IP_PKTINFO, &1i32)
            .map_err(|source| option_error("IP_PKTINFO", source))?;
        set_option(raw, libc::IPPROTO_IP, libc::IP_RECVTTL, &1i32)
            .map_err(|source| option_error("IP_RECVTTL", source))?;

        // Bits set in the filter are dropped by the kernel.
        let passed = [
            ICMP_ECHO_REPLY,
            ICMP_DEST_UNREACH,
            ICMP_TIME_EXCEEDED,
            ICMP_PARAMETER_PROB,
        ];
        let filter: u32 = !passed.iter().fold(0u32, |mask, t| mask | (1u32 << t));
        set_option(raw, SOL_RAW, ICMP_FILTER, &filter)
            .map_err(|source| option_error("ICMP_FILTER", source))?;

        let fd = AsyncFd::with_interest(owned, Interest::READABLE | Interest::WRITABLE)
            .map_err(TracerouteError::SocketCreation)?;

        Ok(Self {
            fd,
            read_deadline: None,
        })
    }

    async fn read_message(
        &self,
        buf: &mut [u8],
    ) -> Result<(usize, ControlMessage), TracerouteError> {
        loop {
            let mut guard = self
                .fd
                .readable()
                .await
                .map_err(TracerouteError::ReadFailed)?;

            match guard.try_io(|inner| recv_with_control(inner.as_raw_fd(), &mut *buf)) {
                Ok(result) => return result.map_err(TracerouteError::ReadFailed),
                Err(_would_block) => continue,
            }
        }
    }
}

#[async_trait]
impl Transport for RawIcmpTransport {
    fn set_hop_limit(&mut self, ttl: u8) -> Result<(), TracerouteError> {
        set_option(
            self.fd.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_TTL,
            &i32::from(ttl),
        )
        .map_err(|source| TracerouteError::SetHopLimit { ttl, source })
    }

    async fn send(&mut self, buf: &[u8], destination: IpAddr) -> Result<(), TracerouteError> {
        let IpAddr::V4(dst) = destination else {
            return Err(TracerouteError::UnsupportedAddress(destination));
        };

        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_addr.s_addr = u32::from_ne_bytes(dst.octets());

        loop {
            let mut guard = self
                .fd
                .writable()
                .await
                .map_err(TracerouteError::WriteFailed)?;

            let sent = guard.try_io(|inner| {
                let result = unsafe {
                    libc::sendto(
                        inner.as_raw_fd(),
                        buf.as_ptr() as *const libc::c_void,
                        buf.len(),
                        0,
                        &sa as *const libc::sockaddr_in as *const libc::sockaddr,
                        mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                    )
                };
                if result < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(result as usize)
                }
            });

            match sent {
                Ok(result) => {
                    let n = result.map_err(TracerouteError::WriteFailed)?;
                    trace!(bytes = n, dst = %dst, "Sent ICMP message");
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn set_receive_deadline(&mut self, deadline: Instant) -> Result<(), TracerouteError> {
        self.read_deadline = Some(deadline);
        Ok(())
    }

    async fn receive(
        &mut self,
        buf: &mut [u8],
    ) -> Result<(usize, ControlMessage), TracerouteError> {
        let (n, control) = match self.read_deadline {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                tokio::time::timeout_at(deadline, self.read_message(buf))
                    .await
                    .map_err(|_| TracerouteError::ReadTimeout)??
            }
            None => self.read_message(buf).await?,
        };

        let n = strip_ip_header(buf, n)?;
        trace!(bytes = n, src = ?control.src, ttl = ?control.ttl, "Received ICMP message");
        Ok((n, control))
    }

    async fn close(&mut self) -> Result<(), TracerouteError> {
        // Socket is closed when dropped
        Ok(())
    }
}

fn option_error(option: &'static str, source: io::Error) -> TracerouteError {
    TracerouteError::SocketOption { option, source }
}

fn set_option<T>(fd: RawFd, level: i32, name: i32, value: &T) -> io::Result<()> {
    let result = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Reads one datagram with `recvmsg`, collecting the sender address and the
/// IP_PKTINFO / IP_TTL control messages.
fn recv_with_control(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, ControlMessage)> {
    let mut peer: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };
    // u64 words keep the control buffer aligned for cmsghdr.
    let mut control_buf = [0u64; CONTROL_BUFFER_WORDS];

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = &mut peer as *mut libc::sockaddr_in as *mut libc::c_void;
    msg.msg_namelen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = mem::size_of_val(&control_buf) as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut control = ControlMessage::default();
    if msg.msg_namelen as usize >= mem::size_of::<libc::sockaddr_in>() {
        control.src = Some(IpAddr::V4(Ipv4Addr::from(peer.sin_addr.s_addr.to_ne_bytes())));
    }

    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let header = &*cmsg;
            if header.cmsg_level == libc::IPPROTO_IP {
                let data = libc::CMSG_DATA(cmsg);
                match header.cmsg_type {
                    libc::IP_PKTINFO => {
                        let info = (data as *const libc::in_pktinfo).read_unaligned();
                        control.dst = Some(IpAddr::V4(Ipv4Addr::from(
                            info.ipi_addr.s_addr.to_ne_bytes(),
                        )));
                        control.if_index = u32::try_from(info.ipi_ifindex).ok();
                    }
                    libc::IP_TTL => {
                        let ttl = (data as *const libc::c_int).read_unaligned();
                        control.ttl = u8::try_from(ttl).ok();
                    }
                    _ => {}
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok((n as usize, control))
}

/// Moves the payload of the IPv4 datagram in `buf[..n]` to the front of `buf`
/// and returns its length.
fn strip_ip_header(buf: &mut [u8], n: usize) -> Result<usize, TracerouteError> {
    let header_len = {
        let ip = Ipv4Packet::new(&buf[..n]).ok_or(TracerouteError::PacketTooShort {
            expected: 20,
            actual: n,
        })?;
        usize::from(ip.get_header_length()) * 4
    };

    if header_len < 20 || header_len > n {
        return Err(TracerouteError::PacketParseFailed {
            layer: "IPv4",
            reason: format!("invalid header length {}", header_len),
        });
    }

    buf.copy_within(header_len..n, 0);
    Ok(n - header_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ip_header() {
        let mut buf = vec![0u8; 64];
        buf[0] = 0x45;
        buf[20..28].copy_from_slice(&[11, 0, 0xaa, 0xbb, 0, 0, 0, 0]);

        let n = strip_ip_header(&mut buf, 28).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[..4], &[11, 0, 0xaa, 0xbb]);
    }

    #[test]
    fn test_strip_ip_header_with_options() {
        let mut buf = vec![0u8; 64];
        // IHL of 6 words: 4 bytes of options
        buf[0] = 0x46;
        buf[24] = 0;
        buf[25] = 0x7f;

        let n = strip_ip_header(&mut buf, 32).unwrap();
        assert_eq!(n, 8);
        assert_eq!(buf[1], 0x7f);
    }

    #[test]
    fn test_strip_ip_header_rejects_garbage() {
        let mut short = vec![0x45u8; 10];
        assert!(matches!(
            strip_ip_header(&mut short, 10),
            Err(TracerouteError::PacketTooShort { .. })
        ));

        let mut bad_ihl = vec![0u8; 40];
        bad_ihl[0] = 0x42;
        assert!(matches!(
            strip_ip_header(&mut bad_ihl, 40),
            Err(TracerouteError::PacketParseFailed { .. })
        ));

        let mut overlong = vec![0u8; 40];
        overlong[0] = 0x4f;
        assert!(strip_ip_header(&mut overlong, 40).is_err());
    }
}
