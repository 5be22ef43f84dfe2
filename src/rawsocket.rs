//! Raw-socket re-injection of fragmented packets.
//!
//! One `SOCK_RAW` IPv4 socket, created once at startup, with `IP_HDRINCL` so the caller supplies
//! the full IP header, and `SO_MARK` set to [`crate::config::RAW_SOCKET_MARK`] so the firewall
//! rule that feeds the queue can exclude re-injected packets and avoid an infinite loop.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::RAW_SOCKET_MARK;
use crate::error::RawSocketError;
use crate::packet::ipv4::Ipv4View;
use crate::packet::tcp::TcpView;

/// An IPv4 raw socket configured for sending pre-built datagrams.
pub struct RawInjector {
    socket: Socket,
}

impl RawInjector {
    /// Opens and configures the raw socket. Fails if the process lacks `CAP_NET_RAW` or the
    /// kernel otherwise refuses the socket or its options.
    pub fn new() -> Result<Self, RawSocketError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc::IPPROTO_RAW)))
            .map_err(RawSocketError::Setup)?;
        socket.set_header_included(true).map_err(RawSocketError::Setup)?;
        socket.set_mark(RAW_SOCKET_MARK).map_err(RawSocketError::Setup)?;
        Ok(RawInjector { socket })
    }

    /// Sends one fully-formed IPv4 datagram (header and all). The destination is read back out
    /// of the datagram's own IP header; the kernel routes on it since `IP_HDRINCL` is set.
    pub fn send(&self, datagram: &[u8]) -> Result<(), RawSocketError> {
        let dst = destination_addr(datagram)?;
        let addr: SocketAddr = SocketAddr::V4(SocketAddrV4::new(dst, 0));
        self.socket
            .send_to(datagram, &addr.into())
            .map_err(RawSocketError::Send)?;
        Ok(())
    }
}

fn destination_addr(datagram: &[u8]) -> Result<Ipv4Addr, RawSocketError> {
    let view = Ipv4View::parse(datagram).map_err(|_| RawSocketError::NoIpHeader)?;
    Ok(view.dst_addr())
}

/// Destination port of a TCP fragment's first segment, if the fragment is large enough to carry
/// one. Only the first fragment of a split datagram has a TCP header; callers that need this
/// (e.g. for logging) should call it on that fragment specifically.
#[allow(dead_code)]
pub fn destination_port(datagram: &[u8]) -> Result<u16, RawSocketError> {
    let view = Ipv4View::parse(datagram).map_err(|_| RawSocketError::NoIpHeader)?;
    let tcp = TcpView::parse(view.payload()).map_err(|_| RawSocketError::NoTransportHeader)?;
    Ok(tcp.dst_port())
}
