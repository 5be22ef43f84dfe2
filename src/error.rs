//! Typed error taxonomies.
//!
//! Each fallible subsystem gets its own small `thiserror` enum, and callers that only care about
//! "did this succeed" convert to [`anyhow::Error`] at the boundary with `?`.

use thiserror::Error;

use crate::reader::ReadError;

/// Failures parsing the fixed IPv4/TCP headers out of a packet buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketParseError {
    #[error("buffer too short to contain a full header")]
    ShortHeader,
    #[error("IP header length (ihl*4 = {0}) exceeds total packet length ({1})")]
    InvalidIhl(usize, usize),
    #[error("IP protocol {0} is not TCP")]
    NotTcp(u8),
}

/// Fragmenter precondition failures (§4.3). All are non-fatal: the caller falls back to
/// accepting the original, unfragmented packet.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    #[error("split offset {0} is not a multiple of 8")]
    Unaligned(usize),
    #[error("split offset {offset} is not strictly less than the IP payload length {payload_len}")]
    OutOfRange { offset: usize, payload_len: usize },
    #[error("input packet is already a fragment (offset or MF bit set); refusing to fragment it further")]
    AlreadyFragmented,
}

/// Netlink/NFQUEUE wire-protocol decode failures.
#[derive(Error, Debug)]
pub enum NetlinkError {
    #[error("malformed netlink message: {0}")]
    Malformed(#[from] ReadError),
    #[error("packet message is missing the {0} attribute")]
    MissingAttribute(&'static str),
    #[error("netlink socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw-socket injection failures (§4.4). Logged and swallowed by the caller; TCP retransmission
/// covers the lost fragment.
#[derive(Error, Debug)]
pub enum RawSocketError {
    #[error("raw socket setup failed: {0}")]
    Setup(std::io::Error),
    #[error("raw socket send failed: {0}")]
    Send(std::io::Error),
    #[error("packet too short to contain an IPv4 header, cannot determine destination")]
    NoIpHeader,
    #[error("packet carries neither a TCP nor a UDP header, cannot determine destination port")]
    NoTransportHeader,
}
