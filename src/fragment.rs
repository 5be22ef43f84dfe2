//! IPv4 fragmentation.
//!
//! Splits one IPv4/TCP datagram into two IP fragments at a caller-chosen byte offset within the
//! IP payload, so that a ClientHello's SNI lands on both sides of the split. Both fragments are
//! freshly built owned buffers; the caller sends each independently via [`crate::rawsocket`].

use crate::error::FragmentError;
use crate::packet::ipv4::{header_checksum, Ipv4Header, Ipv4View, IPV4_FRAG_OFFSET_MASK, IPV4_MF};

/// A pair of IPv4 fragments produced by [`split`].
pub struct Fragments {
    pub first: Vec<u8>,
    pub second: Vec<u8>,
}

/// Splits `packet` into two IP fragments at `offset` bytes into the IP payload.
///
/// `offset` must be a positive multiple of 8 and strictly less than the IP payload length;
/// violating either precondition returns a [`FragmentError`] and the caller should fall back to
/// accepting the original packet unchanged.
pub fn split(packet: &Ipv4View<'_>, offset: usize) -> Result<Fragments, FragmentError> {
    if offset == 0 || offset % 8 != 0 {
        return Err(FragmentError::Unaligned(offset));
    }
    // Fragmenting an already-fragmented datagram is out of scope (see design notes); reject it
    // here rather than produce a three-way split with confusing offset bookkeeping.
    if packet.mf() || packet.fragment_offset() != 0 {
        return Err(FragmentError::AlreadyFragmented);
    }
    let payload = packet.payload();
    if offset >= payload.len() {
        return Err(FragmentError::OutOfRange {
            offset,
            payload_len: payload.len(),
        });
    }

    let header_len = packet.header_len();
    let header = packet.header_bytes();
    let original_flags_offset = packet.flags_to_fragment_offset();
    let original_fragment_offset = original_flags_offset & IPV4_FRAG_OFFSET_MASK;
    let original_mf = packet.mf();

    let first = build_fragment(
        header,
        header_len,
        &payload[..offset],
        original_fragment_offset,
        true,
    );
    let second = build_fragment(
        header,
        header_len,
        &payload[offset..],
        original_fragment_offset + (offset as u16 / 8),
        original_mf,
    );

    Ok(Fragments { first, second })
}

fn build_fragment(
    header: &[u8],
    header_len: usize,
    payload: &[u8],
    fragment_offset: u16,
    mf: bool,
) -> Vec<u8> {
    let mut buf = vec![0u8; header_len + payload.len()];
    buf[..header_len].copy_from_slice(header);
    buf[header_len..].copy_from_slice(payload);

    let mut hdr = Ipv4Header::parse(header).expect("header was sliced from an already-parsed Ipv4View");

    hdr.total_length = (buf.len() as u16).into();
    let mut flags_offset = fragment_offset & IPV4_FRAG_OFFSET_MASK;
    if mf {
        flags_offset |= IPV4_MF;
    }
    hdr.flags_to_fragment_offset = flags_offset.into();

    hdr.header_checksum = 0u16.into();
    hdr.write_into(&mut buf[..header_len]);
    hdr.header_checksum = header_checksum(&buf[..header_len]).into();
    hdr.write_into(&mut buf[..header_len]);

    buf
}
