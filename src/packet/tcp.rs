//! TCP header view.
//!
//! Only the fixed 20-byte header is modeled; this program never needs to read or rewrite TCP
//! options, only to find where the TCP payload starts and where the segment is headed.

use crate::error::PacketParseError;
use crate::utils::types::{u16be, u32be};

/// Fixed portion of a TCP header (options, if any, follow and are treated as opaque bytes of
/// the header).
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub(crate) struct TcpHeader {
    pub src_port: u16be,
    pub dst_port: u16be,
    pub seq_no: u32be,
    pub ack_no: u32be,
    pub data_offset_reserved_flags: u16be,
    pub window: u16be,
    pub checksum: u16be,
    pub urgent_pointer: u16be,
}

impl TcpHeader {
    fn parse(buf: &[u8]) -> Result<Self, PacketParseError> {
        if buf.len() < std::mem::size_of::<TcpHeader>() {
            return Err(PacketParseError::ShortHeader);
        }
        // SAFETY: length checked above; every field is copied out by value.
        Ok(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const TcpHeader) })
    }
}

/// A parsed view over a TCP segment, borrowed from the IP payload.
#[derive(Debug)]
pub struct TcpView<'a> {
    header: TcpHeader,
    buf: &'a [u8],
}

impl<'a> TcpView<'a> {
    /// Parses the fixed header at the start of `buf`.
    ///
    /// Fails if `buf` is too short to contain a fixed header, or if the data offset claims a
    /// header longer than `buf`.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketParseError> {
        let header = TcpHeader::parse(buf)?;
        let view = TcpView { header, buf };
        if view.header_len() > buf.len() {
            return Err(PacketParseError::InvalidIhl(view.header_len(), buf.len()));
        }
        Ok(view)
    }

    #[inline]
    fn data_offset_reserved_flags(&self) -> u16 {
        self.header.data_offset_reserved_flags.into()
    }

    /// Header length in bytes (data offset field counts 32-bit words, top 4 bits of the field).
    #[inline]
    pub fn header_len(&self) -> usize {
        ((self.data_offset_reserved_flags() >> 12) as usize) * 4
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.header.dst_port.into()
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.header.src_port.into()
    }

    /// Everything after the TCP header: the segment payload (e.g. a TLS record).
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[self.header_len()..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_segment(dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        buf[2..4].copy_from_slice(&dst_port.to_be_bytes());
        buf[12] = 0x50; // data offset 5 (20 bytes), no flags
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parses_header_and_finds_payload() {
        let buf = sample_segment(443, &[0x16, 0x03, 0x01]);
        let view = TcpView::parse(&buf).unwrap();
        assert_eq!(view.header_len(), 20);
        assert_eq!(view.dst_port(), 443);
        assert_eq!(view.payload(), &[0x16, 0x03, 0x01]);
    }

    #[test]
    fn rejects_short_buffer() {
        let buf = [0u8; 10];
        assert!(matches!(
            TcpView::parse(&buf),
            Err(PacketParseError::ShortHeader)
        ));
    }

    #[test]
    fn rejects_data_offset_past_end_of_buffer() {
        let mut buf = sample_segment(443, &[]);
        buf[12] = 0x60; // data offset 6 = 24 bytes, buf is only 20
        assert!(matches!(
            TcpView::parse(&buf),
            Err(PacketParseError::InvalidIhl(24, 20))
        ));
    }
}
