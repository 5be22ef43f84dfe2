//! Generic netlink message framing: `nlmsghdr`, `nfgenmsg`, and the `nlattr` TLV list that both
//! carry. This is deliberately generic over the nfqueue-specific attribute numbers in
//! [`crate::netlink::nfqueue`] — it only knows how to wrap/unwrap the envelope.

use crate::error::NetlinkError;
use crate::reader::Cursor;

pub const NLA_ALIGNTO: usize = 4;
pub const NLMSG_HDRLEN: usize = 16;
const NLATTR_HDRLEN: usize = 4;

pub const NLM_F_REQUEST: u16 = 0x1;
pub const NLM_F_ACK: u16 = 0x4;

/// Rounds `len` up to the next multiple of [`NLA_ALIGNTO`], matching the kernel's `NLA_ALIGN`.
#[inline]
pub fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Incrementally builds one outbound netlink message: a 16-byte `nlmsghdr`, a 4-byte
/// `nfgenmsg`, and a sequence of TLV attributes, finishing with `nlmsg_len` patched in.
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Starts a message of the given netlink type (`(subsys << 8) | msg_type`) and flags, with
    /// an nfnetlink generic header for the given protocol family and queue (res_id, big-endian).
    pub fn new(nlmsg_type: u16, nlmsg_flags: u16, family: u8, res_id: u16) -> Self {
        let mut buf = vec![0u8; NLMSG_HDRLEN];
        buf[4..6].copy_from_slice(&nlmsg_type.to_ne_bytes());
        buf[6..8].copy_from_slice(&nlmsg_flags.to_ne_bytes());
        // nlmsg_seq and nlmsg_pid are left 0: this program never multiplexes several
        // outstanding requests, so sequence numbers carry no information the kernel needs.

        buf.push(family);
        buf.push(0); // version
        buf.extend_from_slice(&res_id.to_be_bytes());

        MessageBuilder { buf }
    }

    /// Appends a TLV attribute with a raw byte value, padding to 4-byte alignment.
    pub fn push_attr(&mut self, attr_type: u16, value: &[u8]) -> &mut Self {
        let nla_len = (NLATTR_HDRLEN + value.len()) as u16;
        self.buf.extend_from_slice(&nla_len.to_ne_bytes());
        self.buf.extend_from_slice(&attr_type.to_ne_bytes());
        self.buf.extend_from_slice(value);
        let padded = nla_align(value.len());
        self.buf.resize(self.buf.len() + (padded - value.len()), 0);
        self
    }

    pub fn push_attr_u8(&mut self, attr_type: u16, value: u8) -> &mut Self {
        self.push_attr(attr_type, &[value])
    }

    pub fn push_attr_u32_be(&mut self, attr_type: u16, value: u32) -> &mut Self {
        self.push_attr(attr_type, &value.to_be_bytes())
    }

    /// Finishes the message: patches `nlmsg_len` and returns the owned buffer.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}

/// One inbound netlink message, parsed down to its nfnetlink header and the raw bytes of its
/// attribute TLV list (not yet decoded into individual attributes).
pub struct ParsedMessage<'a> {
    pub nlmsg_type: u16,
    pub family: u8,
    pub res_id: u16,
    pub attrs: &'a [u8],
}

/// Parses the netlink + nfnetlink envelope off the front of `buf`, returning the envelope
/// fields and a slice over the remaining attribute bytes. `buf` is expected to hold exactly one
/// message (the receive loop reads one datagram per `recvfrom`, matching NFQUEUE's framing).
pub fn parse_envelope(buf: &[u8]) -> Result<ParsedMessage<'_>, NetlinkError> {
    let mut cursor = Cursor::new(buf);
    let nlmsg_len = cursor.read_u32_ne()?;
    let nlmsg_type = cursor.read_u16_ne()?;
    let _nlmsg_flags = cursor.read_u16_ne()?;
    let _nlmsg_seq = cursor.read_u32_ne()?;
    let _nlmsg_pid = cursor.read_u32_ne()?;

    let family = cursor.read_u8()?;
    let _version = cursor.read_u8()?;
    let res_id = cursor.read_u16_be()?;

    let body_end = (nlmsg_len as usize).min(buf.len());
    if body_end < cursor.position() {
        return Err(NetlinkError::MissingAttribute("nfgenmsg"));
    }
    let attrs = &buf[cursor.position()..body_end];

    Ok(ParsedMessage {
        nlmsg_type,
        family,
        res_id,
        attrs,
    })
}

/// Walks the TLV attribute list in `buf`, calling `f` with each attribute's type and value.
/// Unknown attribute types are passed through to `f`, which is expected to ignore the ones it
/// doesn't care about (mirroring the "tolerate unknown attributes" requirement).
pub fn for_each_attr<'a>(
    buf: &'a [u8],
    mut f: impl FnMut(u16, &'a [u8]),
) -> Result<(), NetlinkError> {
    let mut cursor = Cursor::new(buf);
    while !cursor.is_empty() {
        if cursor.remaining() < NLATTR_HDRLEN {
            break;
        }
        let nla_len = cursor.read_u16_ne()? as usize;
        let attr_type = cursor.read_u16_ne()?;
        if nla_len < NLATTR_HDRLEN {
            return Err(NetlinkError::MissingAttribute("nlattr too short"));
        }
        let value_len = nla_len - NLATTR_HDRLEN;
        let value = cursor.read_bytes(value_len)?;
        f(attr_type, value);

        let padded = nla_align(nla_len);
        let skip = padded - nla_len;
        if skip > 0 {
            // Trailing alignment padding may be truncated on the very last attribute; don't
            // treat that as an error.
            let _ = cursor.advance(skip.min(cursor.remaining()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_reparses_round_trip() {
        let mut builder = MessageBuilder::new(0x0203, NLM_F_REQUEST, 2, 7);
        builder.push_attr_u8(1, 9);
        builder.push_attr_u32_be(3, 0xdead_beef);
        let msg = builder.finish();

        let parsed = parse_envelope(&msg).unwrap();
        assert_eq!(parsed.nlmsg_type, 0x0203);
        assert_eq!(parsed.family, 2);
        assert_eq!(parsed.res_id, 7);

        let mut seen = Vec::new();
        for_each_attr(parsed.attrs, |t, v| seen.push((t, v.to_vec()))).unwrap();
        assert_eq!(seen[0], (1u16, vec![9u8]));
        assert_eq!(seen[1], (3u16, 0xdead_beef_u32.to_be_bytes().to_vec()));
    }

    #[test]
    fn attribute_walk_tolerates_unknown_types() {
        let mut builder = MessageBuilder::new(0, 0, 2, 0);
        builder.push_attr(99, b"unknown");
        builder.push_attr_u8(1, 5);
        let msg = builder.finish();
        let parsed = parse_envelope(&msg).unwrap();

        let mut seen = Vec::new();
        for_each_attr(parsed.attrs, |t, v| seen.push((t, v.to_vec()))).unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (1u16, vec![5u8]));
    }

    #[test]
    fn never_panics_on_truncated_attrs() {
        for cut in 0..20 {
            let mut builder = MessageBuilder::new(0, 0, 2, 0);
            builder.push_attr_u32_be(1, 0x1234);
            let msg = builder.finish();
            if cut > msg.len() {
                continue;
            }
            let _ = parse_envelope(&msg[..cut]);
        }
    }
}
