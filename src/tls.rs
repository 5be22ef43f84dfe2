//! TLS ClientHello inspection.
//!
//! Walks a TCP payload looking for a ClientHello handshake message and, within it, a Server
//! Name Indication extension. This is the same shape of problem as [`crate::netlink::message`]
//! (bounds-checked TLV walking over an untrusted buffer), so both reuse [`crate::reader::Cursor`]
//! rather than each hand-rolling their own slicing.

use crate::config::TARGET_SNI_SUFFIX;
use crate::reader::Cursor;

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 0x01;
const EXTENSION_TYPE_SERVER_NAME: u16 = 0x0000;

/// Outcome of inspecting a TCP payload for a targeted ClientHello.
///
/// The all-`false`/zero value means "no action": either no ClientHello was found, no SNI
/// extension was present, or the SNI didn't match the target suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the SNI in this ClientHello ends with [`TARGET_SNI_SUFFIX`].
    pub targeted: bool,
    /// Byte offset of the SNI hostname, measured from the start of the TCP payload. Meaningful
    /// only when `targeted` is true.
    pub sni_offset: usize,
    /// Byte length of the SNI hostname. Meaningful only when `targeted` is true.
    pub sni_len: usize,
}

/// Inspects `payload` (a TCP segment's payload) for a targeted ClientHello.
///
/// Never panics and never returns an error: any malformed, truncated, or adversarial input
/// simply yields the zero [`Verdict`], per the inspector's silent-failure policy. The caller
/// accepts the packet unchanged in that case.
pub fn inspect(payload: &[u8]) -> Verdict {
    let mut cursor = Cursor::new(payload);

    // Walk TLS records until one is a Handshake record containing a ClientHello, or we run out
    // of bytes.
    while cursor.remaining() >= 5 {
        let content_type = match cursor.read_u8() {
            Ok(b) => b,
            Err(_) => return Verdict::default(),
        };
        // version (2B)
        if cursor.advance(2).is_err() {
            return Verdict::default();
        }
        let record_len = match cursor.read_u16_be() {
            Ok(n) => n as usize,
            Err(_) => return Verdict::default(),
        };
        if cursor.remaining() < record_len {
            return Verdict::default();
        }
        let record_body_start = cursor.position();

        if content_type != CONTENT_TYPE_HANDSHAKE {
            if cursor.advance(record_len).is_err() {
                return Verdict::default();
            }
            continue;
        }

        let mut record = Cursor::new(&payload[record_body_start..record_body_start + record_len]);
        match inspect_handshake(&mut record, record_body_start) {
            Some(verdict) => return verdict,
            None => {
                // Not a ClientHello, or the ClientHello inside this record didn't carry a
                // matching SNI. Move on to the next record.
                if cursor.advance(record_len).is_err() {
                    return Verdict::default();
                }
                continue;
            }
        }
    }

    Verdict::default()
}

/// Parses a single handshake message out of `record` (a cursor scoped to one TLS record's
/// body). `record_offset` is `record`'s absolute offset within the original payload, so SNI
/// offsets can be reported relative to the payload rather than the record.
///
/// Returns `None` if this record's handshake message isn't a ClientHello, or is a ClientHello
/// with no matching SNI — the caller then moves on to the next record. Returns `Some(verdict)`
/// as soon as a conclusive verdict is reached (matched or explicitly not matched after a full
/// extension walk).
fn inspect_handshake(record: &mut Cursor<'_>, record_offset: usize) -> Option<Verdict> {
    let handshake_type = record.read_u8().ok()?;
    let handshake_len = record.read_u24_be().ok()? as usize;
    if handshake_type != HANDSHAKE_TYPE_CLIENT_HELLO {
        return None;
    }
    if record.remaining() < handshake_len {
        return None;
    }

    // legacy_version (2B) + random (32B)
    record.advance(2).ok()?;
    record.advance(32).ok()?;

    // session_id: 1B length + body
    let session_id_len = record.read_u8().ok()? as usize;
    record.advance(session_id_len).ok()?;

    // cipher_suites: 2B length + body
    let cipher_suites_len = record.read_u16_be().ok()? as usize;
    record.advance(cipher_suites_len).ok()?;

    // compression_methods: 1B length + body
    let compression_methods_len = record.read_u8().ok()? as usize;
    record.advance(compression_methods_len).ok()?;

    if record.is_empty() {
        // No extensions block at all: conclusively not targeted.
        return Some(Verdict::default());
    }

    let extensions_len = record.read_u16_be().ok()? as usize;
    if record.remaining() < extensions_len {
        return None;
    }

    let extensions_start = record.position();
    while record.position() < extensions_start + extensions_len {
        let ext_type = record.read_u16_be().ok()?;
        let ext_len = record.read_u16_be().ok()? as usize;
        if record.remaining() < ext_len {
            return None;
        }
        let ext_body_offset = record_offset + record.position();
        let ext_body = record.read_bytes(ext_len).ok()?;

        if ext_type == EXTENSION_TYPE_SERVER_NAME {
            if let Some((name_offset, name_len)) = parse_server_name_list(ext_body) {
                let targeted = is_targeted_suffix(&ext_body[name_offset..name_offset + name_len]);
                return Some(Verdict {
                    targeted,
                    sni_offset: ext_body_offset + name_offset,
                    sni_len: name_len,
                });
            }
        }
    }

    Some(Verdict::default())
}

/// Parses a `server_name_list` extension body and returns the offset (within `body`) and
/// length of the first name entry's hostname bytes.
fn parse_server_name_list(body: &[u8]) -> Option<(usize, usize)> {
    let mut cursor = Cursor::new(body);
    let list_len = cursor.read_u16_be().ok()? as usize;
    if cursor.remaining() < list_len {
        return None;
    }
    // name_type (1B)
    cursor.advance(1).ok()?;
    let name_len = cursor.read_u16_be().ok()? as usize;
    if cursor.remaining() < name_len {
        return None;
    }
    Some((cursor.position(), name_len))
}

/// True if `name` is at least as long as, and shorter than 128 bytes, and ends with
/// [`TARGET_SNI_SUFFIX`] byte-for-byte.
fn is_targeted_suffix(name: &[u8]) -> bool {
    if name.len() < TARGET_SNI_SUFFIX.len() || name.len() >= 128 {
        return false;
    }
    name.ends_with(TARGET_SNI_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_hello_record(sni: &[u8]) -> Vec<u8> {
        let mut server_name_entry = Vec::new();
        server_name_entry.push(0x00); // name_type: host_name
        server_name_entry.extend_from_slice(&(sni.len() as u16).to_be_bytes());
        server_name_entry.extend_from_slice(sni);

        let mut server_name_list = Vec::new();
        server_name_list.extend_from_slice(&(server_name_entry.len() as u16).to_be_bytes());
        server_name_list.extend_from_slice(&server_name_entry);

        let mut sni_ext = Vec::new();
        sni_ext.extend_from_slice(&EXTENSION_TYPE_SERVER_NAME.to_be_bytes());
        sni_ext.extend_from_slice(&(server_name_list.len() as u16).to_be_bytes());
        sni_ext.extend_from_slice(&server_name_list);

        let mut handshake_body = Vec::new();
        handshake_body.extend_from_slice(&[0x03, 0x03]); // legacy_version
        handshake_body.extend_from_slice(&[0u8; 32]); // random
        handshake_body.push(0); // session_id len 0
        handshake_body.extend_from_slice(&2u16.to_be_bytes()); // cipher_suites len
        handshake_body.extend_from_slice(&[0x13, 0x01]);
        handshake_body.push(1); // compression_methods len
        handshake_body.push(0);
        handshake_body.extend_from_slice(&(sni_ext.len() as u16).to_be_bytes()); // extensions_len
        handshake_body.extend_from_slice(&sni_ext);

        let mut handshake = Vec::new();
        handshake.push(HANDSHAKE_TYPE_CLIENT_HELLO);
        let len = handshake_body.len() as u32;
        handshake.extend_from_slice(&len.to_be_bytes()[1..]);
        handshake.extend_from_slice(&handshake_body);

        let mut record = Vec::new();
        record.push(CONTENT_TYPE_HANDSHAKE);
        record.extend_from_slice(&[0x03, 0x01]); // record version
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    #[test]
    fn finds_targeted_sni() {
        let sni = b"rr3---sn-abc.googlevideo.com";
        let record = client_hello_record(sni);
        let verdict = inspect(&record);
        assert!(verdict.targeted);
        assert_eq!(verdict.sni_len, sni.len());
        assert_eq!(&record[verdict.sni_offset..verdict.sni_offset + verdict.sni_len], sni);
    }

    #[test]
    fn rejects_non_targeted_sni() {
        let record = client_hello_record(b"example.com");
        let verdict = inspect(&record);
        assert!(!verdict.targeted);
    }

    #[test]
    fn ignores_non_handshake_records() {
        let mut buf = vec![0x17, 0x03, 0x03, 0x00, 0x03]; // application_data record, len 3
        buf.extend_from_slice(&[1, 2, 3]);
        assert_eq!(inspect(&buf), Verdict::default());
    }

    #[test]
    fn never_panics_on_truncated_input() {
        let record = client_hello_record(b"googlevideo.com");
        for cut in 0..record.len() {
            let _ = inspect(&record[..cut]);
        }
    }

    #[test]
    fn never_panics_on_empty_input() {
        assert_eq!(inspect(&[]), Verdict::default());
    }
}
