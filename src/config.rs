//! Compiled-in configuration.
//!
//! Unlike [`retina_core::config::RuntimeConfig`](https://docs.rs/retina-core/latest/retina_core/config),
//! which is loaded from an operator-supplied TOML file, this program's external surface is
//! intentionally limited to a single command-line argument (the queue number, parsed in
//! `main.rs`). There is no config file and no environment variable that changes packet
//! processing behavior. The constants below still get a single named home instead of being
//! scattered as inline literals through the pipeline: a dedicated `config` module even where,
//! as here, the values are fixed at compile time.

/// DNS suffix identifying the throttled video streaming service. A ClientHello's SNI is
/// "targeted" when it ends with this suffix (case-sensitive, byte-for-byte).
pub const TARGET_SNI_SUFFIX: &[u8] = b"googlevideo.com";

/// `SO_MARK` value applied to every packet sent out the raw socket.
///
/// The firewall rule that diverts packets into the queue must exclude packets carrying this
/// mark, or re-injected fragments would loop back into this program. See [`crate::rawsocket`].
pub const RAW_SOCKET_MARK: u32 = 0xfc70;

/// TCP payloads longer than this are never split, even if they carry a targeted ClientHello.
/// A conservative guard against producing oversized or otherwise unsafe fragments.
pub const MAX_SPLIT_PAYLOAD_LEN: usize = 1480;

/// Byte cap requested from the kernel for `NFQNL_COPY_PACKET` mode (full packet copy).
pub const NFQUEUE_COPY_RANGE: u32 = 0xffff;

/// Size of the buffer used to receive netlink messages from the queue. Must comfortably fit
/// [`NFQUEUE_COPY_RANGE`] bytes of packet payload plus netlink/nfnetlink/attribute overhead.
pub const NETLINK_RECV_BUFFER_LEN: usize = NFQUEUE_COPY_RANGE as usize + 0x2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_shorter_than_the_sni_length_guard() {
        // The inspector rejects SNIs >= 128 bytes; the target suffix must fit comfortably
        // under that so a real match can still be found.
        assert!(TARGET_SNI_SUFFIX.len() < 128);
    }
}
