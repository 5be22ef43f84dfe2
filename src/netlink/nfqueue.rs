//! NFQUEUE control socket: bind, configure, receive packets, and send verdicts.
//!
//! The socket itself is a bare `AF_NETLINK`/`NETLINK_NETFILTER` socket opened directly with
//! `libc`, the same way low-level DPDK/EAL bindings talk to the kernel through raw FFI rather
//! than a higher-level crate: no maintained Rust NFQUEUE binding exists in this program's
//! dependency stack, and the wire format is simple enough to frame by hand with
//! [`crate::netlink::message`].

use std::os::unix::io::RawFd;

use crate::error::NetlinkError;
use crate::netlink::message::{
    self, for_each_attr, nla_align, MessageBuilder, NLM_F_ACK, NLM_F_REQUEST,
};

const AF_NETLINK: i32 = libc::AF_NETLINK;
const NETLINK_NETFILTER: i32 = 12;
const SOL_NETLINK: i32 = 270;
const NETLINK_NO_ENOBUFS: i32 = 5;

/// `PF_INET`, as used in the nfnetlink generic header's address-family field.
const NFPROTO_IPV4: u8 = 2;

const NFNL_SUBSYS_QUEUE: u16 = 3;

const NFQNL_MSG_PACKET: u16 = 0;
const NFQNL_MSG_VERDICT: u16 = 1;
const NFQNL_MSG_CONFIG: u16 = 2;

fn msg_type(msg: u16) -> u16 {
    (NFNL_SUBSYS_QUEUE << 8) | msg
}

const NFQA_PACKET_HDR: u16 = 1;
const NFQA_VERDICT_HDR: u16 = 2;
const NFQA_MARK: u16 = 3;
const NFQA_PAYLOAD: u16 = 10;
const NFQA_SKB_INFO: u16 = 14;

const NFQA_CFG_CMD: u16 = 1;
const NFQA_CFG_PARAMS: u16 = 2;
const NFQA_CFG_MASK: u16 = 4;
const NFQA_CFG_FLAGS: u16 = 5;

const NFQNL_CFG_CMD_BIND: u8 = 1;
const NFQNL_COPY_PACKET: u8 = 2;

/// `nfqnl_attr_config_flags`: ask the kernel to report GSO/checksum-not-ready state per packet
/// (delivered back as the `NFQA_SKB_INFO` attribute), distinct from the per-packet
/// `NFQA_SKB_GSO`/`NFQA_SKB_CSUMNOTREADY` bits those reports carry.
const NFQA_CFG_F_GSO: u32 = 0x4;

/// `NFQA_SKB_INFO` flag: the payload is not yet checksummed (checksum offloaded to hardware).
pub const NFQA_SKB_CSUMNOTREADY: u32 = 0x1;
/// `NFQA_SKB_INFO` flag: the payload has not yet been segmented (GSO).
pub const NFQA_SKB_GSO: u32 = 0x2;

/// `NF_ACCEPT`/`NF_DROP`, the two verdicts this program ever issues.
pub const NF_DROP: u32 = 0;
pub const NF_ACCEPT: u32 = 1;

/// One packet delivered by the kernel, with the fields the pipeline needs. Owns its payload
/// bytes so it can outlive the receive buffer it was decoded from.
pub struct OwnedQueuedPacket {
    pub packet_id: u32,
    pub hw_protocol: u16,
    pub mark: u32,
    pub skb_info: u32,
    pub payload: Vec<u8>,
}

/// The bound, configured NFQUEUE control socket.
pub struct ControlSocket {
    fd: RawFd,
    /// Queue number as given on the command line. The nfnetlink `res_id` field that actually
    /// carries it on the wire is 16 bits, so only the low 16 bits of this are ever sent.
    queue_num: u32,
}

impl ControlSocket {
    /// Opens the netlink socket, binds it to `queue_num`, and requests full-packet copy mode.
    /// Mirrors steps 1, 3, 4 and 5 of the bootstrap sequence.
    pub fn open(queue_num: u32) -> Result<Self, NetlinkError> {
        let fd = unsafe { libc::socket(AF_NETLINK, libc::SOCK_RAW, NETLINK_NETFILTER) };
        if fd < 0 {
            return Err(NetlinkError::Io(std::io::Error::last_os_error()));
        }

        let mut sockaddr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        sockaddr.nl_family = libc::AF_NETLINK as u16;
        let bind_result = unsafe {
            libc::bind(
                fd,
                &sockaddr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if bind_result < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(NetlinkError::Io(err));
        }

        let ignore_enobufs: i32 = 1;
        unsafe {
            libc::setsockopt(
                fd,
                SOL_NETLINK,
                NETLINK_NO_ENOBUFS,
                &ignore_enobufs as *const i32 as *const libc::c_void,
                std::mem::size_of::<i32>() as u32,
            );
        }

        let socket = ControlSocket { fd, queue_num };
        socket.bind_queue()?;
        socket.configure_copy_packet()?;
        Ok(socket)
    }

    fn send_message(&self, buf: &[u8]) -> Result<(), NetlinkError> {
        let mut dst: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        dst.nl_family = libc::AF_NETLINK as u16;
        let sent = unsafe {
            libc::sendto(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                &dst as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if sent < 0 {
            return Err(NetlinkError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn bind_queue(&self) -> Result<(), NetlinkError> {
        let mut builder = MessageBuilder::new(
            msg_type(NFQNL_MSG_CONFIG),
            NLM_F_REQUEST | NLM_F_ACK,
            NFPROTO_IPV4,
            self.queue_num as u16,
        );
        // nfqnl_msg_config_cmd: command(1B), pad(1B), pf(2B be)
        let mut cmd = [0u8; 4];
        cmd[0] = NFQNL_CFG_CMD_BIND;
        cmd[2..4].copy_from_slice(&(libc::AF_INET as u16).to_be_bytes());
        builder.push_attr(NFQA_CFG_CMD, &cmd);
        self.send_message(&builder.finish())
    }

    fn configure_copy_packet(&self) -> Result<(), NetlinkError> {
        let mut builder = MessageBuilder::new(
            msg_type(NFQNL_MSG_CONFIG),
            NLM_F_REQUEST | NLM_F_ACK,
            NFPROTO_IPV4,
            self.queue_num as u16,
        );
        // nfqnl_msg_config_params: copy_range(4B be), copy_mode(1B)
        let mut params = [0u8; 5];
        params[0..4].copy_from_slice(&crate::config::NFQUEUE_COPY_RANGE.to_be_bytes());
        params[4] = NFQNL_COPY_PACKET;
        builder.push_attr(NFQA_CFG_PARAMS, &params);
        builder.push_attr_u32_be(NFQA_CFG_MASK, NFQA_CFG_F_GSO);
        builder.push_attr_u32_be(NFQA_CFG_FLAGS, NFQA_CFG_F_GSO);
        self.send_message(&builder.finish())
    }

    /// Blocks until a message arrives on the control socket and, if it's a packet message,
    /// decodes it into an owned [`OwnedQueuedPacket`]. Returns `Ok(None)` for non-packet messages
    /// (e.g. acks to the config commands sent at startup), which the caller simply ignores.
    /// Any read or decode error is returned to the caller, which treats it as fatal for the
    /// receive loop.
    pub fn recv_packet(&self, buf: &mut [u8]) -> Result<Option<OwnedQueuedPacket>, NetlinkError> {
        let n = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            return Err(NetlinkError::Io(std::io::Error::last_os_error()));
        }
        let received = &buf[..n as usize];
        let parsed = message::parse_envelope(received)?;
        if parsed.nlmsg_type != msg_type(NFQNL_MSG_PACKET) {
            // Acks and other config-channel replies land here too; nothing to do with them.
            return Ok(None);
        }

        let mut packet_id = None;
        let mut hw_protocol = 0u16;
        let mut mark = 0u32;
        let mut skb_info = 0u32;
        let mut payload = Vec::new();

        for_each_attr(parsed.attrs, |attr_type, value| match attr_type {
            NFQA_PACKET_HDR => {
                if value.len() >= 4 {
                    packet_id = Some(u32::from_be_bytes([value[0], value[1], value[2], value[3]]));
                }
                if value.len() >= 6 {
                    hw_protocol = u16::from_be_bytes([value[4], value[5]]);
                }
            }
            NFQA_MARK => {
                if value.len() == 4 {
                    mark = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                }
            }
            NFQA_SKB_INFO => {
                if value.len() == 4 {
                    skb_info = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                }
            }
            NFQA_PAYLOAD => {
                payload = value.to_vec();
            }
            _ => {}
        })?;

        let packet_id = packet_id.ok_or(NetlinkError::MissingAttribute("NFQA_PACKET_HDR"))?;

        Ok(Some(OwnedQueuedPacket {
            packet_id,
            hw_protocol,
            mark,
            skb_info,
            payload,
        }))
    }

    /// Sends a plain accept/drop verdict for `packet_id`, with no replacement payload.
    pub fn verdict(&self, packet_id: u32, verdict: u32) -> Result<(), NetlinkError> {
        self.send_verdict(packet_id, verdict, None)
    }

    /// Sends an accept verdict carrying a replacement payload (a mangled packet).
    pub fn verdict_with_payload(&self, packet_id: u32, payload: &[u8]) -> Result<(), NetlinkError> {
        self.send_verdict(packet_id, NF_ACCEPT, Some(payload))
    }

    fn send_verdict(
        &self,
        packet_id: u32,
        verdict: u32,
        payload: Option<&[u8]>,
    ) -> Result<(), NetlinkError> {
        let mut builder = MessageBuilder::new(
            msg_type(NFQNL_MSG_VERDICT),
            NLM_F_REQUEST,
            NFPROTO_IPV4,
            self.queue_num as u16,
        );
        let mut hdr = [0u8; 8];
        hdr[0..4].copy_from_slice(&verdict.to_be_bytes());
        hdr[4..8].copy_from_slice(&packet_id.to_be_bytes());
        builder.push_attr(NFQA_VERDICT_HDR, &hdr);
        if let Some(bytes) = payload {
            builder.push_attr(NFQA_PAYLOAD, bytes);
        }
        self.send_message(&builder.finish())
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_packs_subsys_and_message() {
        assert_eq!(msg_type(NFQNL_MSG_PACKET), 0x0300);
        assert_eq!(msg_type(NFQNL_MSG_VERDICT), 0x0301);
        assert_eq!(msg_type(NFQNL_MSG_CONFIG), 0x0302);
    }

    #[test]
    fn nla_align_rounds_up_to_four() {
        assert_eq!(nla_align(0), 0);
        assert_eq!(nla_align(1), 4);
        assert_eq!(nla_align(4), 4);
        assert_eq!(nla_align(5), 8);
    }
}
