//! Process bootstrap and the blocking receive loop.
//!
//! Gathers the two socket handles and the shutdown flag into one owned record, rather than the
//! mutable globals the source program uses. Follows the bootstrap-then-loop split common to
//! `anyhow`-based services: construct everything fallible up front with `anyhow::Context`, then
//! enter a loop that only stops on a fatal error or the shutdown flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::config::NETLINK_RECV_BUFFER_LEN;
use crate::netlink::{ControlSocket, OwnedQueuedPacket};
use crate::pipeline::{self, PacketOutcome};
use crate::rawsocket::RawInjector;

/// Owns the two sockets this process ever opens and the shutdown flag `ctrlc` sets.
pub struct Runtime {
    control: ControlSocket,
    raw: RawInjector,
    running: Arc<AtomicBool>,
}

impl Runtime {
    /// Opens the control socket, binds and configures the given queue, and opens the raw
    /// injector socket. Installs a `SIGINT`/`SIGTERM` handler that flips an atomic flag checked
    /// once per receive-loop iteration.
    pub fn new(queue_num: u32) -> Result<Self> {
        info!("opening NFQUEUE control socket for queue {queue_num}");
        let control = ControlSocket::open(queue_num).context("failed to bind NFQUEUE")?;

        info!("opening raw injector socket");
        let raw = RawInjector::new().context("failed to open raw socket")?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        ctrlc::set_handler(move || {
            flag.store(false, Ordering::Relaxed);
        })
        .context("failed to install signal handler")?;

        Ok(Runtime {
            control,
            raw,
            running,
        })
    }

    /// Runs the blocking receive loop until a fatal I/O error occurs or the shutdown flag is
    /// set. Each received packet is fully processed (a verdict emitted, and any fragments sent)
    /// before the next is read.
    pub fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; NETLINK_RECV_BUFFER_LEN];
        info!("entering receive loop");

        while self.running.load(Ordering::Relaxed) {
            let packet = match self.control.recv_packet(&mut buf) {
                Ok(Some(packet)) => packet,
                Ok(None) => continue,
                Err(e) => {
                    return Err(e).context("fatal error reading from control socket");
                }
            };

            if let Err(e) = self.handle_packet(packet) {
                warn!("error handling packet, continuing: {e:#}");
            }
        }

        info!("shutdown requested, exiting cleanly");
        Ok(())
    }

    fn handle_packet(&self, packet: OwnedQueuedPacket) -> Result<()> {
        let outcome = pipeline::process_packet(
            packet.hw_protocol,
            packet.mark,
            packet.skb_info,
            &packet.payload,
        );

        match outcome {
            PacketOutcome::Accept => self
                .control
                .verdict(packet.packet_id, crate::netlink::nfqueue::NF_ACCEPT)
                .context("failed to send accept verdict"),
            PacketOutcome::Drop => self
                .control
                .verdict(packet.packet_id, crate::netlink::nfqueue::NF_DROP)
                .context("failed to send drop verdict"),
            PacketOutcome::DropAndInject { first, second } => {
                self.control
                    .verdict(packet.packet_id, crate::netlink::nfqueue::NF_DROP)
                    .context("failed to send drop verdict")?;
                if let Err(e) = self.raw.send(&first) {
                    error!("failed to send first fragment: {e}");
                }
                if let Err(e) = self.raw.send(&second) {
                    error!("failed to send second fragment: {e}");
                }
                Ok(())
            }
            PacketOutcome::AcceptMangled { payload } => self
                .control
                .verdict_with_payload(packet.packet_id, &payload)
                .context("failed to send mangled-accept verdict"),
        }
    }
}
