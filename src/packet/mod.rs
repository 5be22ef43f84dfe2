//! Fixed-header packet views.
//!
//! Adapted from [`retina_core::protocols::packet`](https://docs.rs/retina-core/latest/retina_core/protocols/packet/),
//! which in turn credits [`capsule::packets`](https://docs.rs/capsule/0.1.5/capsule/packets/index.html)
//! and [`pnet::packet`](https://docs.rs/pnet/latest/pnet/packet/index.html). That crate parses
//! header structs out of a zero-copy DPDK `Mbuf` chain and only ever reads. This program parses
//! out of, and also *builds*, owned `Vec<u8>` buffers (the fragmenter in [`crate::fragment`]
//! constructs two new IPv4 datagrams byte-for-byte), so the view types here borrow a plain slice
//! instead of an `Mbuf`, and the header structs expose both a `parse` and a `write_into` so
//! [`crate::fragment`] can patch fields in place.

pub mod ipv4;
pub mod tcp;

pub use crate::error::PacketParseError;
