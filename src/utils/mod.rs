//! Small shared helpers used across the packet and netlink modules.

pub mod types;
