//! Shared utilities: IPv4 subnet arithmetic.

pub mod ip_utils;

pub use ip_utils::{host_mask, in_subnet, ipv4_to_u32, parse_cidr, u32_to_ipv4};
