//! # Trielease - Trie-backed IPv4 address allocator
//!
//! This library provides the address bookkeeping behind a DHCP-style lease
//! pool: given a subnet it hands out unique host addresses, tracks occupancy
//! and reclaims freed addresses, each in time proportional to the number of
//! host bits rather than the size of the subnet.
//!
//! ## Architecture
//!
//! - `ip::trie`: `AddressTrie`, a binary trie over the host bits whose nodes
//!   carry a "fully allocated" flag maintained bottom-up
//! - `ip::engine`: `AllocationEngine`, the subnet-facing layer that validates
//!   membership, converts between address bytes and host ids, and reserves the
//!   network, broadcast and gateway addresses
//! - `config` / `config_loader`: YAML pool configuration
//! - `orchestrator`: replay of scripted workloads with a JSON report
//! - `utils`: IPv4 subnet arithmetic
//!
//! ## Example Usage
//!
//! ```rust
//! use trielease::ip::{AllocationEngine, LeaseError};
//!
//! let mut engine = AllocationEngine::new([192, 168, 1, 0], 30)?;
//! assert_eq!(engine.count_free(), 1);
//!
//! let granted = engine.allocate_ip(None)?;
//! assert_eq!(granted, [192, 168, 1, 1]);
//! assert_eq!(engine.allocate_ip(None), Err(LeaseError::Full));
//!
//! engine.free_ip(granted)?;
//! assert_eq!(engine.count_free(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Allocation operations return `thiserror` enums (`TrieError`, `LeaseError`)
//! so callers can match on exhaustion or double frees. Configuration loading
//! and the binary use `color_eyre` for error reports with context.

pub mod config;
pub mod config_loader;
pub mod ip;
pub mod orchestrator;
pub mod utils;
