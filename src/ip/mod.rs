//! IP address allocation.
//!
//! This module holds the binary-trie occupancy structure and the subnet
//! engine built on top of it.

pub mod trie;
pub mod engine;

// Re-export commonly used types
pub use trie::{AddressTrie, HostId, TrieError};
pub use engine::{AllocationEngine, LeaseError, Reservation};
