//! Subnet-facing allocation engine.
//!
//! This file wraps one [`AddressTrie`] with the subnet it serves: it checks
//! that addresses belong to the configured subnet, converts between raw
//! address bytes and trie host ids, and reserves the network, broadcast and
//! gateway addresses when the engine is built.

use std::fmt;
use std::net::Ipv4Addr;

use super::trie::{AddressTrie, HostId, TrieError};
use crate::utils::ip_utils::{host_mask, in_subnet, ipv4_to_u32, u32_to_ipv4, ADDRESS_BITS};

/// Errors returned to engine callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeaseError {
    #[error("Subnet prefix /{prefix} outside the supported range /2../30")]
    InvalidPrefix { prefix: u32 },

    #[error("No free address left in the subnet")]
    Full,

    #[error("Failed to allocate memory for the address trie")]
    MemoryFailure,

    #[error("Address {address} is not allocated")]
    DoubleFree { address: Ipv4Addr },

    #[error("Address {address} does not belong to subnet {subnet}")]
    BadSubnet { address: Ipv4Addr, subnet: String },
}

/// Trie host ids carry no network bits, so a converted `DoubleFree` holds the
/// bare host id as an address until the engine fills in its subnet.
impl From<TrieError> for LeaseError {
    fn from(error: TrieError) -> Self {
        match error {
            TrieError::InvalidDepth { depth } => LeaseError::InvalidPrefix {
                prefix: ADDRESS_BITS.saturating_sub(depth),
            },
            TrieError::Full => LeaseError::Full,
            TrieError::MemoryFailure => LeaseError::MemoryFailure,
            TrieError::DoubleFree { host_id } => LeaseError::DoubleFree {
                address: Ipv4Addr::from(host_id),
            },
        }
    }
}

/// Addresses reserved when the engine is built, in reservation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// All host bits clear
    Network,
    /// All host bits set
    Broadcast,
    /// One below the broadcast address
    Gateway,
}

impl Reservation {
    pub const ALL: [Reservation; 3] = [Reservation::Network, Reservation::Broadcast, Reservation::Gateway];

    /// Host id of this reservation in a subnet with `depth` host bits
    pub fn host_id(self, depth: u32) -> HostId {
        match self {
            Reservation::Network => 0,
            Reservation::Broadcast => host_mask(depth),
            Reservation::Gateway => host_mask(depth) - 1,
        }
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reservation::Network => "network",
            Reservation::Broadcast => "broadcast",
            Reservation::Gateway => "gateway",
        };
        f.write_str(name)
    }
}

/// Hands out unique host addresses of one IPv4 subnet
#[derive(Debug)]
pub struct AllocationEngine {
    trie: AddressTrie,
    base_network_id: [u8; 4],
    depth: u32,
}

impl AllocationEngine {
    /// Build an engine for `base_network_id/prefix` and reserve the network,
    /// broadcast and gateway addresses
    ///
    /// # Arguments
    /// * `base_network_id` - Network address bytes; host bits are ignored
    /// * `prefix` - Subnet prefix length, `1 < prefix < 31`
    ///
    /// # Examples
    /// ```
    /// use trielease::ip::AllocationEngine;
    ///
    /// let engine = AllocationEngine::new([192, 168, 1, 0], 24).unwrap();
    /// assert_eq!(engine.count_free(), 253);
    /// ```
    pub fn new(base_network_id: [u8; 4], prefix: u32) -> Result<Self, LeaseError> {
        if prefix <= 1 || prefix >= ADDRESS_BITS - 1 {
            return Err(LeaseError::InvalidPrefix { prefix });
        }

        let depth = ADDRESS_BITS - prefix;
        let mut trie = AddressTrie::new(depth)?;

        Self::reserve_predefined(&mut trie, depth)?;

        let engine = AllocationEngine {
            trie,
            base_network_id,
            depth,
        };
        log::info!(
            "Created allocation engine for subnet {} with {} free addresses",
            engine.subnet(),
            engine.count_free()
        );

        Ok(engine)
    }

    /// Insert each reservation with its exact host id. The partially built
    /// trie is dropped by the caller on error.
    fn reserve_predefined(trie: &mut AddressTrie, depth: u32) -> Result<(), LeaseError> {
        for (index, reservation) in Reservation::ALL.iter().enumerate() {
            let requested = reservation.host_id(depth);
            let granted = trie.insert(requested);
            let allocated = trie.count_allocated();

            match granted {
                Ok(host_id) if host_id == requested && allocated == index as u64 + 1 => {
                    log::debug!("Reserved {} host id {}", reservation, host_id);
                }
                other => {
                    log::error!(
                        "Failed to reserve {} host id {}: got {:?} with {} allocated",
                        reservation,
                        requested,
                        other,
                        allocated
                    );
                    return Err(LeaseError::MemoryFailure);
                }
            }
        }

        Ok(())
    }

    /// Allocate an address, preferring `requested` when it is free and inside
    /// the subnet
    ///
    /// A request outside the subnet is treated like no request at all. The
    /// returned bytes are the full address: network bits of the subnet plus
    /// the granted host id.
    ///
    /// # Returns
    /// * `Ok([u8; 4])` - The granted address
    /// * `Err(LeaseError::Full)` - Every address is allocated
    /// * `Err(LeaseError::MemoryFailure)` - The trie could not grow
    pub fn allocate_ip(&mut self, requested: Option<[u8; 4]>) -> Result<[u8; 4], LeaseError> {
        let probe = match requested {
            Some(address) if self.contains(address) => self.host_id(address),
            Some(address) => {
                log::debug!(
                    "Requested address {} is outside subnet {}, allocating any free address",
                    Ipv4Addr::from(address),
                    self.subnet()
                );
                0
            }
            None => 0,
        };

        let host_id = self.trie.insert(probe).inspect_err(|e| {
            if *e == TrieError::Full {
                log::warn!("Subnet {} is exhausted", self.subnet());
            }
        })?;

        let granted = self.address(host_id);
        log::debug!("Allocated {} (requested host id {})", Ipv4Addr::from(granted), probe);

        Ok(granted)
    }

    /// Release a previously allocated address
    ///
    /// Addresses outside the subnet are rejected before the trie is touched.
    pub fn free_ip(&mut self, address: [u8; 4]) -> Result<(), LeaseError> {
        if !self.contains(address) {
            log::warn!("Refusing to free {}: not in subnet {}", Ipv4Addr::from(address), self.subnet());
            return Err(LeaseError::BadSubnet {
                address: Ipv4Addr::from(address),
                subnet: self.subnet(),
            });
        }

        let host_id = self.host_id(address);
        self.trie
            .remove(host_id)
            .inspect_err(|_| log::warn!("Double free of {}", Ipv4Addr::from(address)))
            .map_err(|e| self.with_network(e.into()))?;

        log::debug!("Freed {}", Ipv4Addr::from(address));
        Ok(())
    }

    /// Number of addresses still available
    pub fn count_free(&self) -> u64 {
        self.capacity() - self.trie.count_allocated()
    }

    /// [`allocate_ip`](Self::allocate_ip) for [`Ipv4Addr`] callers
    pub fn allocate_addr(&mut self, requested: Option<Ipv4Addr>) -> Result<Ipv4Addr, LeaseError> {
        self.allocate_ip(requested.map(|addr| addr.octets()))
            .map(Ipv4Addr::from)
    }

    /// [`free_ip`](Self::free_ip) for [`Ipv4Addr`] callers
    pub fn free_addr(&mut self, address: Ipv4Addr) -> Result<(), LeaseError> {
        self.free_ip(address.octets())
    }

    /// Check whether `address` is currently allocated
    pub fn is_allocated(&self, address: [u8; 4]) -> bool {
        self.contains(address) && self.trie.is_allocated(self.host_id(address))
    }

    /// Check whether `address` belongs to the configured subnet
    pub fn contains(&self, address: [u8; 4]) -> bool {
        in_subnet(address, self.base_network_id, self.depth)
    }

    /// Network address with host bits cleared
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address(0))
    }

    pub fn prefix(&self) -> u32 {
        ADDRESS_BITS - self.depth
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Total number of addresses in the subnet, reserved ones included
    pub fn capacity(&self) -> u64 {
        self.trie.capacity()
    }

    /// Subnet in CIDR notation
    pub fn subnet(&self) -> String {
        format!("{}/{}", self.network(), self.prefix())
    }

    /// Put the subnet's network bits back into addresses converted from trie errors
    fn with_network(&self, error: LeaseError) -> LeaseError {
        match error {
            LeaseError::DoubleFree { address } => LeaseError::DoubleFree {
                address: Ipv4Addr::from(self.address(self.host_id(address.octets()))),
            },
            other => other,
        }
    }

    fn host_id(&self, address: [u8; 4]) -> HostId {
        ipv4_to_u32(address) & host_mask(self.depth)
    }

    fn address(&self, host_id: HostId) -> [u8; 4] {
        let network_bits = ipv4_to_u32(self.base_network_id) & !host_mask(self.depth);
        u32_to_ipv4(network_bits | host_id)
    }
}
