//! Binary trie over the host-address bit space.
//!
//! Each level of the trie decides one host bit, most significant first. Every
//! node carries an `is_full` flag meaning "every address below me is
//! allocated", which lets allocation skip exhausted ranges and lets counting
//! stop at full subtrees instead of visiting every leaf.
//!
//! Nodes live in an arena and refer to each other by index. The parent link
//! is only used to recompute fullness after a leaf is added or removed.

use crate::utils::ip_utils::ADDRESS_BITS;

/// Offset of an address within the subnet's host-bit range
pub type HostId = u32;

/// Smallest supported number of host bits
pub const MIN_DEPTH: u32 = 2;

/// Largest supported number of host bits
pub const MAX_DEPTH: u32 = ADDRESS_BITS - 2;

/// Errors reported by trie operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrieError {
    #[error("Trie depth {depth} outside the supported range {}..={}", MIN_DEPTH, MAX_DEPTH)]
    InvalidDepth { depth: u32 },

    #[error("Address space is fully allocated")]
    Full,

    #[error("Failed to allocate a trie node")]
    MemoryFailure,

    #[error("Host id {host_id} is not allocated")]
    DoubleFree { host_id: HostId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(usize);

#[derive(Debug, Clone)]
struct TrieNode {
    children: [Option<NodeId>; 2],
    parent: Option<NodeId>,
    is_full: bool,
}

impl TrieNode {
    fn new(parent: Option<NodeId>) -> Self {
        TrieNode {
            children: [None, None],
            parent,
            is_full: false,
        }
    }
}

/// Occupancy trie for `2^depth` host ids
#[derive(Debug)]
pub struct AddressTrie {
    nodes: Vec<TrieNode>,
    /// Arena slots released by `remove`, reused before the arena grows
    free_slots: Vec<NodeId>,
    root: NodeId,
    depth: u32,
}

impl AddressTrie {
    /// Create an empty trie with `depth` host bits
    ///
    /// # Examples
    /// ```
    /// use trielease::ip::AddressTrie;
    ///
    /// let mut trie = AddressTrie::new(3).unwrap();
    /// assert_eq!(trie.insert(5), Ok(5));
    /// assert_eq!(trie.count_allocated(), 1);
    /// assert!(AddressTrie::new(1).is_err());
    /// ```
    pub fn new(depth: u32) -> Result<Self, TrieError> {
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&depth) {
            return Err(TrieError::InvalidDepth { depth });
        }

        let mut nodes = Vec::new();
        nodes
            .try_reserve(1)
            .map_err(|_| TrieError::MemoryFailure)?;
        nodes.push(TrieNode::new(None));

        Ok(AddressTrie {
            nodes,
            free_slots: Vec::new(),
            root: NodeId(0),
            depth,
        })
    }

    /// Number of host bits this trie covers
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Size of the address space, `2^depth`
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_slots.len()
    }

    /// Allocate `requested`, or the next free host id after it
    ///
    /// When the branch `requested` runs into is fully allocated, the candidate
    /// jumps to the first id of the next sibling range and the walk restarts
    /// from the root. A candidate that runs off the end of the space wraps to
    /// host id 0 once. Bits of `requested` above `depth` are ignored.
    ///
    /// # Returns
    /// * `Ok(HostId)` - The host id actually granted
    /// * `Err(TrieError::Full)` - No host id is free
    /// * `Err(TrieError::MemoryFailure)` - A node could not be allocated
    pub fn insert(&mut self, requested: HostId) -> Result<HostId, TrieError> {
        let space = self.capacity();
        let mut candidate = u64::from(requested) & (space - 1);
        let mut wrapped = false;

        'restart: loop {
            if self.node(self.root).is_full {
                return Err(TrieError::Full);
            }

            let mut current = self.root;
            let mut assigned: HostId = 0;

            for level in 0..self.depth {
                let shift = self.depth - 1 - level;
                let bit = ((candidate >> shift) & 1) as usize;
                let child = self.node(current).children[bit];

                if self.is_full(child) {
                    let weight = 1u64 << shift;
                    candidate = (candidate + weight) & !(weight - 1);
                    if candidate >= space {
                        if wrapped {
                            return Err(TrieError::Full);
                        }
                        wrapped = true;
                        candidate = 0;
                    }
                    log::trace!("Subtree at level {} is full, retrying from host id {}", level, candidate);
                    continue 'restart;
                }

                current = match child {
                    Some(id) => id,
                    None => {
                        let id = self.alloc_node(current)?;
                        self.nodes[current.0].children[bit] = Some(id);
                        id
                    }
                };

                assigned |= (bit as HostId) << shift;
            }

            self.nodes[current.0].is_full = true;
            self.update_fullness(self.node(current).parent);

            return Ok(assigned);
        }
    }

    /// Release `host_id`
    ///
    /// Only the leaf is freed; interior nodes on its path stay in place even
    /// when they end up childless.
    pub fn remove(&mut self, host_id: HostId) -> Result<(), TrieError> {
        let host_id = host_id & self.host_bits();
        let mut current = self.root;
        let mut bit = 0;

        for level in 0..self.depth {
            bit = self.branch_bit(host_id, level);
            current = self.node(current).children[bit]
                .ok_or(TrieError::DoubleFree { host_id })?;
        }

        debug_assert!(self.node(current).is_full, "leaf nodes always mark allocated ids");

        let parent = self.node(current).parent;
        if let Some(parent) = parent {
            self.nodes[parent.0].children[bit] = None;
        }
        self.release_node(current);
        self.update_fullness(parent);

        Ok(())
    }

    /// Check whether `host_id` is currently allocated
    pub fn is_allocated(&self, host_id: HostId) -> bool {
        let mut current = self.root;

        for level in 0..self.depth {
            if self.node(current).is_full {
                return true;
            }
            match self.node(current).children[self.branch_bit(host_id, level)] {
                Some(child) => current = child,
                None => return false,
            }
        }

        self.node(current).is_full
    }

    /// Count allocated host ids
    ///
    /// Full subtrees contribute their whole range without being descended, so
    /// the cost follows the number of distinct allocated ranges.
    pub fn count_allocated(&self) -> u64 {
        self.count_from(Some(self.root), self.depth)
    }

    fn count_from(&self, node: Option<NodeId>, height: u32) -> u64 {
        let Some(id) = node else {
            return 0;
        };

        let node = self.node(id);
        if node.is_full {
            return 1u64 << height;
        }
        if height == 0 {
            return 0;
        }

        self.count_from(node.children[0], height - 1) + self.count_from(node.children[1], height - 1)
    }

    /// Recompute fullness from `start` up to the root
    fn update_fullness(&mut self, start: Option<NodeId>) {
        let mut next = start;
        while let Some(id) = next {
            let [zero, one] = self.node(id).children;
            let is_full = self.is_full(zero) && self.is_full(one);
            let node = &mut self.nodes[id.0];
            node.is_full = is_full;
            next = node.parent;
        }
    }

    fn alloc_node(&mut self, parent: NodeId) -> Result<NodeId, TrieError> {
        if let Some(id) = self.free_slots.pop() {
            self.nodes[id.0] = TrieNode::new(Some(parent));
            return Ok(id);
        }

        self.nodes
            .try_reserve(1)
            .map_err(|_| TrieError::MemoryFailure)?;
        self.nodes.push(TrieNode::new(Some(parent)));

        Ok(NodeId(self.nodes.len() - 1))
    }

    fn release_node(&mut self, id: NodeId) {
        self.nodes[id.0] = TrieNode::new(None);
        self.free_slots.push(id);
    }

    /// A missing child counts as not full
    fn is_full(&self, node: Option<NodeId>) -> bool {
        node.map_or(false, |id| self.node(id).is_full)
    }

    fn branch_bit(&self, host_id: HostId, level: u32) -> usize {
        ((host_id >> (self.depth - 1 - level)) & 1) as usize
    }

    fn host_bits(&self) -> HostId {
        ((1u64 << self.depth) - 1) as HostId
    }

    fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_bounds() {
        assert_eq!(AddressTrie::new(0).unwrap_err(), TrieError::InvalidDepth { depth: 0 });
        assert_eq!(AddressTrie::new(1).unwrap_err(), TrieError::InvalidDepth { depth: 1 });
        assert_eq!(AddressTrie::new(31).unwrap_err(), TrieError::InvalidDepth { depth: 31 });
        assert!(AddressTrie::new(2).is_ok());
        assert!(AddressTrie::new(30).is_ok());

        let trie = AddressTrie::new(8).unwrap();
        assert_eq!(trie.capacity(), 256);
        assert_eq!(trie.count_allocated(), 0);
        assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn test_insert_exact_ids() {
        let mut trie = AddressTrie::new(4).unwrap();
        assert_eq!(trie.insert(0), Ok(0));
        assert_eq!(trie.insert(15), Ok(15));
        assert_eq!(trie.insert(14), Ok(14));
        assert_eq!(trie.insert(9), Ok(9));
        assert_eq!(trie.count_allocated(), 4);
        assert!(trie.is_allocated(9));
        assert!(!trie.is_allocated(8));
    }

    #[test]
    fn test_insert_skips_taken_ids() {
        let mut trie = AddressTrie::new(3).unwrap();
        assert_eq!(trie.insert(4), Ok(4));
        assert_eq!(trie.insert(4), Ok(5));
        assert_eq!(trie.insert(4), Ok(6));
        assert_eq!(trie.insert(5), Ok(7));
        // 4..=7 is now a full subtree, the next request for it lands on 0
        assert_eq!(trie.insert(6), Ok(0));
        assert_eq!(trie.count_allocated(), 5);
    }

    #[test]
    fn test_insert_ignores_bits_above_depth() {
        let mut trie = AddressTrie::new(2).unwrap();
        assert_eq!(trie.insert(0xc0a8_0101), Ok(1));
    }

    #[test]
    fn test_insert_until_full() {
        let mut trie = AddressTrie::new(3).unwrap();
        let mut granted: Vec<HostId> = (0..8).map(|_| trie.insert(0).unwrap()).collect();
        granted.sort_unstable();
        assert_eq!(granted, (0..8).collect::<Vec<_>>());

        assert_eq!(trie.insert(0), Err(TrieError::Full));
        assert_eq!(trie.insert(7), Err(TrieError::Full));
        assert_eq!(trie.count_allocated(), 8);
    }

    #[test]
    fn test_full_subtree_counts_without_leaves() {
        let mut trie = AddressTrie::new(2).unwrap();
        for id in 0..4 {
            trie.insert(id).unwrap();
        }
        assert!(trie.node(trie.root).is_full);
        assert_eq!(trie.count_allocated(), 4);

        trie.remove(2).unwrap();
        assert!(!trie.node(trie.root).is_full);
        assert_eq!(trie.count_allocated(), 3);
        assert_eq!(trie.insert(3), Ok(2));
    }

    #[test]
    fn test_remove_and_double_free() {
        let mut trie = AddressTrie::new(4).unwrap();
        assert_eq!(trie.remove(3), Err(TrieError::DoubleFree { host_id: 3 }));

        trie.insert(3).unwrap();
        assert_eq!(trie.remove(3), Ok(()));
        assert_eq!(trie.remove(3), Err(TrieError::DoubleFree { host_id: 3 }));
        assert_eq!(trie.count_allocated(), 0);

        // Sibling path exists but the leaf does not
        trie.insert(2).unwrap();
        assert_eq!(trie.remove(3), Err(TrieError::DoubleFree { host_id: 3 }));
        assert_eq!(trie.count_allocated(), 1);
    }

    #[test]
    fn test_remove_keeps_interior_nodes() {
        let mut trie = AddressTrie::new(4).unwrap();
        trie.insert(6).unwrap();
        assert_eq!(trie.node_count(), 5);

        trie.remove(6).unwrap();
        assert_eq!(trie.node_count(), 4);

        // The freed leaf slot is reused, the interior path is shared
        trie.insert(7).unwrap();
        assert_eq!(trie.node_count(), 5);
        assert_eq!(trie.nodes.len(), 5);
    }
}
