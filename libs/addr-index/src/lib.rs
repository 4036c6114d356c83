//! An ordered map from address to size, backed by a fixed-capacity node pool.
//!
//! This plays the same role `wavltree` plays elsewhere in this codebase —
//! an ordered, pointer-linked binary search tree — but the node data here is
//! plain `(addr, size)` pairs rather than fields embedded in a participating
//! value, so the tree owns an arena of nodes instead of being intrusive.
//! Node identity is a `u32` index into that arena, never a raw pointer: the
//! allocator this index validates pointers for must keep working even if a
//! node pool entry moves or is recycled, so there is nothing here for
//! `unsafe` to hang off.
//!
//! Balancing is intentionally not implemented; the owning allocator bounds
//! the number of live entries (by construction, one per outstanding
//! allocation), so worst-case tree height in practice is far short of where
//! an unbalanced BST would start to hurt.

mod bitmap;

use bitmap::Bitmap;

#[derive(onlyerror::Error, Debug, PartialEq, Eq)]
pub enum IndexError {
    /// the node pool has no free slots
    #[error("address index pool exhausted")]
    PoolExhausted,
}

type NodeId = u32;

struct Node {
    addr: usize,
    size: usize,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// Ordered map from payload address to chunk size, for O(log n) validation
/// of user-supplied pointers.
pub struct AddrIndex {
    pool: Vec<Node>,
    occupied: Bitmap,
    root: Option<NodeId>,
    len: usize,
}

impl AddrIndex {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Vec::with_capacity(capacity);
        pool.resize_with(capacity, || Node {
            addr: 0,
            size: 0,
            left: None,
            right: None,
        });
        Self {
            pool,
            occupied: Bitmap::new(capacity),
            root: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `(addr, size)`. Overwrites the size in place if `addr` is
    /// already present (this should not happen for valid allocator use, but
    /// is defined behavior rather than a silent duplicate node).
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::PoolExhausted`] if the node pool has no free
    /// slots and `addr` was not already present.
    pub fn insert(&mut self, addr: usize, size: usize) -> Result<(), IndexError> {
        if let Some(id) = self.find(addr) {
            self.pool[id as usize].size = size;
            return Ok(());
        }

        let Some(slot) = self.occupied.first_unset() else {
            tracing::warn!(capacity = self.capacity(), "address index pool exhausted");
            return Err(IndexError::PoolExhausted);
        };
        let id = u32::try_from(slot).expect("pool capacity fits in u32");
        self.pool[slot] = Node {
            addr,
            size,
            left: None,
            right: None,
        };
        self.occupied.set(slot);
        self.root = Some(Self::insert_node(self.root, id, &mut self.pool));
        self.len += 1;
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, addr: usize) -> Option<usize> {
        self.find(addr).map(|id| self.pool[id as usize].size)
    }

    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        self.find(addr).is_some()
    }

    /// Removes the entry for `addr`, returning its size if present.
    pub fn remove(&mut self, addr: usize) -> Option<usize> {
        if self.find(addr).is_none() {
            return None;
        }
        let mut removed_size = None;
        self.root = Self::remove_node(self.root, addr, &mut self.pool, &mut removed_size);
        if let Some((slot, _)) = removed_size {
            self.occupied.clear(slot as usize);
            self.len -= 1;
        }
        removed_size.map(|(_, size)| size)
    }

    fn find(&self, addr: usize) -> Option<NodeId> {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = &self.pool[id as usize];
            cur = match addr.cmp(&node.addr) {
                std::cmp::Ordering::Equal => return Some(id),
                std::cmp::Ordering::Less => node.left,
                std::cmp::Ordering::Greater => node.right,
            };
        }
        None
    }

    fn insert_node(root: Option<NodeId>, new_id: NodeId, pool: &mut [Node]) -> NodeId {
        let Some(id) = root else {
            return new_id;
        };
        let new_addr = pool[new_id as usize].addr;
        if new_addr < pool[id as usize].addr {
            let left = pool[id as usize].left;
            pool[id as usize].left = Some(Self::insert_node(left, new_id, pool));
        } else {
            let right = pool[id as usize].right;
            pool[id as usize].right = Some(Self::insert_node(right, new_id, pool));
        }
        id
    }

    /// Classic BST deletion by key, operating on arena indices instead of
    /// owned boxes. On success, `out` is set to `(freed_slot, removed_size)`.
    fn remove_node(
        root: Option<NodeId>,
        addr: usize,
        pool: &mut [Node],
        out: &mut Option<(NodeId, usize)>,
    ) -> Option<NodeId> {
        let id = root?;
        match addr.cmp(&pool[id as usize].addr) {
            std::cmp::Ordering::Less => {
                let left = pool[id as usize].left;
                pool[id as usize].left = Self::remove_node(left, addr, pool, out);
                Some(id)
            }
            std::cmp::Ordering::Greater => {
                let right = pool[id as usize].right;
                pool[id as usize].right = Self::remove_node(right, addr, pool, out);
                Some(id)
            }
            std::cmp::Ordering::Equal => {
                let removed_size = pool[id as usize].size;
                match (pool[id as usize].left, pool[id as usize].right) {
                    (None, None) => {
                        *out = Some((id, removed_size));
                        None
                    }
                    (Some(only), None) | (None, Some(only)) => {
                        *out = Some((id, removed_size));
                        Some(only)
                    }
                    (Some(left), Some(right)) => {
                        // Replace with the in-order successor (leftmost of the right
                        // subtree); `id`'s slot stays live in the tree, so the slot
                        // actually freed is the successor's, not `id`'s.
                        let (new_right, succ_slot, succ_addr, succ_size) = Self::take_min(right, pool);
                        pool[id as usize].addr = succ_addr;
                        pool[id as usize].size = succ_size;
                        pool[id as usize].left = Some(left);
                        pool[id as usize].right = new_right;
                        *out = Some((succ_slot, removed_size));
                        Some(id)
                    }
                }
            }
        }
    }

    /// Removes the minimum node of the subtree rooted at `id`, returning the
    /// subtree's new root, the physical slot the minimum occupied, and its
    /// `addr`/`size`.
    fn take_min(id: NodeId, pool: &mut [Node]) -> (Option<NodeId>, NodeId, usize, usize) {
        let left = pool[id as usize].left;
        let Some(left_id) = left else {
            let right = pool[id as usize].right;
            return (right, id, pool[id as usize].addr, pool[id as usize].size);
        };
        let (new_left, slot, addr, size) = Self::take_min(left_id, pool);
        pool[id as usize].left = new_left;
        (Some(id), slot, addr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn insert_lookup_remove() {
        let mut idx = AddrIndex::with_capacity(4);
        idx.insert(100, 8).unwrap();
        idx.insert(50, 16).unwrap();
        idx.insert(200, 32).unwrap();
        assert_eq!(idx.lookup(100), Some(8));
        assert_eq!(idx.lookup(50), Some(16));
        assert_eq!(idx.lookup(200), Some(32));
        assert_eq!(idx.lookup(999), None);
        assert_eq!(idx.len(), 3);

        assert_eq!(idx.remove(50), Some(16));
        assert_eq!(idx.lookup(50), None);
        assert_eq!(idx.len(), 2);
        assert!(idx.contains(100));
        assert!(idx.contains(200));
    }

    #[test]
    fn pool_exhaustion() {
        let mut idx = AddrIndex::with_capacity(2);
        idx.insert(1, 1).unwrap();
        idx.insert(2, 2).unwrap();
        assert_eq!(idx.insert(3, 3), Err(IndexError::PoolExhausted));
        // Freeing a slot makes room again.
        idx.remove(1);
        assert!(idx.insert(3, 3).is_ok());
    }

    #[test]
    fn duplicate_insert_overwrites_size() {
        let mut idx = AddrIndex::with_capacity(4);
        idx.insert(10, 1).unwrap();
        idx.insert(10, 2).unwrap();
        assert_eq!(idx.lookup(10), Some(2));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn remove_node_with_two_children_preserves_siblings() {
        let mut idx = AddrIndex::with_capacity(8);
        for addr in [50, 25, 75, 10, 30, 60, 90] {
            idx.insert(addr, addr).unwrap();
        }
        assert_eq!(idx.remove(50), Some(50));
        for addr in [25, 75, 10, 30, 60, 90] {
            assert_eq!(idx.lookup(addr), Some(addr), "lost entry for {addr}");
        }
        assert_eq!(idx.len(), 6);
    }

    #[test]
    fn remove_node_with_two_children_frees_successors_slot_not_its_own() {
        // A pool exactly as large as the live set: if `remove` frees the
        // wrong slot (the kept node's instead of the detached successor's),
        // the bitmap ends up with a slot double-claimed by two nodes and the
        // next insert corrupts the tree instead of reusing the truly free slot.
        let mut idx = AddrIndex::with_capacity(7);
        for addr in [50, 25, 75, 10, 30, 60, 90] {
            idx.insert(addr, addr).unwrap();
        }
        assert_eq!(idx.remove(50), Some(50));
        assert_eq!(idx.len(), 6);

        idx.insert(200, 200).unwrap();
        for addr in [25, 75, 10, 30, 60, 90, 200] {
            assert_eq!(idx.lookup(addr), Some(addr), "lost or corrupted entry for {addr}");
        }
        assert_eq!(idx.len(), 7);
    }

    proptest! {
        #[test]
        fn matches_btreemap_oracle(
            ops in prop::collection::vec(
                (any::<bool>(), 0usize..64, 1usize..128),
                0..200,
            )
        ) {
            let mut idx = AddrIndex::with_capacity(64);
            let mut oracle: BTreeMap<usize, usize> = BTreeMap::new();

            for (is_insert, addr, size) in ops {
                if is_insert {
                    if oracle.len() < 64 || oracle.contains_key(&addr) {
                        prop_assert!(idx.insert(addr, size).is_ok());
                        oracle.insert(addr, size);
                    }
                } else {
                    let expected = oracle.remove(&addr);
                    let got = idx.remove(addr);
                    prop_assert_eq!(expected, got);
                }
                prop_assert_eq!(idx.len(), oracle.len());
                for (&addr, &size) in &oracle {
                    prop_assert_eq!(idx.lookup(addr), Some(size));
                }
            }
        }
    }
}
