//! Stable identity across double-buffered renders.
//!
//! The runtime discards and rebuilds nodes every render pass, so a
//! node's address is useless as an identity. This registry is an
//! ephemeral side-table: entries key on the node pointer but hold a
//! `Weak` reference, and every hit is validated by upgrading and
//! comparing `Rc::ptr_eq` — an address reused by a fresh allocation
//! must never alias an old id. The twin link propagates an id forward
//! one generation at a time.

use std::rc::{Rc, Weak};

use ahash::AHashMap;
use host::node::TreeNode;

use crate::store::{self, KEY_IDENTITY, KEY_SEQUENCE};

pub type StableId = String;

/// Prune once the table outgrows this many entries.
const PRUNE_WATERMARK: usize = 256;

struct Entry {
    id: StableId,
    node: Weak<TreeNode>,
}

#[derive(Default)]
pub struct IdentityTable {
    entries: AHashMap<usize, Entry>,
    inserts_since_prune: usize,
}

fn key_of(node: &Rc<TreeNode>) -> usize {
    Rc::as_ptr(node) as usize
}

impl IdentityTable {
    /// Valid registration for exactly this node, stale entries removed
    /// on sight.
    fn live_hit(&mut self, node: &Rc<TreeNode>) -> Option<StableId> {
        let key = key_of(node);
        let valid = match self.entries.get(&key) {
            Some(entry) => entry
                .node
                .upgrade()
                .is_some_and(|live| Rc::ptr_eq(&live, node)),
            None => return None,
        };
        if !valid {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|entry| entry.id.clone())
    }

    fn insert(&mut self, node: &Rc<TreeNode>, id: StableId) {
        self.entries.insert(
            key_of(node),
            Entry {
                id,
                node: Rc::downgrade(node),
            },
        );
        self.inserts_since_prune += 1;
        if self.inserts_since_prune >= PRUNE_WATERMARK {
            self.entries.retain(|_, entry| entry.node.upgrade().is_some());
            self.inserts_since_prune = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stable id for `node`. Lookup order: direct registration, then the
/// twin's registration (reused and propagated forward), then a freshly
/// minted id registered for both node and twin. The sequence advances
/// by exactly one per new id, regardless of how many nodes share it;
/// ids are never reused within a process lifetime.
pub fn id_for(node: &Rc<TreeNode>) -> StableId {
    let hit = store::with_slot::<IdentityTable, _>(KEY_IDENTITY, |table| {
        if let Some(id) = table.live_hit(node) {
            return Some(id);
        }
        let twin = node.alternate()?;
        let id = table.live_hit(&twin)?;
        table.insert(node, id.clone());
        Some(id)
    });
    if let Some(id) = hit {
        return id;
    }

    let seq = store::with_slot::<u64, _>(KEY_SEQUENCE, |next| {
        *next += 1;
        *next
    });
    let id = format!("n{seq}");
    store::with_slot::<IdentityTable, _>(KEY_IDENTITY, |table| {
        table.insert(node, id.clone());
        if let Some(twin) = node.alternate() {
            table.insert(&twin, id.clone());
        }
    });
    id
}

/// Non-minting lookup: the id this node (or its twin) already has.
pub fn peek(node: &Rc<TreeNode>) -> Option<StableId> {
    store::with_slot::<IdentityTable, _>(KEY_IDENTITY, |table| {
        table
            .live_hit(node)
            .or_else(|| node.alternate().and_then(|twin| table.live_hit(&twin)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use host::node::NodeKind;

    fn node() -> Rc<TreeNode> {
        TreeNode::new(NodeKind::FunctionComponent, None, None)
    }

    #[test]
    fn test_repeated_lookups_are_stable() {
        let n = node();
        let id = id_for(&n);
        assert_eq!(id_for(&n), id);
        assert_eq!(peek(&n), Some(id));
    }

    #[test]
    fn test_twins_share_one_id_in_either_order() {
        // twin registered first
        let a = node();
        let a2 = node();
        TreeNode::link_alternates(&a, &a2);
        let id_a = id_for(&a);
        assert_eq!(id_for(&a2), id_a);

        // fresh node first, twin after
        let b = node();
        let b2 = node();
        TreeNode::link_alternates(&b, &b2);
        let id_b2 = id_for(&b2);
        assert_eq!(id_for(&b), id_b2);
        assert_ne!(id_a, id_b2);
    }

    #[test]
    fn test_minting_advances_sequence_once_per_id() {
        let a = node();
        let a2 = node();
        TreeNode::link_alternates(&a, &a2);
        let first = id_for(&a); // registers both a and a2
        let second = id_for(&node());

        let first_seq: u64 = first.trim_start_matches('n').parse().expect("seq");
        let second_seq: u64 = second.trim_start_matches('n').parse().expect("seq");
        assert_eq!(second_seq, first_seq + 1);
    }

    #[test]
    fn test_identity_propagates_across_generations() {
        let gen1 = node();
        let id = id_for(&gen1);

        let gen2 = node();
        TreeNode::link_alternates(&gen1, &gen2);
        assert_eq!(id_for(&gen2), id);

        // gen1 is discarded; gen3 twins gen2 and still inherits the id
        drop(gen1);
        let gen3 = node();
        TreeNode::link_alternates(&gen2, &gen3);
        assert_eq!(id_for(&gen3), id);
    }

    #[test]
    fn test_dead_nodes_do_not_leak_ids() {
        let short_lived = node();
        let id = id_for(&short_lived);
        drop(short_lived);

        let fresh = node();
        // even if the allocator reuses the address, the stale entry is
        // detected and a new id minted
        assert_ne!(id_for(&fresh), id);
        assert!(peek(&node()).is_none());
    }
}
