//! Advisory membership snapshot gossiped along the ring.
//!
//! A [NodeList] is observability only. Lookups, stabilization, finger repair and
//! disconnect decisions never read it.
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::did::between;
use crate::dht::did::SortRing;
use crate::dht::Did;
use crate::dht::Ring;

/// Membership change flooded to the ring.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeListDelta {
    /// Newly announced ids.
    pub add: Vec<Did>,
    /// Ids known to be superseded.
    pub remove: Vec<Did>,
}

impl NodeListDelta {
    /// Neither adds nor removes anything.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Ring-ordered set of known ids, always containing the owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeList {
    did: Did,
    ring: Ring,
    members: BTreeSet<Did>,
}

impl NodeList {
    /// A list knowing only its owner.
    pub fn new(did: Did, ring: Ring) -> Self {
        Self {
            did,
            ring,
            members: BTreeSet::from([did]),
        }
    }

    /// Members walking clockwise from the owner, owner first.
    pub fn list(&self) -> Vec<Did> {
        let mut ids: Vec<Did> = self.members.iter().copied().collect();
        ids.sort_ring(self.ring, self.did);
        ids
    }

    /// Number of known members, including the owner.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false, the owner is a member.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `did` is known.
    pub fn contains(&self, did: Did) -> bool {
        self.members.contains(&did)
    }

    /// Insert announced ids, returning the ones that were new.
    pub fn merge(&mut self, announced: &[Did]) -> Vec<Did> {
        announced
            .iter()
            .filter(|did| self.ring.contains(**did))
            .filter(|did| self.members.insert(**did))
            .copied()
            .collect()
    }

    /// Drop ids strictly between `predecessor` and the owner, returning them.
    pub fn prune_between(&mut self, predecessor: Did) -> Vec<Did> {
        let removed: Vec<Did> = self
            .members
            .iter()
            .filter(|did| between(predecessor, **did, self.did))
            .copied()
            .collect();
        for did in removed.iter() {
            self.members.remove(did);
        }
        removed
    }

    /// Apply a gossiped delta. The owner is never removed.
    /// Returns true if the snapshot changed.
    pub fn apply(&mut self, delta: &NodeListDelta) -> bool {
        let mut changed = !self.merge(&delta.add).is_empty();
        for did in delta.remove.iter() {
            if *did != self.did {
                changed |= self.members.remove(did);
            }
        }
        changed
    }

    /// Forget everyone but the owner.
    pub fn collapse(&mut self) {
        self.members.retain(|did| *did == self.did);
    }
}
