#![warn(missing_docs)]
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use crate::dht::did::between;
use crate::dht::Did;

/// Finger table of Chord DHT.
/// Index 0 is the successor, index `i` approximates the owner of `did + 4^i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerTable {
    did: Did,
    size: usize,
    finger: Vec<Option<Did>>,
    pub(super) fix_finger_index: usize,
}

impl FingerTable {
    /// builder
    pub fn new(did: Did, size: usize) -> Self {
        Self {
            did,
            size,
            finger: vec![None; size],
            fix_finger_index: 0,
        }
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successor of the table owner, `finger[0]`.
    pub fn successor(&self) -> Option<Did> {
        self.get(0)
    }

    /// Replace the successor. Self ids are ignored.
    pub fn set_successor(&mut self, did: Option<Did>) {
        match did {
            Some(did) => self.set(0, did),
            None => self.finger[0] = None,
        }
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<Did> {
        self.finger.get(index).copied().flatten()
    }

    /// setter, out of range indexes and the owner's own did are ignored
    pub fn set(&mut self, index: usize, did: Did) {
        if index >= self.finger.len() || did == self.did {
            return;
        }
        self.finger[index] = Some(did);
    }

    /// Check finger is contains some node
    pub fn contains(&self, did: Did) -> bool {
        self.finger.contains(&Some(did))
    }

    /// Every finger strictly between the owner and `id`, scanning from the highest index down.
    /// Repeated entries are reported once, at their highest position.
    pub fn closest_preceding_nodes(&self, id: Did) -> Vec<Did> {
        let mut ret: Vec<Did> = vec![];
        for f in self.finger.iter().rev().flatten() {
            if between(self.did, *f, id) && !ret.contains(f) {
                ret.push(*f);
            }
        }
        ret
    }

    /// Advance the refresh cursor over `[1, size)` and return it.
    /// Returns None when the table only holds a successor.
    pub fn next_fix_index(&mut self) -> Option<usize> {
        if self.size < 2 {
            return None;
        }
        self.fix_finger_index += 1;
        if self.fix_finger_index >= self.size {
            self.fix_finger_index = 1;
        }
        Some(self.fix_finger_index)
    }

    /// get number of known fingers
    pub fn len(&self) -> usize {
        self.finger.iter().flatten().count()
    }

    /// table size `m`
    pub fn size(&self) -> usize {
        self.size
    }

    /// get finger list
    pub fn list(&self) -> &Vec<Option<Did>> {
        &self.finger
    }
}

impl Index<usize> for FingerTable {
    type Output = Option<Did>;
    fn index(&self, index: usize) -> &Self::Output {
        self.finger.get(index).unwrap_or(&None)
    }
}
