//! Chord algorithm implement.
#![warn(missing_docs)]
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use super::did::between;
use super::membership::NodeList;
use super::membership::NodeListDelta;
use super::FingerTable;
use crate::dht::Did;
use crate::dht::Ring;
use crate::error::Error;
use crate::error::Result;

/// PeerRing is used to help a node interact with other nodes.
/// All nodes of a ringcast network form a clockwise ring in the order of Did.
/// PeerRing holds the ring state of one node and computes every transition of the
/// Chord protocol synchronously. Work that needs the network is handed back as a
/// [PeerRingAction] for the caller to carry out.
pub struct PeerRing {
    /// The did of current node.
    pub did: Did,
    /// Identifier space of the ring.
    pub ring: Ring,
    /// [FingerTable] help node to find successor quickly, index 0 is the successor.
    pub finger: Arc<Mutex<FingerTable>>,
    /// The did of previous node on the ring.
    pub predecessor: Arc<Mutex<Option<Did>>>,
    /// A better successor found by stabilize whose connection is still pending.
    pub temp_successor: Arc<Mutex<Option<Did>>>,
    /// Advisory membership snapshot, present when membership tracking is enabled.
    pub membership: Option<Arc<Mutex<NodeList>>>,
}

/// Type alias is just for making the code easy to read.
type Target = Did;

/// `PeerRing` use this to describe the result of the Chord algorithm. Sometimes it's a
/// direct result, sometimes it's an action that is continued externally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerRingAction {
    /// No result, the whole manipulation is done internally.
    None,
    /// Found some node.
    Some(Did),
    /// Trigger a remote action.
    RemoteAction(Target, RemoteAction),
    /// Trigger multiple independent remote actions.
    MultiActions(Vec<PeerRingAction>),
    /// Try the actions in order, stop at the first one that succeeds.
    FallbackActions(Vec<PeerRingAction>),
}

/// Some of the process needs to be done remotely. This enum is used to describe that.
///
/// To avoid ambiguity, in the following comments, `did_a` is the Did declared in
/// [PeerRingAction]. Other dids are the fields declared in this [RemoteAction].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAction {
    /// Need `did_a` to find the successor of `did_b`.
    FindSuccessor(Did),
    /// Tell `did_a` that current node may be its predecessor.
    Notify,
    /// Tell `did_a` it has been displaced as predecessor of current node.
    Update,
    /// Open a link to `did_a` if none exists.
    Connect,
    /// Close the link to `did_a`.
    Disconnect,
    /// Successor `did_a` is gone, find a replacement from the fallback list.
    /// Carries the pending temp successor that has to be abandoned first.
    RecoverSuccessor(Option<Did>),
}

impl PeerRingAction {
    /// Returns `true` if the action is a [PeerRingAction::None] value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Vec<PeerRingAction>> for PeerRingAction {
    fn from(mut acts: Vec<PeerRingAction>) -> Self {
        match acts.len() {
            0 => Self::None,
            1 => acts.remove(0),
            _ => Self::MultiActions(acts),
        }
    }
}

impl PeerRing {
    /// Create the ring state of node `did`. The finger table has `ring.width()` entries.
    pub fn new(did: Did, ring: Ring, track_membership: bool) -> Self {
        Self {
            did,
            ring,
            finger: Arc::new(Mutex::new(FingerTable::new(did, ring.width()))),
            predecessor: Arc::new(Mutex::new(None)),
            temp_successor: Arc::new(Mutex::new(None)),
            membership: track_membership.then(|| Arc::new(Mutex::new(NodeList::new(did, ring)))),
        }
    }

    /// Lock and return MutexGuard of finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of predecessor.
    pub fn lock_predecessor(&self) -> Result<MutexGuard<Option<Did>>> {
        self.predecessor.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of the pending successor.
    pub fn lock_temp_successor(&self) -> Result<MutexGuard<Option<Did>>> {
        self.temp_successor
            .lock()
            .map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of the membership list, if tracked.
    pub fn lock_membership(&self) -> Result<Option<MutexGuard<NodeList>>> {
        self.membership
            .as_ref()
            .map(|m| m.lock().map_err(|_| Error::DHTSyncLockError))
            .transpose()
    }

    /// Current successor, `finger[0]`.
    pub fn successor(&self) -> Result<Option<Did>> {
        Ok(self.lock_finger()?.successor())
    }

    /// Current predecessor.
    pub fn predecessor(&self) -> Result<Option<Did>> {
        Ok(*self.lock_predecessor()?)
    }

    /// Pending successor of an unfinished stabilize round.
    pub fn temp_successor(&self) -> Result<Option<Did>> {
        Ok(*self.lock_temp_successor()?)
    }

    /// Start a ring of one. The successor is left unset until a peer shows up.
    pub fn create(&self) -> Result<()> {
        self.lock_finger()?.set_successor(None);
        *self.lock_temp_successor()? = None;
        Ok(())
    }

    /// Join a ring containing a node identified by `did`.
    /// The node is taken as successor right away, stabilization corrects it later.
    ///
    /// Returns a [RemoteAction::Notify] for `did`, the caller must connect first.
    pub fn join(&self, did: Did) -> Result<PeerRingAction> {
        if did == self.did {
            return Ok(PeerRingAction::None);
        }
        self.lock_finger()?.set_successor(Some(did));
        Ok(PeerRingAction::RemoteAction(did, RemoteAction::Notify))
    }

    /// Handle notification from a node that thinks it is the predecessor of current node.
    ///
    /// * An unknown successor is replaced by `did`, which is notified back.
    /// * `did` becomes predecessor if there is none or it lies between the current
    ///   predecessor and self. The displaced predecessor receives an [RemoteAction::Update].
    pub fn notify(&self, did: Did) -> Result<PeerRingAction> {
        if did == self.did {
            return Ok(PeerRingAction::None);
        }
        let mut acts = vec![];
        {
            let mut finger = self.lock_finger()?;
            if finger.successor().is_none() {
                finger.set_successor(Some(did));
                acts.push(PeerRingAction::RemoteAction(did, RemoteAction::Notify));
            }
        }

        let mut predecessor = self.lock_predecessor()?;
        match *predecessor {
            None => *predecessor = Some(did),
            Some(pre) if pre == did => {}
            Some(pre) if between(pre, did, self.did) => {
                *predecessor = Some(did);
                acts.push(PeerRingAction::RemoteAction(pre, RemoteAction::Update));
            }
            Some(_) => {}
        }

        tracing::debug!(
            "notify: self: {}, from: {}, predecessor: {:?}, actions: {:?}",
            self.did,
            did,
            *predecessor,
            acts
        );
        Ok(acts.into())
    }

    /// Decide on the predecessor `ps` reported by successor `queried`.
    ///
    /// The reply may be stale: nothing happens unless `queried` is still the successor.
    /// A `ps` between self and `queried` is a better successor. Without a link it is
    /// remembered as temp successor and a connection is requested; once connected it is
    /// promoted and the old successor is released unless it is still in use.
    pub fn stabilize(
        &self,
        queried: Did,
        ps: Did,
        has_connection: bool,
        is_connected: bool,
    ) -> Result<PeerRingAction> {
        let mut finger = self.lock_finger()?;
        if finger.successor() != Some(queried) {
            return Ok(PeerRingAction::None);
        }
        if ps == self.did || !between(self.did, ps, queried) {
            return Ok(PeerRingAction::None);
        }
        if !has_connection {
            *self.lock_temp_successor()? = Some(ps);
            return Ok(PeerRingAction::RemoteAction(ps, RemoteAction::Connect));
        }
        if !is_connected {
            return Ok(PeerRingAction::None);
        }

        finger.set_successor(Some(ps));
        let predecessor = self.lock_predecessor()?;
        *self.lock_temp_successor()? = None;
        tracing::debug!(
            "stabilize: self: {}, successor: {} -> {}",
            self.did,
            queried,
            ps
        );

        if *predecessor != Some(queried) && !finger.contains(queried) {
            Ok(PeerRingAction::RemoteAction(
                queried,
                RemoteAction::Disconnect,
            ))
        } else {
            Ok(PeerRingAction::None)
        }
    }

    /// Advance the finger cursor and return the index with the id it should point to.
    pub fn next_finger_target(&self) -> Result<Option<(usize, Did)>> {
        let mut finger = self.lock_finger()?;
        Ok(finger
            .next_fix_index()
            .map(|index| (index, self.ring.finger_start(self.did, index))))
    }

    /// Store `found` as finger `index`.
    /// A replaced finger is disconnected unless it is still in the table, the predecessor
    /// or the temp successor. A connection to `found` is requested when missing.
    pub fn fix_finger(&self, index: usize, found: Did, connected: bool) -> Result<PeerRingAction> {
        if found == self.did {
            return Ok(PeerRingAction::None);
        }
        let mut acts = vec![];
        let mut finger = self.lock_finger()?;
        let old = finger.get(index);
        if old != Some(found) {
            finger.set(index, found);
            if let Some(old) = old {
                let predecessor = self.lock_predecessor()?;
                let temp = self.lock_temp_successor()?;
                if !finger.contains(old) && *predecessor != Some(old) && *temp != Some(old) {
                    acts.push(PeerRingAction::RemoteAction(old, RemoteAction::Disconnect));
                }
            }
        }
        if !connected {
            acts.push(PeerRingAction::RemoteAction(found, RemoteAction::Connect));
        }
        Ok(acts.into())
    }

    /// Find the successor of a Did.
    ///
    /// Answers directly when `did` lies in `(self, successor]`, otherwise returns
    /// [PeerRingAction::FallbackActions] asking the closest preceding fingers in turn.
    pub fn find_successor(&self, did: Did) -> Result<PeerRingAction> {
        let finger = self.lock_finger()?;
        let succ = finger.successor().ok_or(Error::NoSuccessor)?;

        let ret = if did == succ || between(self.did, did, succ) {
            PeerRingAction::Some(succ)
        } else {
            PeerRingAction::FallbackActions(
                finger
                    .closest_preceding_nodes(did)
                    .into_iter()
                    .map(|n| PeerRingAction::RemoteAction(n, RemoteAction::FindSuccessor(did)))
                    .collect(),
            )
        };

        tracing::debug!(
            "find_successor: self: {}, did: {}, successor: {}, result: {:?}",
            self.did,
            did,
            succ,
            ret
        );
        Ok(ret)
    }

    /// A link to `did` dropped.
    /// Clears the predecessor if it was `did`. Losing the successor yields a
    /// [RemoteAction::RecoverSuccessor] and abandons the temp successor.
    pub fn remove(&self, did: Did) -> Result<PeerRingAction> {
        let finger = self.lock_finger()?;
        let mut predecessor = self.lock_predecessor()?;
        if *predecessor == Some(did) {
            *predecessor = None;
        }
        if finger.successor() != Some(did) {
            return Ok(PeerRingAction::None);
        }
        let pending = self.lock_temp_successor()?.take();
        Ok(PeerRingAction::RemoteAction(
            did,
            RemoteAction::RecoverSuccessor(pending),
        ))
    }

    /// Swap a lost successor for `did`.
    /// Returns false when the successor moved on meanwhile and nothing was changed.
    pub fn replace_successor(&self, lost: Did, did: Did) -> Result<bool> {
        let mut finger = self.lock_finger()?;
        match finger.successor() {
            Some(s) if s != lost => Ok(false),
            _ => {
                finger.set_successor(Some(did));
                Ok(true)
            }
        }
    }

    /// No successor could be recovered: reopen the ring and forget the membership.
    pub fn isolate(&self) -> Result<()> {
        self.lock_finger()?.set_successor(None);
        if let Some(mut membership) = self.lock_membership()? {
            membership.collapse();
        }
        Ok(())
    }

    /// Ring-ordered membership snapshot, when tracked.
    pub fn membership_list(&self) -> Result<Option<Vec<Did>>> {
        Ok(self.lock_membership()?.map(|m| m.list()))
    }

    /// Merge a list announced by the predecessor and prune what it supersedes.
    /// Returns the resulting delta, None when nothing changed or membership is off.
    pub fn merge_membership(&self, announced: &[Did]) -> Result<Option<NodeListDelta>> {
        let predecessor = self.predecessor()?;
        let Some(mut membership) = self.lock_membership()? else {
            return Ok(None);
        };
        let add = membership.merge(announced);
        let remove = match predecessor {
            Some(pre) => membership.prune_between(pre),
            None => vec![],
        };
        let delta = NodeListDelta { add, remove };
        Ok((!delta.is_empty()).then_some(delta))
    }

    /// Apply a gossiped delta. Returns true if the snapshot changed.
    pub fn apply_membership(&self, delta: &NodeListDelta) -> Result<bool> {
        Ok(self
            .lock_membership()?
            .map(|mut m| m.apply(delta))
            .unwrap_or(false))
    }
}
