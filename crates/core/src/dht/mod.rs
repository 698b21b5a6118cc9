#![warn(missing_docs)]
//! Implementation of Ringcast's DHT
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).
//!
//! Identifiers live on a ring of `4^m` ids and finger `i` of a node points at the owner of `did + 4^i`.

mod chord;
pub mod did;
/// Finger table for Ringcast
pub mod finger;
pub mod membership;
mod stabilization;

pub use chord::PeerRing;
pub use chord::PeerRingAction;
pub use chord::RemoteAction as PeerRingRemoteAction;
pub use did::between;
pub use did::Did;
pub use did::Ring;
pub use did::SortRing;
pub use finger::FingerTable;
pub use membership::NodeList;
pub use membership::NodeListDelta;
pub use stabilization::Stabilizer;
