//! Ringcast: Chord ring maintenance and reliable dissemination.
//! --------------
//! - [Chord](crate::dht::PeerRing) keeps the successor, predecessor and finger table of a node on a ring of `4^m` ids.
//! - [Stabilizer](crate::dht::Stabilizer) runs the periodic stabilize and fix_fingers steps.
//! - [MessageTracker](crate::message::MessageTracker) accounts sent and received messages, receipts and resends.
//! - [ChordNode](crate::node::ChordNode) ties a ring, its trackers and a [transport](crate::transport) together.
//!
//! # Joining a ring
//!
//! 1. Node A opens a link to a known member B and sets B as its successor.
//! 2. On the next stabilize A asks its successor for its predecessor. If that node X lies
//!    between A and B, X becomes the successor of A. Either way A notifies its successor.
//! 3. Fingers are refreshed one at a time by fix_fingers, each through a lookup.
//!
//! # Dissemination
//!
//! - A broadcast floods every link. Each hop acknowledges with a receipt, resends until acknowledged
//!   and skips peers it already has a receipt from. Broadcasts of one originator are handed to the
//!   application in id order.
//! - A directed message is forwarded greedily to the neighbor closest to its destination.
//!   A hop that cannot get strictly closer gives up.
//!
//! # Test
//! ```shell
//! cargo test -p ringcast-core --features dummy
//! ```

pub mod config;
pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod message;
pub mod node;
pub mod transport;

#[cfg(test)]
mod tests;
