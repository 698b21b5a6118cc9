#![warn(missing_docs)]
//! This module defines the message structures exchanged between ringcast nodes.
//!
//! Ring maintenance uses request/response rpcs ([RpcRequest], [RpcResponse]).
//! Dissemination uses fire-and-forget [Message]s that are acknowledged by receipts.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::dht::NodeListDelta;
use crate::error::Error;
use crate::error::Result;

/// Bincode wire form shared by all message types.
pub trait BincodeCodec: Serialize + DeserializeOwned {
    /// Deserialize from bincode bytes.
    fn from_bincode(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::BincodeDeserialize)
    }

    /// Serialize to bincode bytes.
    fn to_bincode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(Error::BincodeSerialize)
    }
}

/// Request of notify: the sender believes it is the predecessor of the receiver.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NotifySend {
    /// Ring-ordered membership snapshot of the sender, when it tracks membership.
    pub node_list: Option<Vec<Did>>,
}

/// Request of find successor.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FindSuccessorSend {
    /// did of target
    pub did: Did,
}

/// Rpc requests of ring maintenance.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RpcRequest {
    /// NOTIFY
    Notify(NotifySend),
    /// GET_PREDECESSOR
    GetPredecessor,
    /// FIND_SUCCESSOR
    FindSuccessor(FindSuccessorSend),
    /// UPDATE, the receiver was displaced as predecessor of the sender.
    Update,
}

/// Replies to [RpcRequest].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RpcResponse {
    /// Reply of NOTIFY and UPDATE.
    Ack,
    /// Reply of GET_PREDECESSOR.
    Predecessor(Option<Did>),
    /// Reply of FIND_SUCCESSOR.
    Successor(Did),
}

/// Body of a flooded packet.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub enum PacketBody {
    /// Application payload, delivered through the node callback.
    Data(Bytes),
    /// Membership delta (NL), merged into the local membership list.
    NodeList(NodeListDelta),
}

/// Id sequence a flooded packet is numbered in. Each stream has its own tracker, so
/// membership gossip never leaves gaps in the data ids of an originator.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloodStream {
    /// [PacketBody::Data]
    Data,
    /// [PacketBody::NodeList]
    Membership,
}

impl PacketBody {
    /// The stream packets with this body are numbered in.
    pub fn stream(&self) -> FloodStream {
        match self {
            PacketBody::Data(_) => FloodStream::Data,
            PacketBody::NodeList(_) => FloodStream::Membership,
        }
    }
}

/// PACKET, a flooded broadcast.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Packet {
    /// did of the node that broadcast it.
    pub originator: Did,
    /// sequence id assigned by the originator's tracker of `body.stream()`.
    pub id: u64,
    /// content
    pub body: PacketBody,
}

/// RECEIPT, acknowledges a [Packet]. The acknowledging peer is the sender of the receipt.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// originator of the acknowledged packet
    pub originator: Did,
    /// id of the acknowledged packet
    pub id: u64,
    /// stream of the acknowledged packet
    pub stream: FloodStream,
}

/// DIRECTED, a message routed greedily toward one destination.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DirectedPacket {
    /// did of the node that sent it.
    pub originator: Did,
    /// did of the node it is addressed to.
    pub destination: Did,
    /// sequence id assigned by the originator's tracker for `destination`.
    pub id: u64,
    /// application payload
    pub payload: Bytes,
}

/// DRECEIPT, acknowledges one hop of a [DirectedPacket].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct DirectedReceipt {
    /// originator of the acknowledged packet
    pub originator: Did,
    /// destination of the acknowledged packet, selects the tracker
    pub destination: Did,
    /// id of the acknowledged packet
    pub id: u64,
}

/// Dissemination messages.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// PACKET
    Packet(Packet),
    /// RECEIPT
    Receipt(Receipt),
    /// DIRECTED
    Directed(DirectedPacket),
    /// DRECEIPT
    DirectedReceipt(DirectedReceipt),
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BincodeCodec for RpcRequest {}
impl BincodeCodec for RpcResponse {}
impl BincodeCodec for Message {}
