//! Error of ringcast_core

use crate::dht::Did;
use crate::dht::PeerRingAction;
use crate::message::RpcResponse;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ringcast-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Ring width {0} is out of range, expect 1..=64")]
    InvalidRingWidth(u8),

    #[error("Did {0} is out of the identifier space")]
    DidOutOfRing(Did),

    #[error("Invalid did: {0}")]
    InvalidDid(String),

    #[error("No successor is known, the node has not joined a ring")]
    NoSuccessor,

    #[error("No route found to the successor of {0}")]
    NoRouteFound(Did),

    #[error("Directed routing toward {0} cannot make progress")]
    NoProgress(Did),

    #[error("Peer {target} has already received message {originator}:{id}")]
    AlreadyReceived {
        originator: Did,
        id: u64,
        target: Did,
    },

    #[error("Connect to {0} failed: {1}")]
    ConnectionFailed(Did, String),

    #[error("Disconnect from {0} failed: {1}")]
    DisconnectFailed(Did, String),

    #[error("No connection to {0}")]
    ConnectionMissing(Did),

    #[error("Successor list exhausted, node is isolated from the ring")]
    SuccessorListExhausted,

    #[error("Message {originator}:{id} to {target} was not acknowledged after {attempts} attempts")]
    ResendExhausted {
        originator: Did,
        id: u64,
        target: Did,
        attempts: u32,
    },

    #[error("Pending receipt of message {originator}:{id} from {target} was dropped")]
    ResendCancelled {
        originator: Did,
        id: u64,
        target: Did,
    },

    #[error("Rpc to {0} timed out")]
    RpcTimeout(Did),

    #[error("Rpc to {0} failed: {1}")]
    RpcFailed(Did, String),

    #[error("Unexpected rpc response from {0}: {1:?}")]
    UnexpectedRpcResponse(Did, RpcResponse),

    #[error("Send message to {0} failed: {1}")]
    SendMessageFailed(Did, String),

    #[error("Should not connect to self")]
    ShouldNotConnectSelf,

    #[error("Should not send message to self")]
    ShouldNotSendSelf,

    #[error("Node has been destroyed")]
    NodeDestroyed,

    #[error("Unexpected PeerRingAction, {0:?}")]
    PeerRingUnexpectedAction(PeerRingAction),

    #[error("Failed on read/write DHT")]
    DHTSyncLockError,

    #[error("Failed on lock message tracker")]
    TrackerSyncLockError,

    #[error("Failed on lock callback")]
    CallbackSyncLockError,

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),
}
