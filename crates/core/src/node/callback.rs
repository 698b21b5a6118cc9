use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ringcast_transport::core::callback::TransportCallback;
use ringcast_transport::core::transport::ConnectionState;

use crate::dht::Did;
use crate::message::BincodeCodec;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::RpcRequest;

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// The [InnerNodeCallback] will accept shared [NodeCallback] trait object.
pub type SharedNodeCallback = Arc<dyn NodeCallback + Send + Sync>;

/// Used to notify the application of events that occur in the node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NodeEvent {
    /// Indicates that the connection state of a peer has changed.
    ConnectionStateChange {
        /// The did of remote peer.
        peer: Did,
        /// The final state of the connection.
        state: ConnectionState,
    },
    /// The successor was lost and replaced from the fallback list.
    SuccessorRecovered {
        /// The successor that went away.
        lost: Did,
        /// Its replacement.
        successor: Did,
    },
    /// The successor was lost and no fallback could be reached.
    /// The node is cut off from the ring until a peer joins it again.
    Isolated {
        /// The successor that went away.
        lost: Did,
    },
}

/// Any object that implements this trait can be used as a callback for the node.
#[async_trait]
pub trait NodeCallback {
    /// This method is invoked once per broadcast, in the send order of its originator.
    async fn on_broadcast(
        &self,
        _originator: Did,
        _id: u64,
        _data: &Bytes,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    /// This method is invoked once per directed message addressed to this node.
    async fn on_directed(
        &self,
        _originator: Did,
        _id: u64,
        _data: &Bytes,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    /// This method is invoked after the node handled an event.
    async fn on_event(&self, _event: &NodeEvent) -> Result<(), CallbackError> {
        Ok(())
    }
}

pub(crate) struct DefaultCallback;
impl NodeCallback for DefaultCallback {}

/// [InnerNodeCallback] routes transport events into the [MessageHandler] of a node.
pub struct InnerNodeCallback {
    handler: MessageHandler,
}

impl InnerNodeCallback {
    /// Create a new [InnerNodeCallback] for the node behind `handler`.
    pub fn new(handler: MessageHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl TransportCallback for InnerNodeCallback {
    async fn on_message(&self, cid: &str, msg: &[u8]) -> Result<(), CallbackError> {
        let did = Did::from_str(cid)?;
        let msg = Message::from_bincode(msg)?;
        self.handler.handle_message(did, &msg).await?;
        Ok(())
    }

    async fn on_request(&self, cid: &str, msg: &[u8]) -> Result<Bytes, CallbackError> {
        let did = Did::from_str(cid)?;
        let req = RpcRequest::from_bincode(msg)?;
        let resp = self.handler.handle_rpc(did, &req).await?;
        Ok(resp.to_bincode()?)
    }

    async fn on_peer_connection_state_change(
        &self,
        cid: &str,
        s: ConnectionState,
    ) -> Result<(), CallbackError> {
        let Ok(did) = Did::from_str(cid) else {
            tracing::warn!("on_peer_connection_state_change parse did failed: {}", cid);
            return Ok(());
        };

        if s.is_terminated() {
            let handler = self.handler.clone();
            self.handler.spawn("on_disconnect", async move {
                handler.on_disconnect(did).await
            });
        }

        let cb = self.handler.callback()?;
        cb.on_event(&NodeEvent::ConnectionStateChange {
            peer: did,
            state: s,
        })
        .await
    }
}
