//! The link layer as seen by a Chord node.
//!
//! [ChordTransport] is the collaborator contract of the protocol: connections, rpcs and
//! fire-and-forget messages addressed by [Did]. [SwarmTransport] implements it on top of any
//! byte level [TransportInterface], using the textual form of a Did as connection id.
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ringcast_transport::core::callback::SharedTransportCallback;
use ringcast_transport::core::transport::ConnectionState;
use ringcast_transport::core::transport::TransportInterface;

use crate::dht::Did;
use crate::dht::Ring;
use crate::dht::SortRing;
use crate::error::Error;
use crate::error::Result;
use crate::message::BincodeCodec;
use crate::message::Message;
use crate::message::RpcRequest;
use crate::message::RpcResponse;

/// Transport shared by every handler of a node.
pub type SharedTransport = Arc<dyn ChordTransport>;

/// Links of one node, addressed by [Did].
#[async_trait]
pub trait ChordTransport: Send + Sync {
    /// Establish a link, may fail.
    async fn connect(&self, did: Did) -> Result<()>;

    /// Tear down a link, may fail.
    async fn disconnect(&self, did: Did) -> Result<()>;

    /// The link to `did` is fully established.
    fn is_connected(&self, did: Did) -> bool;

    /// A link attempt to `did` exists, it may still be pending.
    fn has_connection(&self, did: Did) -> bool;

    /// Request/response over the link to `did`.
    async fn send_rpc(&self, did: Did, req: RpcRequest) -> Result<RpcResponse>;

    /// Fire-and-forget over the link to `did`.
    async fn send_message(&self, did: Did, msg: &Message) -> Result<()>;

    /// Peers with an established link.
    fn neighbors(&self) -> Vec<Did>;

    /// Known peers except self, ranked clockwise from self.
    fn query_successors(&self) -> Vec<Did>;

    /// Install the callback inbound traffic is routed to.
    fn bind(&self, callback: SharedTransportCallback) -> Result<()>;

    /// Close all links.
    async fn close(&self) -> Result<()>;
}

/// [ChordTransport] over a byte level transport.
pub struct SwarmTransport<T> {
    transport: T,
    did: Did,
    ring: Ring,
    rpc_timeout: Duration,
}

impl<T> SwarmTransport<T>
where T: TransportInterface + Send + Sync
{
    /// Wrap `transport`, the endpoint of `did` on `ring`.
    pub fn new(transport: T, did: Did, ring: Ring, rpc_timeout: Duration) -> Self {
        Self {
            transport,
            did,
            ring,
            rpc_timeout,
        }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.transport
    }

    fn parse_cids(&self, cids: Vec<String>) -> Vec<Did> {
        cids.into_iter()
            .filter_map(|cid| match Did::from_str(&cid) {
                Ok(did) if did != self.did && self.ring.contains(did) => Some(did),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("ignore peer with invalid connection id {}: {:?}", cid, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl<T> ChordTransport for SwarmTransport<T>
where T: TransportInterface + Send + Sync
{
    async fn connect(&self, did: Did) -> Result<()> {
        if did == self.did {
            return Err(Error::ShouldNotConnectSelf);
        }
        self.transport
            .connect(&did.to_string())
            .await
            .map_err(|e| Error::ConnectionFailed(did, e.to_string()))
    }

    async fn disconnect(&self, did: Did) -> Result<()> {
        tracing::info!("disconnect {}", did);
        self.transport
            .disconnect(&did.to_string())
            .await
            .map_err(|e| Error::DisconnectFailed(did, e.to_string()))
    }

    fn is_connected(&self, did: Did) -> bool {
        self.transport.connection_state(&did.to_string()) == Some(ConnectionState::Connected)
    }

    fn has_connection(&self, did: Did) -> bool {
        self.transport
            .connection_state(&did.to_string())
            .map(|s| s.is_alive())
            .unwrap_or(false)
    }

    async fn send_rpc(&self, did: Did, req: RpcRequest) -> Result<RpcResponse> {
        let data = req.to_bincode()?;
        let resp = tokio::time::timeout(
            self.rpc_timeout,
            self.transport.request(&did.to_string(), data),
        )
        .await
        .map_err(|_| Error::RpcTimeout(did))?
        .map_err(|e| Error::RpcFailed(did, e.to_string()))?;
        RpcResponse::from_bincode(&resp)
    }

    async fn send_message(&self, did: Did, msg: &Message) -> Result<()> {
        let data = msg.to_bincode()?;
        self.transport
            .send_message(&did.to_string(), data)
            .await
            .map_err(|e| Error::SendMessageFailed(did, e.to_string()))
    }

    fn neighbors(&self) -> Vec<Did> {
        let mut dids = self.parse_cids(self.transport.connection_ids());
        dids.retain(|did| self.is_connected(*did));
        dids.sort_ring(self.ring, self.did);
        dids
    }

    fn query_successors(&self) -> Vec<Did> {
        let mut dids = self.parse_cids(self.transport.peer_ids());
        dids.sort_ring(self.ring, self.did);
        dids
    }

    fn bind(&self, callback: SharedTransportCallback) -> Result<()> {
        self.transport
            .set_callback(callback)
            .map_err(|e| Error::Callback(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.transport
            .close()
            .await
            .map_err(|e| Error::DisconnectFailed(self.did, e.to_string()))
    }
}
