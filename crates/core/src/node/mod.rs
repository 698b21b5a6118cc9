#![warn(missing_docs)]
//! A Chord node: ring maintenance, lookup and dissemination behind one handle.

mod builder;
/// Callback interface for node
pub mod callback;

use std::sync::Arc;

pub use builder::ChordNodeBuilder;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dht::Did;
use crate::dht::PeerRing;
use crate::dht::Stabilizer;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::NodeInspect;
use crate::message::Message;
use crate::message::MessageHandler;
use crate::message::RpcRequest;
use crate::message::RpcResponse;
use crate::node::callback::SharedNodeCallback;

/// One member of a ring. Cloning gives another handle to the same node.
#[derive(Clone)]
pub struct ChordNode {
    pub(crate) handler: MessageHandler,
    stabilizer: Arc<Stabilizer>,
    shutdown: CancellationToken,
}

impl ChordNode {
    /// Get did of self.
    pub fn did(&self) -> Did {
        self.handler.did()
    }

    /// Get DHT(Distributed Hash Table) of self.
    pub fn dht(&self) -> Arc<PeerRing> {
        self.handler.dht()
    }

    /// Get the message handler of self.
    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    /// Get the stabilization runner of self.
    pub fn stabilizer(&self) -> Arc<Stabilizer> {
        self.stabilizer.clone()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::NodeDestroyed);
        }
        Ok(())
    }

    /// Start a new ring with this node as its only member.
    pub fn create(&self) -> Result<()> {
        self.ensure_alive()?;
        self.handler.dht.create()
    }

    /// Join the ring that `did` belongs to.
    pub async fn join(&self, did: Did) -> Result<()> {
        self.ensure_alive()?;
        self.handler.join(did).await
    }

    /// Run one stabilize round.
    pub async fn stabilize(&self) -> Result<()> {
        self.ensure_alive()?;
        self.handler.stabilize().await
    }

    /// Refresh the next finger.
    pub async fn fix_fingers(&self) -> Result<()> {
        self.ensure_alive()?;
        self.handler.fix_fingers().await
    }

    /// Find the node responsible for `did`.
    pub async fn find_successor(&self, did: Did) -> Result<Did> {
        self.ensure_alive()?;
        self.handler.find_successor(did).await
    }

    /// Answer an rpc from `sender`.
    pub async fn handle_rpc(&self, sender: Did, req: &RpcRequest) -> Result<RpcResponse> {
        self.ensure_alive()?;
        self.handler.handle_rpc(sender, req).await
    }

    /// Handle the loss of the link to `did`.
    pub async fn on_disconnect(&self, did: Did) -> Result<()> {
        self.handler.on_disconnect(did).await
    }

    /// Flood `data` to every reachable node.
    pub async fn broadcast(&self, data: Bytes) -> Result<u64> {
        self.ensure_alive()?;
        self.handler.broadcast(data).await
    }

    /// Route `data` toward `destination`.
    pub async fn directed_send(&self, destination: Did, data: Bytes) -> Result<u64> {
        self.ensure_alive()?;
        self.handler.directed_send(destination, data).await
    }

    /// Handle a message received from `sender`.
    pub async fn receive(&self, sender: Did, msg: &Message) -> Result<()> {
        self.ensure_alive()?;
        self.handler.handle_message(sender, msg).await
    }

    /// Peers with an established link.
    pub fn neighbors(&self) -> Vec<Did> {
        self.handler.transport.neighbors()
    }

    /// Run the periodic stabilize and fix_fingers timers until the node is destroyed.
    pub fn start(&self) -> JoinHandle<()> {
        tokio::spawn(self.stabilizer.clone().wait(self.shutdown.clone()))
    }

    /// Stop timers, resend loops and background tasks, then close every link.
    pub async fn destroy(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        tracing::info!("destroy node {}", self.did());
        self.shutdown.cancel();
        self.handler.transport.close().await
    }

    /// Whether [ChordNode::destroy] was called.
    pub fn is_destroyed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Replace the application callback.
    pub fn set_callback(&self, callback: SharedNodeCallback) -> Result<()> {
        self.handler.set_callback(callback)
    }

    /// Snapshot of the node state.
    pub fn inspect(&self) -> NodeInspect {
        NodeInspect::inspect(self)
    }
}
