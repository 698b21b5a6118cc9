#![warn(missing_docs)]
//! This module provider [ChordNodeBuilder] and it's interface for
//! [ChordNode]

use std::sync::Arc;

use ringcast_transport::core::transport::TransportInterface;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::dht::Did;
use crate::dht::PeerRing;
use crate::dht::Stabilizer;
use crate::error::Error;
use crate::error::Result;
use crate::message::MessageHandler;
use crate::node::callback::DefaultCallback;
use crate::node::callback::InnerNodeCallback;
use crate::node::callback::SharedNodeCallback;
use crate::node::ChordNode;
use crate::transport::SharedTransport;
use crate::transport::SwarmTransport;

/// Creates a ChordNodeBuilder to configure a ChordNode.
pub struct ChordNodeBuilder<T> {
    did: Did,
    transport: T,
    config: NodeConfig,
    callback: Option<SharedNodeCallback>,
}

impl<T> ChordNodeBuilder<T>
where T: TransportInterface + Send + Sync + 'static
{
    /// Creates new instance of [ChordNodeBuilder].
    /// The connection id of `transport` must be the textual form of `did`.
    pub fn new(did: Did, transport: T) -> Self {
        Self {
            did,
            transport,
            config: NodeConfig::default(),
            callback: None,
        }
    }

    /// Sets up the node configuration.
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind callback for ChordNode.
    pub fn callback(mut self, callback: SharedNodeCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Try build for `ChordNode`.
    pub fn build(self) -> Result<ChordNode> {
        let ring = self.config.ring()?;
        if !ring.contains(self.did) {
            return Err(Error::DidOutOfRing(self.did));
        }
        if self.transport.cid() != self.did.to_string() {
            return Err(Error::InvalidDid(format!(
                "transport endpoint {} does not belong to {}",
                self.transport.cid(),
                self.did
            )));
        }

        let dht = Arc::new(PeerRing::new(
            self.did,
            ring,
            self.config.track_membership,
        ));
        let transport: SharedTransport = Arc::new(SwarmTransport::new(
            self.transport,
            self.did,
            ring,
            self.config.rpc_timeout(),
        ));
        let callback = self
            .callback
            .unwrap_or_else(|| Arc::new(DefaultCallback {}));
        let config = Arc::new(self.config);
        let shutdown = CancellationToken::new();

        let handler = MessageHandler::new(
            dht,
            transport.clone(),
            config.clone(),
            callback,
            shutdown.clone(),
        );
        transport.bind(Arc::new(InnerNodeCallback::new(handler.clone())))?;

        let stabilizer = Arc::new(Stabilizer::new(
            handler.clone(),
            config.stabilize_interval(),
            config.fix_fingers_interval(),
        ));

        Ok(ChordNode {
            handler,
            stabilizer,
            shutdown,
        })
    }
}
