//! This module defines the interface every transport implements.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::core::callback::SharedTransportCallback;

/// State of a link, modeled after the peer connection states of webrtc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Link object created, nothing exchanged yet.
    New,
    /// Handshake in progress.
    Connecting,
    /// Link usable in both directions.
    Connected,
    /// Remote end went away.
    Disconnected,
    /// Handshake or link failed.
    Failed,
    /// Link closed locally.
    Closed,
}

impl ConnectionState {
    /// The link is established or about to be.
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::New | Self::Connecting | Self::Connected)
    }

    /// The link is gone and will not come back.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// A transport manages the links of one endpoint. Remote endpoints are identified
/// by connection id, `cid` in short.
#[async_trait]
pub trait TransportInterface {
    /// The error type of the transport.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connection id of this endpoint.
    fn cid(&self) -> &str;

    /// Install the callback inbound traffic and state changes are reported to.
    fn set_callback(&self, callback: SharedTransportCallback) -> Result<(), Self::Error>;

    /// Open a link to `cid`. Opening a link that is already alive is a no-op.
    async fn connect(&self, cid: &str) -> Result<(), Self::Error>;

    /// Tear down the link to `cid`.
    async fn disconnect(&self, cid: &str) -> Result<(), Self::Error>;

    /// State of the link to `cid`, None when there is no link.
    fn connection_state(&self, cid: &str) -> Option<ConnectionState>;

    /// Connection ids of all links that are alive.
    fn connection_ids(&self) -> Vec<String>;

    /// Connection ids of the endpoints this transport knows how to reach, self excluded.
    fn peer_ids(&self) -> Vec<String>;

    /// Fire-and-forget send over the link to `cid`.
    async fn send_message(&self, cid: &str, msg: Bytes) -> Result<(), Self::Error>;

    /// Send a request over the link to `cid` and wait for its response.
    async fn request(&self, cid: &str, msg: Bytes) -> Result<Bytes, Self::Error>;

    /// Close every link and stop reporting to the callback.
    async fn close(&self) -> Result<(), Self::Error>;
}
