//! This module defines the callback a transport reports to.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::transport::ConnectionState;

/// Any error raised by a callback. Transports only log it.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Callback shared between a transport and its delivery tasks.
pub type SharedTransportCallback = Arc<dyn TransportCallback + Send + Sync>;

/// Implement this trait to handle the events of a transport.
/// All methods take the connection id of the remote end.
#[async_trait]
pub trait TransportCallback {
    /// Invoked when a fire-and-forget message arrives.
    async fn on_message(&self, _cid: &str, _msg: &[u8]) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Invoked when a request arrives. The returned bytes are the response.
    async fn on_request(&self, cid: &str, msg: &[u8]) -> Result<Bytes, CallbackError>;

    /// Invoked when the state of the link to `cid` has changed.
    async fn on_peer_connection_state_change(
        &self,
        _cid: &str,
        _state: ConnectionState,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}
