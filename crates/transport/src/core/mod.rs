//! The main concepts of this mod are:
//!
//! The [TransportInterface](transport::TransportInterface) trait should be
//! implemented by every transport. It manages links to remote endpoints, identified by
//! connection id, and carries opaque bytes over them. See the [transport] module.
//!
//! The [TransportCallback](callback::TransportCallback) trait is used to let user handle
//! the events of a transport, including link state change, incoming messages and
//! incoming requests. See the [callback] module.

pub mod callback;
pub mod transport;
