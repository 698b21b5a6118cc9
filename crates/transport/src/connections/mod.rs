//! Transport implementations.
//! Only an in-memory `DummyTransport` is provided, for testing and simulation.

#[cfg(feature = "dummy")]
mod dummy;

#[cfg(feature = "dummy")]
pub use crate::connections::dummy::DummyConfig;
#[cfg(feature = "dummy")]
pub use crate::connections::dummy::DummyNetwork;
#[cfg(feature = "dummy")]
pub use crate::connections::dummy::DummyTransport;
