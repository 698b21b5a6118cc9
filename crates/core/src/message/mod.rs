//! Message and MessageHandler
pub mod types;
pub use types::*;

pub mod tracker;
pub use tracker::DeliveryQueue;
pub use tracker::MessageKey;
pub use tracker::MessageTracker;

pub mod handlers;
pub use handlers::HandleMsg;
pub use handlers::HandleRpc;
pub use handlers::MessageHandler;
pub use handlers::TrackerKind;
