#![allow(missing_docs)]

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Connection {0} not found, should connect first")]
    ConnectionNotFound(String),

    #[error("Connection {0} is released")]
    ConnectionReleased(String),

    #[error("Peer {0} is not registered on this network")]
    PeerNotFound(String),

    #[error("Should not connect to self")]
    ConnectSelf,

    #[error("Callback of {0} is missing")]
    CallbackMissing(String),

    #[error("Callback lock of {0} is poisoned")]
    CallbackLock(String),

    #[error("Request to {0} failed: {1}")]
    RequestFailed(String, String),
}
