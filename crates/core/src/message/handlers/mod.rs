#![warn(missing_docs)]
//! This module implemented message handler of ringcast network.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::dht::Did;
use crate::dht::PeerRing;
use crate::error::Error;
use crate::error::Result;
use crate::message::DeliveryQueue;
use crate::message::FloodStream;
use crate::message::Message;
use crate::message::MessageKey;
use crate::message::MessageTracker;
use crate::message::RpcRequest;
use crate::message::RpcResponse;
use crate::node::callback::NodeEvent;
use crate::node::callback::SharedNodeCallback;
use crate::transport::SharedTransport;

/// Operator and Handler for connections and successor recovery
pub mod connection;
/// Executors of [PeerRingAction](crate::dht::PeerRingAction) and lookup
pub mod dht;
/// Operator and Handler for directed messages
pub mod directed;
/// Operator and Handler for flood broadcast
pub mod flood;
/// Membership gossip
pub mod membership;
/// Operator and handler for DHT stablization
pub mod stabilization;

/// Selects the [MessageTracker] a message is accounted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerKind {
    /// The flood tracker of one stream.
    Flood(FloodStream),
    /// The tracker dedicated to one destination.
    Directed(Did),
}

/// MessageHandler will manage resources.
/// It is cheap to clone, every clone shares the same node state.
#[derive(Clone)]
pub struct MessageHandler {
    pub(crate) dht: Arc<PeerRing>,
    pub(crate) transport: SharedTransport,
    flood: Arc<Mutex<MessageTracker>>,
    membership: Arc<Mutex<MessageTracker>>,
    directed: Arc<DashMap<Did, MessageTracker>>,
    inbox: Arc<tokio::sync::Mutex<DeliveryQueue<Bytes>>>,
    callback: Arc<RwLock<SharedNodeCallback>>,
    pub(crate) config: Arc<NodeConfig>,
    pub(crate) shutdown: CancellationToken,
}

/// Generic trait for handle message ,inspired by Actor-Model.
#[async_trait]
pub trait HandleMsg<T> {
    /// Message handler, `sender` is the peer the message came from.
    async fn handle(&self, sender: Did, msg: &T) -> Result<()>;
}

/// Generic trait for answer rpc requests.
#[async_trait]
pub trait HandleRpc<T> {
    /// Rpc handler, `sender` is the peer that asked.
    async fn reply(&self, sender: Did, req: &T) -> Result<RpcResponse>;
}

impl MessageHandler {
    /// Create a new MessageHandler instance.
    pub fn new(
        dht: Arc<PeerRing>,
        transport: SharedTransport,
        config: Arc<NodeConfig>,
        callback: SharedNodeCallback,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dht,
            transport,
            flood: Arc::new(Mutex::new(MessageTracker::new())),
            membership: Arc::new(Mutex::new(MessageTracker::new())),
            directed: Arc::new(DashMap::new()),
            inbox: Arc::new(tokio::sync::Mutex::new(DeliveryQueue::new())),
            callback: Arc::new(RwLock::new(callback)),
            config,
            shutdown,
        }
    }

    /// Get did of self.
    pub fn did(&self) -> Did {
        self.dht.did
    }

    /// Get DHT(Distributed Hash Table) of self.
    pub fn dht(&self) -> Arc<PeerRing> {
        self.dht.clone()
    }

    /// Get the transport of self.
    pub fn transport(&self) -> SharedTransport {
        self.transport.clone()
    }

    pub(crate) fn callback(&self) -> Result<SharedNodeCallback> {
        Ok(self
            .callback
            .read()
            .map_err(|_| Error::CallbackSyncLockError)?
            .clone())
    }

    pub(crate) fn set_callback(&self, callback: SharedNodeCallback) -> Result<()> {
        let mut inner = self
            .callback
            .write()
            .map_err(|_| Error::CallbackSyncLockError)?;
        *inner = callback;
        Ok(())
    }

    /// Report `event` to the application callback.
    pub(crate) async fn emit(&self, event: NodeEvent) {
        let cb = match self.callback() {
            Ok(cb) => cb,
            Err(e) => {
                tracing::error!("Failed to load callback: {:?}", e);
                return;
            }
        };
        if let Err(e) = cb.on_event(&event).await {
            tracing::warn!("Callback on_event {:?} failed: {:?}", event, e);
        }
    }

    /// Run `f` against the tracker selected by `kind`.
    /// The closure runs under the tracker lock and must not block.
    pub fn with_tracker<R>(
        &self,
        kind: TrackerKind,
        f: impl FnOnce(&mut MessageTracker) -> R,
    ) -> Result<R> {
        match kind {
            TrackerKind::Flood(stream) => {
                let tracker = match stream {
                    FloodStream::Data => &self.flood,
                    FloodStream::Membership => &self.membership,
                };
                let mut tracker = tracker.lock().map_err(|_| Error::TrackerSyncLockError)?;
                Ok(f(&mut tracker))
            }
            TrackerKind::Directed(destination) => {
                let mut tracker = self.directed.entry(destination).or_default();
                Ok(f(tracker.value_mut()))
            }
        }
    }

    /// Like [MessageHandler::with_tracker], but never creates a directed tracker.
    /// Returns None when `kind` names a destination without one.
    pub fn with_existing_tracker<R>(
        &self,
        kind: TrackerKind,
        f: impl FnOnce(&mut MessageTracker) -> R,
    ) -> Result<Option<R>> {
        match kind {
            TrackerKind::Flood(_) => self.with_tracker(kind, f).map(Some),
            TrackerKind::Directed(destination) => Ok(self
                .directed
                .get_mut(&destination)
                .map(|mut tracker| f(tracker.value_mut()))),
        }
    }

    /// Drop the tracker of `destination` if it holds nothing.
    pub(crate) fn prune_directed(&self, destination: Did) {
        self.directed.remove_if(&destination, |_, t| t.is_idle());
    }

    /// Whether a tracker for messages toward `destination` exists.
    pub fn has_directed_tracker(&self, destination: Did) -> bool {
        self.directed.contains_key(&destination)
    }

    /// Held while flooded data is accepted and delivered, so deliveries of one
    /// originator reach the callback in id order.
    pub(crate) async fn lock_inbox(&self) -> tokio::sync::MutexGuard<DeliveryQueue<Bytes>> {
        self.inbox.lock().await
    }

    /// Run `job` in the background until it finishes or the node is destroyed.
    /// Failures are logged under `name`.
    pub(crate) fn spawn<F>(&self, name: &'static str, job: F)
    where F: Future<Output = Result<()>> + Send + 'static {
        let shutdown = self.shutdown.clone();
        let did = self.did();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                res = job => {
                    if let Err(e) = res {
                        tracing::warn!("[{}] {} failed: {}", name, did, e);
                    }
                }
            }
        });
    }

    /// Send `msg` to `target` and resend it until `target` acknowledges `key`.
    ///
    /// Fails fast with [Error::AlreadyReceived] if `target` acknowledged before. The pending
    /// receipt handler is dropped on every failure, so a later receipt resolves nothing.
    pub async fn send_to_node(
        &self,
        kind: TrackerKind,
        target: Did,
        key: MessageKey,
        msg: &Message,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel::<()>();
        let registered = self.with_tracker(kind, |t| {
            if t.has_receipt(key, target) {
                return false;
            }
            t.sent_message(
                key,
                target,
                Box::new(move || {
                    let _ = tx.send(());
                }),
            );
            true
        })?;
        if !registered {
            return Err(Error::AlreadyReceived {
                originator: key.originator,
                id: key.id,
                target,
            });
        }

        let ret = self.resend_until_receipt(target, key, msg, rx).await;
        if ret.is_err() {
            self.with_tracker(kind, |t| t.cancel(key, target))?;
        }
        ret
    }

    async fn resend_until_receipt(
        &self,
        target: Did,
        key: MessageKey,
        msg: &Message,
        mut rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        let attempts = self.config.max_resend.saturating_add(1);
        for attempt in 0..attempts {
            if !self.transport.has_connection(target) {
                return Err(Error::ConnectionMissing(target));
            }
            if let Err(e) = self.transport.send_message(target, msg).await {
                tracing::debug!(
                    "send {} to {} failed on attempt {}: {}",
                    key,
                    target,
                    attempt,
                    e
                );
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Error::NodeDestroyed),
                res = &mut rx => {
                    return res.map_err(|_| Error::ResendCancelled {
                        originator: key.originator,
                        id: key.id,
                        target,
                    });
                }
                _ = tokio::time::sleep(self.config.resend_interval()) => {}
            }
        }
        Err(Error::ResendExhausted {
            originator: key.originator,
            id: key.id,
            target,
            attempts,
        })
    }

    /// Dispatch an inbound message from `sender`.
    pub async fn handle_message(&self, sender: Did, msg: &Message) -> Result<()> {
        tracing::trace!("{} received {} from {}", self.did(), msg, sender);
        match msg {
            Message::Packet(ref msg) => self.handle(sender, msg).await,
            Message::Receipt(ref msg) => self.handle(sender, msg).await,
            Message::Directed(ref msg) => self.handle(sender, msg).await,
            Message::DirectedReceipt(ref msg) => self.handle(sender, msg).await,
        }
    }

    /// Dispatch an inbound rpc from `sender` and produce its reply.
    pub async fn handle_rpc(&self, sender: Did, req: &RpcRequest) -> Result<RpcResponse> {
        match req {
            RpcRequest::Notify(ref req) => self.reply(sender, req).await,
            RpcRequest::GetPredecessor => Ok(RpcResponse::Predecessor(self.dht.predecessor()?)),
            RpcRequest::FindSuccessor(ref req) => self.reply(sender, req).await,
            RpcRequest::Update => {
                let handler = self.clone();
                self.spawn("update", async move { handler.stabilize().await });
                Ok(RpcResponse::Ack)
            }
        }
    }
}
