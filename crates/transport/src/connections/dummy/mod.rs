use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::core::callback::SharedTransportCallback;
use crate::core::transport::ConnectionState;
use crate::core::transport::TransportInterface;
use crate::error::Error;
use crate::error::Result;

/// Max delay in ms on sending message
const DUMMY_DELAY_MAX: u64 = 100;
/// Min delay in ms on sending message
const DUMMY_DELAY_MIN: u64 = 0;

/// Behaviour of the links of a [DummyNetwork].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DummyConfig {
    /// Lower bound of the random delivery delay.
    pub min_delay_ms: u64,
    /// Upper bound of the random delivery delay.
    pub max_delay_ms: u64,
    /// Probability that a fire-and-forget message is lost, in `[0, 1]`.
    pub drop_rate: f64,
    /// Time a link stays in [ConnectionState::Connecting].
    pub channel_open_delay_ms: u64,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: DUMMY_DELAY_MIN,
            max_delay_ms: DUMMY_DELAY_MAX,
            drop_rate: 0.0,
            channel_open_delay_ms: 0,
        }
    }
}

impl DummyConfig {
    /// Links deliver at once and never lose a message.
    pub fn instant() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            drop_rate: 0.0,
            channel_open_delay_ms: 0,
        }
    }

    fn random_delay(&self) -> Duration {
        let ms = if self.max_delay_ms <= self.min_delay_ms {
            self.min_delay_ms
        } else {
            rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms)
        };
        Duration::from_millis(ms)
    }

    fn should_drop(&self) -> bool {
        self.drop_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.drop_rate
    }
}

/// One registered endpoint: its callback and the state of its links, keyed by remote cid.
/// Terminated links are removed from `links`.
#[derive(Default)]
struct Endpoint {
    cid: String,
    callback: RwLock<Option<SharedTransportCallback>>,
    links: DashMap<String, ConnectionState>,
}

impl Endpoint {
    fn new(cid: &str) -> Self {
        Self {
            cid: cid.to_string(),
            ..Default::default()
        }
    }

    fn callback(&self) -> Result<Option<SharedTransportCallback>> {
        self.callback
            .read()
            .map(|cb| cb.clone())
            .map_err(|_| Error::CallbackLock(self.cid.clone()))
    }

    fn link_state(&self, remote: &str) -> Option<ConnectionState> {
        self.links.get(remote).map(|s| *s)
    }

    /// Move the link to `remote` into `state` and report it if anything changed.
    async fn update(&self, remote: &str, state: ConnectionState) {
        let changed = if state.is_terminated() {
            self.links.remove(remote).is_some()
        } else {
            self.links.insert(remote.to_string(), state) != Some(state)
        };
        if !changed {
            return;
        }

        match self.callback() {
            Ok(Some(cb)) => {
                if let Err(e) = cb.on_peer_connection_state_change(remote, state).await {
                    tracing::error!("Callback on_peer_connection_state_change failed: {e:?}");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to load callback of {}: {e:?}", self.cid),
        }
    }
}

/// An in-memory network. Every [DummyTransport] created from it registers an endpoint here.
/// Networks are plain values, so independent networks can coexist in one process.
pub struct DummyNetwork {
    config: DummyConfig,
    endpoints: DashMap<String, Arc<Endpoint>>,
}

impl DummyNetwork {
    /// Create a new network whose links behave according to `config`.
    pub fn new(config: DummyConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            endpoints: DashMap::new(),
        })
    }

    /// Behaviour of the links.
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Register the endpoint `cid` and return its transport.
    /// An endpoint registered earlier under the same cid is replaced.
    pub fn transport(self: &Arc<Self>, cid: &str) -> DummyTransport {
        self.endpoints
            .insert(cid.to_string(), Arc::new(Endpoint::new(cid)));
        DummyTransport {
            cid: cid.to_string(),
            network: self.clone(),
        }
    }

    /// Connection ids of all registered endpoints.
    pub fn endpoint_ids(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.key().clone()).collect()
    }

    fn endpoint(&self, cid: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.get(cid).map(|e| e.value().clone())
    }
}

/// The transport of one endpoint of a [DummyNetwork].
pub struct DummyTransport {
    cid: String,
    network: Arc<DummyNetwork>,
}

impl DummyTransport {
    /// The network this transport is registered on.
    pub fn network(&self) -> Arc<DummyNetwork> {
        self.network.clone()
    }

    fn local(&self) -> Result<Arc<Endpoint>> {
        self.network
            .endpoint(&self.cid)
            .ok_or_else(|| Error::ConnectionReleased(self.cid.clone()))
    }

    /// Both ends of the link to `cid`, only if it is fully established.
    fn established(&self, cid: &str) -> Result<Arc<Endpoint>> {
        let local = self.local()?;
        if local.link_state(cid) != Some(ConnectionState::Connected) {
            return Err(Error::ConnectionNotFound(cid.to_string()));
        }
        self.network
            .endpoint(cid)
            .ok_or_else(|| Error::ConnectionReleased(cid.to_string()))
    }
}

#[async_trait]
impl TransportInterface for DummyTransport {
    type Error = Error;

    fn cid(&self) -> &str {
        &self.cid
    }

    fn set_callback(&self, callback: SharedTransportCallback) -> Result<()> {
        let local = self.local()?;
        let mut slot = local
            .callback
            .write()
            .map_err(|_| Error::CallbackLock(self.cid.clone()))?;
        *slot = Some(callback);
        Ok(())
    }

    async fn connect(&self, cid: &str) -> Result<()> {
        if cid == self.cid {
            return Err(Error::ConnectSelf);
        }
        let local = self.local()?;
        let remote = self
            .network
            .endpoint(cid)
            .ok_or_else(|| Error::PeerNotFound(cid.to_string()))?;
        if local.link_state(cid).map(|s| s.is_alive()).unwrap_or(false) {
            return Ok(());
        }

        local.update(cid, ConnectionState::Connecting).await;
        remote.update(&self.cid, ConnectionState::Connecting).await;

        if self.network.config.channel_open_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(
                self.network.config.channel_open_delay_ms,
            ))
            .await;
        }

        // either end may have been closed while the link was opening
        if self.network.endpoint(cid).is_none() {
            local.update(cid, ConnectionState::Failed).await;
            return Err(Error::PeerNotFound(cid.to_string()));
        }
        if self.network.endpoint(&self.cid).is_none() {
            return Err(Error::ConnectionReleased(self.cid.clone()));
        }

        local.update(cid, ConnectionState::Connected).await;
        remote.update(&self.cid, ConnectionState::Connected).await;
        Ok(())
    }

    async fn disconnect(&self, cid: &str) -> Result<()> {
        let local = self.local()?;
        if local.link_state(cid).is_none() {
            return Err(Error::ConnectionNotFound(cid.to_string()));
        }
        local.update(cid, ConnectionState::Closed).await;

        // simulate remote closing
        if let Some(remote) = self.network.endpoint(cid) {
            remote
                .update(&self.cid, ConnectionState::Disconnected)
                .await;
        }
        Ok(())
    }

    fn connection_state(&self, cid: &str) -> Option<ConnectionState> {
        self.local().ok()?.link_state(cid)
    }

    fn connection_ids(&self) -> Vec<String> {
        self.local()
            .map(|local| local.links.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default()
    }

    fn peer_ids(&self) -> Vec<String> {
        self.network
            .endpoints
            .iter()
            .map(|e| e.key().clone())
            .filter(|cid| cid != &self.cid)
            .collect()
    }

    async fn send_message(&self, cid: &str, msg: Bytes) -> Result<()> {
        let remote = self.established(cid)?;
        if self.network.config.should_drop() {
            tracing::debug!("dummy network dropped message {} -> {}", self.cid, cid);
            return Ok(());
        }

        let delay = self.network.config.random_delay();
        let from = self.cid.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // the link may have been torn down in flight
            if remote.link_state(&from).is_none() {
                return;
            }
            match remote.callback() {
                Ok(Some(cb)) => {
                    if let Err(e) = cb.on_message(&from, &msg).await {
                        tracing::error!("Callback on_message failed: {e:?}")
                    }
                }
                Ok(None) => tracing::debug!("{} has no callback, message dropped", remote.cid),
                Err(e) => tracing::error!("Failed to load callback: {e:?}"),
            }
        });
        Ok(())
    }

    async fn request(&self, cid: &str, msg: Bytes) -> Result<Bytes> {
        let remote = self.established(cid)?;
        let delay = self.network.config.random_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let cb = remote
            .callback()?
            .ok_or_else(|| Error::CallbackMissing(cid.to_string()))?;
        cb.on_request(&self.cid, &msg)
            .await
            .map_err(|e| Error::RequestFailed(cid.to_string(), e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let Some((_, local)) = self.network.endpoints.remove(&self.cid) else {
            return Ok(());
        };
        {
            let mut slot = local
                .callback
                .write()
                .map_err(|_| Error::CallbackLock(self.cid.clone()))?;
            *slot = None;
        }

        let peers: Vec<String> = local.links.iter().map(|e| e.key().clone()).collect();
        for peer in peers {
            local.update(&peer, ConnectionState::Closed).await;
            if let Some(remote) = self.network.endpoint(&peer) {
                remote
                    .update(&self.cid, ConnectionState::Disconnected)
                    .await;
            }
        }
        Ok(())
    }
}
