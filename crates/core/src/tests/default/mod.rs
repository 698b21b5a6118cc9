use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ringcast_transport::connections::DummyNetwork;
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::dht::Did;
use crate::error::Result;
use crate::node::callback::NodeCallback;
use crate::node::callback::NodeEvent;
use crate::node::ChordNode;
use crate::node::ChordNodeBuilder;

mod test_dissemination;
mod test_recovery;
mod test_stabilization;

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Everything a node handed to its application callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Broadcast {
        originator: Did,
        id: u64,
        data: Bytes,
    },
    Directed {
        originator: Did,
        id: u64,
        data: Bytes,
    },
    Event(NodeEvent),
}

pub struct RecordCallback {
    tx: mpsc::UnboundedSender<Delivery>,
}

#[async_trait]
impl NodeCallback for RecordCallback {
    async fn on_broadcast(
        &self,
        originator: Did,
        id: u64,
        data: &Bytes,
    ) -> std::result::Result<(), CallbackError> {
        self.tx
            .send(Delivery::Broadcast {
                originator,
                id,
                data: data.clone(),
            })
            .map_err(|e| e.into())
    }

    async fn on_directed(
        &self,
        originator: Did,
        id: u64,
        data: &Bytes,
    ) -> std::result::Result<(), CallbackError> {
        self.tx
            .send(Delivery::Directed {
                originator,
                id,
                data: data.clone(),
            })
            .map_err(|e| e.into())
    }

    async fn on_event(&self, event: &NodeEvent) -> std::result::Result<(), CallbackError> {
        self.tx
            .send(Delivery::Event(event.clone()))
            .map_err(|e| e.into())
    }
}

pub struct Node {
    pub node: ChordNode,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Node {
    pub fn did(&self) -> Did {
        self.node.did()
    }

    pub async fn listen_once(&mut self, timeout: Duration) -> Option<Delivery> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for `n` application payloads, skipping events.
    pub async fn payloads(&mut self, n: usize, timeout: Duration) -> Vec<Delivery> {
        let mut ret = vec![];
        let deadline = tokio::time::Instant::now() + timeout;
        while ret.len() < n {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.listen_once(left).await {
                Some(Delivery::Event(_)) => continue,
                Some(d) => ret.push(d),
                None => break,
            }
        }
        ret
    }

    /// Wait for the first event matching `pred`.
    pub async fn wait_event<F>(&mut self, timeout: Duration, pred: F) -> Option<NodeEvent>
    where F: Fn(&NodeEvent) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.listen_once(left).await? {
                Delivery::Event(e) if pred(&e) => return Some(e),
                _ => continue,
            }
        }
    }

    /// Everything delivered so far without waiting.
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut ret = vec![];
        while let Ok(d) = self.rx.try_recv() {
            ret.push(d);
        }
        ret
    }
}

pub fn did(x: u32) -> Did {
    Did::from(x)
}

pub fn test_config(ring_width: u8) -> NodeConfig {
    NodeConfig {
        ring_width,
        resend_interval_ms: 50,
        max_resend: 10,
        rpc_timeout_ms: 1000,
        ..Default::default()
    }
}

pub fn prepare_node(network: &Arc<DummyNetwork>, did: Did, config: NodeConfig) -> Result<Node> {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = network.transport(&did.to_string());
    let node = ChordNodeBuilder::new(did, transport)
        .config(config)
        .callback(Arc::new(RecordCallback { tx }))
        .build()?;
    Ok(Node { node, rx })
}

/// Create a node for each of `dids`, the first one starts the ring and the others join through it.
pub async fn prepare_ring(
    network: &Arc<DummyNetwork>,
    dids: &[Did],
    config: NodeConfig,
) -> Result<Vec<Node>> {
    let mut nodes = vec![];
    for did in dids {
        nodes.push(prepare_node(network, *did, config.clone())?);
    }
    let Some((first, rest)) = nodes.split_first() else {
        return Ok(nodes);
    };
    first.node.create()?;
    for n in rest {
        n.node.join(first.did()).await?;
        settle().await;
    }
    Ok(nodes)
}

/// Let spawned background work run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub async fn run_stabilize(nodes: &[Node], rounds: usize) {
    for _ in 0..rounds {
        for n in nodes {
            n.node.stabilize().await.unwrap();
        }
        settle().await;
    }
}

pub async fn run_fix_fingers(nodes: &[Node], rounds: usize) {
    for _ in 0..rounds {
        for n in nodes {
            if let Err(e) = n.node.fix_fingers().await {
                tracing::warn!("fix_fingers of {} failed: {}", n.did(), e);
            }
        }
        settle().await;
    }
}

pub fn is_converged(nodes: &[Node]) -> bool {
    let mut dids: Vec<Did> = nodes.iter().map(|n| n.did()).collect();
    dids.sort();
    let len = dids.len();
    nodes.iter().all(|n| {
        let Ok(i) = dids.binary_search(&n.did()) else {
            return false;
        };
        let dht = n.node.dht();
        dht.successor().unwrap() == Some(dids[(i + 1) % len])
            && dht.predecessor().unwrap() == Some(dids[(i + len - 1) % len])
    })
}

/// Run stabilize rounds until the ring is converged. Returns the rounds it took.
pub async fn stabilize_until_converged(nodes: &[Node], max_rounds: usize) -> usize {
    for round in 0..max_rounds {
        if is_converged(nodes) {
            return round;
        }
        run_stabilize(nodes, 1).await;
    }
    assert!(is_converged(nodes), "ring did not converge in {max_rounds} rounds");
    max_rounds
}

/// Build a converged ring with a complete finger table on every node.
pub async fn prepare_converged_ring(
    network: &Arc<DummyNetwork>,
    dids: &[Did],
    config: NodeConfig,
) -> Result<Vec<Node>> {
    let width = config.ring_width as usize;
    let nodes = prepare_ring(network, dids, config).await?;
    stabilize_until_converged(&nodes, 4 * dids.len() + 8).await;
    run_fix_fingers(&nodes, 3 * width).await;
    assert!(is_converged(&nodes));
    Ok(nodes)
}

/// The node responsible for `id`: the smallest did not below `id`, wrapping around.
pub fn owner(dids: &[Did], id: Did) -> Did {
    let mut sorted = dids.to_vec();
    sorted.sort();
    sorted
        .iter()
        .find(|d| **d >= id)
        .copied()
        .unwrap_or(sorted[0])
}

pub fn assert_no_links_changed(nodes: &mut [Node]) {
    for n in nodes.iter_mut() {
        let changes: Vec<Delivery> = n
            .drain()
            .into_iter()
            .filter(|d| matches!(d, Delivery::Event(NodeEvent::ConnectionStateChange { .. })))
            .collect();
        assert!(changes.is_empty(), "{} saw {:?}", n.did(), changes);
    }
}
