//! Run a ring of in-memory nodes, let it converge, then push traffic through it.
//!
//! Nodes are linked by a [DummyNetwork]. They join one after another through their successor,
//! stabilize in rounds driven from here until every successor and predecessor is the true
//! neighbor, then send broadcasts and directed messages from random members.
//! The [Report] tells how many of them arrived and how often anything arrived twice.
use std::collections::BTreeSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use ringcast_core::dht::Did;
use ringcast_core::dht::Ring;
use ringcast_core::inspect::NodeInspect;
use ringcast_core::node::callback::NodeCallback;
use ringcast_core::node::ChordNode;
use ringcast_core::node::ChordNodeBuilder;
use ringcast_transport::connections::DummyNetwork;
use serde::Deserialize;
use serde::Serialize;

use crate::config::Config;
use crate::error::Error;
use crate::error::Result;

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

const ROUND_PAUSE: Duration = Duration::from_millis(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub seed: u64,
    /// Stabilize rounds until every link of the ring was right.
    pub converged_after: usize,
    pub broadcasts: usize,
    pub broadcast_deliveries: usize,
    pub expected_broadcast_deliveries: usize,
    pub directed: usize,
    pub directed_deliveries: usize,
    /// Payloads handed to the same node more than once.
    pub duplicates: usize,
    /// Fingers not pointing at the owner of their start when traffic began.
    pub finger_mismatches: usize,
    pub nodes: Vec<NodeInspect>,
}

impl Report {
    /// Whether every finger was exact and every payload reached every node it was meant for,
    /// exactly once.
    pub fn is_complete(&self) -> bool {
        self.duplicates == 0
            && self.finger_mismatches == 0
            && self.broadcast_deliveries == self.expected_broadcast_deliveries
            && self.directed_deliveries == self.directed
    }
}

/// Deliveries of all nodes, keyed by `(receiver, originator, id)`.
#[derive(Default)]
struct DeliveryLog {
    broadcasts: Mutex<BTreeSet<(Did, Did, u64)>>,
    directed: Mutex<BTreeSet<(Did, Did, u64)>>,
    duplicates: AtomicUsize,
}

impl DeliveryLog {
    fn record(
        &self,
        set: &Mutex<BTreeSet<(Did, Did, u64)>>,
        entry: (Did, Did, u64),
    ) -> std::result::Result<(), CallbackError> {
        let mut set = set
            .lock()
            .map_err(|e| CallbackError::from(format!("delivery log poisoned: {}", e)))?;
        if !set.insert(entry) {
            tracing::warn!("{} got {}:{} twice", entry.0, entry.1, entry.2);
            self.duplicates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn counts(&self) -> Result<(usize, usize)> {
        let broadcasts = self
            .broadcasts
            .lock()
            .map_err(|_| Error::InvalidSimulation("delivery log poisoned".to_string()))?
            .len();
        let directed = self
            .directed
            .lock()
            .map_err(|_| Error::InvalidSimulation("delivery log poisoned".to_string()))?
            .len();
        Ok((broadcasts, directed))
    }
}

struct Recorder {
    did: Did,
    log: Arc<DeliveryLog>,
}

#[async_trait]
impl NodeCallback for Recorder {
    async fn on_broadcast(
        &self,
        originator: Did,
        id: u64,
        _data: &Bytes,
    ) -> std::result::Result<(), CallbackError> {
        self.log
            .record(&self.log.broadcasts, (self.did, originator, id))
    }

    async fn on_directed(
        &self,
        originator: Did,
        id: u64,
        _data: &Bytes,
    ) -> std::result::Result<(), CallbackError> {
        self.log.record(&self.log.directed, (self.did, originator, id))
    }
}

/// Distinct random dids of `ring`, in the order they will join.
fn random_dids(ring: Ring, n: usize, rng: &mut StdRng) -> Vec<Did> {
    let mut seen = BTreeSet::new();
    let mut dids = vec![];
    while dids.len() < n {
        let did = ring.random_did(rng);
        if seen.insert(did) {
            dids.push(did);
        }
    }
    dids
}

/// Every node points at its true successor and predecessor.
pub fn is_converged(nodes: &[ChordNode]) -> bool {
    let mut dids: Vec<Did> = nodes.iter().map(|n| n.did()).collect();
    dids.sort();
    let len = dids.len();
    if len < 2 {
        return true;
    }
    nodes.iter().all(|n| {
        let Ok(i) = dids.binary_search(&n.did()) else {
            return false;
        };
        let dht = n.dht();
        dht.successor().ok().flatten() == Some(dids[(i + 1) % len])
            && dht.predecessor().ok().flatten() == Some(dids[(i + len - 1) % len])
    })
}

/// The member of sorted `dids` responsible for `id`: the first one not below it, wrapping.
fn owner_of(dids: &[Did], id: Did) -> Option<Did> {
    let i = dids.partition_point(|d| *d < id);
    dids.get(i).or_else(|| dids.first()).copied()
}

/// Count fingers `1..width` that differ from the owner of their start.
/// A start owned by the node itself is never stored, so those entries must stay empty.
pub fn finger_mismatches(ring: Ring, nodes: &[ChordNode]) -> Result<usize> {
    let mut dids: Vec<Did> = nodes.iter().map(|n| n.did()).collect();
    dids.sort();
    let mut mismatches = 0;
    for n in nodes {
        let dht = n.dht();
        let finger = dht.lock_finger()?;
        for index in 1..finger.size() {
            let ideal = owner_of(&dids, ring.finger_start(n.did(), index))
                .filter(|owner| *owner != n.did());
            if ideal.is_some() && finger.get(index) != ideal {
                tracing::warn!(
                    "finger {} of {} is {:?}, expected {:?}",
                    index,
                    n.did(),
                    finger.get(index),
                    ideal
                );
                mismatches += 1;
            }
        }
    }
    Ok(mismatches)
}

async fn stabilize_round(nodes: &[ChordNode]) {
    for n in nodes {
        if let Err(e) = n.stabilize().await {
            tracing::warn!("stabilize of {} failed: {}", n.did(), e);
        }
    }
    tokio::time::sleep(ROUND_PAUSE).await;
}

async fn fix_fingers_round(nodes: &[ChordNode]) {
    for n in nodes {
        if let Err(e) = n.fix_fingers().await {
            tracing::debug!("fix_fingers of {} failed: {}", n.did(), e);
        }
    }
    tokio::time::sleep(ROUND_PAUSE).await;
}

/// Build the nodes of `dids` one by one into `nodes`. The first one starts the ring,
/// every later one joins through its successor among the nodes joined before it.
async fn build_ring(
    config: &Config,
    network: &Arc<DummyNetwork>,
    dids: &[Did],
    log: &Arc<DeliveryLog>,
    nodes: &mut Vec<ChordNode>,
) -> Result<()> {
    for did in dids {
        let node = ChordNodeBuilder::new(*did, network.transport(&did.to_string()))
            .config(config.node.clone())
            .callback(Arc::new(Recorder {
                did: *did,
                log: log.clone(),
            }))
            .build()?;
        nodes.push(node.clone());
        // every endpoint of the network but this one has joined already
        match node.handler().transport().query_successors().first() {
            Some(successor) => node.join(*successor).await?,
            None => node.create()?,
        }
        tracing::debug!("{} joined", did);
        tokio::time::sleep(ROUND_PAUSE).await;
    }
    Ok(())
}

async fn send_traffic(
    config: &Config,
    nodes: &[ChordNode],
    rng: &mut StdRng,
) -> Result<(usize, usize)> {
    let sim = &config.simulation;
    let mut broadcasts = 0;
    for i in 0..sim.broadcasts {
        let origin = &nodes[rng.gen_range(0..nodes.len())];
        let id = origin
            .broadcast(Bytes::from(format!("broadcast {}", i)))
            .await?;
        tracing::info!("{} broadcast {}", origin.did(), id);
        broadcasts += 1;
    }

    let mut directed = 0;
    if nodes.len() > 1 {
        for i in 0..sim.directed {
            let from = rng.gen_range(0..nodes.len());
            let to = (from + rng.gen_range(1..nodes.len())) % nodes.len();
            let destination = nodes[to].did();
            let id = nodes[from]
                .directed_send(destination, Bytes::from(format!("directed {}", i)))
                .await?;
            tracing::info!("{} sent {} to {}", nodes[from].did(), id, destination);
            directed += 1;
        }
    }
    Ok((broadcasts, directed))
}

/// Run the simulation described by `config`. Every node is destroyed before this returns.
pub async fn run(config: Config) -> Result<Report> {
    let sim = config.simulation.clone();
    let ring = config.node.ring()?;
    if sim.nodes == 0 {
        return Err(Error::InvalidSimulation("no nodes".to_string()));
    }
    if ring.size().is_some_and(|size| size < sim.nodes as u128) {
        return Err(Error::InvalidSimulation(format!(
            "{} nodes do not fit a ring of width {}",
            sim.nodes,
            ring.width()
        )));
    }

    let mut rng = StdRng::seed_from_u64(sim.seed);
    let dids = random_dids(ring, sim.nodes, &mut rng);
    let network = DummyNetwork::new(config.network.clone());
    let log = Arc::new(DeliveryLog::default());

    let mut nodes = vec![];
    let res = match build_ring(&config, &network, &dids, &log, &mut nodes).await {
        Ok(()) => drive(&config, &nodes, &log, &mut rng).await,
        Err(e) => Err(e),
    };
    let destroyed = futures::future::join_all(nodes.iter().map(|n| n.destroy())).await;
    for (n, r) in nodes.iter().zip(destroyed) {
        if let Err(e) = r {
            tracing::warn!("destroy {} failed: {}", n.did(), e);
        }
    }
    res
}

async fn drive(
    config: &Config,
    nodes: &[ChordNode],
    log: &DeliveryLog,
    rng: &mut StdRng,
) -> Result<Report> {
    let sim = &config.simulation;
    let mut converged_after = None;
    for round in 0..=sim.rounds {
        if is_converged(nodes) {
            converged_after = Some(round);
            break;
        }
        if round < sim.rounds {
            stabilize_round(nodes).await;
            fix_fingers_round(nodes).await;
        }
    }
    let Some(converged_after) = converged_after else {
        return Err(Error::NotConverged(sim.rounds));
    };
    tracing::info!("ring converged after {} rounds", converged_after);

    for _ in 0..3 * config.node.ring_width as usize {
        fix_fingers_round(nodes).await;
    }

    let finger_mismatches = finger_mismatches(config.node.ring()?, nodes)?;
    let (broadcasts, directed) = send_traffic(config, nodes, rng).await?;
    let expected_broadcast_deliveries = broadcasts * (nodes.len() - 1);

    // every packet is either acknowledged or given up on within the resend budget,
    // and data held behind a lost id waits one more hold timeout
    let budget = config.node.resend_interval() * (config.node.max_resend + 2)
        + config.node.hold_timeout()
        + config.node.rpc_timeout();
    let deadline = tokio::time::Instant::now() + budget;
    let (mut broadcast_deliveries, mut directed_deliveries) = log.counts()?;
    while (broadcast_deliveries < expected_broadcast_deliveries || directed_deliveries < directed)
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(POLL_INTERVAL).await;
        (broadcast_deliveries, directed_deliveries) = log.counts()?;
    }

    Ok(Report {
        seed: sim.seed,
        converged_after,
        broadcasts,
        broadcast_deliveries,
        expected_broadcast_deliveries,
        directed,
        directed_deliveries,
        duplicates: log.duplicates.load(Ordering::SeqCst),
        finger_mismatches,
        nodes: nodes.iter().map(|n| n.inspect()).collect(),
    })
}
