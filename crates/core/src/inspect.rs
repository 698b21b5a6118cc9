//! Serializable snapshots of node state, for tests and reports.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::PeerRing;
use crate::node::ChordNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInspect {
    pub dht: DHTInspect,
    pub neighbors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DHTInspect {
    pub did: String,
    #[serde(default)]
    pub successor: Option<String>,
    #[serde(default)]
    pub predecessor: Option<String>,
    #[serde(default)]
    pub temp_successor: Option<String>,
    /// Runs of equal fingers as `(finger, first index, last index)`.
    pub finger_table: Vec<(Option<String>, u64, u64)>,
    #[serde(default)]
    pub node_list: Option<Vec<String>>,
}

impl NodeInspect {
    pub fn inspect(node: &ChordNode) -> Self {
        Self {
            dht: DHTInspect::inspect(&node.dht()),
            neighbors: node.neighbors().iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl DHTInspect {
    pub fn inspect(dht: &PeerRing) -> Self {
        let did = dht.did.to_string();
        let successor = dht.successor().ok().flatten().map(|x| x.to_string());
        let predecessor = dht.predecessor().ok().flatten().map(|x| x.to_string());
        let temp_successor = dht.temp_successor().ok().flatten().map(|x| x.to_string());

        let finger_table = {
            dht.lock_finger()
                .map(|ft| {
                    let finger = ft.list().iter().map(|x| x.map(|did| did.to_string()));
                    compress_iter(finger)
                })
                .unwrap_or_default()
        };

        let node_list = dht
            .membership_list()
            .ok()
            .flatten()
            .map(|list| list.iter().map(|d| d.to_string()).collect());

        Self {
            did,
            successor,
            predecessor,
            temp_successor,
            finger_table,
            node_list,
        }
    }
}

pub fn compress_iter<T>(iter: impl Iterator<Item = T>) -> Vec<(T, u64, u64)>
where T: PartialEq {
    let mut result = vec![];
    let mut start = 0u64;
    let mut count = 0u64;
    let mut prev: Option<T> = None;

    for (i, x) in iter.enumerate() {
        match prev {
            Some(p) if p == x => {
                count += 1;
            }
            _ => {
                if let Some(p) = prev {
                    result.push((p, start, start + count - 1));
                }
                start = i as u64;
                count = 1;
            }
        }
        prev = Some(x);
    }

    if let Some(p) = prev {
        result.push((p, start, start + count - 1));
    }

    result
}
