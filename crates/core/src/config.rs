//! Per node configuration.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_FIX_FINGERS_INTERVAL_MS;
use crate::consts::DEFAULT_MAX_RESEND;
use crate::consts::DEFAULT_RESEND_INTERVAL_MS;
use crate::consts::DEFAULT_RING_WIDTH;
use crate::consts::DEFAULT_RPC_TIMEOUT_MS;
use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::dht::Ring;
use crate::error::Result;

/// Knobs of a [ChordNode](crate::node::ChordNode). Every node of one ring must use the same `ring_width`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// `m`, the ring holds `4^m` ids and each finger table `m` entries.
    pub ring_width: u8,
    /// Period of the stabilize timer.
    pub stabilize_interval_ms: u64,
    /// Period of the fix_fingers timer.
    pub fix_fingers_interval_ms: u64,
    /// Period between resends of an unacknowledged message.
    pub resend_interval_ms: u64,
    /// Resends after the first send before a send fails.
    pub max_resend: u32,
    /// Upper bound of an rpc round trip.
    pub rpc_timeout_ms: u64,
    /// Gossip the advisory membership list.
    pub track_membership: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ring_width: DEFAULT_RING_WIDTH,
            stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
            fix_fingers_interval_ms: DEFAULT_FIX_FINGERS_INTERVAL_MS,
            resend_interval_ms: DEFAULT_RESEND_INTERVAL_MS,
            max_resend: DEFAULT_MAX_RESEND,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            track_membership: false,
        }
    }
}

impl NodeConfig {
    /// Identifier space described by `ring_width`.
    pub fn ring(&self) -> Result<Ring> {
        Ring::new(self.ring_width)
    }

    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_millis(self.stabilize_interval_ms)
    }

    pub fn fix_fingers_interval(&self) -> Duration {
        Duration::from_millis(self.fix_fingers_interval_ms)
    }

    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// How long a flooded packet that arrived ahead of a gap is held back. A missing id not
    /// seen by then has outlived the resend budget of a hop and is given up on.
    pub fn hold_timeout(&self) -> Duration {
        self.resend_interval() * self.max_resend.saturating_add(1)
    }
}
