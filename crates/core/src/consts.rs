//! Constant variables.

/// Ring width used when none is configured, a ring of `4^8 = 65536` ids.
pub const DEFAULT_RING_WIDTH: u8 = 8;
/// Interval between two stabilize rounds, in ms.
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 3000;
/// Interval between two fix_fingers rounds, in ms.
pub const DEFAULT_FIX_FINGERS_INTERVAL_MS: u64 = 3000;
/// Interval between two sends of an unacknowledged message, in ms.
pub const DEFAULT_RESEND_INTERVAL_MS: u64 = 1000;
/// Resends after the first send before giving up.
pub const DEFAULT_MAX_RESEND: u32 = 5;
/// Upper bound of a single rpc round trip, in ms.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5000;
