#![warn(missing_docs)]

//! This module defines the identifier space of a ringcast network.
//!
//! A [Did] is a point of the finite cyclic group Z/(4^m), where `m` is the ring width
//! carried by [Ring]. The width is a per-ring value, so rings of different sizes can
//! live side by side in one process.
//!
//! ## Textual form
//!
//! A Did is always rendered as 32 lower-case hex digits, which is also the connection id
//! handed to transports. Parsing accepts an optional `0x` prefix.
//!
//! ## Ordering
//!
//! The derived [Ord] of a Did is the linear order of its integer value. All protocol decisions
//! use the circular order instead, through [between] and the distance helpers of [Ring].

use std::str::FromStr;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Widest ring supported, `4^64 = 2^128`.
pub const MAX_RING_WIDTH: u8 = 64;

/// Did is an element of the ring Z/(4^m), wrapping u128.
#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize, Hash, Default)]
pub struct Did(u128);

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl std::fmt::Debug for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Did(0x{:x})", self.0)
    }
}

impl From<u128> for Did {
    fn from(id: u128) -> Did {
        Self(id)
    }
}

impl From<u64> for Did {
    fn from(id: u64) -> Did {
        Self(id as u128)
    }
}

impl From<u32> for Did {
    fn from(id: u32) -> Did {
        Self(id as u128)
    }
}

impl From<Did> for u128 {
    fn from(did: Did) -> u128 {
        did.0
    }
}

impl FromStr for Did {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if hex.is_empty() || hex.len() > 32 {
            return Err(Error::InvalidDid(s.to_string()));
        }
        u128::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| Error::InvalidDid(s.to_string()))
    }
}

/// Test `b` in the open interval `(a, c)` walking clockwise.
///
/// When `a == c` the interval covers the whole ring except `a` itself.
pub fn between(a: Did, b: Did, c: Did) -> bool {
    if a < c {
        a < b && b < c
    } else {
        a < b || b < c
    }
}

/// Ring describes the identifier space Z/(4^m) for a given width `m`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ring {
    width: u8,
}

impl Ring {
    /// Create a ring of size `4^width`. The width must lie in `1..=64`.
    pub fn new(width: u8) -> Result<Self> {
        if width == 0 || width > MAX_RING_WIDTH {
            return Err(Error::InvalidRingWidth(width));
        }
        Ok(Self { width })
    }

    /// Ring width `m`, also the finger table length.
    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Bits of the identifier space, `2m`.
    pub fn bits(&self) -> u32 {
        2 * self.width as u32
    }

    fn mask(&self) -> u128 {
        if self.bits() >= 128 {
            u128::MAX
        } else {
            (1u128 << self.bits()) - 1
        }
    }

    /// Ring size `4^m`, or None when it overflows u128 (`m = 64`).
    pub fn size(&self) -> Option<u128> {
        1u128.checked_shl(self.bits())
    }

    /// Largest identifier of the ring.
    pub fn max(&self) -> Did {
        Did(self.mask())
    }

    /// Whether a Did is a member of this ring.
    pub fn contains(&self, did: Did) -> bool {
        did.0 & !self.mask() == 0
    }

    /// Reduce an arbitrary integer into the ring.
    pub fn wrap(&self, value: u128) -> Did {
        Did(value & self.mask())
    }

    /// `did + offset (mod 4^m)`
    pub fn add(&self, did: Did, offset: u128) -> Did {
        self.wrap(did.0.wrapping_add(offset))
    }

    /// Offset of finger `index`, `4^index`.
    pub fn finger_offset(&self, index: usize) -> u128 {
        1u128 << (2 * index as u32)
    }

    /// Identifier finger `index` of `did` is responsible for: `did + 4^index (mod 4^m)`.
    pub fn finger_start(&self, did: Did, index: usize) -> Did {
        self.add(did, self.finger_offset(index))
    }

    /// Clockwise distance walking from `from` to `to`.
    pub fn clockwise(&self, from: Did, to: Did) -> u128 {
        to.0.wrapping_sub(from.0) & self.mask()
    }

    /// Symmetric ring distance, `min(clockwise, counter-clockwise)`.
    pub fn distance(&self, a: Did, b: Did) -> u128 {
        std::cmp::min(self.clockwise(a, b), self.clockwise(b, a))
    }

    /// Draw a uniformly random member of the ring.
    pub fn random_did<R: Rng + ?Sized>(&self, rng: &mut R) -> Did {
        self.wrap(rng.gen::<u128>())
    }
}

/// Ordering with a did reference.
/// Sorts ids by clockwise distance from an origin, so the origin's successor comes first.
pub trait SortRing {
    /// Sort in place, walking clockwise from `origin` on `ring`.
    fn sort_ring(&mut self, ring: Ring, origin: Did);
}

impl SortRing for Vec<Did> {
    fn sort_ring(&mut self, ring: Ring, origin: Did) {
        self.sort_by_key(|did| ring.clockwise(origin, *did));
    }
}
