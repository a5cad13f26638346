//! Chain variants and the tip record tracked by the sync engine.

use strum::{AsRefStr, Display, EnumString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Uint256;

/// Network the chain source is running on.
///
/// Game logic may define different initial states per network. The integer
/// values are stable and part of the buffered game-logic boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Chain {
    Main,
    Test,
    Regtest,
}

impl Chain {
    pub const fn as_int(self) -> i32 {
        match self {
            Chain::Main => 1,
            Chain::Test => 2,
            Chain::Regtest => 3,
        }
    }

    pub const fn from_int(value: i32) -> Option<Self> {
        match value {
            1 => Some(Chain::Main),
            2 => Some(Chain::Test),
            3 => Some(Chain::Regtest),
            _ => None,
        }
    }
}

/// The block a local game state corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainTip {
    pub height: u64,
    pub hash: Uint256,
}

impl ChainTip {
    pub const fn new(height: u64, hash: Uint256) -> Self {
        Self { height, hash }
    }
}

impl std::fmt::Display for ChainTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}
