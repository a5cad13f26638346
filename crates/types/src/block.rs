//! Block-level data exchanged between the chain source, the subscriber and
//! the game logic.

use strum::{AsRefStr, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{ChainTip, Uint256};

/// Whether a block was attached to or detached from the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[strum(serialize_all = "lowercase")]
pub enum BlockEventKind {
    Attach,
    Detach,
}

/// Identifying fields of a block.
///
/// Decoded from the `"block"` object of a notification payload; extra fields
/// in that object are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockHeader {
    pub hash: Uint256,
    pub parent: Uint256,
    pub height: u64,
}

impl BlockHeader {
    pub const fn tip(&self) -> ChainTip {
        ChainTip::new(self.height, self.hash)
    }

    /// The tip the chain falls back to when this block is detached.
    pub fn parent_tip(&self) -> ChainTip {
        ChainTip::new(self.height.saturating_sub(1), self.parent)
    }
}

/// Opaque game state at some block.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GameStateData(pub Vec<u8>);

/// Opaque data that reverses exactly one forward transition.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UndoData(pub Vec<u8>);

macro_rules! opaque_bytes {
    ($ty:ident) => {
        impl $ty {
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<Vec<u8>> for $ty {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl From<&[u8]> for $ty {
            fn from(bytes: &[u8]) -> Self {
                Self(bytes.to_vec())
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({} bytes)", stringify!($ty), self.0.len())
            }
        }
    };
}

opaque_bytes!(GameStateData);
opaque_bytes!(UndoData);
