//! Move tally demo game, written against the buffered calling convention.
//!
//! The state is the list of per-block move counts as little-endian `u32`s, so
//! it outgrows the initial buffer after a few hundred blocks.

use serde_json::Value;

use gamesync_runtime::logic::{
    BufferedCallee, CallStatus, ForwardWritten, InitialStateWritten, NamesWritten,
};
use gamesync_types::{ChainTip, UINT256_HEX_LEN};

pub const GAME_ID: &str = "tally";

const COUNT_BYTES: usize = 4;

pub struct MoveTally {
    initial: ChainTip,
}

impl MoveTally {
    pub fn new(initial: ChainTip) -> Self {
        Self { initial }
    }
}

/// Copy `bytes` into `out` if they fit.
fn write(out: &mut [u8], bytes: &[u8]) -> Option<usize> {
    let target = out.get_mut(..bytes.len())?;
    target.copy_from_slice(bytes);
    Some(bytes.len())
}

fn move_count(block: &str) -> u32 {
    serde_json::from_str::<Value>(block)
        .ok()
        .and_then(|block| block["moves"].as_array().map(Vec::len))
        .and_then(|len| u32::try_from(len).ok())
        .unwrap_or(0)
}

impl BufferedCallee for MoveTally {
    fn get_names(
        &mut self,
        id: &mut [u8],
        name: &mut [u8],
        version: &mut [u8],
    ) -> CallStatus<NamesWritten> {
        let fields: [&[u8]; 3] = [
            GAME_ID.as_bytes(),
            b"Move tally",
            env!("CARGO_PKG_VERSION").as_bytes(),
        ];
        let longest = fields.iter().map(|f| f.len()).max().unwrap_or(0);

        match (
            write(id, fields[0]),
            write(name, fields[1]),
            write(version, fields[2]),
        ) {
            (Some(id), Some(name), Some(version)) => {
                CallStatus::Complete(NamesWritten { id, name, version })
            }
            _ => CallStatus::BufferTooSmall(longest),
        }
    }

    fn get_initial_state(
        &mut self,
        _chain: i32,
        _state: &mut [u8],
        hash_hex: &mut [u8; UINT256_HEX_LEN],
    ) -> CallStatus<InitialStateWritten> {
        hash_hex.copy_from_slice(self.initial.hash.to_hex().as_bytes());
        CallStatus::Complete(InitialStateWritten {
            state: 0,
            height: self.initial.height,
        })
    }

    fn process_forward(
        &mut self,
        _chain: i32,
        old_state: &[u8],
        block: &str,
        new_state: &mut [u8],
        _undo: &mut [u8],
    ) -> CallStatus<ForwardWritten> {
        let mut next = old_state.to_vec();
        next.extend_from_slice(&move_count(block).to_le_bytes());

        match write(new_state, &next) {
            Some(written) => CallStatus::Complete(ForwardWritten {
                new_state: written,
                undo: 0,
            }),
            None => CallStatus::BufferTooSmall(next.len()),
        }
    }

    fn process_backwards(
        &mut self,
        _chain: i32,
        new_state: &[u8],
        _block: &str,
        _undo: &[u8],
        old_state: &mut [u8],
    ) -> CallStatus<usize> {
        let previous = &new_state[..new_state.len().saturating_sub(COUNT_BYTES)];
        match write(old_state, previous) {
            Some(written) => CallStatus::Complete(written),
            None => CallStatus::BufferTooSmall(previous.len()),
        }
    }
}
