//! Adapter for game logic exposed through caller-allocated output buffers.
//!
//! Each call receives buffers of the current size. When an output does not
//! fit, the callee reports how many bytes it needs and the call is repeated
//! with larger buffers. Inputs are passed as raw bytes and compact JSON text,
//! and the network as its integer code.

use serde_json::Value;
use tracing::debug;

use gamesync_types::{Chain, GameStateData, UINT256_HEX_LEN, Uint256, UndoData};

use super::{ForwardOutput, GameLogic, GameLogicError, GameNames, InitialState, Result};

/// Buffer size used for the first attempt of every call.
pub const INITIAL_BUFFER_SIZE: usize = 1024;

/// Outcome of one buffered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus<T> {
    /// All outputs were written.
    Complete(T),
    /// Some output needs at least this many bytes.
    BufferTooSmall(usize),
}

/// Bytes written into each names buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamesWritten {
    pub id: usize,
    pub name: usize,
    pub version: usize,
}

/// Initial state output. The block hash is written as hex text into its own
/// fixed-size buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialStateWritten {
    pub state: usize,
    pub height: u64,
}

/// Bytes written into the new-state and undo buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardWritten {
    pub new_state: usize,
    pub undo: usize,
}

/// Game logic operations over caller-allocated buffers.
pub trait BufferedCallee: Send {
    fn get_names(
        &mut self,
        id: &mut [u8],
        name: &mut [u8],
        version: &mut [u8],
    ) -> CallStatus<NamesWritten>;

    fn get_initial_state(
        &mut self,
        chain: i32,
        state: &mut [u8],
        hash_hex: &mut [u8; UINT256_HEX_LEN],
    ) -> CallStatus<InitialStateWritten>;

    fn process_forward(
        &mut self,
        chain: i32,
        old_state: &[u8],
        block: &str,
        new_state: &mut [u8],
        undo: &mut [u8],
    ) -> CallStatus<ForwardWritten>;

    /// Writes the state before the block into `old_state`.
    fn process_backwards(
        &mut self,
        chain: i32,
        new_state: &[u8],
        block: &str,
        undo: &[u8],
        old_state: &mut [u8],
    ) -> CallStatus<usize>;
}

/// [`GameLogic`] on top of a [`BufferedCallee`].
///
/// The buffer size only ever grows, so one oversized output makes every later
/// call start with buffers large enough for it.
pub struct BufferedGameLogic<C> {
    callee: C,
    buffer_size: usize,
}

impl<C: BufferedCallee> BufferedGameLogic<C> {
    pub fn new(callee: C) -> Self {
        Self {
            callee,
            buffer_size: INITIAL_BUFFER_SIZE,
        }
    }

    /// Buffer size the next call will start with.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn callee(&self) -> &C {
        &self.callee
    }

    fn grow(&mut self, required: usize) {
        // A callee asking for nothing more would make the retry loop spin.
        assert!(required > 0, "buffered game logic requested a zero-sized buffer");

        let next = required.max(self.buffer_size.saturating_mul(2));
        debug!(
            from = self.buffer_size,
            to = next,
            required,
            "Growing game logic buffers"
        );
        self.buffer_size = next;
    }

    fn block_text(block: &Value) -> Result<String> {
        serde_json::to_string(block).map_err(|e| GameLogicError::InvalidBlock(e.to_string()))
    }
}

/// Truncate `buf` to the reported length, which must fit the buffer.
fn take(mut buf: Vec<u8>, written: usize, what: &str) -> Vec<u8> {
    assert!(
        written <= buf.len(),
        "game logic reported {} bytes of {} in a {} byte buffer",
        written,
        what,
        buf.len()
    );
    buf.truncate(written);
    buf
}

fn utf8(bytes: Vec<u8>, what: &str) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| GameLogicError::InvalidState(format!("{} is not valid UTF-8: {}", what, e)))
}

impl<C: BufferedCallee> GameLogic for BufferedGameLogic<C> {
    fn names(&mut self) -> Result<GameNames> {
        loop {
            let size = self.buffer_size;
            let (mut id, mut name, mut version) = (vec![0; size], vec![0; size], vec![0; size]);

            match self.callee.get_names(&mut id, &mut name, &mut version) {
                CallStatus::Complete(written) => {
                    return Ok(GameNames {
                        id: utf8(take(id, written.id, "game id"), "game id")?,
                        name: utf8(take(name, written.name, "game name"), "game name")?,
                        version: utf8(take(version, written.version, "version"), "version")?,
                    });
                }
                CallStatus::BufferTooSmall(required) => self.grow(required),
            }
        }
    }

    fn initial_state(&mut self, chain: Chain) -> Result<InitialState> {
        loop {
            let mut state = vec![0; self.buffer_size];
            let mut hash_hex = [0u8; UINT256_HEX_LEN];

            match self
                .callee
                .get_initial_state(chain.as_int(), &mut state, &mut hash_hex)
            {
                CallStatus::Complete(written) => {
                    let state = take(state, written.state, "initial state");
                    let hash = std::str::from_utf8(&hash_hex)
                        .ok()
                        .and_then(|text| text.parse::<Uint256>().ok())
                        .unwrap_or_else(|| {
                            panic!("game logic returned an invalid initial block hash")
                        });

                    return Ok(InitialState {
                        state: state.into(),
                        height: written.height,
                        hash,
                    });
                }
                CallStatus::BufferTooSmall(required) => self.grow(required),
            }
        }
    }

    fn process_forward(
        &mut self,
        chain: Chain,
        old_state: &GameStateData,
        block: &Value,
    ) -> Result<ForwardOutput> {
        let block = Self::block_text(block)?;

        loop {
            let size = self.buffer_size;
            let (mut new_state, mut undo) = (vec![0; size], vec![0; size]);

            match self.callee.process_forward(
                chain.as_int(),
                old_state.as_bytes(),
                &block,
                &mut new_state,
                &mut undo,
            ) {
                CallStatus::Complete(written) => {
                    return Ok(ForwardOutput {
                        new_state: take(new_state, written.new_state, "new state").into(),
                        undo: take(undo, written.undo, "undo data").into(),
                    });
                }
                CallStatus::BufferTooSmall(required) => self.grow(required),
            }
        }
    }

    fn process_backwards(
        &mut self,
        chain: Chain,
        new_state: &GameStateData,
        block: &Value,
        undo: &UndoData,
    ) -> Result<GameStateData> {
        let block = Self::block_text(block)?;

        loop {
            let mut old_state = vec![0; self.buffer_size];

            match self.callee.process_backwards(
                chain.as_int(),
                new_state.as_bytes(),
                &block,
                undo.as_bytes(),
                &mut old_state,
            ) {
                CallStatus::Complete(written) => {
                    return Ok(take(old_state, written, "old state").into());
                }
                CallStatus::BufferTooSmall(required) => self.grow(required),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Appends the compact block text to the state; the undo data is the
    /// length of the old state.
    #[derive(Default)]
    struct AppendingCallee {
        calls: usize,
        sizes: Vec<usize>,
        initial_len: usize,
    }

    fn write(out: &mut [u8], bytes: &[u8]) -> Option<usize> {
        (bytes.len() <= out.len()).then(|| {
            out[..bytes.len()].copy_from_slice(bytes);
            bytes.len()
        })
    }

    impl BufferedCallee for AppendingCallee {
        fn get_names(
            &mut self,
            id: &mut [u8],
            name: &mut [u8],
            version: &mut [u8],
        ) -> CallStatus<NamesWritten> {
            self.calls += 1;
            CallStatus::Complete(NamesWritten {
                id: write(id, b"append").unwrap(),
                name: write(name, b"Appending game").unwrap(),
                version: write(version, b"v1").unwrap(),
            })
        }

        fn get_initial_state(
            &mut self,
            chain: i32,
            state: &mut [u8],
            hash_hex: &mut [u8; UINT256_HEX_LEN],
        ) -> CallStatus<InitialStateWritten> {
            self.calls += 1;
            self.sizes.push(state.len());
            assert_eq!(chain, Chain::Regtest.as_int());

            let initial = vec![b'x'; self.initial_len];
            match write(state, &initial) {
                Some(len) => {
                    hash_hex.copy_from_slice("ab".repeat(32).as_bytes());
                    CallStatus::Complete(InitialStateWritten {
                        state: len,
                        height: 7,
                    })
                }
                None => CallStatus::BufferTooSmall(initial.len()),
            }
        }

        fn process_forward(
            &mut self,
            _chain: i32,
            old_state: &[u8],
            block: &str,
            new_state: &mut [u8],
            undo: &mut [u8],
        ) -> CallStatus<ForwardWritten> {
            self.calls += 1;
            self.sizes.push(new_state.len());

            let mut next = old_state.to_vec();
            next.extend_from_slice(block.as_bytes());
            let undo_bytes = (old_state.len() as u64).to_le_bytes();

            match (write(new_state, &next), write(undo, &undo_bytes)) {
                (Some(new_state), Some(undo)) => {
                    CallStatus::Complete(ForwardWritten { new_state, undo })
                }
                _ => CallStatus::BufferTooSmall(next.len()),
            }
        }

        fn process_backwards(
            &mut self,
            _chain: i32,
            new_state: &[u8],
            _block: &str,
            undo: &[u8],
            old_state: &mut [u8],
        ) -> CallStatus<usize> {
            self.calls += 1;
            let len = u64::from_le_bytes(undo.try_into().unwrap()) as usize;
            match write(old_state, &new_state[..len]) {
                Some(written) => CallStatus::Complete(written),
                None => CallStatus::BufferTooSmall(len),
            }
        }
    }

    #[test]
    fn test_names() {
        let mut logic = BufferedGameLogic::new(AppendingCallee::default());
        let names = logic.names().unwrap();
        assert_eq!(names.id, "append");
        assert_eq!(names.name, "Appending game");
        assert_eq!(names.version, "v1");
    }

    #[test]
    fn test_buffer_doubles_when_requirement_is_small() {
        let mut logic = BufferedGameLogic::new(AppendingCallee {
            initial_len: 1500,
            ..Default::default()
        });

        let initial = logic.initial_state(Chain::Regtest).unwrap();
        assert_eq!(initial.state.len(), 1500);
        assert_eq!(initial.height, 7);
        assert_eq!(initial.hash, Uint256::from_bytes([0xab; 32]));

        assert_eq!(logic.callee().sizes, vec![1024, 2048]);
        assert_eq!(logic.buffer_size(), 2048);
    }

    #[test]
    fn test_buffer_jumps_to_large_requirement() {
        let mut logic = BufferedGameLogic::new(AppendingCallee {
            initial_len: 5000,
            ..Default::default()
        });

        logic.initial_state(Chain::Regtest).unwrap();
        assert_eq!(logic.callee().sizes, vec![1024, 5000]);

        // The grown size is kept for later calls.
        let block = json!({"moves": []});
        logic
            .process_forward(Chain::Regtest, &GameStateData::default(), &block)
            .unwrap();
        assert_eq!(logic.callee().sizes, vec![1024, 5000, 5000]);
    }

    #[test]
    fn test_forward_passes_compact_json() {
        let mut logic = BufferedGameLogic::new(AppendingCallee::default());
        let block = json!({"moves": [1, 2]});

        let out = logic
            .process_forward(Chain::Main, &GameStateData::from(b"s".to_vec()), &block)
            .unwrap();
        assert_eq!(out.new_state.as_bytes(), br#"s{"moves":[1,2]}"#);
        assert_eq!(logic.callee().calls, 1);
    }

    #[test]
    fn test_backwards_returns_old_state() {
        let mut logic = BufferedGameLogic::new(AppendingCallee::default());
        let old = GameStateData::from(b"before".to_vec());
        let block = json!({"moves": ["m"]});

        let forward = logic.process_forward(Chain::Main, &old, &block).unwrap();
        assert_ne!(forward.new_state, old);

        let restored = logic
            .process_backwards(Chain::Main, &forward.new_state, &block, &forward.undo)
            .unwrap();
        assert_eq!(restored, old);
    }

    struct ZeroRequest;

    impl BufferedCallee for ZeroRequest {
        fn get_names(&mut self, _: &mut [u8], _: &mut [u8], _: &mut [u8]) -> CallStatus<NamesWritten> {
            CallStatus::BufferTooSmall(0)
        }

        fn get_initial_state(
            &mut self,
            _: i32,
            state: &mut [u8],
            _: &mut [u8; UINT256_HEX_LEN],
        ) -> CallStatus<InitialStateWritten> {
            // Claims more bytes than the buffer holds.
            CallStatus::Complete(InitialStateWritten {
                state: state.len() + 1,
                height: 0,
            })
        }

        fn process_forward(
            &mut self,
            _: i32,
            _: &[u8],
            _: &str,
            _: &mut [u8],
            _: &mut [u8],
        ) -> CallStatus<ForwardWritten> {
            CallStatus::BufferTooSmall(0)
        }

        fn process_backwards(
            &mut self,
            _: i32,
            _: &[u8],
            _: &str,
            _: &[u8],
            _: &mut [u8],
        ) -> CallStatus<usize> {
            CallStatus::BufferTooSmall(0)
        }
    }

    #[test]
    #[should_panic(expected = "zero-sized buffer")]
    fn test_zero_request_is_fatal() {
        let mut logic = BufferedGameLogic::new(ZeroRequest);
        let _ = logic.names();
    }

    #[test]
    #[should_panic(expected = "byte buffer")]
    fn test_overlong_write_is_fatal() {
        let mut logic = BufferedGameLogic::new(ZeroRequest);
        let _ = logic.initial_state(Chain::Main);
    }
}
