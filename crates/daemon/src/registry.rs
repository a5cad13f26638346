//! Name registry demo game.
//!
//! Moves set the value of a name: `{"name": "alice", "value": "hello"}`.
//! Later moves in the same block win. The state is the full name table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gamesync_runtime::logic::Result;
use gamesync_runtime::{ForwardOutput, GameLogic, GameLogicError, GameNames, InitialState};
use gamesync_types::{Chain, ChainTip, GameStateData, UndoData};

pub const GAME_ID: &str = "names";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct NameMove {
    name: String,
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    names: BTreeMap<String, String>,
}

/// Previous value of every name touched by a block, in move order.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryUndo {
    previous: Vec<(String, Option<String>)>,
}

pub struct NameRegistry {
    initial: ChainTip,
}

impl NameRegistry {
    /// Start the game at `initial` on every network.
    pub fn new(initial: ChainTip) -> Self {
        Self { initial }
    }
}

fn decode<T>(bytes: &[u8], what: &str) -> std::result::Result<T, String>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_slice(bytes).map_err(|e| format!("invalid {}: {}", what, e))
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    // Maps with string keys always serialize.
    serde_json::to_vec(value).unwrap_or_default()
}

fn moves(block: &Value) -> Vec<NameMove> {
    block["moves"]
        .as_array()
        .map(|moves| {
            moves
                .iter()
                .filter_map(|mv| serde_json::from_value(mv.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

impl GameLogic for NameRegistry {
    fn names(&mut self) -> Result<GameNames> {
        Ok(GameNames {
            id: GAME_ID.to_string(),
            name: "Name registry".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    fn initial_state(&mut self, _chain: Chain) -> Result<InitialState> {
        Ok(InitialState {
            state: GameStateData::from(encode(&Registry::default())),
            height: self.initial.height,
            hash: self.initial.hash,
        })
    }

    fn process_forward(
        &mut self,
        _chain: Chain,
        old_state: &GameStateData,
        block: &Value,
    ) -> Result<ForwardOutput> {
        let mut registry: Registry =
            decode(old_state.as_bytes(), "registry").map_err(GameLogicError::InvalidState)?;
        let mut undo = RegistryUndo::default();

        // Malformed moves are ignored, like invalid transactions in a block.
        for mv in moves(block) {
            let previous = registry.names.insert(mv.name.clone(), mv.value);
            undo.previous.push((mv.name, previous));
        }

        Ok(ForwardOutput {
            new_state: GameStateData::from(encode(&registry)),
            undo: UndoData::from(encode(&undo)),
        })
    }

    fn process_backwards(
        &mut self,
        _chain: Chain,
        new_state: &GameStateData,
        _block: &Value,
        undo: &UndoData,
    ) -> Result<GameStateData> {
        let mut registry: Registry =
            decode(new_state.as_bytes(), "registry").map_err(GameLogicError::InvalidState)?;
        let undo: RegistryUndo =
            decode(undo.as_bytes(), "undo data").map_err(GameLogicError::InvalidUndo)?;

        for (name, previous) in undo.previous.into_iter().rev() {
            match previous {
                Some(value) => registry.names.insert(name, value),
                None => registry.names.remove(&name),
            };
        }

        Ok(GameStateData::from(encode(&registry)))
    }
}
