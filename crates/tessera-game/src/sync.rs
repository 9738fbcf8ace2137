//! Per-viewer snapshots, etags and diffs.
//!
//! A viewer only learns which kind of power a piece holds if they are
//! authorized for it. Everything else is public.
//!
//! Diffs are edit scripts over JSON objects: keys whose values are equal
//! on both sides are left out, objects present on both sides are diffed
//! recursively, anything else that changed or appeared is carried
//! verbatim, and vanished keys are listed under [`DELETE_KEY`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tessera_protocol::UserId;

use crate::model::{GameBoard, GameState};

/// Reserved diff key listing removed keys.
pub const DELETE_KEY: &str = "$delete";

/// Digest bytes kept in an etag.
const ETAG_BYTES: usize = 12;

/// The state as `viewer` may see it.
pub fn serialize_for(state: &GameState, viewer: &UserId) -> Value {
    json!({
        "settings": {
            "board_size": {
                "x": state.settings.board_size.x,
                "y": state.settings.board_size.y,
            },
        },
        "board": serialize_board(&state.board, viewer),
        "current_player_id": state.current_player_id,
        "next_power_spawn": {
            "rounds": state.next_power_spawn.rounds,
            "count": state.next_power_spawn.count,
        },
        "finished": state.finished,
        "winner_id": state.winner_id,
        "moves_played": state.moves_played,
    })
}

fn serialize_board(board: &GameBoard, viewer: &UserId) -> Value {
    let tiles: Map<String, Value> = board
        .tiles
        .values()
        .map(|t| {
            let v = json!({
                "position": { "x": t.position.x, "y": t.position.y },
                "elevation": t.elevation,
            });
            (t.id.to_string(), v)
        })
        .collect();
    let pieces: Map<String, Value> = board
        .pieces
        .values()
        .map(|p| {
            let v = json!({ "owner_id": p.owner_id, "tile_id": p.tile_id });
            (p.id.to_string(), v)
        })
        .collect();
    let powers: Map<String, Value> = board
        .powers
        .values()
        .map(|p| {
            let definition = p
                .is_authorized(viewer)
                .then_some(p.power_definition_id.as_str());
            let v = json!({
                "power_definition_id": definition,
                "tile_id": p.tile_id,
                "piece_id": p.piece_id,
                "authorized_player_ids": p.authorized_player_ids,
            });
            (p.id.to_string(), v)
        })
        .collect();
    json!({ "tiles": tiles, "pieces": pieces, "powers": powers })
}

// ---------------------------------------------------------------------------
// Etags
// ---------------------------------------------------------------------------

/// Short stable hash of `value`'s canonical JSON form.
pub fn etag(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..ETAG_BYTES])
}

/// Serializes with object keys sorted, whatever map ordering serde_json
/// was built with.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// `(serialized, etag)` of `state` for `viewer`.
pub fn snapshot_for(state: &GameState, viewer: &UserId) -> (Value, String) {
    let serialized = serialize_for(state, viewer);
    let tag = etag(&serialized);
    (serialized, tag)
}

/// Per-viewer change from `from` to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDiff {
    pub diff: Value,
    pub etag_from: String,
    pub etag_to: String,
}

impl StateDiff {
    pub fn between(from: &GameState, to: &GameState, viewer: &UserId) -> Self {
        let (before, etag_from) = snapshot_for(from, viewer);
        let (after, etag_to) = snapshot_for(to, viewer);
        Self {
            diff: diff(&before, &after),
            etag_from,
            etag_to,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag_from == self.etag_to
    }
}

// ---------------------------------------------------------------------------
// Diff / apply
// ---------------------------------------------------------------------------

/// Edit script turning `from` into `to`.
///
/// Two objects produce an object script; anything else produces `to`.
pub fn diff(from: &Value, to: &Value) -> Value {
    match (from, to) {
        (Value::Object(a), Value::Object(b)) => Value::Object(diff_objects(a, b)),
        _ => to.clone(),
    }
}

fn diff_objects(from: &Map<String, Value>, to: &Map<String, Value>) -> Map<String, Value> {
    let mut script = Map::new();
    for (key, new) in to {
        match from.get(key) {
            Some(old) if old == new => {}
            Some(old @ Value::Object(_)) if new.is_object() => {
                script.insert(key.clone(), diff(old, new));
            }
            _ => {
                script.insert(key.clone(), new.clone());
            }
        }
    }
    let mut removed: Vec<&String> =
        from.keys().filter(|k| !to.contains_key(*k)).collect();
    if !removed.is_empty() {
        removed.sort();
        script.insert(
            DELETE_KEY.to_owned(),
            Value::Array(removed.into_iter().map(|k| Value::String(k.clone())).collect()),
        );
    }
    script
}

/// Applies an edit script produced by [`diff`] to `base`.
pub fn apply_diff(base: &Value, script: &Value) -> Value {
    let (Value::Object(base), Value::Object(script)) = (base, script) else {
        return script.clone();
    };
    let mut out = base.clone();
    for (key, change) in script {
        if key == DELETE_KEY {
            continue;
        }
        let next = match out.get(key) {
            Some(old @ Value::Object(_)) if change.is_object() => apply_diff(old, change),
            _ => change.clone(),
        };
        out.insert(key.clone(), next);
    }
    if let Some(Value::Array(removed)) = script.get(DELETE_KEY) {
        for key in removed.iter().filter_map(Value::as_str) {
            out.remove(key);
        }
    }
    Value::Object(out)
}
