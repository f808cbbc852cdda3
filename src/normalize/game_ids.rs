//! Game-listing normalizer.
//!
//! Weekly listing payloads carry an `items` array whose entries each hold an
//! `eventid`. The output preserves the payload's ordering.

use serde_json::Value;
use tracing::warn;

use crate::error::IngestError;
use crate::model::GameIdBatch;

/// Normalize a weekly game listing into an ordered id batch.
///
/// Year and week are caller-supplied; the payload does not carry them.
/// Entries without a usable `eventid` are skipped with a warning, never
/// fatal. An empty `items` array yields an empty batch.
pub fn parse_game_listing(
    payload: &Value,
    year: i32,
    week: i32,
) -> Result<GameIdBatch, IngestError> {
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::malformed("game_listing", "items"))?;

    let mut game_ids = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item.get("eventid").and_then(event_id) {
            Some(id) => game_ids.push(id),
            None => warn!(year, week, index, "listing item has no usable eventid"),
        }
    }

    Ok(GameIdBatch {
        year,
        week,
        game_ids,
    })
}

fn event_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
