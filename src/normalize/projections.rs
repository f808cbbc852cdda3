//! Projection feed normalizer.
//!
//! The provider payload is a JSON:API document: a `data` array of projection
//! entries whose `relationships` point into a flat `included` array of
//! players, games, and leagues. Entries are joined against an index over
//! `included` keyed on (type, id).

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use crate::error::IngestError;
use crate::model::{League, Position, PropLine};
use crate::normalize::enrich;

/// League relationship id used by the provider for college football. Any
/// other id is treated as NFL.
const COLLEGE_LEAGUE_ID: &str = "15";

const DEFAULT_ODDS_TYPE: &str = "standard";

/// Index over the payload's `included` array, keyed on (type, id).
struct IncludedIndex<'a> {
    entries: HashMap<(&'a str, &'a str), &'a Value>,
}

impl<'a> IncludedIndex<'a> {
    fn build(included: &'a [Value]) -> Self {
        let mut entries = HashMap::with_capacity(included.len());
        for item in included {
            if let (Some(kind), Some(id)) = (
                item.get("type").and_then(Value::as_str),
                item.get("id").and_then(Value::as_str),
            ) {
                entries.insert((kind, id), item);
            }
        }
        Self { entries }
    }

    /// Attributes of the included entry a relationship points at.
    fn resolve(&self, entry: &'a Value, relationship: &str) -> Option<&'a Value> {
        let data = entry
            .get("relationships")?
            .get(relationship)?
            .get("data")?;
        let kind = data.get("type").and_then(Value::as_str)?;
        let id = data.get("id").and_then(Value::as_str)?;
        self.entries.get(&(kind, id))?.get("attributes")
    }

    fn relationship_id(&self, entry: &'a Value, relationship: &str) -> Option<&'a str> {
        entry
            .get("relationships")?
            .get(relationship)?
            .get("data")?
            .get("id")
            .and_then(Value::as_str)
    }
}

/// Normalize a projection payload into prop lines.
///
/// Fails only when the payload's top-level shape is wrong. Entries with
/// unresolvable relationships produce records with the affected fields left
/// `None` for the validator to reject; the rest of the batch is unaffected.
pub fn parse_projections(payload: &Value, source: &str) -> Result<Vec<PropLine>, IngestError> {
    let data = payload
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::malformed(source, "data"))?;
    let included = payload
        .get("included")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::malformed(source, "included"))?;

    let index = IncludedIndex::build(included);
    let mut lines = Vec::with_capacity(data.len());

    for entry in data {
        let projection_id = entry
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let attributes = entry.get("attributes");

        let stat_type = attr_str(attributes, "stat_type");
        let line_score = attributes
            .and_then(|a| a.get("line_score"))
            .and_then(decimal_value);
        let odds_type = attr_str(attributes, "odds_type")
            .unwrap_or_else(|| DEFAULT_ODDS_TYPE.to_string());

        let league = match index.relationship_id(entry, "league") {
            Some(COLLEGE_LEAGUE_ID) => League::College,
            _ => League::Nfl,
        };

        // Player attributes come from the included new_player entry.
        let player = index.resolve(entry, "new_player");
        let player_name = player.and_then(|p| {
            p.get("display_name")
                .or_else(|| p.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let team = player
            .and_then(|p| p.get("team"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let position = player
            .and_then(|p| p.get("position"))
            .and_then(Value::as_str)
            .and_then(Position::parse);

        // Game attributes drive opponent and time-derived fields.
        let game = index.resolve(entry, "game");
        let game_time = game
            .and_then(|g| g.get("start_time"))
            .and_then(Value::as_str)
            .and_then(parse_timestamp);
        let opponent = match (&team, game) {
            (Some(team), Some(game)) => {
                let home = game.get("home_team").and_then(Value::as_str);
                let away = game.get("away_team").and_then(Value::as_str);
                match (home, away) {
                    (Some(home), Some(away)) => enrich::derive_opponent(team, home, away),
                    _ => None,
                }
            }
            _ => None,
        };

        let player_id = match index.relationship_id(entry, "new_player") {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => match (&player_name, &team) {
                // No native id: fall back to a deterministic surrogate keyed
                // on the game, so every projection of this player in this
                // game maps to the same id.
                (Some(name), Some(team)) => Some(enrich::surrogate_player_id(
                    name,
                    team,
                    index
                        .relationship_id(entry, "game")
                        .unwrap_or(projection_id.as_str()),
                )),
                _ => None,
            },
        };

        if player.is_none() {
            warn!(
                source = source,
                projection_id = %projection_id,
                "projection references a player absent from included data"
            );
        }

        let season = enrich::derive_season(game_time);

        lines.push(PropLine {
            projection_id,
            source: source.to_string(),
            league,
            player_id,
            player_name,
            team,
            opponent,
            position,
            stat_type,
            line_score,
            game_time,
            odds_type,
            season,
        });
    }

    Ok(lines)
}

fn attr_str(attributes: Option<&Value>, key: &str) -> Option<String> {
    attributes
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Lines arrive as JSON numbers or as strings depending on provider mood.
fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(_) => Decimal::from_str(&value.to_string()).ok(),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "data": [
                {
                    "type": "projection",
                    "id": "pp_1001",
                    "attributes": {
                        "stat_type": "Pass Yards",
                        "line_score": 248.5,
                        "odds_type": "standard"
                    },
                    "relationships": {
                        "new_player": {"data": {"type": "new_player", "id": "17"}},
                        "game": {"data": {"type": "game", "id": "g1"}},
                        "league": {"data": {"type": "league", "id": "9"}}
                    }
                }
            ],
            "included": [
                {
                    "type": "new_player",
                    "id": "17",
                    "attributes": {
                        "display_name": "Josh Allen",
                        "team": "BUF",
                        "position": "QB"
                    }
                },
                {
                    "type": "game",
                    "id": "g1",
                    "attributes": {
                        "home_team": "BUF",
                        "away_team": "NYJ",
                        "start_time": "2024-09-10T17:00:00Z"
                    }
                }
            ]
        })
    }

    #[test]
    fn resolves_cross_references() {
        let lines = parse_projections(&sample_payload(), "PrizePicks").unwrap();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.projection_id, "pp_1001");
        assert_eq!(line.player_name.as_deref(), Some("Josh Allen"));
        assert_eq!(line.player_id.as_deref(), Some("17"));
        assert_eq!(line.team.as_deref(), Some("BUF"));
        assert_eq!(line.opponent.as_deref(), Some("NYJ"));
        assert_eq!(line.position, Some(Position::Qb));
        assert_eq!(line.stat_type.as_deref(), Some("Pass Yards"));
        assert_eq!(line.line_score, Some(dec!(248.5)));
        assert_eq!(line.league, League::Nfl);
        assert_eq!(line.season, Some(2024));
        assert_eq!(line.odds_type, "standard");
    }

    #[test]
    fn missing_top_level_array_is_malformed() {
        let err = parse_projections(&json!({"data": []}), "PrizePicks").unwrap_err();
        match err {
            IngestError::MalformedSourceData { key_path, .. } => {
                assert_eq!(key_path, "included")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unresolved_player_reference_leaves_fields_empty() {
        let mut payload = sample_payload();
        payload["included"] = json!([]);
        let lines = parse_projections(&payload, "PrizePicks").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].player_name, None);
        assert_eq!(lines[0].team, None);
        assert_eq!(lines[0].opponent, None);
        assert_eq!(lines[0].season, None);
        // Native relationship id still usable as player_id.
        assert_eq!(lines[0].player_id.as_deref(), Some("17"));
    }

    #[test]
    fn league_id_15_maps_to_college() {
        let mut payload = sample_payload();
        payload["data"][0]["relationships"]["league"]["data"]["id"] = json!("15");
        let lines = parse_projections(&payload, "PrizePicks").unwrap();
        assert_eq!(lines[0].league, League::College);
    }

    #[test]
    fn missing_odds_type_defaults_to_standard() {
        let mut payload = sample_payload();
        payload["data"][0]["attributes"]
            .as_object_mut()
            .unwrap()
            .remove("odds_type");
        let lines = parse_projections(&payload, "PrizePicks").unwrap();
        assert_eq!(lines[0].odds_type, "standard");
    }

    #[test]
    fn string_line_score_is_parsed() {
        let mut payload = sample_payload();
        payload["data"][0]["attributes"]["line_score"] = json!("72.5");
        let lines = parse_projections(&payload, "PrizePicks").unwrap();
        assert_eq!(lines[0].line_score, Some(dec!(72.5)));
    }

    #[test]
    fn surrogate_id_used_when_native_id_is_empty() {
        let mut payload = sample_payload();
        payload["data"][0]["relationships"]["new_player"]["data"]["id"] = json!("");
        payload["included"][0]["id"] = json!("");
        let lines = parse_projections(&payload, "PrizePicks").unwrap();
        let id = lines[0].player_id.as_deref().unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn surrogate_id_stable_across_projections_of_one_game() {
        // Two projections for the same player in the same game must share a
        // surrogate id when no native id exists.
        let mut payload = sample_payload();
        payload["included"][0]["id"] = json!("");
        payload["data"][0]["relationships"]["new_player"]["data"]["id"] = json!("");
        let mut second = payload["data"][0].clone();
        second["id"] = json!("pp_1002");
        second["attributes"]["stat_type"] = json!("Pass TDs");
        payload["data"].as_array_mut().unwrap().push(second);

        let lines = parse_projections(&payload, "PrizePicks").unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].player_id.is_some());
        assert_eq!(lines[0].player_id, lines[1].player_id);
    }
}
