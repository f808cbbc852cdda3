//! Box-score normalizer.
//!
//! The payload nests player statistics under
//! `boxscore.players[team].statistics[category].athletes[]`, where each
//! category carries parallel `labels` and per-athlete `stats` arrays. Only
//! the passing, receiving, and rushing categories are emitted; positions are
//! limited to QB, WR, and RB.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::model::{GameContext, League, PlayerStat, Position, StatCategory};
use crate::normalize::enrich;

const SOURCE_KEY_BOXSCORE: &str = "boxscore";
const SOURCE_KEY_PLAYERS: &str = "boxscore.players";

/// Normalize one game's box score into per-player stat records.
///
/// The caller supplies the game context (id, week, kickoff) resolved from the
/// game listing; the payload itself carries neither. Fails only when the
/// `boxscore.players` structure is missing.
pub fn parse_box_score(
    payload: &Value,
    game: &GameContext,
    source: &str,
    league: League,
) -> Result<Vec<PlayerStat>, IngestError> {
    let boxscore = payload
        .get("boxscore")
        .ok_or_else(|| IngestError::malformed(source, SOURCE_KEY_BOXSCORE))?;
    let teams = boxscore
        .get("players")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::malformed(source, SOURCE_KEY_PLAYERS))?;

    let season = enrich::derive_season(game.kickoff);
    let abbreviations: Vec<Option<&str>> = teams.iter().map(team_abbreviation).collect();
    let mut records = Vec::new();

    for (team_index, team_block) in teams.iter().enumerate() {
        let team = abbreviations[team_index];
        // The opponent is whichever other team block shares the payload.
        let opponent = abbreviations
            .iter()
            .enumerate()
            .find(|(i, abbr)| *i != team_index && abbr.is_some())
            .and_then(|(_, abbr)| *abbr);

        if team.is_none() {
            warn!(
                source = source,
                game_id = %game.game_id,
                team_index,
                "team block has no abbreviation"
            );
        }

        let categories = team_block
            .get("statistics")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for category_block in categories {
            let category = match category_block
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_ascii_lowercase)
                .as_deref()
            {
                Some("passing") => StatCategory::Passing,
                Some("receiving") => StatCategory::Receiving,
                Some("rushing") => StatCategory::Rushing,
                // Kicking, punting, defense and the like are out of scope.
                _ => continue,
            };

            let labels: Vec<&str> = category_block
                .get("labels")
                .and_then(Value::as_array)
                .map(|l| l.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let athletes = category_block
                .get("athletes")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for athlete_block in athletes {
                if let Some(record) = athlete_record(
                    athlete_block,
                    &labels,
                    category,
                    team,
                    opponent,
                    game,
                    season,
                    source,
                    league,
                ) {
                    records.push(record);
                }
            }
        }
    }

    debug!(
        source = source,
        game_id = %game.game_id,
        records = records.len(),
        "box score normalized"
    );
    Ok(records)
}

fn team_abbreviation(team_block: &Value) -> Option<&str> {
    let team = team_block.get("team")?;
    team.get("abbreviation")
        .or_else(|| team.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[allow(clippy::too_many_arguments)]
fn athlete_record(
    athlete_block: &Value,
    labels: &[&str],
    category: StatCategory,
    team: Option<&str>,
    opponent: Option<&str>,
    game: &GameContext,
    season: Option<i32>,
    source: &str,
    league: League,
) -> Option<PlayerStat> {
    let athlete = athlete_block.get("athlete");
    let player_name = athlete.and_then(|a| {
        a.get("displayName")
            .or_else(|| a.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    });

    // Explicit position when the payload has one, otherwise the position the
    // category implies.
    let position = athlete
        .and_then(|a| a.get("position"))
        .and_then(|p| p.get("abbreviation"))
        .and_then(Value::as_str)
        .and_then(Position::parse)
        .unwrap_or_else(|| category.implied_position());

    // Only prop-relevant positions survive.
    if !matches!(position, Position::Qb | Position::Wr | Position::Rb) {
        return None;
    }

    let mut record = PlayerStat {
        player_id: None,
        player_name: player_name.clone(),
        team: team.map(str::to_string),
        opponent: opponent.map(str::to_string),
        position: Some(position),
        stat_type: category,
        game_id: game.game_id.clone(),
        week: Some(game.week),
        season,
        league,
        source: source.to_string(),
        passing_yards: None,
        completions: None,
        attempts: None,
        passing_touchdowns: None,
        interceptions: None,
        sacks: None,
        sack_yards_lost: None,
        receiving_yards: None,
        receptions: None,
        targets: None,
        receiving_touchdowns: None,
        rushing_yards: None,
        rushing_attempts: None,
        rushing_touchdowns: None,
    };

    record.player_id = match athlete.and_then(|a| a.get("id")).and_then(json_id) {
        Some(id) => Some(id),
        None => match (&player_name, team) {
            (Some(name), Some(team)) => {
                Some(enrich::surrogate_player_id(name, team, &game.game_id))
            }
            _ => None,
        },
    };

    let stats = athlete_block
        .get("stats")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (label, stat) in labels.iter().zip(stats.iter()) {
        apply_stat(&mut record, category, label, stat);
    }

    // Zero-information rows (athletes listed without any category stats) are
    // dropped here instead of burdening validation.
    if !record.has_category_stats() {
        return None;
    }
    Some(record)
}

/// Map one labelled stat value onto the record's category fields. Labels not
/// relevant to the category (averages, longs, ratings) are ignored.
fn apply_stat(record: &mut PlayerStat, category: StatCategory, label: &str, stat: &Value) {
    match (category, label.to_ascii_uppercase().as_str()) {
        (StatCategory::Passing, "C/ATT") => {
            if let Some((completions, attempts)) = split_completions_attempts(stat) {
                record.completions = Some(completions);
                record.attempts = Some(attempts);
            }
        }
        (StatCategory::Passing, "YDS") => record.passing_yards = int_value(stat),
        (StatCategory::Passing, "TD") => record.passing_touchdowns = int_value(stat),
        (StatCategory::Passing, "INT") => record.interceptions = int_value(stat),
        (StatCategory::Passing, "SACKS") => {
            if let Some((sacks, yards_lost)) = split_sacks(stat) {
                record.sacks = Some(sacks);
                record.sack_yards_lost = Some(yards_lost);
            }
        }
        (StatCategory::Receiving, "YDS") => record.receiving_yards = int_value(stat),
        (StatCategory::Receiving, "REC") => record.receptions = int_value(stat),
        (StatCategory::Receiving, "TGTS" | "TARGETS") => record.targets = int_value(stat),
        (StatCategory::Receiving, "TD") => record.receiving_touchdowns = int_value(stat),
        (StatCategory::Rushing, "YDS") => record.rushing_yards = int_value(stat),
        (StatCategory::Rushing, "CAR" | "ATT") => record.rushing_attempts = int_value(stat),
        (StatCategory::Rushing, "TD") => record.rushing_touchdowns = int_value(stat),
        _ => {}
    }
}

/// "2-11" style count-and-yards-lost sack values.
fn split_sacks(stat: &Value) -> Option<(i64, i64)> {
    let raw = stat.as_str()?;
    let (sacks, yards_lost) = raw.split_once('-')?;
    Some((sacks.trim().parse().ok()?, yards_lost.trim().parse().ok()?))
}

/// "22/31" style completions-over-attempts values.
fn split_completions_attempts(stat: &Value) -> Option<(i64, i64)> {
    let raw = stat.as_str()?;
    let (completions, attempts) = raw.split_once('/')?;
    Some((
        completions.trim().parse().ok()?,
        attempts.trim().parse().ok()?,
    ))
}

/// Stat values arrive as strings ("275") or numbers depending on the feed.
fn int_value(stat: &Value) -> Option<i64> {
    match stat {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
