//! Ingestion orchestration.
//!
//! Each `ingest_*` method runs one payload end to end: normalize, validate,
//! write, and report. Rejected records never abort a run; malformed payloads
//! and store failures do.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{Store, WriteResult};
use crate::model::{GameContext, GameIdBatch, League, Player, ProcessedGame, PropLine, Team};
use crate::validate::{validate_batch, BatchOutcome, Validate};

/// Counters describing one completed ingestion run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub records_seen: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub rejected_by_rule: BTreeMap<String, usize>,
    pub written: u64,
    pub updated: u64,
    pub skipped_duplicate_games: usize,
}

impl RunReport {
    fn from_batch<T: Validate>(batch: &BatchOutcome<T>) -> Self {
        Self {
            records_seen: batch.seen(),
            accepted: batch.accepted.len(),
            rejected: batch.rejected.len(),
            rejected_by_rule: batch
                .rejections_by_rule()
                .into_iter()
                .map(|(rule, count)| (rule.to_string(), count))
                .collect(),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "seen={} accepted={} rejected={} written={} updated={} skipped_games={}",
            self.records_seen,
            self.accepted,
            self.rejected,
            self.written,
            self.updated,
            self.skipped_duplicate_games
        )?;
        if !self.rejected_by_rule.is_empty() {
            write!(f, " rejections=[")?;
            for (i, (rule, count)) in self.rejected_by_rule.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{rule}: {count}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// A week's worth of game ids split by ingestion status.
#[derive(Debug)]
pub struct WeekPlan {
    pub batch: GameIdBatch,
    /// Ids not yet marked processed, in listing order.
    pub pending: Vec<String>,
    pub report: RunReport,
}

pub struct Pipeline {
    store: Store,
    batch_size: usize,
    force: bool,
}

impl Pipeline {
    pub fn new(store: Store, batch_size: usize, force: bool) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            force,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Ingest a projection payload: normalize, validate, and upsert the
    /// accepted lines plus the player/team dimension rows they imply.
    pub async fn ingest_projections(&self, payload: &Value, source: &str) -> Result<RunReport> {
        let lines = crate::normalize::parse_projections(payload, source)?;
        let batch = validate_batch(lines);
        log_rejections(source, &batch);
        let mut report = RunReport::from_batch(&batch);

        let mut total = WriteResult::default();
        for chunk in batch.accepted.chunks(self.batch_size) {
            total.absorb(self.store.write_prop_lines(chunk).await?);
        }
        report.written = total.written;
        report.updated = total.updated;

        let (players, teams) = dimension_records(&batch.accepted, source);
        self.write_dimensions(source, players, teams).await?;

        info!(source, %report, "projection ingestion finished");
        Ok(report)
    }

    /// Ingest one game's box score. A game already marked processed is
    /// skipped wholesale unless the pipeline runs in force mode. The
    /// processed marker commits in the same transaction as the stat rows.
    pub async fn ingest_box_score(
        &self,
        payload: &Value,
        game: &GameContext,
        source: &str,
        league: League,
    ) -> Result<RunReport> {
        if !self.force && self.store.is_game_processed(&game.game_id).await? {
            info!(game_id = %game.game_id, "game already ingested, skipping");
            return Ok(RunReport {
                skipped_duplicate_games: 1,
                ..RunReport::default()
            });
        }

        let stats = crate::normalize::parse_box_score(payload, game, source, league)?;
        let batch = validate_batch(stats);
        log_rejections(source, &batch);
        let mut report = RunReport::from_batch(&batch);

        if batch.accepted.is_empty() {
            // Nothing committed means no marker either; a later run may find
            // a corrected payload for this game.
            warn!(game_id = %game.game_id, "no records accepted, game left unmarked");
            return Ok(report);
        }

        // All accepted records share the game, so the first one's season is
        // the batch's season.
        let year = batch.accepted[0].season.unwrap_or_default();
        let marker = ProcessedGame {
            game_id: game.game_id.clone(),
            week: game.week,
            year,
            league,
            source: source.to_string(),
            game_type: 2,
        };
        let result = self.store.write_game_batch(&batch.accepted, &marker).await?;
        report.written = result.written;
        report.updated = result.updated;

        let players = stat_players(&batch.accepted, league);
        self.write_dimensions(source, players, Vec::new()).await?;

        info!(source, game_id = %game.game_id, %report, "box score ingestion finished");
        Ok(report)
    }

    /// Validate and upsert dimension rows. Dimension rejections are logged
    /// but never fail a run; the fact records they came from were already
    /// accepted.
    async fn write_dimensions(
        &self,
        source: &str,
        players: Vec<Player>,
        teams: Vec<Team>,
    ) -> Result<()> {
        let players = validate_batch(players);
        log_rejections(source, &players);
        self.store.write_players(&players.accepted).await?;

        let teams = validate_batch(teams);
        log_rejections(source, &teams);
        self.store.write_teams(&teams.accepted).await?;
        Ok(())
    }

    /// Ingest a weekly game listing and split its ids into already-processed
    /// and pending. Listings never write markers; only committed box scores
    /// mark a game processed.
    pub async fn ingest_game_listing(
        &self,
        payload: &Value,
        year: i32,
        week: i32,
    ) -> Result<WeekPlan> {
        let batch = crate::normalize::parse_game_listing(payload, year, week)?;
        let mut pending = Vec::with_capacity(batch.game_ids.len());
        let mut skipped = 0usize;

        for game_id in &batch.game_ids {
            if !self.force && self.store.is_game_processed(game_id).await? {
                skipped += 1;
            } else {
                pending.push(game_id.clone());
            }
        }

        let report = RunReport {
            records_seen: batch.game_ids.len(),
            accepted: pending.len(),
            skipped_duplicate_games: skipped,
            ..RunReport::default()
        };
        info!(year, week, %report, "game listing ingested");
        Ok(WeekPlan {
            batch,
            pending,
            report,
        })
    }
}

fn log_rejections<T: Validate>(source: &str, batch: &BatchOutcome<T>) {
    for (_, violations) in &batch.rejected {
        for violation in violations {
            warn!(source, %violation, "record rejected");
        }
    }
}

/// Dimension rows implied by a batch of accepted prop lines. Accepted lines
/// always carry player and team identity, so the filters only drop the
/// impossible.
fn dimension_records(lines: &[PropLine], source: &str) -> (Vec<Player>, Vec<Team>) {
    let mut player_ids = HashSet::new();
    let mut team_keys = HashSet::new();
    let mut players = Vec::new();
    let mut teams = Vec::new();

    for line in lines {
        if let (Some(player_id), Some(name)) = (&line.player_id, &line.player_name) {
            if player_ids.insert(player_id.clone()) {
                players.push(Player {
                    player_id: player_id.clone(),
                    name: name.clone(),
                    position: line.position,
                    team: line.team.clone(),
                    league: line.league,
                    source: source.to_string(),
                });
            }
        }
        for abbreviation in line.team.iter().chain(line.opponent.iter()) {
            if team_keys.insert((abbreviation.clone(), line.league)) {
                teams.push(Team {
                    name: abbreviation.clone(),
                    abbreviation: abbreviation.clone(),
                    league: line.league,
                    source: source.to_string(),
                });
            }
        }
    }

    (players, teams)
}

fn stat_players(stats: &[crate::model::PlayerStat], league: League) -> Vec<Player> {
    let mut seen = HashSet::new();
    let mut players = Vec::new();
    for stat in stats {
        if let (Some(player_id), Some(name)) = (&stat.player_id, &stat.player_name) {
            if seen.insert(player_id.clone()) {
                players.push(Player {
                    player_id: player_id.clone(),
                    name: name.clone(),
                    position: stat.position,
                    team: stat.team.clone(),
                    league,
                    source: stat.source.clone(),
                });
            }
        }
    }
    players
}
