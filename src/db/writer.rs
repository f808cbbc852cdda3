//! Transactional batch writer.
//!
//! Each batch is written inside a single transaction: either every row (and,
//! for game batches, the processed-game marker) commits, or none do. Rows
//! land through upserts on their natural keys, so re-running a batch updates
//! in place instead of duplicating.
//!
//! Connection failures are retried with exponential backoff; a write conflict
//! from a concurrent writer gets exactly one full-batch retry.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use sqlx::{Sqlite, Transaction};
use tracing::{info, warn};

use crate::db::Store;
use crate::error::{classify_write_error, IngestError};
use crate::model::{Player, PlayerStat, ProcessedGame, PropLine, Team};

/// Retry behavior for transient store failures.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(exp.min(self.backoff_max_ms))
    }
}

/// Outcome of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Rows that did not exist before this batch.
    pub written: u64,
    /// Rows that existed and were refreshed in place.
    pub updated: u64,
}

impl WriteResult {
    pub fn absorb(&mut self, other: WriteResult) {
        self.written += other.written;
        self.updated += other.updated;
    }
}

impl Store {
    /// Upsert a batch of prop lines in one transaction.
    pub async fn write_prop_lines(&self, lines: &[PropLine]) -> Result<WriteResult, IngestError> {
        if lines.is_empty() {
            return Ok(WriteResult::default());
        }
        self.with_retry("prop_lines", || self.try_write_prop_lines(lines))
            .await
    }

    /// Upsert one game's stat records and its processed-game marker in a
    /// single transaction. The marker only exists once every fact row is in.
    pub async fn write_game_batch(
        &self,
        stats: &[PlayerStat],
        marker: &ProcessedGame,
    ) -> Result<WriteResult, IngestError> {
        self.with_retry("player_stats", || self.try_write_game_batch(stats, marker))
            .await
    }

    /// Upsert player dimension rows in one transaction.
    pub async fn write_players(&self, players: &[Player]) -> Result<WriteResult, IngestError> {
        if players.is_empty() {
            return Ok(WriteResult::default());
        }
        self.with_retry("players", || self.try_write_players(players))
            .await
    }

    /// Upsert team dimension rows in one transaction.
    pub async fn write_teams(&self, teams: &[Team]) -> Result<WriteResult, IngestError> {
        if teams.is_empty() {
            return Ok(WriteResult::default());
        }
        self.with_retry("teams", || self.try_write_teams(teams)).await
    }

    /// Run a batch write with the retry policy: connection failures back off
    /// and retry up to the limit, a write conflict retries the whole batch
    /// once, anything else surfaces immediately.
    async fn with_retry<F, Fut>(
        &self,
        table: &'static str,
        attempt_batch: F,
    ) -> Result<WriteResult, IngestError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<WriteResult, IngestError>>,
    {
        let mut connection_attempts: u32 = 0;
        let mut conflict_retried = false;

        loop {
            match attempt_batch().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable_connection() => {
                    connection_attempts += 1;
                    if connection_attempts > self.retry.max_retries {
                        return Err(e);
                    }
                    let delay = self.retry.backoff(connection_attempts - 1);
                    warn!(
                        table,
                        attempt = connection_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store connection failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e @ IngestError::ConflictOnWrite { .. }) if !conflict_retried => {
                    conflict_retried = true;
                    warn!(table, error = %e, "write conflict, retrying batch once");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_write_prop_lines(&self, lines: &[PropLine]) -> Result<WriteResult, IngestError> {
        let mut tx = begin(self.pool(), "prop_lines").await?;
        let mut result = WriteResult::default();

        for line in lines {
            let key = format!("{}|{}", line.source, line.projection_id);
            let exists: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM prop_lines WHERE source = ? AND projection_id = ?",
            )
            .bind(&line.source)
            .bind(&line.projection_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error("prop_lines", &key, e))?;

            sqlx::query(
                "INSERT INTO prop_lines (projection_id, source, league, player_id, player_name, team, opponent, position, stat_type, line_score, game_time, odds_type, season)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(source, projection_id) DO UPDATE SET
                     league = excluded.league,
                     player_id = excluded.player_id,
                     player_name = excluded.player_name,
                     team = excluded.team,
                     opponent = excluded.opponent,
                     position = excluded.position,
                     stat_type = excluded.stat_type,
                     line_score = excluded.line_score,
                     game_time = excluded.game_time,
                     odds_type = excluded.odds_type,
                     season = excluded.season,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(&line.projection_id)
            .bind(&line.source)
            .bind(line.league.as_str())
            .bind(required("prop_lines", &key, "player_id", line.player_id.as_deref())?)
            .bind(required("prop_lines", &key, "player_name", line.player_name.as_deref())?)
            .bind(required("prop_lines", &key, "team", line.team.as_deref())?)
            .bind(&line.opponent)
            .bind(
                line.position
                    .ok_or_else(|| missing("prop_lines", &key, "position"))?
                    .as_str(),
            )
            .bind(required("prop_lines", &key, "stat_type", line.stat_type.as_deref())?)
            .bind(
                line.line_score
                    .ok_or_else(|| missing("prop_lines", &key, "line_score"))?
                    .to_string(),
            )
            .bind(line.game_time.map(|t| t.to_rfc3339()))
            .bind(&line.odds_type)
            .bind(line.season.ok_or_else(|| missing("prop_lines", &key, "season"))?)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error("prop_lines", &key, e))?;

            if exists.0 > 0 {
                result.updated += 1;
            } else {
                result.written += 1;
            }
        }

        commit(tx, "prop_lines").await?;
        info!(
            written = result.written,
            updated = result.updated,
            "prop line batch committed"
        );
        Ok(result)
    }

    async fn try_write_game_batch(
        &self,
        stats: &[PlayerStat],
        marker: &ProcessedGame,
    ) -> Result<WriteResult, IngestError> {
        let mut tx = begin(self.pool(), "player_stats").await?;
        let mut result = WriteResult::default();

        for stat in stats {
            let key = format!(
                "{}|{}|{}",
                stat.player_id.as_deref().unwrap_or(""),
                stat.game_id,
                stat.stat_type
            );
            let player_id = required("player_stats", &key, "player_id", stat.player_id.as_deref())?;
            let exists: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM player_stats WHERE player_id = ? AND game_id = ? AND stat_type = ?",
            )
            .bind(player_id)
            .bind(&stat.game_id)
            .bind(stat.stat_type.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error("player_stats", &key, e))?;

            sqlx::query(
                "INSERT INTO player_stats (player_id, player_name, team, opponent, position, stat_type, game_id, week, season, league, source,
                     passing_yards, completions, attempts, passing_touchdowns, interceptions, sacks, sack_yards_lost,
                     receiving_yards, receptions, targets, receiving_touchdowns,
                     rushing_yards, rushing_attempts, rushing_touchdowns)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(player_id, game_id, stat_type) DO UPDATE SET
                     player_name = excluded.player_name,
                     team = excluded.team,
                     opponent = excluded.opponent,
                     position = excluded.position,
                     week = excluded.week,
                     season = excluded.season,
                     league = excluded.league,
                     source = excluded.source,
                     passing_yards = excluded.passing_yards,
                     completions = excluded.completions,
                     attempts = excluded.attempts,
                     passing_touchdowns = excluded.passing_touchdowns,
                     interceptions = excluded.interceptions,
                     sacks = excluded.sacks,
                     sack_yards_lost = excluded.sack_yards_lost,
                     receiving_yards = excluded.receiving_yards,
                     receptions = excluded.receptions,
                     targets = excluded.targets,
                     receiving_touchdowns = excluded.receiving_touchdowns,
                     rushing_yards = excluded.rushing_yards,
                     rushing_attempts = excluded.rushing_attempts,
                     rushing_touchdowns = excluded.rushing_touchdowns,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(player_id)
            .bind(required("player_stats", &key, "player_name", stat.player_name.as_deref())?)
            .bind(required("player_stats", &key, "team", stat.team.as_deref())?)
            .bind(&stat.opponent)
            .bind(
                stat.position
                    .ok_or_else(|| missing("player_stats", &key, "position"))?
                    .as_str(),
            )
            .bind(stat.stat_type.as_str())
            .bind(&stat.game_id)
            .bind(stat.week.ok_or_else(|| missing("player_stats", &key, "week"))?)
            .bind(stat.season.ok_or_else(|| missing("player_stats", &key, "season"))?)
            .bind(stat.league.as_str())
            .bind(&stat.source)
            .bind(stat.passing_yards)
            .bind(stat.completions)
            .bind(stat.attempts)
            .bind(stat.passing_touchdowns)
            .bind(stat.interceptions)
            .bind(stat.sacks)
            .bind(stat.sack_yards_lost)
            .bind(stat.receiving_yards)
            .bind(stat.receptions)
            .bind(stat.targets)
            .bind(stat.receiving_touchdowns)
            .bind(stat.rushing_yards)
            .bind(stat.rushing_attempts)
            .bind(stat.rushing_touchdowns)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error("player_stats", &key, e))?;

            if exists.0 > 0 {
                result.updated += 1;
            } else {
                result.written += 1;
            }
        }

        // The marker rides the same transaction as the fact rows: a game is
        // only ever marked processed once all its stats are committed.
        // Markers are append-only; the first committed marker for a game id
        // stands, including under force re-ingestion.
        sqlx::query(
            "INSERT INTO games_processed (game_id, week, year, league, source, game_type)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(game_id) DO NOTHING",
        )
        .bind(&marker.game_id)
        .bind(marker.week)
        .bind(marker.year)
        .bind(marker.league.as_str())
        .bind(&marker.source)
        .bind(marker.game_type)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify_write_error("games_processed", &marker.game_id, e))?;

        commit(tx, "player_stats").await?;
        info!(
            game_id = %marker.game_id,
            written = result.written,
            updated = result.updated,
            "game batch committed"
        );
        Ok(result)
    }

    async fn try_write_players(&self, players: &[Player]) -> Result<WriteResult, IngestError> {
        let mut tx = begin(self.pool(), "players").await?;
        let mut result = WriteResult::default();

        for player in players {
            let exists: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM players WHERE player_id = ?")
                    .bind(&player.player_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| classify_write_error("players", &player.player_id, e))?;

            sqlx::query(
                "INSERT INTO players (player_id, name, position, team, league, source)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(player_id) DO UPDATE SET
                     name = excluded.name,
                     position = excluded.position,
                     team = excluded.team,
                     league = excluded.league,
                     source = excluded.source,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(&player.player_id)
            .bind(&player.name)
            .bind(player.position.map(|p| p.as_str()))
            .bind(&player.team)
            .bind(player.league.as_str())
            .bind(&player.source)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error("players", &player.player_id, e))?;

            if exists.0 > 0 {
                result.updated += 1;
            } else {
                result.written += 1;
            }
        }

        commit(tx, "players").await?;
        Ok(result)
    }

    async fn try_write_teams(&self, teams: &[Team]) -> Result<WriteResult, IngestError> {
        let mut tx = begin(self.pool(), "teams").await?;
        let mut result = WriteResult::default();

        for team in teams {
            let key = format!("{}|{}", team.abbreviation, team.league);
            let exists: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM teams WHERE abbreviation = ? AND league = ?",
            )
            .bind(&team.abbreviation)
            .bind(team.league.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error("teams", &key, e))?;

            sqlx::query(
                "INSERT INTO teams (name, abbreviation, league, source)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(abbreviation, league) DO UPDATE SET
                     name = excluded.name,
                     source = excluded.source,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(&team.name)
            .bind(&team.abbreviation)
            .bind(team.league.as_str())
            .bind(&team.source)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_write_error("teams", &key, e))?;

            if exists.0 > 0 {
                result.updated += 1;
            } else {
                result.written += 1;
            }
        }

        commit(tx, "teams").await?;
        Ok(result)
    }
}

async fn begin(
    pool: &sqlx::SqlitePool,
    table: &'static str,
) -> Result<Transaction<'static, Sqlite>, IngestError> {
    pool.begin()
        .await
        .map_err(|e| classify_write_error(table, "begin", e))
}

async fn commit(tx: Transaction<'_, Sqlite>, table: &'static str) -> Result<(), IngestError> {
    tx.commit()
        .await
        .map_err(|e| classify_write_error(table, "commit", e))
}

fn missing(table: &'static str, record_key: &str, field: &'static str) -> IngestError {
    IngestError::BatchWrite {
        table,
        record_key: record_key.to_string(),
        detail: format!("required field `{field}` is missing"),
    }
}

fn required<'a>(
    table: &'static str,
    record_key: &str,
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, IngestError> {
    value.ok_or_else(|| missing(table, record_key, field))
}
