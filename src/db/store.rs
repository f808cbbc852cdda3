use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use crate::db::writer::RetryPolicy;

pub struct Store {
    pool: SqlitePool,
    pub(crate) retry: RetryPolicy,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PropLineRow {
    pub id: Option<i64>,
    pub projection_id: String,
    pub source: String,
    pub league: String,
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub opponent: Option<String>,
    pub position: String,
    pub stat_type: String,
    pub line_score: String,
    pub game_time: Option<String>,
    pub odds_type: String,
    pub season: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlayerStatRow {
    pub id: Option<i64>,
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub opponent: Option<String>,
    pub position: String,
    pub stat_type: String,
    pub game_id: String,
    pub week: i64,
    pub season: i64,
    pub league: String,
    pub source: String,
    pub passing_yards: Option<i64>,
    pub completions: Option<i64>,
    pub attempts: Option<i64>,
    pub passing_touchdowns: Option<i64>,
    pub interceptions: Option<i64>,
    pub sacks: Option<i64>,
    pub sack_yards_lost: Option<i64>,
    pub receiving_yards: Option<i64>,
    pub receptions: Option<i64>,
    pub targets: Option<i64>,
    pub receiving_touchdowns: Option<i64>,
    pub rushing_yards: Option<i64>,
    pub rushing_attempts: Option<i64>,
    pub rushing_touchdowns: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProcessedGameRow {
    pub id: Option<i64>,
    pub game_id: String,
    pub week: i64,
    pub year: i64,
    pub league: String,
    pub source: String,
    pub game_type: i64,
    pub created_at: Option<String>,
}

impl Store {
    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(database_path: &str, retry: RetryPolicy) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // An in-memory database exists per connection; more than one would
        // give each caller a different empty schema.
        let max_connections = if database_path.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool, retry };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    // --- Dedup tracker ---

    /// Whether a game's stat records were already committed in full.
    pub async fn is_game_processed(&self, game_id: &str) -> Result<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM games_processed WHERE game_id = ?")
                .bind(game_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check processed game")?;
        Ok(row.0 > 0)
    }

    pub async fn get_processed_game(&self, game_id: &str) -> Result<Option<ProcessedGameRow>> {
        let row = sqlx::query_as::<_, ProcessedGameRow>(
            "SELECT * FROM games_processed WHERE game_id = ?",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch processed game")?;
        Ok(row)
    }

    // --- Read paths ---

    pub async fn get_prop_lines_for_player(&self, player_id: &str) -> Result<Vec<PropLineRow>> {
        let rows = sqlx::query_as::<_, PropLineRow>(
            "SELECT * FROM prop_lines WHERE player_id = ? ORDER BY id",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch prop lines by player")?;
        Ok(rows)
    }

    pub async fn get_prop_line(
        &self,
        source: &str,
        projection_id: &str,
    ) -> Result<Option<PropLineRow>> {
        let row = sqlx::query_as::<_, PropLineRow>(
            "SELECT * FROM prop_lines WHERE source = ? AND projection_id = ?",
        )
        .bind(source)
        .bind(projection_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch prop line")?;
        Ok(row)
    }

    pub async fn get_stats_for_game(&self, game_id: &str) -> Result<Vec<PlayerStatRow>> {
        let rows = sqlx::query_as::<_, PlayerStatRow>(
            "SELECT * FROM player_stats WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch stats by game")?;
        Ok(rows)
    }

    pub async fn get_stats_for_player(&self, player_id: &str) -> Result<Vec<PlayerStatRow>> {
        let rows = sqlx::query_as::<_, PlayerStatRow>(
            "SELECT * FROM player_stats WHERE player_id = ? ORDER BY season, week",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch stats by player")?;
        Ok(rows)
    }

    pub async fn count_prop_lines(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM prop_lines")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count prop lines")?;
        Ok(row.0)
    }

    pub async fn count_player_stats(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM player_stats")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count player stats")?;
        Ok(row.0)
    }

    pub async fn count_players(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count players")?;
        Ok(row.0)
    }

    pub async fn count_teams(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM teams")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count teams")?;
        Ok(row.0)
    }
}
