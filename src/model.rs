use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// League a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Nfl,
    College,
}

impl League {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nfl => "nfl",
            Self::College => "college",
        }
    }
}

impl std::fmt::Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for League {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nfl" => Ok(Self::Nfl),
            "college" | "cfb" => Ok(Self::College),
            other => Err(format!("unknown league: {other}")),
        }
    }
}

/// Positions tracked for prop analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "QB")]
    Qb,
    #[serde(rename = "WR")]
    Wr,
    #[serde(rename = "RB")]
    Rb,
    #[serde(rename = "TE")]
    Te,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qb => "QB",
            Self::Wr => "WR",
            Self::Rb => "RB",
            Self::Te => "TE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QB" => Some(Self::Qb),
            "WR" => Some(Self::Wr),
            "RB" => Some(Self::Rb),
            "TE" => Some(Self::Te),
            _ => None,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistic category of a box-score record. Exactly the numeric fields of
/// this category may be populated on a `PlayerStat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatCategory {
    Passing,
    Receiving,
    Rushing,
}

impl StatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passing => "passing",
            Self::Receiving => "receiving",
            Self::Rushing => "rushing",
        }
    }

    /// Position implied by the category when the source carries no explicit
    /// position field.
    pub fn implied_position(&self) -> Position {
        match self {
            Self::Passing => Position::Qb,
            Self::Receiving => Position::Wr,
            Self::Rushing => Position::Rb,
        }
    }
}

impl std::fmt::Display for StatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One betting projection posted by a provider.
///
/// Fields resolved through the payload's cross-reference table stay `None`
/// when the reference cannot be resolved; the validator reports those gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropLine {
    pub projection_id: String,
    pub source: String,
    pub league: League,
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub team: Option<String>,
    pub opponent: Option<String>,
    pub position: Option<Position>,
    pub stat_type: Option<String>,
    pub line_score: Option<Decimal>,
    pub game_time: Option<DateTime<Utc>>,
    pub odds_type: String,
    pub season: Option<i32>,
}

/// One player's actual performance in one game, for one statistic category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStat {
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub team: Option<String>,
    pub opponent: Option<String>,
    pub position: Option<Position>,
    pub stat_type: StatCategory,
    pub game_id: String,
    pub week: Option<i32>,
    pub season: Option<i32>,
    pub league: League,
    pub source: String,

    // Passing
    pub passing_yards: Option<i64>,
    pub completions: Option<i64>,
    pub attempts: Option<i64>,
    pub passing_touchdowns: Option<i64>,
    pub interceptions: Option<i64>,
    pub sacks: Option<i64>,
    pub sack_yards_lost: Option<i64>,

    // Receiving
    pub receiving_yards: Option<i64>,
    pub receptions: Option<i64>,
    pub targets: Option<i64>,
    pub receiving_touchdowns: Option<i64>,

    // Rushing
    pub rushing_yards: Option<i64>,
    pub rushing_attempts: Option<i64>,
    pub rushing_touchdowns: Option<i64>,
}

impl PlayerStat {
    /// A record with its category fields all empty carries no information.
    /// Sack counts alone do not qualify; they only ride along with real
    /// passing output.
    pub fn has_category_stats(&self) -> bool {
        match self.stat_type {
            StatCategory::Passing => {
                self.passing_yards.is_some()
                    || self.completions.is_some()
                    || self.attempts.is_some()
                    || self.passing_touchdowns.is_some()
                    || self.interceptions.is_some()
            }
            StatCategory::Receiving => {
                self.receiving_yards.is_some()
                    || self.receptions.is_some()
                    || self.targets.is_some()
                    || self.receiving_touchdowns.is_some()
            }
            StatCategory::Rushing => {
                self.rushing_yards.is_some()
                    || self.rushing_attempts.is_some()
                    || self.rushing_touchdowns.is_some()
            }
        }
    }
}

/// Aggregate record for one week's game listing: the full ordered list of
/// game identifiers for a (year, week) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameIdBatch {
    pub year: i32,
    pub week: i32,
    pub game_ids: Vec<String>,
}

/// Marker that a game's stat records have been fully ingested. Written in the
/// same transaction as the game's fact rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedGame {
    pub game_id: String,
    pub week: i32,
    pub year: i32,
    pub league: League,
    pub source: String,
    /// 1 = preseason, 2 = regular season, 3 = postseason.
    pub game_type: i32,
}

/// Dimension record identifying a player across fact tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub name: String,
    pub position: Option<Position>,
    pub team: Option<String>,
    pub league: League,
    pub source: String,
}

/// Dimension record identifying a team within a league.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub abbreviation: String,
    pub league: League,
    pub source: String,
}

/// Game-level context supplied alongside a box-score payload. The payload
/// itself does not carry week or kickoff time; the caller resolves those from
/// the game listing that produced the game id.
#[derive(Debug, Clone)]
pub struct GameContext {
    pub game_id: String,
    pub week: i32,
    pub kickoff: Option<DateTime<Utc>>,
}
