//! Record validation.
//!
//! Every rule that applies to a record is evaluated — violations are
//! collected, never short-circuited, so a rejection carries complete
//! diagnostics. Rule families run in a fixed order: required fields, format
//! conformance, placeholder rejection, relationship checks, range checks.
//! Derivation gaps (a season no timestamp could produce) are reported as
//! their own rule family so run reports can separate them from plain
//! missing-field rejections.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;

use crate::model::{PlayerStat, Player, PropLine, StatCategory, Team};

pub const MIN_SEASON_YEAR: i32 = 2000;
pub const MAX_SEASON_YEAR: i32 = 2030;

/// Values that mark a field as unresolved upstream. Matched
/// case-insensitively against identity fields; never persisted.
pub const PLACEHOLDER_BLOCKLIST: &[&str] = &[
    "unknown",
    "unknown player",
    "unknown team",
    "unknown opponent",
    "unk",
    "tbd",
    "n/a",
    "null",
    "none",
    "pending",
    "missing",
    "placeholder",
    "",
];

/// Sanity ceilings for single-game stat fields, from observed historical
/// maxima with headroom. Values outside these bounds are data errors, not
/// record performances.
const STAT_BOUNDS: &[(&str, i64)] = &[
    ("passing_yards", 600),
    ("completions", 50),
    ("attempts", 70),
    ("passing_touchdowns", 8),
    ("interceptions", 6),
    ("sacks", 15),
    ("sack_yards_lost", 150),
    ("receiving_yards", 300),
    ("receptions", 20),
    ("targets", 25),
    ("receiving_touchdowns", 4),
    ("rushing_yards", 300),
    ("rushing_attempts", 40),
    ("rushing_touchdowns", 5),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    Format,
    Placeholder,
    Relationship,
    Range,
    Derivation,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Format => "format",
            Self::Placeholder => "placeholder",
            Self::Relationship => "relationship",
            Self::Range => "range",
            Self::Derivation => "derivation",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed rule on one field.
#[derive(Debug, Clone)]
pub struct Violation {
    pub field: &'static str,
    pub rule: Rule,
    pub detail: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.field, self.rule, self.detail)
    }
}

/// Result of validating a single record.
#[derive(Debug)]
pub enum Outcome<T> {
    Accepted(T),
    Rejected {
        record: T,
        violations: Vec<Violation>,
    },
}

pub trait Validate {
    fn collect_violations(&self) -> Vec<Violation>;

    /// Fields forming the record's natural uniqueness key, when all are
    /// present. Used for in-batch duplicate detection.
    fn natural_key(&self) -> Option<String> {
        None
    }
}

pub fn validate<T: Validate>(record: T) -> Outcome<T> {
    let violations = record.collect_violations();
    if violations.is_empty() {
        Outcome::Accepted(record)
    } else {
        Outcome::Rejected { record, violations }
    }
}

/// Partition of a batch into accepted records and rejected records with their
/// violations. Individual record failures never abort the batch.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub accepted: Vec<T>,
    pub rejected: Vec<(T, Vec<Violation>)>,
}

impl<T> BatchOutcome<T> {
    pub fn seen(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    /// Rejection counts grouped by rule family, for run reporting.
    pub fn rejections_by_rule(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for (_, violations) in &self.rejected {
            for v in violations {
                *counts.entry(v.rule.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }
}

pub fn validate_batch<T: Validate>(records: Vec<T>) -> BatchOutcome<T> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for record in records {
        match validate(record) {
            Outcome::Accepted(rec) => {
                // Within one batch the same natural key may only appear once;
                // the later record loses.
                if let Some(key) = rec.natural_key() {
                    if !seen_keys.insert(key.clone()) {
                        rejected.push((
                            rec,
                            vec![Violation {
                                field: "natural_key",
                                rule: Rule::Relationship,
                                detail: format!("duplicate natural key in batch: {key}"),
                            }],
                        ));
                        continue;
                    }
                }
                accepted.push(rec);
            }
            Outcome::Rejected { record, violations } => rejected.push((record, violations)),
        }
    }

    BatchOutcome { accepted, rejected }
}

// --- shared checks ---

struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    fn push(&mut self, field: &'static str, rule: Rule, detail: impl Into<String>) {
        self.violations.push(Violation {
            field,
            rule,
            detail: detail.into(),
        });
    }

    fn required_str(&mut self, field: &'static str, value: Option<&str>) {
        match value {
            None => self.push(field, Rule::Required, "field is missing"),
            Some(s) if s.trim().is_empty() => {
                self.push(field, Rule::Required, "field is empty")
            }
            Some(_) => {}
        }
    }

    fn required<T>(&mut self, field: &'static str, value: &Option<T>) {
        if value.is_none() {
            self.push(field, Rule::Required, "field is missing");
        }
    }

    /// Record identifiers are source-native alphanumeric tokens (optionally
    /// with `_` or `-`); anything else is a mangled extraction.
    fn identifier_format(&mut self, field: &'static str, value: Option<&str>) {
        if let Some(s) = value {
            if !s.is_empty()
                && !s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                self.push(
                    field,
                    Rule::Format,
                    format!("identifier contains invalid characters: {s:?}"),
                );
            }
        }
    }

    fn identity(&mut self, field: &'static str, value: Option<&str>) {
        if let Some(s) = value {
            let normalized = s.trim().to_ascii_lowercase();
            if PLACEHOLDER_BLOCKLIST.contains(&normalized.as_str()) {
                self.push(
                    field,
                    Rule::Placeholder,
                    format!("placeholder value: {s:?}"),
                );
            }
        }
    }

    fn season(&mut self, value: Option<i32>) {
        match value {
            None => self.push(
                "season",
                Rule::Derivation,
                "season could not be derived from any game timestamp",
            ),
            Some(year) if !(MIN_SEASON_YEAR..=MAX_SEASON_YEAR).contains(&year) => self.push(
                "season",
                Rule::Range,
                format!("season {year} outside {MIN_SEASON_YEAR}-{MAX_SEASON_YEAR}"),
            ),
            Some(_) => {}
        }
    }

    fn bounded(&mut self, field: &'static str, value: Option<i64>, max: i64) {
        if let Some(v) = value {
            if v < 0 {
                self.push(field, Rule::Range, format!("negative value: {v}"));
            } else if v > max {
                self.push(field, Rule::Range, format!("value {v} above ceiling {max}"));
            }
        }
    }

    fn must_be_absent(&mut self, field: &'static str, value: Option<i64>, category: StatCategory) {
        if value.is_some() {
            self.push(
                field,
                Rule::Relationship,
                format!("field does not belong to {category} records"),
            );
        }
    }

    fn teams_differ(&mut self, team: Option<&str>, opponent: Option<&str>) {
        if let (Some(t), Some(o)) = (team, opponent) {
            if t.eq_ignore_ascii_case(o) {
                self.push(
                    "opponent",
                    Rule::Relationship,
                    format!("team and opponent are both {t:?}"),
                );
            }
        }
    }
}

impl Validate for PropLine {
    fn collect_violations(&self) -> Vec<Violation> {
        let mut c = Checker::new();

        // Required
        c.required_str("projection_id", Some(&self.projection_id));
        c.required_str("source", Some(&self.source));
        c.required_str("player_id", self.player_id.as_deref());
        c.required_str("player_name", self.player_name.as_deref());
        c.required_str("team", self.team.as_deref());
        c.required("position", &self.position);
        c.required_str("stat_type", self.stat_type.as_deref());
        c.required("line_score", &self.line_score);
        c.required("game_time", &self.game_time);

        // Format
        c.identifier_format("projection_id", Some(&self.projection_id));
        c.identifier_format("player_id", self.player_id.as_deref());

        // Placeholders on identity fields
        c.identity("player_name", self.player_name.as_deref());
        c.identity("team", self.team.as_deref());
        c.identity("opponent", self.opponent.as_deref());
        c.identity("stat_type", self.stat_type.as_deref());

        // Relationships
        c.teams_differ(self.team.as_deref(), self.opponent.as_deref());

        // Ranges
        c.season(self.season);
        if let Some(line) = self.line_score {
            if line < Decimal::ZERO {
                c.push("line_score", Rule::Range, format!("negative line: {line}"));
            } else if line > Decimal::from(1000) {
                c.push(
                    "line_score",
                    Rule::Range,
                    format!("implausible line: {line}"),
                );
            }
        }

        c.violations
    }

    fn natural_key(&self) -> Option<String> {
        if self.projection_id.is_empty() {
            return None;
        }
        Some(format!("{}|{}", self.source, self.projection_id))
    }
}

impl Validate for PlayerStat {
    fn collect_violations(&self) -> Vec<Violation> {
        let mut c = Checker::new();

        // Required
        c.required_str("game_id", Some(&self.game_id));
        c.required_str("source", Some(&self.source));
        c.required_str("player_id", self.player_id.as_deref());
        c.required_str("player_name", self.player_name.as_deref());
        c.required_str("team", self.team.as_deref());
        c.required("position", &self.position);
        if !self.has_category_stats() {
            c.push(
                "stat_type",
                Rule::Required,
                format!("no {} statistics recorded", self.stat_type),
            );
        }

        // Format
        c.identifier_format("game_id", Some(&self.game_id));
        c.identifier_format("player_id", self.player_id.as_deref());

        // Placeholders
        c.identity("player_name", self.player_name.as_deref());
        c.identity("team", self.team.as_deref());
        c.identity("opponent", self.opponent.as_deref());
        c.identity("game_id", Some(&self.game_id));

        // Relationships: only this category's fields may be populated
        match self.stat_type {
            StatCategory::Passing => {
                for (field, value) in [
                    ("receiving_yards", self.receiving_yards),
                    ("receptions", self.receptions),
                    ("targets", self.targets),
                    ("receiving_touchdowns", self.receiving_touchdowns),
                    ("rushing_yards", self.rushing_yards),
                    ("rushing_attempts", self.rushing_attempts),
                    ("rushing_touchdowns", self.rushing_touchdowns),
                ] {
                    c.must_be_absent(field, value, self.stat_type);
                }
            }
            StatCategory::Receiving => {
                for (field, value) in [
                    ("passing_yards", self.passing_yards),
                    ("completions", self.completions),
                    ("attempts", self.attempts),
                    ("passing_touchdowns", self.passing_touchdowns),
                    ("interceptions", self.interceptions),
                    ("sacks", self.sacks),
                    ("sack_yards_lost", self.sack_yards_lost),
                    ("rushing_yards", self.rushing_yards),
                    ("rushing_attempts", self.rushing_attempts),
                    ("rushing_touchdowns", self.rushing_touchdowns),
                ] {
                    c.must_be_absent(field, value, self.stat_type);
                }
            }
            StatCategory::Rushing => {
                for (field, value) in [
                    ("passing_yards", self.passing_yards),
                    ("completions", self.completions),
                    ("attempts", self.attempts),
                    ("passing_touchdowns", self.passing_touchdowns),
                    ("interceptions", self.interceptions),
                    ("sacks", self.sacks),
                    ("sack_yards_lost", self.sack_yards_lost),
                    ("receiving_yards", self.receiving_yards),
                    ("receptions", self.receptions),
                    ("targets", self.targets),
                    ("receiving_touchdowns", self.receiving_touchdowns),
                ] {
                    c.must_be_absent(field, value, self.stat_type);
                }
            }
        }
        c.teams_differ(self.team.as_deref(), self.opponent.as_deref());
        if let (Some(comp), Some(att)) = (self.completions, self.attempts) {
            if comp > att {
                c.push(
                    "completions",
                    Rule::Relationship,
                    format!("completions ({comp}) exceed attempts ({att})"),
                );
            }
        }
        if let (Some(rec), Some(tgt)) = (self.receptions, self.targets) {
            if rec > tgt {
                c.push(
                    "receptions",
                    Rule::Relationship,
                    format!("receptions ({rec}) exceed targets ({tgt})"),
                );
            }
        }

        // Ranges
        c.season(self.season);
        if let Some(week) = self.week {
            if !(1..=18).contains(&week) {
                c.push("week", Rule::Range, format!("week {week} outside 1-18"));
            }
        }
        for &(field, max) in STAT_BOUNDS {
            let value = match field {
                "passing_yards" => self.passing_yards,
                "completions" => self.completions,
                "attempts" => self.attempts,
                "passing_touchdowns" => self.passing_touchdowns,
                "interceptions" => self.interceptions,
                "sacks" => self.sacks,
                "sack_yards_lost" => self.sack_yards_lost,
                "receiving_yards" => self.receiving_yards,
                "receptions" => self.receptions,
                "targets" => self.targets,
                "receiving_touchdowns" => self.receiving_touchdowns,
                "rushing_yards" => self.rushing_yards,
                "rushing_attempts" => self.rushing_attempts,
                "rushing_touchdowns" => self.rushing_touchdowns,
                _ => None,
            };
            c.bounded(field, value, max);
        }

        c.violations
    }

    fn natural_key(&self) -> Option<String> {
        let player_id = self.player_id.as_deref()?;
        if player_id.is_empty() || self.game_id.is_empty() {
            return None;
        }
        Some(format!("{player_id}|{}|{}", self.game_id, self.stat_type))
    }
}

impl Validate for Player {
    fn collect_violations(&self) -> Vec<Violation> {
        let mut c = Checker::new();
        c.required_str("player_id", Some(&self.player_id));
        c.required_str("name", Some(&self.name));
        c.identity("name", Some(&self.name));
        c.violations
    }

    fn natural_key(&self) -> Option<String> {
        if self.player_id.is_empty() {
            return None;
        }
        Some(self.player_id.clone())
    }
}

impl Validate for Team {
    fn collect_violations(&self) -> Vec<Violation> {
        let mut c = Checker::new();
        c.required_str("name", Some(&self.name));
        c.required_str("abbreviation", Some(&self.abbreviation));
        c.identity("name", Some(&self.name));
        c.identity("abbreviation", Some(&self.abbreviation));
        c.violations
    }

    fn natural_key(&self) -> Option<String> {
        if self.abbreviation.is_empty() {
            return None;
        }
        Some(format!("{}|{}", self.abbreviation, self.league))
    }
}
