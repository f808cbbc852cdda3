//! End-to-end pipeline tests against an in-memory store.

use props_ingest::db::{RetryPolicy, Store};
use props_ingest::model::{GameContext, League};
use props_ingest::pipeline::Pipeline;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

async fn pipeline(force: bool) -> Pipeline {
    let store = Store::new(":memory:", RetryPolicy::default())
        .await
        .expect("should create store");
    Pipeline::new(store, 1000, force)
}

fn projection_payload() -> Value {
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
            },
            {
                "type": "projection",
                "id": "pp_1002",
                "attributes": {
                    "stat_type": "Receiving Yards",
                    "line_score": "62.5"
                },
                "relationships": {
                    "new_player": {"data": {"type": "new_player", "id": "44"}},
                    "game": {"data": {"type": "game", "id": "g1"}},
                    "league": {"data": {"type": "league", "id": "9"}}
                }
            },
            {
                "type": "projection",
                "id": "pp_1003",
                "attributes": {
                    "stat_type": "Pass Yards",
                    "line_score": 210.0
                },
                "relationships": {
                    "new_player": {"data": {"type": "new_player", "id": "missing"}},
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
                "type": "new_player",
                "id": "44",
                "attributes": {
                    "display_name": "Garrett Wilson",
                    "team": "NYJ",
                    "position": "WR"
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

fn box_score_payload() -> Value {
    json!({
        "boxscore": {
            "players": [
                {
                    "team": {"name": "Buffalo Bills", "abbreviation": "BUF"},
                    "statistics": [
                        {
                            "name": "passing",
                            "labels": ["C/ATT", "YDS", "AVG", "TD", "INT", "SACKS"],
                            "athletes": [
                                {
                                    "athlete": {
                                        "id": "3918298",
                                        "displayName": "Josh Allen",
                                        "position": {"abbreviation": "QB"}
                                    },
                                    "stats": ["22/31", "275", "8.9", "2", "1", "2-11"]
                                }
                            ]
                        }
                    ]
                },
                {
                    "team": {"name": "New York Jets", "abbreviation": "NYJ"},
                    "statistics": [
                        {
                            "name": "receiving",
                            "labels": ["REC", "YDS", "AVG", "TD", "TGTS"],
                            "athletes": [
                                {
                                    "athlete": {
                                        "id": "4569618",
                                        "displayName": "Garrett Wilson",
                                        "position": {"abbreviation": "WR"}
                                    },
                                    "stats": ["7", "83", "11.9", "1", "11"]
                                }
                            ]
                        }
                    ]
                }
            ]
        }
    })
}

fn game_context() -> GameContext {
    GameContext {
        game_id: "401547353".to_string(),
        week: 1,
        kickoff: Some(Utc.with_ymd_and_hms(2024, 9, 10, 17, 0, 0).unwrap()),
    }
}

#[tokio::test]
async fn projections_end_to_end() {
    let pipeline = pipeline(false).await;
    let report = pipeline
        .ingest_projections(&projection_payload(), "PrizePicks")
        .await
        .expect("ingestion should succeed");

    // Two resolvable projections accepted; the third references a player
    // missing from included data and fails validation.
    assert_eq!(report.records_seen, 3);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.written, 2);
    assert_eq!(report.updated, 0);

    let row = pipeline
        .store()
        .get_prop_line("PrizePicks", "pp_1001")
        .await
        .unwrap()
        .expect("line should be persisted");
    assert_eq!(row.player_name, "Josh Allen");
    assert_eq!(row.team, "BUF");
    assert_eq!(row.opponent.as_deref(), Some("NYJ"));
    assert_eq!(row.stat_type, "Pass Yards");
    assert_eq!(row.line_score, "248.5");
    assert_eq!(row.season, 2024);
    assert_eq!(row.league, "nfl");
    assert_eq!(row.odds_type, "standard");

    // Dimension rows implied by the accepted lines.
    assert_eq!(pipeline.store().count_players().await.unwrap(), 2);
    assert_eq!(pipeline.store().count_teams().await.unwrap(), 2);

    let by_player = pipeline
        .store()
        .get_prop_lines_for_player("17")
        .await
        .unwrap();
    assert_eq!(by_player.len(), 1);
    assert_eq!(by_player[0].projection_id, "pp_1001");
}

#[tokio::test]
async fn projections_rerun_updates_in_place() {
    let pipeline = pipeline(false).await;
    pipeline
        .ingest_projections(&projection_payload(), "PrizePicks")
        .await
        .unwrap();

    let mut payload = projection_payload();
    payload["data"][0]["attributes"]["line_score"] = json!(251.5);
    let report = pipeline
        .ingest_projections(&payload, "PrizePicks")
        .await
        .unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(report.updated, 2);

    assert_eq!(pipeline.store().count_prop_lines().await.unwrap(), 2);
    let row = pipeline
        .store()
        .get_prop_line("PrizePicks", "pp_1001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.line_score, "251.5");
}

#[tokio::test]
async fn malformed_projection_payload_fails_the_run() {
    let pipeline = pipeline(false).await;
    let err = pipeline
        .ingest_projections(&json!({"data": []}), "PrizePicks")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("included"));
    assert_eq!(pipeline.store().count_prop_lines().await.unwrap(), 0);
}

#[tokio::test]
async fn box_score_end_to_end_with_dedup() {
    let pipeline = pipeline(false).await;
    let report = pipeline
        .ingest_box_score(&box_score_payload(), &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(report.written, 2);
    assert_eq!(report.skipped_duplicate_games, 0);

    let stats = pipeline
        .store()
        .get_stats_for_game("401547353")
        .await
        .unwrap();
    assert_eq!(stats.len(), 2);
    let qb = stats
        .iter()
        .find(|s| s.player_name == "Josh Allen")
        .unwrap();
    assert_eq!(qb.completions, Some(22));
    assert_eq!(qb.attempts, Some(31));
    assert_eq!(qb.passing_yards, Some(275));
    assert_eq!(qb.sacks, Some(2));
    assert_eq!(qb.sack_yards_lost, Some(11));
    assert_eq!(qb.opponent.as_deref(), Some("NYJ"));
    assert_eq!(qb.season, 2024);
    assert_eq!(qb.week, 1);

    assert!(pipeline
        .store()
        .is_game_processed("401547353")
        .await
        .unwrap());
    let marker = pipeline
        .store()
        .get_processed_game("401547353")
        .await
        .unwrap()
        .expect("marker should exist");
    assert_eq!(marker.week, 1);
    assert_eq!(marker.year, 2024);
    assert_eq!(marker.game_type, 2);

    let career = pipeline
        .store()
        .get_stats_for_player("3918298")
        .await
        .unwrap();
    assert_eq!(career.len(), 1);

    // Second run skips the whole game.
    let report = pipeline
        .ingest_box_score(&box_score_payload(), &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();
    assert_eq!(report.skipped_duplicate_games, 1);
    assert_eq!(report.records_seen, 0);
    assert_eq!(report.written, 0);
    assert_eq!(
        pipeline.store().count_player_stats().await.unwrap(),
        2
    );
}

#[tokio::test]
async fn force_mode_reprocesses_a_marked_game() {
    let pipeline = pipeline(true).await;
    pipeline
        .ingest_box_score(&box_score_payload(), &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();

    let mut payload = box_score_payload();
    payload["boxscore"]["players"][0]["statistics"][0]["athletes"][0]["stats"] =
        json!(["23/32", "291", "9.1", "3", "1"]);
    let report = pipeline
        .ingest_box_score(&payload, &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();
    assert_eq!(report.skipped_duplicate_games, 0);
    assert_eq!(report.updated, 2);

    let stats = pipeline
        .store()
        .get_stats_for_game("401547353")
        .await
        .unwrap();
    let qb = stats
        .iter()
        .find(|s| s.player_name == "Josh Allen")
        .unwrap();
    assert_eq!(qb.passing_yards, Some(291));
}

#[tokio::test]
async fn invalid_stat_relationship_is_rejected_without_aborting() {
    let pipeline = pipeline(false).await;
    let mut payload = box_score_payload();
    // Five completions on zero attempts is impossible; only this record
    // should be rejected.
    payload["boxscore"]["players"][0]["statistics"][0]["athletes"][0]["stats"] =
        json!(["5/0", "60", "12.0", "0", "0"]);
    let report = pipeline
        .ingest_box_score(&payload, &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.accepted, 1);
    assert!(report.rejected_by_rule.contains_key("relationship"));

    let stats = pipeline
        .store()
        .get_stats_for_game("401547353")
        .await
        .unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].player_name, "Garrett Wilson");
}

#[tokio::test]
async fn empty_accepted_batch_leaves_game_unmarked() {
    let pipeline = pipeline(false).await;
    let payload = json!({"boxscore": {"players": []}});
    let report = pipeline
        .ingest_box_score(&payload, &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();
    assert_eq!(report.accepted, 0);
    assert!(!pipeline
        .store()
        .is_game_processed("401547353")
        .await
        .unwrap());
}

#[tokio::test]
async fn game_listing_reports_pending_and_processed() {
    let pipeline = pipeline(false).await;
    pipeline
        .ingest_box_score(&box_score_payload(), &game_context(), "Espn", League::Nfl)
        .await
        .unwrap();

    let listing = json!({
        "items": [
            {"eventid": "401547353"},
            {"eventid": "401547403"},
            {"eventid": "401547397"}
        ]
    });
    let plan = pipeline
        .ingest_game_listing(&listing, 2024, 1)
        .await
        .unwrap();
    assert_eq!(plan.batch.game_ids.len(), 3);
    assert_eq!(plan.report.skipped_duplicate_games, 1);
    assert_eq!(plan.pending, vec!["401547403", "401547397"]);
}
