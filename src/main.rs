use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use props_ingest::config::AppConfig;
use props_ingest::db::Store;
use props_ingest::logging;
use props_ingest::model::{GameContext, League};
use props_ingest::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "props-ingest", about = "Sports prop data ingestion pipeline")]
struct Cli {
    /// Re-ingest games already marked processed.
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a projection payload.
    Projections {
        /// Path to the projection JSON file.
        file: PathBuf,
        #[arg(long, default_value = "PrizePicks")]
        source: String,
    },
    /// Ingest one game's box score.
    Boxscore {
        /// Path to a boxscore_<eventid>.json file.
        file: PathBuf,
        /// Game id; parsed from the filename when omitted.
        #[arg(long)]
        game_id: Option<String>,
        #[arg(long)]
        week: i32,
        /// Kickoff time (RFC 3339), used to derive the season.
        #[arg(long)]
        kickoff: Option<String>,
        #[arg(long, default_value = "nfl")]
        league: String,
        #[arg(long, default_value = "Espn")]
        source: String,
    },
    /// Ingest a weekly game listing and report pending games.
    Games {
        /// Path to the listing JSON file.
        file: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        week: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    logging::init_logging(&config.monitoring)?;

    tracing::info!(
        database = %config.database.path,
        batch_size = config.ingest.batch_size,
        "props-ingest starting"
    );

    let store = Store::new(&config.database.path, config.retry).await?;
    let force = cli.force || config.ingest.force;
    let pipeline = Pipeline::new(store, config.ingest.batch_size, force);

    match cli.command {
        Command::Projections { file, source } => {
            let payload = load_json(&file)?;
            let report = pipeline.ingest_projections(&payload, &source).await?;
            println!("{report}");
        }
        Command::Boxscore {
            file,
            game_id,
            week,
            kickoff,
            league,
            source,
        } => {
            let payload = load_json(&file)?;
            let game_id = match game_id {
                Some(id) => id,
                None => game_id_from_filename(&file)
                    .context("no --game-id given and none found in filename")?,
            };
            let kickoff = kickoff
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|t| t.with_timezone(&Utc))
                        .with_context(|| format!("invalid kickoff time: {raw}"))
                })
                .transpose()?;
            let league =
                League::from_str(&league).map_err(|e| anyhow::anyhow!("{e}"))?;
            let game = GameContext {
                game_id,
                week,
                kickoff,
            };
            let report = pipeline
                .ingest_box_score(&payload, &game, &source, league)
                .await?;
            println!("{report}");
        }
        Command::Games { file, year, week } => {
            let payload = load_json(&file)?;
            let plan = pipeline.ingest_game_listing(&payload, year, week).await?;
            println!("{}", plan.report);
            for game_id in &plan.pending {
                println!("pending: {game_id}");
            }
        }
    }

    Ok(())
}

fn load_json(path: &Path) -> Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse JSON: {}", path.display()))
}

/// Extract the event id from a boxscore_<eventid>.json filename.
fn game_id_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.strip_prefix("boxscore_")?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(id.to_string())
    } else {
        None
    }
}
