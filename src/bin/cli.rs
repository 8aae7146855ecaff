use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pickem::config::{init_logging, AppConfig};
use pickem::data::{save_picks_to_csv, save_standings_to_csv};
use pickem::espn_api::{EspnClient, ScoreProvider};
use pickem::lock::{can_edit_picks, compute_lock_instant};
use pickem::models::{League, PickFilter};
use pickem::reconcile::reconcile;
use pickem::standings::standings;
use pickem::store::Store;
use std::sync::Arc;

/// Pick'em admin tool
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a week's scoreboard from ESPN and store its games
    Ingest {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
    },
    /// Make the given games the live slate for a week
    Select {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
        /// Game ids; defaults to every stored game of the week
        game_ids: Vec<String>,
    },
    /// Print the live scoreboard for a week
    Scores {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
    },
    /// Show when picks lock for a week
    Lock {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
    },
    /// Grade picks against final scores
    Reconcile {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
    },
    /// Print the week's standings
    Standings {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
        /// Also write standings to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },
    /// Write the week's picks to a CSV file
    Export {
        #[arg(long)]
        league: League,
        #[arg(long)]
        week: u32,
        #[arg(long, default_value = "cache/picks.csv")]
        out: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    init_logging();

    let cli = Cli::parse();
    let config = cli.config;

    let store = Store::open(&config.data_file)
        .await
        .with_context(|| format!("Failed to open store at {}", config.data_file.display()))?;

    match cli.command {
        Command::Ingest { league, week } => {
            let client = EspnClient::new(config.espn_base_url.clone(), config.fetch_timeout())?;
            let games = client
                .fetch_scoreboard(league, week)
                .await
                .context("Failed to fetch scoreboard")?;

            for game in &games {
                store.upsert_game(game.clone()).await?;
                println!(
                    "{} @ {} | {} | {} [{}]",
                    game.away_team, game.home_team, game.spread, game.kickoff, game.game_id
                );
            }
            println!("\nStored {} {} games for week {}", games.len(), league, week);
        }
        Command::Select {
            league,
            week,
            game_ids,
        } => {
            let game_ids = if game_ids.is_empty() {
                store
                    .find_games_by_week_league(week, league)
                    .await
                    .into_iter()
                    .map(|g| g.game_id)
                    .collect()
            } else {
                game_ids
            };
            let known = store.find_games_by_ids(&game_ids).await;
            if known.len() != game_ids.len() {
                anyhow::bail!(
                    "{} of {} game ids are not stored; run ingest first",
                    game_ids.len() - known.len(),
                    game_ids.len()
                );
            }

            let set = store
                .upsert_selected_game_set(week, league, game_ids)
                .await?;
            println!("Selected {} games for {} week {}", set.game_ids.len(), league, week);
        }
        Command::Scores { league, week } => {
            let client = EspnClient::new(config.espn_base_url.clone(), config.fetch_timeout())?;
            let entries = client
                .fetch_scores(league, week)
                .await
                .context("Failed to fetch scoreboard")?;

            let score = |points: Option<u32>| points.map_or("-".to_string(), |p| p.to_string());
            for (i, entry) in entries.iter().enumerate() {
                let state = &entry.state;
                println!(
                    "{}. {} {} @ {} {} | {} | {}",
                    i + 1,
                    state.away_team,
                    score(state.away_score),
                    state.home_team,
                    score(state.home_score),
                    state.status,
                    state.odds.as_deref().unwrap_or("N/A")
                );
            }
        }
        Command::Lock { league, week } => {
            let games = match store.find_selected_game_set(week, league).await {
                Some(set) => store.find_games_by_ids(&set.game_ids).await,
                None => {
                    println!("No games selected for {} week {}", league, week);
                    return Ok(());
                }
            };

            match compute_lock_instant(&games, &config.lock_policy()?) {
                Some(lock) => {
                    let open = can_edit_picks(Some(lock), chrono::Utc::now());
                    println!(
                        "{} week {} locks at {} ({})",
                        league,
                        week,
                        lock,
                        if open { "open" } else { "locked" }
                    );
                }
                None => println!("{} week {} has no lock-day games; picks never lock", league, week),
            }
        }
        Command::Reconcile { league, week } => {
            let client = EspnClient::new(config.espn_base_url.clone(), config.fetch_timeout())?;
            let report = reconcile(
                &store,
                Arc::new(client),
                week,
                league,
                config.reconcile_options(),
            )
            .await?;

            println!("{}", report.format());
            for (i, issue) in report.issues.iter().enumerate() {
                println!("{}. {:?}: {}", i + 1, issue.kind, issue.message);
            }
        }
        Command::Standings { league, week, csv } => {
            let filter = PickFilter {
                user: None,
                week: Some(week),
                league: Some(league),
            };
            let rows = standings(&store.find_picks(&filter).await);

            if rows.is_empty() {
                println!("No picks for {} week {}", league, week);
            }
            for (i, row) in rows.iter().enumerate() {
                println!("{}. {}", i + 1, row.format());
            }

            if let Some(path) = csv {
                save_standings_to_csv(&rows, &path)?;
                println!("\nSaved standings to {}", path);
            }
        }
        Command::Export { league, week, out } => {
            let filter = PickFilter {
                user: None,
                week: Some(week),
                league: Some(league),
            };
            let picks = store.find_picks(&filter).await;
            save_picks_to_csv(&picks, &out)?;
            println!("Saved {} picks to {}", picks.len(), out);
        }
    }

    Ok(())
}
