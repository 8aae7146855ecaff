use crate::error::StoreError;
use crate::models::Pick;
use crate::store::Collections;
use crate::utils::standings::StandingRow;
use anyhow::{Context, Result};
use std::path::Path;

/// Save the store to a JSON snapshot file
pub async fn save_snapshot(collections: &Collections, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // Write to a sibling file first so a crash never leaves half a snapshot
    let json = serde_json::to_vec_pretty(collections)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Load the store from a JSON snapshot file, `None` if it does not exist yet
pub async fn load_snapshot(path: &Path) -> Result<Option<Collections>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn csv_writer(filename: &str) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = Path::new(filename).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    csv::Writer::from_path(filename).context("Failed to create CSV file")
}

/// Save picks to CSV
pub fn save_picks_to_csv(picks: &[Pick], filename: &str) -> Result<()> {
    let mut writer = csv_writer(filename)?;

    writer.write_record([
        "User", "League", "Week", "Home Team", "Away Team", "Pick", "Spread", "Game Id",
        "Correct",
    ])?;

    for pick in picks {
        let correct = match pick.correct {
            Some(true) => "yes",
            Some(false) => "no",
            None => "",
        };
        let league = pick.league.to_string();
        let week = pick.week.to_string();
        writer.write_record([
            pick.user.as_str(),
            league.as_str(),
            week.as_str(),
            pick.home_team.as_str(),
            pick.away_team.as_str(),
            pick.pick.as_str(),
            pick.spread.as_str(),
            pick.game_id.as_deref().unwrap_or(""),
            correct,
        ])?;
    }

    writer.flush().context("Failed to write CSV file")?;
    Ok(())
}

/// Save standings to CSV
pub fn save_standings_to_csv(rows: &[StandingRow], filename: &str) -> Result<()> {
    let mut writer = csv_writer(filename)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().context("Failed to write CSV file")?;
    Ok(())
}
