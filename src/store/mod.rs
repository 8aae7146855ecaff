use crate::error::StoreError;
use crate::models::{Game, League, Pick, PickFields, PickFilter, PickKey, SelectedGameSet};
use crate::utils::data::{load_snapshot, save_snapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Every collection the service persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collections {
    pub games: BTreeMap<String, Game>,
    pub selections: Vec<SelectedGameSet>,
    pub picks: Vec<Pick>,
    pub next_pick_id: u64,
}

/// Document store for games, selected-game sets and picks.
///
/// Each mutation touches one document under the write lock and, when a
/// snapshot path is configured, rewrites the snapshot before the lock is
/// released. A failed snapshot write rolls the document back.
pub struct Store {
    inner: RwLock<Collections>,
    snapshot: Option<PathBuf>,
}

impl Store {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            snapshot: None,
        }
    }

    /// Store backed by a JSON snapshot file, created on first write
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let collections = load_snapshot(&path).await?.unwrap_or_default();
        tracing::info!(
            path = %path.display(),
            games = collections.games.len(),
            picks = collections.picks.len(),
            "opened store"
        );

        Ok(Self {
            inner: RwLock::new(collections),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, collections: &Collections) -> Result<(), StoreError> {
        match &self.snapshot {
            Some(path) => save_snapshot(collections, path).await,
            None => Ok(()),
        }
    }

    pub async fn find_games_by_week_league(&self, week: u32, league: League) -> Vec<Game> {
        let inner = self.inner.read().await;
        let mut games: Vec<Game> = inner
            .games
            .values()
            .filter(|g| g.week == week && g.league == league)
            .cloned()
            .collect();
        games.sort_by(|a, b| a.kickoff.cmp(&b.kickoff));
        games
    }

    pub async fn find_game(&self, game_id: &str) -> Option<Game> {
        self.inner.read().await.games.get(game_id).cloned()
    }

    /// Games in the given order; unknown ids are left out
    pub async fn find_games_by_ids(&self, game_ids: &[String]) -> Vec<Game> {
        let inner = self.inner.read().await;
        game_ids
            .iter()
            .filter_map(|id| inner.games.get(id).cloned())
            .collect()
    }

    /// Insert or replace a game keyed by its external id
    pub async fn upsert_game(&self, game: Game) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let previous = inner.games.insert(game.game_id.clone(), game.clone());

        if let Err(e) = self.persist(&inner).await {
            match previous {
                Some(previous) => inner.games.insert(game.game_id.clone(), previous),
                None => inner.games.remove(&game.game_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Distinct weeks that have at least one game, ascending
    pub async fn distinct_weeks(&self, league: Option<League>) -> Vec<u32> {
        let inner = self.inner.read().await;
        let mut weeks: Vec<u32> = inner
            .games
            .values()
            .filter(|g| league.map_or(true, |l| g.league == l))
            .map(|g| g.week)
            .collect();
        weeks.sort_unstable();
        weeks.dedup();
        weeks
    }

    pub async fn find_selected_game_set(&self, week: u32, league: League) -> Option<SelectedGameSet> {
        self.inner
            .read()
            .await
            .selections
            .iter()
            .find(|s| s.week == week && s.league == league)
            .cloned()
    }

    /// Replace the set for (week, league); the old set is discarded
    pub async fn upsert_selected_game_set(
        &self,
        week: u32,
        league: League,
        game_ids: Vec<String>,
    ) -> Result<SelectedGameSet, StoreError> {
        let mut inner = self.inner.write().await;
        let previous = inner.selections.clone();

        inner
            .selections
            .retain(|s| !(s.week == week && s.league == league));
        let set = SelectedGameSet {
            week,
            league,
            game_ids,
            created_at: Utc::now(),
        };
        inner.selections.push(set.clone());

        if let Err(e) = self.persist(&inner).await {
            inner.selections = previous;
            return Err(e);
        }
        Ok(set)
    }

    pub async fn find_picks(&self, filter: &PickFilter) -> Vec<Pick> {
        self.inner
            .read()
            .await
            .picks
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    /// Create the pick for `key` or update its user-owned fields in place.
    /// The correctness flag is left untouched.
    pub async fn upsert_pick(&self, key: PickKey, fields: PickFields) -> Result<Pick, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let existing = inner.picks.iter().position(|p| p.key() == key);
        let (index, previous) = match existing {
            Some(index) => {
                let previous = inner.picks[index].clone();
                let pick = &mut inner.picks[index];
                pick.pick = fields.pick;
                pick.spread = fields.spread;
                pick.game_id = fields.game_id;
                pick.updated_at = now;
                (index, Some(previous))
            }
            None => {
                inner.next_pick_id += 1;
                let pick = Pick {
                    id: inner.next_pick_id,
                    user: key.user,
                    home_team: key.home_team,
                    away_team: key.away_team,
                    pick: fields.pick,
                    spread: fields.spread,
                    week: key.week,
                    league: key.league,
                    game_id: fields.game_id,
                    correct: None,
                    created_at: now,
                    updated_at: now,
                };
                inner.picks.push(pick);
                (inner.picks.len() - 1, None)
            }
        };

        if let Err(e) = self.persist(&inner).await {
            match previous {
                Some(previous) => inner.picks[index] = previous,
                None => {
                    inner.picks.remove(index);
                    inner.next_pick_id -= 1;
                }
            }
            return Err(e);
        }
        Ok(inner.picks[index].clone())
    }

    /// Write only the correctness flag. Returns whether the value changed.
    pub async fn set_pick_correctness(&self, id: u64, correct: bool) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let pick = inner
            .picks
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::UnknownPick(id))?;

        let previous = pick.correct;
        if previous == Some(correct) {
            return Ok(false);
        }
        pick.correct = Some(correct);

        if let Err(e) = self.persist(&inner).await {
            if let Some(pick) = inner.picks.iter_mut().find(|p| p.id == id) {
                pick.correct = previous;
            }
            return Err(e);
        }
        Ok(true)
    }
}
