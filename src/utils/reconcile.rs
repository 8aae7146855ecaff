//! Grading of stored picks against final scores.
//!
//! Each distinct game referenced by the week's picks is fetched once, with a
//! cap on in-flight requests and a timeout per request. A game that cannot be
//! fetched only leaves its own picks ungraded. The single write is the
//! correctness flag, so a pick resubmitted while grading runs keeps the
//! user's fields.

use crate::api::espn_api::{GameState, ScoreProvider};
use crate::error::StoreError;
use crate::models::{League, Pick, PickFilter};
use crate::store::Store;
use crate::utils::spread::{evaluate, home_handicap, is_pick_correct};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Limits applied to the provider fan-out
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub concurrency: usize,
    pub fetch_timeout: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingGameId,
    FetchFailed,
    FetchTimedOut,
    TeamMismatch,
    MissingScore,
}

/// Something the caller should know about; never aborts the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileIssue {
    pub kind: IssueKind,
    pub pick_id: Option<u64>,
    pub game_id: Option<String>,
    pub message: String,
}

/// Outcome of one reconciliation pass.
/// `examined == updated + pending + skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub week: u32,
    pub league: League,
    pub examined: usize,
    /// Picks whose correctness flag was written this pass
    pub updated: usize,
    /// Subset of `updated` whose flag differed from before
    pub changed: usize,
    /// Picks on games that are not final, could not be fetched, or could
    /// not be matched to a usable final score
    pub pending: usize,
    /// Picks with no game id
    pub skipped: usize,
    pub issues: Vec<ReconcileIssue>,
}

impl ReconcileReport {
    pub fn format(&self) -> String {
        format!(
            "{} week {} | examined: {} | updated: {} (changed: {}) | pending: {} | skipped: {} | issues: {}",
            self.league,
            self.week,
            self.examined,
            self.updated,
            self.changed,
            self.pending,
            self.skipped,
            self.issues.len()
        )
    }
}

enum FetchOutcome {
    Fetched(GameState),
    Failed(String),
    TimedOut,
}

/// Fetch every game once, at most `options.concurrency` at a time
async fn fetch_games(
    provider: Arc<dyn ScoreProvider>,
    league: League,
    game_ids: BTreeSet<String>,
    options: ReconcileOptions,
) -> BTreeMap<String, FetchOutcome> {
    let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for game_id in game_ids {
        let provider = Arc::clone(&provider);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => {
                    match tokio::time::timeout(
                        options.fetch_timeout,
                        provider.fetch_game(league, &game_id),
                    )
                    .await
                    {
                        Ok(Ok(state)) => FetchOutcome::Fetched(state),
                        Ok(Err(e)) => FetchOutcome::Failed(e.to_string()),
                        Err(_) => FetchOutcome::TimedOut,
                    }
                }
                Err(e) => FetchOutcome::Failed(e.to_string()),
            };
            (game_id, outcome)
        });
    }

    let mut outcomes = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((game_id, outcome)) => {
                outcomes.insert(game_id, outcome);
            }
            // A panicking fetch leaves its game out; its picks count as pending
            Err(e) => tracing::error!(error = %e, "game fetch task failed"),
        }
    }
    outcomes
}

/// Final scores lined up with the pick's own home/away
fn scores_for_pick(pick: &Pick, state: &GameState) -> Result<(u32, u32), IssueKind> {
    let (home_score, away_score) = if state.home_team == pick.home_team && state.away_team == pick.away_team {
        (state.home_score, state.away_score)
    } else if state.home_team == pick.away_team && state.away_team == pick.home_team {
        (state.away_score, state.home_score)
    } else {
        return Err(IssueKind::TeamMismatch);
    };

    match (home_score, away_score) {
        (Some(home), Some(away)) => Ok((home, away)),
        _ => Err(IssueKind::MissingScore),
    }
}

/// Grade one pick against a completed game.
/// Fails when the game is not the pick's matchup or has no usable score.
pub fn grade_pick(pick: &Pick, state: &GameState) -> Result<bool, IssueKind> {
    let (home_score, away_score) = scores_for_pick(pick, state)?;

    // Abbreviations only orient the descriptor when they belong to the pick's sides
    let (home_abbrev, away_abbrev) = if state.home_team == pick.away_team {
        (state.away_abbreviation.as_deref(), state.home_abbreviation.as_deref())
    } else {
        (state.home_abbreviation.as_deref(), state.away_abbreviation.as_deref())
    };
    let spread = home_handicap(&pick.spread, home_abbrev, away_abbrev);

    let outcome = evaluate(
        &pick.home_team,
        &pick.away_team,
        home_score,
        away_score,
        spread,
    );
    Ok(is_pick_correct(&pick.pick, &outcome))
}

/// Grade every pick for (week, league) whose game has gone final
pub async fn reconcile(
    store: &Store,
    provider: Arc<dyn ScoreProvider>,
    week: u32,
    league: League,
    options: ReconcileOptions,
) -> Result<ReconcileReport, StoreError> {
    let filter = PickFilter {
        user: None,
        week: Some(week),
        league: Some(league),
    };
    let picks = store.find_picks(&filter).await;
    tracing::info!(%league, week, picks = picks.len(), "reconciling picks");

    let mut report = ReconcileReport {
        week,
        league,
        examined: picks.len(),
        updated: 0,
        changed: 0,
        pending: 0,
        skipped: 0,
        issues: Vec::new(),
    };

    let game_ids: BTreeSet<String> = picks
        .iter()
        .filter_map(|p| p.game_id.as_deref().map(str::trim))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    let outcomes = fetch_games(provider, league, game_ids, options).await;

    // Report fetch problems once per game rather than once per pick
    for (game_id, outcome) in &outcomes {
        let issue = match outcome {
            FetchOutcome::Failed(message) => Some((IssueKind::FetchFailed, message.clone())),
            FetchOutcome::TimedOut => Some((
                IssueKind::FetchTimedOut,
                format!("no response within {:?}", options.fetch_timeout),
            )),
            FetchOutcome::Fetched(_) => None,
        };
        if let Some((kind, message)) = issue {
            tracing::warn!(game_id = %game_id, ?kind, %message, "could not fetch game");
            report.issues.push(ReconcileIssue {
                kind,
                pick_id: None,
                game_id: Some(game_id.clone()),
                message,
            });
        }
    }

    for pick in &picks {
        let game_id = match pick.game_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => {
                tracing::warn!(pick_id = pick.id, user = %pick.user, "pick has no game id");
                report.skipped += 1;
                report.issues.push(ReconcileIssue {
                    kind: IssueKind::MissingGameId,
                    pick_id: Some(pick.id),
                    game_id: None,
                    message: format!(
                        "{}'s pick on {} vs {} has no game id",
                        pick.user, pick.home_team, pick.away_team
                    ),
                });
                continue;
            }
        };

        let state = match outcomes.get(game_id) {
            Some(FetchOutcome::Fetched(state)) if state.is_completed() => state,
            _ => {
                report.pending += 1;
                continue;
            }
        };

        let correct = match grade_pick(pick, state) {
            Ok(correct) => correct,
            Err(kind) => {
                let message = match kind {
                    IssueKind::TeamMismatch => format!(
                        "pick names {} vs {}, provider reports {} vs {}",
                        pick.home_team, pick.away_team, state.home_team, state.away_team
                    ),
                    _ => format!("final score missing for {} vs {}", state.home_team, state.away_team),
                };
                tracing::warn!(pick_id = pick.id, game_id, ?kind, %message, "pick left ungraded");
                report.pending += 1;
                report.issues.push(ReconcileIssue {
                    kind,
                    pick_id: Some(pick.id),
                    game_id: Some(game_id.to_string()),
                    message,
                });
                continue;
            }
        };

        let changed = store.set_pick_correctness(pick.id, correct).await?;
        tracing::debug!(pick_id = pick.id, user = %pick.user, pick = %pick.pick, correct, "graded pick");
        report.updated += 1;
        if changed {
            report.changed += 1;
        }
    }

    tracing::info!("{}", report.format());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::api::espn_api::ScoreboardEntry;
    use crate::models::{PickFields, PickKey};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider serving canned states, with optional failures and stalls
    #[derive(Default)]
    struct FakeProvider {
        games: HashMap<String, GameState>,
        failing: Vec<String>,
        stalled: Vec<String>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScoreProvider for FakeProvider {
        async fn fetch_game(&self, _league: League, game_id: &str) -> Result<GameState, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(game_id.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.stalled.iter().any(|id| id == game_id) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|id| id == game_id) {
                return Err(ProviderError::Status(503));
            }
            self.games
                .get(game_id)
                .cloned()
                .ok_or_else(|| ProviderError::Malformed(format!("unknown game {}", game_id)))
        }

        async fn fetch_scores(&self, _league: League, _week: u32) -> Result<Vec<ScoreboardEntry>, ProviderError> {
            Ok(self
                .games
                .values()
                .map(|state| ScoreboardEntry {
                    kickoff: chrono::Utc::now(),
                    state: state.clone(),
                })
                .collect())
        }
    }

    fn final_state(id: &str, home: &str, away: &str, home_score: u32, away_score: u32) -> GameState {
        GameState {
            game_id: id.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_abbreviation: None,
            away_abbreviation: None,
            home_score: Some(home_score),
            away_score: Some(away_score),
            status: "Final".to_string(),
            odds: None,
        }
    }

    async fn submit(
        store: &Store,
        user: &str,
        home: &str,
        away: &str,
        side: &str,
        spread: &str,
        game_id: Option<&str>,
    ) -> Pick {
        store
            .upsert_pick(
                PickKey {
                    user: user.to_string(),
                    home_team: home.to_string(),
                    away_team: away.to_string(),
                    week: 8,
                    league: League::Nfl,
                },
                PickFields {
                    pick: side.to_string(),
                    spread: spread.to_string(),
                    game_id: game_id.map(str::to_string),
                },
            )
            .await
            .unwrap()
    }

    fn fast() -> ReconcileOptions {
        ReconcileOptions {
            concurrency: 2,
            fetch_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_grades_completed_games_and_is_idempotent() {
        let store = Store::in_memory();
        // Lions -3 win 24-17: Lions cover
        submit(&store, "alex", "Detroit Lions", "Chicago Bears", "Detroit Lions", "DET -3", Some("g1")).await;
        submit(&store, "jordan", "Detroit Lions", "Chicago Bears", "Chicago Bears", "DET -3", Some("g1")).await;
        // Packers -3 win 20-17: push
        submit(&store, "alex", "Green Bay Packers", "Minnesota Vikings", "Green Bay Packers", "-3", Some("g2")).await;

        let mut provider = FakeProvider::default();
        provider.games.insert("g1".into(), final_state("g1", "Detroit Lions", "Chicago Bears", 24, 17));
        provider.games.insert("g2".into(), final_state("g2", "Green Bay Packers", "Minnesota Vikings", 20, 17));
        let provider: Arc<dyn ScoreProvider> = Arc::new(provider);

        let first = reconcile(&store, Arc::clone(&provider), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(first.examined, 3);
        assert_eq!(first.updated, 3);
        assert_eq!(first.changed, 3);
        assert!(first.issues.is_empty());

        let flags = |picks: Vec<Pick>| -> Vec<(u64, Option<bool>)> {
            picks.into_iter().map(|p| (p.id, p.correct)).collect()
        };
        let after_first = flags(store.find_picks(&PickFilter::default()).await);
        assert_eq!(after_first, vec![(1, Some(true)), (2, Some(false)), (3, Some(false))]);

        let second = reconcile(&store, provider, 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(second.updated, 3);
        assert_eq!(second.changed, 0);
        assert_eq!(flags(store.find_picks(&PickFilter::default()).await), after_first);
    }

    #[tokio::test]
    async fn test_each_game_fetched_once() {
        let store = Store::in_memory();
        for user in ["a", "b", "c", "d"] {
            submit(&store, user, "Detroit Lions", "Chicago Bears", "Detroit Lions", "-3", Some("g1")).await;
        }

        let mut provider = FakeProvider::default();
        provider.games.insert("g1".into(), final_state("g1", "Detroit Lions", "Chicago Bears", 30, 10));
        let provider = Arc::new(provider);

        let report = reconcile(&store, provider.clone(), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.updated, 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fan_out_is_capped() {
        let store = Store::in_memory();
        let mut provider = FakeProvider::default();
        for i in 0..10 {
            let id = format!("g{}", i);
            let home = format!("Home {}", i);
            let away = format!("Away {}", i);
            submit(&store, "alex", &home, &away, &home, "-1", Some(id.as_str())).await;
            provider.games.insert(id.clone(), final_state(&id, &home, &away, 14, 7));
        }
        let provider = Arc::new(provider);

        let report = reconcile(&store, provider.clone(), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.updated, 10);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(provider.seen.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_missing_game_id_is_reported_not_counted() {
        let store = Store::in_memory();
        submit(&store, "alex", "Detroit Lions", "Chicago Bears", "Detroit Lions", "-3", None).await;
        submit(&store, "jordan", "Detroit Lions", "Chicago Bears", "Detroit Lions", "-3", Some("g1")).await;

        let mut provider = FakeProvider::default();
        provider.games.insert("g1".into(), final_state("g1", "Detroit Lions", "Chicago Bears", 24, 17));

        let report = reconcile(&store, Arc::new(provider), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::MissingGameId);
        assert_eq!(report.issues[0].pick_id, Some(1));
    }

    #[tokio::test]
    async fn test_failures_and_stalls_do_not_abort_the_batch() {
        let store = Store::in_memory();
        submit(&store, "alex", "Detroit Lions", "Chicago Bears", "Detroit Lions", "-3", Some("ok")).await;
        submit(&store, "alex", "Green Bay Packers", "Minnesota Vikings", "Green Bay Packers", "-3", Some("down")).await;
        submit(&store, "alex", "Buffalo Bills", "Miami Dolphins", "Buffalo Bills", "-3", Some("slow")).await;

        let mut provider = FakeProvider::default();
        provider.games.insert("ok".into(), final_state("ok", "Detroit Lions", "Chicago Bears", 24, 17));
        provider.games.insert("slow".into(), final_state("slow", "Buffalo Bills", "Miami Dolphins", 31, 10));
        provider.failing.push("down".into());
        provider.stalled.push("slow".into());

        let report = reconcile(&store, Arc::new(provider), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.pending, 2);
        let kinds: Vec<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&IssueKind::FetchFailed));
        assert!(kinds.contains(&IssueKind::FetchTimedOut));

        let picks = store.find_picks(&PickFilter::default()).await;
        assert_eq!(picks[0].correct, Some(true));
        assert_eq!(picks[1].correct, None);
        assert_eq!(picks[2].correct, None);
    }

    #[tokio::test]
    async fn test_in_progress_games_stay_ungraded() {
        let store = Store::in_memory();
        submit(&store, "alex", "Detroit Lions", "Chicago Bears", "Detroit Lions", "-3", Some("g1")).await;

        let mut state = final_state("g1", "Detroit Lions", "Chicago Bears", 24, 17);
        state.status = "End of 3rd Quarter".to_string();
        let mut provider = FakeProvider::default();
        provider.games.insert("g1".into(), state);

        let report = reconcile(&store, Arc::new(provider), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.pending, 1);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_grade_pick_handles_swapped_orientation() {
        let now = chrono::Utc::now();
        let pick = Pick {
            id: 1,
            user: "alex".to_string(),
            home_team: "Detroit Lions".to_string(),
            away_team: "Chicago Bears".to_string(),
            pick: "Chicago Bears".to_string(),
            spread: "+3".to_string(),
            week: 8,
            league: League::Nfl,
            game_id: Some("g1".to_string()),
            correct: None,
            created_at: now,
            updated_at: now,
        };
        // Provider lists the teams the other way round; Lions scored 17, Bears 24
        let state = final_state("g1", "Chicago Bears", "Detroit Lions", 24, 17);
        assert_eq!(grade_pick(&pick, &state), Ok(true));
    }

    #[test]
    fn test_grade_pick_orients_descriptor_by_abbreviation() {
        let now = chrono::Utc::now();
        let pick = Pick {
            id: 1,
            user: "alex".to_string(),
            home_team: "Detroit Lions".to_string(),
            away_team: "Chicago Bears".to_string(),
            pick: "Chicago Bears".to_string(),
            spread: "CHI -3".to_string(),
            week: 8,
            league: League::Nfl,
            game_id: Some("g1".to_string()),
            correct: None,
            created_at: now,
            updated_at: now,
        };
        // Bears favored by 3 on the road and win by 7
        let mut state = final_state("g1", "Detroit Lions", "Chicago Bears", 14, 21);
        state.home_abbreviation = Some("DET".to_string());
        state.away_abbreviation = Some("CHI".to_string());
        assert_eq!(grade_pick(&pick, &state), Ok(true));
    }

    #[tokio::test]
    async fn test_unmatched_teams_are_reported_not_graded() {
        let store = Store::in_memory();
        submit(&store, "alex", "Detroit Lions", "Chicago Bears", "Detroit Lions", "-3", Some("g1")).await;

        let mut provider = FakeProvider::default();
        provider.games.insert("g1".into(), final_state("g1", "Green Bay Packers", "Minnesota Vikings", 30, 10));

        let report = reconcile(&store, Arc::new(provider), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.pending, 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::TeamMismatch);
        assert_eq!(report.issues[0].pick_id, Some(1));

        let picks = store.find_picks(&PickFilter::default()).await;
        assert_eq!(picks[0].correct, None);
    }

    #[tokio::test]
    async fn test_final_without_scores_is_reported_not_graded() {
        let store = Store::in_memory();
        submit(&store, "alex", "Detroit Lions", "Chicago Bears", "Chicago Bears", "DET -3", Some("g1")).await;

        let mut state = final_state("g1", "Detroit Lions", "Chicago Bears", 0, 0);
        state.home_score = None;
        state.away_score = None;
        let mut provider = FakeProvider::default();
        provider.games.insert("g1".into(), state);

        let report = reconcile(&store, Arc::new(provider), 8, League::Nfl, fast()).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.pending, 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::MissingScore);

        let picks = store.find_picks(&PickFilter::default()).await;
        assert_eq!(picks[0].correct, None);
    }
}
