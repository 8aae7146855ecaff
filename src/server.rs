use crate::api::espn_api::{ScoreProvider, ScoreboardEntry};
use crate::error::{PickemError, PickemResult};
use crate::models::{
    deserialize_optional_spread, deserialize_spread, Game, League, Pick, PickFields, PickFilter,
    PickKey,
};
use crate::store::Store;
use crate::utils::lock::{can_edit_picks, compute_lock_instant, LockPolicy};
use crate::utils::reconcile::{reconcile, ReconcileOptions, ReconcileReport};
use crate::utils::standings::{standings, StandingRow};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything a handler needs
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub provider: Arc<dyn ScoreProvider>,
    pub lock_policy: LockPolicy,
    pub reconcile_options: ReconcileOptions,
    pub admin_token: Option<Arc<str>>,
}

/// Admin routes require `Authorization: Bearer <token>` when a token is configured
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = PickemError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Ok(AdminGuard);
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match presented {
            Some(token) if token == expected => Ok(AdminGuard),
            _ => Err(PickemError::Unauthorized),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmittedPick {
    pub home_team: String,
    pub away_team: String,
    pub selected_team: String,
    #[serde(default, deserialize_with = "deserialize_optional_spread")]
    pub spread: Option<String>,
    #[serde(default)]
    pub game_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPicksRequest {
    pub user: String,
    pub week: u32,
    pub league: League,
    pub picks: Vec<SubmittedPick>,
}

#[derive(Debug, Deserialize)]
pub struct WeekLeague {
    pub week: u32,
    pub league: League,
}

#[derive(Debug, Serialize)]
pub struct SlateResponse {
    pub week: u32,
    pub league: League,
    pub games: Vec<Game>,
    pub lock_instant: Option<DateTime<Utc>>,
    pub can_edit_picks: bool,
}

#[derive(Debug, Deserialize)]
pub struct SelectGamesRequest {
    pub week: u32,
    pub league: League,
    pub game_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingGame {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(deserialize_with = "deserialize_spread")]
    pub spread: String,
    pub kickoff: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StoreGamesRequest {
    pub week: u32,
    pub league: League,
    pub games: Vec<IncomingGame>,
}

#[derive(Debug, Deserialize)]
pub struct WeeksQuery {
    pub league: Option<League>,
}

fn require(value: &str, field: &str) -> PickemResult<()> {
    if value.trim().is_empty() {
        return Err(PickemError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_week(week: u32) -> PickemResult<()> {
    if week == 0 {
        return Err(PickemError::Validation("week must be at least 1".to_string()));
    }
    Ok(())
}

/// Shape checks that need neither the store nor the clock
fn validate_submission(request: &SubmitPicksRequest) -> PickemResult<()> {
    require(&request.user, "user")?;
    require_week(request.week)?;
    if request.picks.is_empty() {
        return Err(PickemError::Validation("picks must not be empty".to_string()));
    }

    for pick in &request.picks {
        require(&pick.home_team, "home_team")?;
        require(&pick.away_team, "away_team")?;
        if pick.selected_team != pick.home_team && pick.selected_team != pick.away_team {
            return Err(PickemError::Validation(format!(
                "selected_team {:?} is neither {:?} nor {:?}",
                pick.selected_team, pick.home_team, pick.away_team
            )));
        }
    }
    Ok(())
}

/// Lock instant of the admin-selected slate for (week, league)
async fn slate_lock(state: &AppState, week: u32, league: League) -> (Vec<Game>, Option<DateTime<Utc>>) {
    let games = match state.store.find_selected_game_set(week, league).await {
        Some(set) => state.store.find_games_by_ids(&set.game_ids).await,
        None => Vec::new(),
    };
    let lock = compute_lock_instant(&games, &state.lock_policy);
    (games, lock)
}

async fn submit_picks(
    State(state): State<AppState>,
    payload: Result<Json<SubmitPicksRequest>, JsonRejection>,
) -> PickemResult<(StatusCode, Json<Vec<Pick>>)> {
    let Json(request) = payload?;
    validate_submission(&request)?;

    let (_, lock) = slate_lock(&state, request.week, request.league).await;
    if !can_edit_picks(lock, Utc::now()) {
        if let Some(locked_at) = lock {
            tracing::info!(user = %request.user, week = request.week, league = %request.league, "rejected locked submission");
            return Err(PickemError::Locked {
                week: request.week,
                league: request.league,
                locked_at,
            });
        }
    }

    // Resolve every pick before writing any of them
    let mut resolved = Vec::with_capacity(request.picks.len());
    for pick in request.picks {
        let game_id = pick
            .game_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let game = match &game_id {
            Some(id) => state.store.find_game(id).await,
            None => None,
        };

        if let Some(game) = &game {
            if game.week != request.week || game.league != request.league {
                return Err(PickemError::Validation(format!(
                    "game {} belongs to {} week {}",
                    game.game_id, game.league, game.week
                )));
            }
            if game.home_team != pick.home_team || game.away_team != pick.away_team {
                return Err(PickemError::Validation(format!(
                    "game {} is {} vs {}, not {} vs {}",
                    game.game_id, game.home_team, game.away_team, pick.home_team, pick.away_team
                )));
            }
        }

        let spread = pick
            .spread
            .or_else(|| game.map(|g| g.spread))
            .unwrap_or_else(|| "0".to_string());

        resolved.push((
            PickKey {
                user: request.user.trim().to_string(),
                home_team: pick.home_team,
                away_team: pick.away_team,
                week: request.week,
                league: request.league,
            },
            PickFields {
                pick: pick.selected_team,
                spread,
                game_id,
            },
        ));
    }

    let mut stored = Vec::with_capacity(resolved.len());
    for (key, fields) in resolved {
        stored.push(state.store.upsert_pick(key, fields).await?);
    }
    tracing::info!(user = %request.user.trim(), week = request.week, league = %request.league, picks = stored.len(), "stored picks");

    Ok((StatusCode::CREATED, Json(stored)))
}

async fn list_picks(
    State(state): State<AppState>,
    Query(filter): Query<PickFilter>,
) -> Json<Vec<Pick>> {
    Json(state.store.find_picks(&filter).await)
}

async fn reconcile_picks(
    _admin: AdminGuard,
    State(state): State<AppState>,
    payload: Result<Json<WeekLeague>, JsonRejection>,
) -> PickemResult<Json<ReconcileReport>> {
    let Json(request) = payload?;
    require_week(request.week)?;
    let report = reconcile(
        &state.store,
        Arc::clone(&state.provider),
        request.week,
        request.league,
        state.reconcile_options,
    )
    .await?;
    Ok(Json(report))
}

async fn selected_games(
    State(state): State<AppState>,
    Query(query): Query<WeekLeague>,
) -> Json<SlateResponse> {
    let (games, lock) = slate_lock(&state, query.week, query.league).await;
    Json(SlateResponse {
        week: query.week,
        league: query.league,
        games,
        lock_instant: lock,
        can_edit_picks: can_edit_picks(lock, Utc::now()),
    })
}

async fn select_games(
    _admin: AdminGuard,
    State(state): State<AppState>,
    payload: Result<Json<SelectGamesRequest>, JsonRejection>,
) -> PickemResult<Json<SlateResponse>> {
    let Json(request) = payload?;
    require_week(request.week)?;

    let mut game_ids: Vec<String> = Vec::with_capacity(request.game_ids.len());
    for id in request.game_ids {
        let id = id.trim().to_string();
        if !game_ids.contains(&id) {
            game_ids.push(id);
        }
    }

    for id in &game_ids {
        match state.store.find_game(id).await {
            Some(game) if game.week == request.week && game.league == request.league => {}
            Some(game) => {
                return Err(PickemError::Validation(format!(
                    "game {} belongs to {} week {}",
                    id, game.league, game.week
                )))
            }
            None => return Err(PickemError::NotFound(format!("no game with id {}", id))),
        }
    }

    let set = state
        .store
        .upsert_selected_game_set(request.week, request.league, game_ids)
        .await?;
    tracing::info!(week = set.week, league = %set.league, games = set.game_ids.len(), "selected games");

    let games = state.store.find_games_by_ids(&set.game_ids).await;
    let lock = compute_lock_instant(&games, &state.lock_policy);
    Ok(Json(SlateResponse {
        week: set.week,
        league: set.league,
        games,
        lock_instant: lock,
        can_edit_picks: can_edit_picks(lock, Utc::now()),
    }))
}

async fn store_games(
    _admin: AdminGuard,
    State(state): State<AppState>,
    payload: Result<Json<StoreGamesRequest>, JsonRejection>,
) -> PickemResult<Json<Vec<Game>>> {
    let Json(request) = payload?;
    require_week(request.week)?;
    for game in &request.games {
        require(&game.game_id, "game_id")?;
        require(&game.home_team, "home_team")?;
        require(&game.away_team, "away_team")?;
    }

    let mut stored = Vec::with_capacity(request.games.len());
    for incoming in request.games {
        let game = Game {
            game_id: incoming.game_id.trim().to_string(),
            week: request.week,
            league: request.league,
            home_team: incoming.home_team,
            away_team: incoming.away_team,
            spread: incoming.spread,
            kickoff: incoming.kickoff,
        };
        state.store.upsert_game(game.clone()).await?;
        stored.push(game);
    }
    tracing::info!(week = request.week, league = %request.league, games = stored.len(), "stored games");

    Ok(Json(stored))
}

async fn weeks(State(state): State<AppState>, Query(query): Query<WeeksQuery>) -> Json<Vec<u32>> {
    Json(state.store.distinct_weeks(query.league).await)
}

async fn week_standings(
    State(state): State<AppState>,
    Query(query): Query<WeekLeague>,
) -> Json<Vec<StandingRow>> {
    let filter = PickFilter {
        user: None,
        week: Some(query.week),
        league: Some(query.league),
    };
    Json(standings(&state.store.find_picks(&filter).await))
}

/// Live scoreboard for a week, straight from the provider
async fn scores(
    State(state): State<AppState>,
    Query(query): Query<WeekLeague>,
) -> PickemResult<Json<Vec<ScoreboardEntry>>> {
    require_week(query.week)?;
    let entries = state.provider.fetch_scores(query.league, query.week).await?;
    Ok(Json(entries))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/picks", get(list_picks).post(submit_picks))
        .route("/picks/reconcile", post(reconcile_picks))
        .route("/selected-games", get(selected_games))
        .route("/weeks", get(weeks))
        .route("/standings", get(week_standings))
        .route("/scores", get(scores))
        .route("/admin/select-games", post(select_games))
        .route("/admin/store-games", post(store_games))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
