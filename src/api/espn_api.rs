use crate::error::ProviderError;
use crate::models::{Game, League};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ESPN_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports";

/// Only these status details mean the score is final
pub const COMPLETED_STATUSES: [&str; 2] = ["Final", "Final/OT"];

/// Current state of one game as reported by the provider.
/// Scores are `None` when the payload has none (or an unreadable one).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameState {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_abbreviation: Option<String>,
    pub away_abbreviation: Option<String>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub status: String,
    pub odds: Option<String>,
}

impl GameState {
    pub fn is_completed(&self) -> bool {
        COMPLETED_STATUSES.contains(&self.status.as_str())
    }
}

/// One scoreboard row: kickoff plus live state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreboardEntry {
    pub kickoff: DateTime<Utc>,
    #[serde(flatten)]
    pub state: GameState,
}

impl ScoreboardEntry {
    /// The schedule row stored for a week's slate
    pub fn into_game(self, league: League, week: u32) -> Game {
        Game {
            game_id: self.state.game_id,
            week,
            league,
            home_team: self.state.home_team,
            away_team: self.state.away_team,
            spread: self.state.odds.unwrap_or_else(|| "N/A".to_string()),
            kickoff: self.kickoff,
        }
    }
}

/// Source of live game state
#[async_trait]
pub trait ScoreProvider: Send + Sync + 'static {
    async fn fetch_game(&self, league: League, game_id: &str) -> Result<GameState, ProviderError>;

    /// Every game of a week with its current status, scores and odds
    async fn fetch_scores(&self, league: League, week: u32) -> Result<Vec<ScoreboardEntry>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    header: SummaryHeader,
    #[serde(default)]
    pickcenter: Vec<EspnOdds>,
}

#[derive(Debug, Deserialize)]
struct SummaryHeader {
    #[serde(default)]
    competitions: Vec<EspnCompetition>,
}

#[derive(Debug, Deserialize)]
struct ScoreboardResponse {
    #[serde(default)]
    events: Vec<EspnEvent>,
}

#[derive(Debug, Deserialize)]
struct EspnEvent {
    id: String,
    date: String,
    #[serde(default)]
    competitions: Vec<EspnCompetition>,
}

#[derive(Debug, Deserialize)]
struct EspnCompetition {
    #[serde(default)]
    competitors: Vec<EspnCompetitor>,
    status: Option<EspnStatus>,
    #[serde(default)]
    odds: Vec<EspnOdds>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnCompetitor {
    home_away: Option<String>,
    score: Option<String>,
    team: EspnTeam,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnTeam {
    display_name: String,
    abbreviation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EspnStatus {
    #[serde(rename = "type")]
    kind: EspnStatusType,
}

#[derive(Debug, Deserialize)]
struct EspnStatusType {
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EspnOdds {
    details: Option<String>,
}

/// Split the two competitors into (home, away).
/// Uses the `homeAway` marker when present, otherwise ESPN's order.
fn home_and_away(competitors: &[EspnCompetitor]) -> Option<(&EspnCompetitor, &EspnCompetitor)> {
    let marked = |side: &str| {
        competitors
            .iter()
            .find(|c| c.home_away.as_deref() == Some(side))
    };
    match (marked("home"), marked("away")) {
        (Some(home), Some(away)) => Some((home, away)),
        _ if competitors.len() >= 2 => Some((&competitors[0], &competitors[1])),
        _ => None,
    }
}

fn parse_score(game_id: &str, score: Option<&str>) -> Option<u32> {
    let score = score?;
    match score.trim().parse::<u32>() {
        Ok(points) => Some(points),
        Err(_) => {
            tracing::warn!(game_id, score, "unreadable score");
            None
        }
    }
}

/// ESPN dates come as "2024-10-20T17:00Z" (no seconds) or full RFC 3339
pub fn parse_espn_date(date: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|naive| naive.and_utc())
}

fn game_state(
    game_id: &str,
    competition: &EspnCompetition,
    fallback_odds: Option<&str>,
) -> Result<GameState, ProviderError> {
    let (home, away) = home_and_away(&competition.competitors)
        .ok_or_else(|| ProviderError::Malformed(format!("game {} has no competitors", game_id)))?;

    let status = competition
        .status
        .as_ref()
        .and_then(|s| s.kind.detail.clone())
        .unwrap_or_default();

    let odds = competition
        .odds
        .iter()
        .find_map(|o| o.details.clone())
        .or_else(|| fallback_odds.map(str::to_string));

    Ok(GameState {
        game_id: game_id.to_string(),
        home_team: home.team.display_name.clone(),
        away_team: away.team.display_name.clone(),
        home_abbreviation: home.team.abbreviation.clone(),
        away_abbreviation: away.team.abbreviation.clone(),
        home_score: parse_score(game_id, home.score.as_deref()),
        away_score: parse_score(game_id, away.score.as_deref()),
        status,
        odds,
    })
}

fn parse_summary(game_id: &str, body: &str) -> Result<GameState, ProviderError> {
    let summary: SummaryResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let competition = summary
        .header
        .competitions
        .first()
        .ok_or_else(|| ProviderError::Malformed(format!("game {} has no competition", game_id)))?;
    let fallback_odds = summary.pickcenter.iter().find_map(|o| o.details.as_deref());

    game_state(game_id, competition, fallback_odds)
}

fn parse_scoreboard(body: &str) -> Result<Vec<ScoreboardEntry>, ProviderError> {
    let scoreboard: ScoreboardResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let mut entries = Vec::new();
    for event in scoreboard.events {
        let Some(competition) = event.competitions.first() else {
            tracing::warn!(event = %event.id, "scoreboard event without competition");
            continue;
        };
        let Some(kickoff) = parse_espn_date(&event.date) else {
            tracing::warn!(event = %event.id, date = %event.date, "unparseable kickoff");
            continue;
        };
        let state = match game_state(&event.id, competition, None) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(event = %event.id, error = %e, "skipping scoreboard event");
                continue;
            }
        };

        entries.push(ScoreboardEntry { kickoff, state });
    }

    Ok(entries)
}

pub struct EspnClient {
    client: Client,
    base_url: String,
}

impl EspnClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, ProviderError> {
        tracing::debug!(url, "fetching from ESPN");
        let response = self.client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }

    /// Fetch a week's games with their current odds
    pub async fn fetch_scoreboard(&self, league: League, week: u32) -> Result<Vec<Game>, ProviderError> {
        let entries = self.fetch_scores(league, week).await?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.into_game(league, week))
            .collect())
    }
}

#[async_trait]
impl ScoreProvider for EspnClient {
    async fn fetch_game(&self, league: League, game_id: &str) -> Result<GameState, ProviderError> {
        let url = format!("{}/{}/summary", self.base_url, league.espn_sport_path());
        let body = self
            .get_text(&url, &[("event", game_id.to_string())])
            .await?;
        parse_summary(game_id, &body)
    }

    async fn fetch_scores(&self, league: League, week: u32) -> Result<Vec<ScoreboardEntry>, ProviderError> {
        let url = format!("{}/{}/scoreboard", self.base_url, league.espn_sport_path());
        let mut query = vec![("week", week.to_string())];
        if league == League::Ncaaf {
            // FBS only
            query.push(("groups", "80".to_string()));
            query.push(("limit", "1000".to_string()));
        }

        let body = self.get_text(&url, &query).await?;
        let entries = parse_scoreboard(&body)?;
        tracing::info!(%league, week, games = entries.len(), "fetched scoreboard");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = r#"{
        "header": {
            "id": "401671789",
            "competitions": [{
                "competitors": [
                    {"homeAway": "away", "score": "10",
                     "team": {"displayName": "Tennessee Titans", "abbreviation": "TEN"}},
                    {"homeAway": "home", "score": "52",
                     "team": {"displayName": "Detroit Lions", "abbreviation": "DET"}}
                ],
                "status": {"type": {"detail": "Final", "completed": true}}
            }]
        },
        "pickcenter": [{"details": "DET -11.5", "overUnder": 46.5}]
    }"#;

    const SCOREBOARD: &str = r#"{
        "week": {"number": 8},
        "events": [
            {
                "id": "401671789",
                "date": "2024-10-27T17:00Z",
                "competitions": [{
                    "competitors": [
                        {"homeAway": "home", "score": "0",
                         "team": {"displayName": "Detroit Lions", "abbreviation": "DET"}},
                        {"homeAway": "away", "score": "0",
                         "team": {"displayName": "Tennessee Titans", "abbreviation": "TEN"}}
                    ],
                    "status": {"type": {"detail": "Sun, October 27th at 1:00 PM EDT"}},
                    "odds": [{"details": "DET -11.5"}]
                }]
            },
            {
                "id": "401671790",
                "date": "not a date",
                "competitions": []
            }
        ]
    }"#;

    #[test]
    fn test_parse_summary_uses_home_away_markers() {
        let state = parse_summary("401671789", SUMMARY).unwrap();
        assert_eq!(state.home_team, "Detroit Lions");
        assert_eq!(state.away_team, "Tennessee Titans");
        assert_eq!(state.home_score, Some(52));
        assert_eq!(state.away_score, Some(10));
        assert_eq!(state.home_abbreviation.as_deref(), Some("DET"));
        assert_eq!(state.odds.as_deref(), Some("DET -11.5"));
        assert!(state.is_completed());
    }

    #[test]
    fn test_only_final_statuses_are_completed() {
        let mut state = parse_summary("401671789", SUMMARY).unwrap();
        for (status, completed) in [
            ("Final", true),
            ("Final/OT", true),
            ("Halftime", false),
            ("End of 4th Quarter", false),
            ("final", false),
            ("", false),
        ] {
            state.status = status.to_string();
            assert_eq!(state.is_completed(), completed, "{}", status);
        }
    }

    #[test]
    fn test_malformed_summary_is_an_error() {
        assert!(matches!(
            parse_summary("1", "{\"header\": {}}"),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            parse_summary("1", "<html>"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_scores_are_not_zero() {
        let body = r#"{
            "header": {"competitions": [{
                "competitors": [
                    {"homeAway": "home", "team": {"displayName": "Detroit Lions"}},
                    {"homeAway": "away", "score": "--", "team": {"displayName": "Chicago Bears"}}
                ],
                "status": {"type": {"detail": "Final"}}
            }]}
        }"#;
        let state = parse_summary("1", body).unwrap();
        assert!(state.is_completed());
        assert_eq!(state.home_score, None);
        assert_eq!(state.away_score, None);
    }

    #[test]
    fn test_scoreboard_keeps_live_state() {
        let entries = parse_scoreboard(SCOREBOARD).unwrap();
        assert_eq!(entries.len(), 1);
        let state = &entries[0].state;
        assert_eq!(state.status, "Sun, October 27th at 1:00 PM EDT");
        assert_eq!(state.home_score, Some(0));
        assert_eq!(state.odds.as_deref(), Some("DET -11.5"));

        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(json["game_id"], "401671789");
        assert_eq!(json["home_team"], "Detroit Lions");
        assert_eq!(json["kickoff"], "2024-10-27T17:00:00Z");
    }

    #[test]
    fn test_parse_scoreboard_skips_broken_events() {
        let games: Vec<Game> = parse_scoreboard(SCOREBOARD)
            .unwrap()
            .into_iter()
            .map(|entry| entry.into_game(League::Nfl, 8))
            .collect();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].game_id, "401671789");
        assert_eq!(games[0].spread, "DET -11.5");
        assert_eq!(games[0].week, 8);
        assert_eq!(
            games[0].kickoff,
            parse_espn_date("2024-10-27T17:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_parse_espn_date() {
        assert!(parse_espn_date("2024-10-27T17:00Z").is_some());
        assert!(parse_espn_date("2024-10-27T17:00:00+00:00").is_some());
        assert!(parse_espn_date("Sunday").is_none());
    }

    #[tokio::test]
    #[ignore] // Ignore by default since it requires network access
    async fn test_fetch_scoreboard() {
        let client = EspnClient::new(ESPN_BASE_URL, Duration::from_secs(10)).unwrap();
        let games = client.fetch_scoreboard(League::Nfl, 1).await.unwrap();
        assert!(!games.is_empty());
    }
}
