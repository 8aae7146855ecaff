use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// League a slate of games belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum League {
    #[serde(rename = "NFL", alias = "nfl")]
    Nfl,
    #[serde(rename = "NCAAF", alias = "CFB", alias = "ncaaf", alias = "cfb")]
    Ncaaf,
}

impl League {
    /// Path segment used by the ESPN site API
    pub fn espn_sport_path(&self) -> &'static str {
        match self {
            League::Nfl => "football/nfl",
            League::Ncaaf => "football/college-football",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            League::Nfl => write!(f, "NFL"),
            League::Ncaaf => write!(f, "NCAAF"),
        }
    }
}

impl FromStr for League {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NFL" => Ok(League::Nfl),
            "NCAAF" | "CFB" => Ok(League::Ncaaf),
            other => Err(format!("unknown league: {}", other)),
        }
    }
}

/// A scheduled matchup as published by the score provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String, // External provider id, unique
    pub week: u32,
    pub league: League,
    pub home_team: String,
    pub away_team: String,
    #[serde(deserialize_with = "deserialize_spread")]
    pub spread: String, // Descriptor as published, e.g. "KC -3.5"
    pub kickoff: DateTime<Utc>,
}

/// The games an admin made live for one week of one league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedGameSet {
    pub week: u32,
    pub league: League,
    pub game_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A single user's prediction for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub id: u64,
    pub user: String,
    pub home_team: String,
    pub away_team: String,
    pub pick: String,
    pub spread: String, // Captured at submission time, never re-fetched
    pub week: u32,
    pub league: League,
    pub game_id: Option<String>,
    pub correct: Option<bool>, // None until graded
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pick {
    pub fn key(&self) -> PickKey {
        PickKey {
            user: self.user.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            week: self.week,
            league: self.league,
        }
    }
}

/// Uniqueness key: at most one pick per user, matchup, week and league
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PickKey {
    pub user: String,
    pub home_team: String,
    pub away_team: String,
    pub week: u32,
    pub league: League,
}

/// The user-owned fields of a pick. Grading never touches these.
#[derive(Debug, Clone, PartialEq)]
pub struct PickFields {
    pub pick: String,
    pub spread: String,
    pub game_id: Option<String>,
}

/// Filter for pick lookups; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PickFilter {
    pub user: Option<String>,
    pub week: Option<u32>,
    pub league: Option<League>,
}

impl PickFilter {
    pub fn matches(&self, pick: &Pick) -> bool {
        self.user.as_ref().map_or(true, |u| &pick.user == u)
            && self.week.map_or(true, |w| pick.week == w)
            && self.league.map_or(true, |l| pick.league == l)
    }
}

/// Spreads arrive either as descriptor strings ("KC -3.5") or as bare numbers
pub fn deserialize_spread<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Same as [`deserialize_spread`] for optional fields
pub fn deserialize_optional_spread<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Number(n)) => Some(n.to_string()),
        None => None,
    })
}
