use serde::{Deserialize, Serialize};

/// Result of applying a spread to a final score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadOutcome {
    pub covering_side: Option<String>, // None on a push
    pub is_tie: bool,
}

/// Parse a spread descriptor into a number
/// "-3.5" -> -3.5
/// "KC -3.5" -> -3.5 (second token)
/// "EVEN", "N/A", "" -> 0.0
pub fn parse_spread(descriptor: &str) -> f64 {
    let mut tokens = descriptor.split_whitespace();
    let first = tokens.next();
    let second = tokens.next();

    let parsed = match (first, second) {
        (Some(token), None) => token.parse::<f64>().ok(),
        (_, Some(token)) => token.parse::<f64>().ok(),
        (None, _) => None,
    };

    match parsed {
        Some(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Spread from the home team's perspective.
///
/// Provider descriptors name the favored team ("DEN -3.5"). When that team is
/// the away side the number is flipped so it reads as the home handicap.
pub fn home_handicap(descriptor: &str, home_abbrev: Option<&str>, away_abbrev: Option<&str>) -> f64 {
    let spread = parse_spread(descriptor);
    let favored = match descriptor.split_whitespace().collect::<Vec<_>>().as_slice() {
        [team, _] => Some(*team),
        _ => None,
    };

    match (favored, home_abbrev, away_abbrev) {
        (Some(team), _, Some(away)) if team.eq_ignore_ascii_case(away) => -spread,
        _ => spread,
    }
}

/// Decide which side covered.
///
/// `spread` is the home handicap: negative means the home team is favored and
/// the away team receives |spread| points, positive means the home team is the
/// underdog and receives them. Only call this with final scores.
pub fn evaluate(
    home_team: &str,
    away_team: &str,
    home_score: u32,
    away_score: u32,
    spread: f64,
) -> SpreadOutcome {
    let spread = if spread.is_finite() { spread } else { 0.0 };

    // The underdog receives the points
    let adjusted_home = home_score as f64 + spread.max(0.0);
    let adjusted_away = away_score as f64 + (-spread).max(0.0);

    if adjusted_home > adjusted_away {
        SpreadOutcome {
            covering_side: Some(home_team.to_string()),
            is_tie: false,
        }
    } else if adjusted_away > adjusted_home {
        SpreadOutcome {
            covering_side: Some(away_team.to_string()),
            is_tie: false,
        }
    } else {
        SpreadOutcome {
            covering_side: None,
            is_tie: true,
        }
    }
}

/// A pick is correct iff it names the covering side of a non-push
pub fn is_pick_correct(pick: &str, outcome: &SpreadOutcome) -> bool {
    !outcome.is_tie && outcome.covering_side.as_deref() == Some(pick)
}
