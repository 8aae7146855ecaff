use crate::models::Pick;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One user's record for a week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingRow {
    pub user: String,
    pub correct: u32,
    pub incorrect: u32,
    pub pending: u32,
}

impl StandingRow {
    pub fn format(&self) -> String {
        format!(
            "{:<20} {:>3} correct | {:>3} incorrect | {:>3} pending",
            self.user, self.correct, self.incorrect, self.pending
        )
    }
}

/// Tally picks per user, best record first
pub fn standings(picks: &[Pick]) -> Vec<StandingRow> {
    let mut by_user: BTreeMap<&str, StandingRow> = BTreeMap::new();

    for pick in picks {
        let row = by_user.entry(pick.user.as_str()).or_insert_with(|| StandingRow {
            user: pick.user.clone(),
            correct: 0,
            incorrect: 0,
            pending: 0,
        });
        match pick.correct {
            Some(true) => row.correct += 1,
            Some(false) => row.incorrect += 1,
            None => row.pending += 1,
        }
    }

    let mut rows: Vec<StandingRow> = by_user.into_values().collect();
    // BTreeMap already ordered by name, stable sort keeps it for ties
    rows.sort_by(|a, b| b.correct.cmp(&a.correct));
    rows
}
