use crate::models::Game;
use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc, Weekday};

/// Picks lock at the first kickoff on this day
pub const DEFAULT_LOCK_DAY: Weekday = Weekday::Sun;

/// US Eastern standard time, in seconds east of UTC
pub const DEFAULT_LOCK_UTC_OFFSET_SECS: i32 = -5 * 3600;

/// Where the lock falls for a weekly slate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub lock_day: Weekday,
    /// Kickoffs are bucketed into calendar days at this offset
    pub utc_offset: FixedOffset,
}

impl LockPolicy {
    pub fn new(lock_day: Weekday, utc_offset_hours: i32) -> Option<Self> {
        Some(Self {
            lock_day,
            utc_offset: FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)?,
        })
    }

    fn falls_on_lock_day(&self, kickoff: &DateTime<Utc>) -> bool {
        kickoff.with_timezone(&self.utc_offset).weekday() == self.lock_day
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            lock_day: DEFAULT_LOCK_DAY,
            utc_offset: FixedOffset::east_opt(DEFAULT_LOCK_UTC_OFFSET_SECS)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Earliest kickoff among the slate's games played on the lock day.
/// `None` means the week never locks.
pub fn compute_lock_instant<'a, I>(games: I, policy: &LockPolicy) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a Game>,
{
    games
        .into_iter()
        .map(|game| game.kickoff)
        .filter(|kickoff| policy.falls_on_lock_day(kickoff))
        .min()
}

/// Picks stay editable strictly before the lock instant
pub fn can_edit_picks(lock_instant: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match lock_instant {
        Some(lock) => now < lock,
        None => true,
    }
}
