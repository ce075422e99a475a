/// Reward rules and injectable time/randomness sources for the ledger
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Picks the roulette prize slot before anything is recorded
pub trait PrizePicker: Send + Sync {
    /// Index into a prize table of `slots` entries
    fn pick(&self, slots: usize) -> usize;
}

/// Uniform random pick
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPrizePicker;

impl PrizePicker for RandomPrizePicker {
    fn pick(&self, slots: usize) -> usize {
        if slots == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..slots)
    }
}

/// Always picks the same slot
#[derive(Debug, Clone, Copy)]
pub struct FixedPrizePicker(pub usize);

impl PrizePicker for FixedPrizePicker {
    fn pick(&self, slots: usize) -> usize {
        self.0.min(slots.saturating_sub(1))
    }
}

/// Calendar day of `now` in a fixed UTC offset
pub fn calendar_day(now: DateTime<Utc>, offset_hours: i32) -> NaiveDate {
    (now + Duration::hours(i64::from(offset_hours))).date_naive()
}

/// Bonus for reaching `streak` consecutive days.
///
/// Exact table hits pay their bonus. Past the longest milestone the
/// longest one repeats at each multiple of its length.
pub fn milestone_bonus(streak: i64, milestones: &[(i64, i64)]) -> i64 {
    if let Some((_, bonus)) = milestones.iter().find(|(days, _)| *days == streak) {
        return *bonus;
    }

    match milestones.iter().max_by_key(|(days, _)| *days) {
        Some((longest, bonus)) if *longest > 0 && streak > *longest && streak % longest == 0 => {
            *bonus
        }
        _ => 0,
    }
}

/// Linear payout between `min` and `max` for a 0-100 score, rounded half away from zero
pub fn interpolate_payout(min: i64, max: i64, score: i64) -> i64 {
    let ratio = score.clamp(0, 100) as f64 / 100.0;
    (min as f64 + ratio * (max - min) as f64).round() as i64
}

/// Normalised answer used for quiz comparison
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TABLE: &[(i64, i64)] = &[(7, 50), (14, 100), (30, 300)];

    #[test]
    fn test_milestone_table() {
        assert_eq!(milestone_bonus(1, TABLE), 0);
        assert_eq!(milestone_bonus(7, TABLE), 50);
        assert_eq!(milestone_bonus(14, TABLE), 100);
        assert_eq!(milestone_bonus(30, TABLE), 300);
        assert_eq!(milestone_bonus(37, TABLE), 0);
        assert_eq!(milestone_bonus(60, TABLE), 300);
        assert_eq!(milestone_bonus(90, TABLE), 300);
        assert_eq!(milestone_bonus(10, &[]), 0);
    }

    #[test]
    fn test_interpolate_payout() {
        assert_eq!(interpolate_payout(10, 50, 80), 42);
        assert_eq!(interpolate_payout(10, 50, 0), 10);
        assert_eq!(interpolate_payout(10, 50, 100), 50);
        assert_eq!(interpolate_payout(0, 5, 50), 3);
        assert_eq!(interpolate_payout(10, 50, 250), 50);
    }

    #[test]
    fn test_calendar_day_uses_offset() {
        // 16:00 UTC is already the next day at +9
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap();
        assert_eq!(calendar_day(now, 0), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(calendar_day(now, 9), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn test_fixed_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::days(1));
        assert_eq!(clock.now(), start + Duration::days(1));
    }

    #[test]
    fn test_prize_pickers_stay_in_range() {
        for _ in 0..100 {
            assert!(RandomPrizePicker.pick(6) < 6);
        }
        assert_eq!(FixedPrizePicker(10).pick(6), 5);
        assert_eq!(normalize_answer("  Seoul "), "seoul");
    }
}
