use std::sync::Mutex;

use amity_types::events::TimeContext;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc, Weekday};

/// Source of "now" for a turn.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
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

/// Time-of-day buckets: morning 5–11, afternoon 12–17, evening 18–21,
/// night 22–4, all in local hours.
pub fn time_context(now: DateTime<Utc>, offset: FixedOffset) -> TimeContext {
    let local = now.with_timezone(&offset);
    let hour = local.hour();
    TimeContext {
        hour,
        is_morning: (5..12).contains(&hour),
        is_afternoon: (12..18).contains(&hour),
        is_evening: (18..22).contains(&hour),
        is_night: hour >= 22 || hour < 5,
        is_weekend: matches!(local.weekday(), Weekday::Sat | Weekday::Sun),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn buckets_follow_local_hour() {
        let taipei = FixedOffset::east_opt(8 * 3600).unwrap();
        // 23:30 UTC on a Friday is 07:30 Saturday in UTC+8.
        let ctx = time_context(at("2025-03-07T23:30:00Z"), taipei);
        assert_eq!(ctx.hour, 7);
        assert!(ctx.is_morning);
        assert!(!ctx.is_night);
        assert!(ctx.is_weekend);

        let utc = FixedOffset::east_opt(0).unwrap();
        let ctx = time_context(at("2025-03-07T23:30:00Z"), utc);
        assert!(ctx.is_night);
        assert!(!ctx.is_weekend);
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(at("2025-01-01T00:00:00Z"));
        clock.advance(Duration::days(7));
        assert_eq!(clock.now(), at("2025-01-08T00:00:00Z"));
    }
}
