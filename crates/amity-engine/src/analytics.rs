//! Per-character conversation statistics. All day and hour bucketing is done
//! in the configured UTC offset.

use std::collections::{BTreeMap, BTreeSet};

use amity_types::models::{AffinityLevel, ChatMessage, Favorability};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;

use crate::affinity;

pub const TREND_DAYS: i64 = 30;
pub const TOP_HOURS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub total_messages: usize,
    pub user_messages: usize,
    pub character_messages: usize,
    pub conversation_days: i64,
    pub first_message: DateTime<Utc>,
    pub last_message: DateTime<Utc>,
    pub avg_messages_per_day: f64,
    pub longest_streak_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelStep {
    pub message_count: u64,
    pub level: AffinityLevel,
    pub level_name: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FavorabilityTrend {
    pub current_level: AffinityLevel,
    pub current_level_name: &'static str,
    pub message_count: u64,
    pub progression: Vec<LevelStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveHour {
    pub hour: u32,
    pub message_count: usize,
    pub time_range: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trends {
    pub daily: Vec<DailyCount>,
    pub most_active_hours: Vec<ActiveHour>,
    pub messages_by_hour: Vec<HourCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub overview: Overview,
    pub favorability: FavorabilityTrend,
    pub trends: Trends,
}

/// Analytics payload served for a character. `analytics` is absent when the
/// character has no messages yet.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub success: bool,
    pub character_id: i64,
    pub character_name: String,
    pub total_messages: usize,
    pub analytics: Option<Analytics>,
}

fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// Inclusive calendar span from the first to the last message; 0 when empty.
pub fn conversation_days(messages: &[ChatMessage], offset: FixedOffset) -> i64 {
    let dates = messages.iter().map(|m| local_date(m.created_at, offset));
    match (dates.clone().min(), dates.max()) {
        (Some(first), Some(last)) => (last - first).num_days() + 1,
        _ => 0,
    }
}

/// Longest run of consecutive calendar days that each have a message.
pub fn longest_streak(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<NaiveDate> = None;
    for &date in dates {
        current = match previous {
            Some(p) if (date - p).num_days() == 1 => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(date);
    }
    longest
}

/// Replays the counter over the user's messages and records where each
/// level boundary was crossed.
pub fn level_progression(messages: &[ChatMessage]) -> Vec<LevelStep> {
    let mut steps = Vec::new();
    let mut level = AffinityLevel::Level1;
    let mut count = 0u64;
    for m in messages.iter().filter(|m| m.from_user) {
        count += 1;
        let next = affinity::level_for(count);
        if next != level {
            steps.push(LevelStep {
                message_count: count,
                level: next,
                level_name: next.name(),
                timestamp: m.created_at,
            });
            level = next;
        }
    }
    steps
}

/// `messages` must be chronological. Returns `None` for an empty history.
pub fn compute(
    favorability: &Favorability,
    messages: &[ChatMessage],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<Analytics> {
    let first = messages.first()?;
    let last = messages.last()?;

    let total = messages.len();
    let character_messages = messages.iter().filter(|m| !m.from_user).count();
    let days = conversation_days(messages, offset);

    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut by_hour = [0usize; 24];
    for m in messages {
        let local = m.created_at.with_timezone(&offset);
        *by_day.entry(local.date_naive()).or_default() += 1;
        by_hour[local.hour() as usize] += 1;
    }

    let active_dates: BTreeSet<NaiveDate> = by_day.keys().copied().collect();

    let today = local_date(now, offset);
    let daily = (0..TREND_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            DailyCount {
                date,
                message_count: by_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect();

    // Busiest first; ties go to the earlier hour.
    let mut ranked: Vec<(u32, usize)> = by_hour
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(hour, count)| (hour as u32, *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let most_active_hours = ranked
        .into_iter()
        .take(TOP_HOURS)
        .map(|(hour, message_count)| ActiveHour {
            hour,
            message_count,
            time_range: format!("{}:00-{}:00", hour, hour + 1),
        })
        .collect();

    let avg = if days > 0 { total as f64 / days as f64 } else { 0.0 };

    Some(Analytics {
        overview: Overview {
            total_messages: total,
            user_messages: total - character_messages,
            character_messages,
            conversation_days: days,
            first_message: first.created_at,
            last_message: last.created_at,
            avg_messages_per_day: (avg * 10.0).round() / 10.0,
            longest_streak_days: longest_streak(&active_dates),
        },
        favorability: FavorabilityTrend {
            current_level: favorability.current_level,
            current_level_name: favorability.current_level.name(),
            message_count: favorability.message_count,
            progression: level_progression(messages),
        },
        trends: Trends {
            daily,
            most_active_hours,
            messages_by_hour: by_hour
                .iter()
                .enumerate()
                .map(|(hour, count)| HourCount {
                    hour: hour as u32,
                    count: *count,
                })
                .collect(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn msg(id: i64, speaker: &str, when: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id,
            character_id: 1,
            user_id: 1,
            speaker_name: speaker.into(),
            from_user: speaker == "阿哲",
            content: "…".into(),
            created_at: when,
            affinity_level: AffinityLevel::Level1,
        }
    }

    fn fav(count: u64) -> Favorability {
        Favorability {
            character_id: 1,
            message_count: count,
            current_level: affinity::level_for(count),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn empty_history_has_no_analytics() {
        assert!(compute(&fav(0), &[], Utc::now(), utc()).is_none());
        assert_eq!(conversation_days(&[], utc()), 0);
    }

    #[test]
    fn overview_counts_and_streak() {
        let messages = vec![
            msg(1, "阿哲", at("2025-03-01T08:10:00Z")),
            msg(2, "小雨", at("2025-03-01T08:11:00Z")),
            msg(3, "阿哲", at("2025-03-02T21:00:00Z")),
            msg(4, "小雨", at("2025-03-02T21:01:00Z")),
            msg(5, "阿哲", at("2025-03-05T08:30:00Z")),
        ];
        let now = at("2025-03-05T09:00:00Z");
        let a = compute(&fav(3), &messages, now, utc()).unwrap();

        assert_eq!(a.overview.total_messages, 5);
        assert_eq!(a.overview.user_messages, 3);
        assert_eq!(a.overview.character_messages, 2);
        assert_eq!(a.overview.conversation_days, 5);
        assert_eq!(a.overview.avg_messages_per_day, 1.0);
        assert_eq!(a.overview.longest_streak_days, 2);
        assert_eq!(a.overview.first_message, at("2025-03-01T08:10:00Z"));

        assert_eq!(a.trends.daily.len(), 30);
        let today = a.trends.daily.last().unwrap();
        assert_eq!(today.date, NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(today.message_count, 1);

        assert_eq!(a.trends.messages_by_hour.len(), 24);
        assert_eq!(a.trends.messages_by_hour[8].count, 3);
        assert_eq!(a.trends.most_active_hours[0].hour, 8);
        assert_eq!(a.trends.most_active_hours[0].time_range, "8:00-9:00");
        assert_eq!(a.trends.most_active_hours[1].hour, 21);
    }

    #[test]
    fn progression_marks_boundaries() {
        let t0 = at("2025-03-01T00:00:00Z");
        let mut messages = Vec::new();
        for i in 0..60 {
            let when = t0 + Duration::minutes(i * 2);
            messages.push(msg(i * 2, "阿哲", when));
            messages.push(msg(i * 2 + 1, "小雨", when + Duration::seconds(30)));
        }
        let steps = level_progression(&messages);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].message_count, 20);
        assert_eq!(steps[0].level, AffinityLevel::Level2);
        assert_eq!(steps[1].message_count, 50);
        assert_eq!(steps[1].level_name, "親密期");
    }

    #[test]
    fn roles_survive_a_rename() {
        // Lines written under an old character name still count as the character's.
        let messages = vec![
            msg(1, "阿哲", at("2025-03-01T08:00:00Z")),
            msg(2, "小雨", at("2025-03-01T08:01:00Z")),
            msg(3, "阿哲", at("2025-03-01T09:00:00Z")),
            msg(4, "小晴", at("2025-03-01T09:01:00Z")),
        ];
        let a = compute(&fav(2), &messages, at("2025-03-01T10:00:00Z"), utc()).unwrap();
        assert_eq!(a.overview.user_messages, 2);
        assert_eq!(a.overview.character_messages, 2);
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let dates: BTreeSet<NaiveDate> = [d(1), d(2), d(3), d(7), d(8)].into_iter().collect();
        assert_eq!(longest_streak(&dates), 3);
        assert_eq!(longest_streak(&BTreeSet::new()), 0);
    }
}
