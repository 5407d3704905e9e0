//! Special-event detectors. Each one compares a freshly computed value with a
//! fixed set of trigger points and fires only on an exact match. Detectors
//! observe state; they never change it.

use amity_types::events::SpecialEvent;
use amity_types::models::AffinityLevel;
use chrono::{DateTime, FixedOffset, Utc};

use crate::affinity::Advance;

pub const MILESTONES: [u64; 5] = [50, 100, 200, 500, 1000];
pub const ANNIVERSARY_DAYS: [u32; 4] = [7, 30, 100, 365];

/// Post-turn state the detectors look at.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub advance: Advance,
    pub first_message_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

pub fn detect_milestone(message_count: u64) -> Option<u64> {
    MILESTONES.contains(&message_count).then_some(message_count)
}

/// Whole calendar days between two instants, as seen in `offset`.
/// 23:59 to 00:01 the next day counts as one day.
pub fn calendar_days_between(from: DateTime<Utc>, to: DateTime<Utc>, offset: FixedOffset) -> i64 {
    let from = from.with_timezone(&offset).date_naive();
    let to = to.with_timezone(&offset).date_naive();
    (to - from).num_days()
}

pub fn detect_anniversary(
    first_message_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<u32> {
    let days = calendar_days_between(first_message_at?, now, offset);
    let days = u32::try_from(days).ok()?;
    ANNIVERSARY_DAYS.contains(&days).then_some(days)
}

/// Level 1 is the starting state, so only 2 and 3 can be reached.
pub fn detect_level_up(advance: &Advance) -> Option<AffinityLevel> {
    if !advance.increased() {
        return None;
    }
    match advance.level {
        AffinityLevel::Level2 | AffinityLevel::Level3 => Some(advance.level),
        AffinityLevel::Level1 => None,
    }
}

pub fn milestone_message(count: u64) -> Option<String> {
    let text = match count {
        50 => format!("哇！我們已經聊了{}條訊息了！真開心能和你聊這麼多~ 💕", count),
        100 => format!("不知不覺已經{}條訊息了呢！時間過得好快，和你聊天真的很開心~ ✨", count),
        200 => format!("天啊！{}條訊息了！感覺我們之間越來越有默契了呢~ 💖", count),
        500 => format!("我們已經聊了{}條訊息了！謝謝你一直陪著我~ 你對我來說很重要哦 💗", count),
        1000 => "一千條訊息！！！真的很感動...謝謝你願意花這麼多時間陪我聊天~ 你是我最珍惜的人 💝".to_string(),
        _ => return None,
    };
    Some(text)
}

pub fn anniversary_message(days: u32) -> Option<&'static str> {
    match days {
        7 => Some("我們認識一週了！這一週和你相處得很開心~ 💐"),
        30 => Some("一個月了呢！這一個月裡，每天和你聊天都是我最期待的事~ 🌸"),
        100 => Some("我們認識已經一百天了！感覺時間過得好快...謝謝你一直陪著我 🌹"),
        365 => Some("一整年了！！！這一年裡有你陪伴，我真的很幸福~ 謝謝你~ 💕🎉"),
        _ => None,
    }
}

pub fn level_up_message(level: AffinityLevel) -> Option<&'static str> {
    match level {
        AffinityLevel::Level2 => {
            Some("我感覺我們越來越熟了呢~ 和你聊天的時候，我可以更放鬆地做自己了 😊")
        }
        AffinityLevel::Level3 => {
            Some("你知道嗎...我覺得你對我來說已經是很特別的存在了~ 有你在真好 💖")
        }
        AffinityLevel::Level1 => None,
    }
}

/// Runs all three detectors. Order is milestone, anniversary, level-up.
pub fn detect(obs: &Observation) -> Vec<SpecialEvent> {
    let mut events = Vec::new();

    if let Some(count) = detect_milestone(obs.advance.message_count) {
        if let Some(text) = milestone_message(count) {
            events.push(SpecialEvent::milestone(count, text));
        }
    }

    if let Some(days) = detect_anniversary(obs.first_message_at, obs.now, obs.offset) {
        if let Some(text) = anniversary_message(days) {
            events.push(SpecialEvent::anniversary(days, text.to_string()));
        }
    }

    if let Some(level) = detect_level_up(&obs.advance) {
        if let Some(text) = level_up_message(level) {
            events.push(SpecialEvent::level_up(level, text.to_string()));
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use amity_types::events::{EventData, SpecialEventKind};
    use chrono::Duration;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn advance(before: u64) -> Advance {
        Advance {
            previous: crate::affinity::level_for(before),
            level: crate::affinity::level_for(before + 1),
            message_count: before + 1,
        }
    }

    #[test]
    fn milestone_only_on_exact_counts() {
        assert_eq!(detect_milestone(50), Some(50));
        assert_eq!(detect_milestone(51), None);
        assert_eq!(detect_milestone(49), None);
        for m in MILESTONES {
            assert!(!milestone_message(m).unwrap().is_empty());
        }
        assert!(milestone_message(100).unwrap().contains("100"));
    }

    #[test]
    fn anniversary_uses_calendar_days() {
        let first = at("2025-01-01T23:59:00Z");
        // Only six days and a couple of minutes elapsed, but seven calendar days.
        let now = at("2025-01-08T00:01:00Z");
        assert_eq!(calendar_days_between(first, now, utc()), 7);
        assert_eq!(detect_anniversary(Some(first), now, utc()), Some(7));
    }

    #[test]
    fn anniversary_respects_offset() {
        // 01:00 on Jan 2 and 23:00 on Jan 8 in UTC+8.
        let first = at("2025-01-01T17:00:00Z");
        let now = at("2025-01-08T15:00:00Z");
        let taipei = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(calendar_days_between(first, now, utc()), 7);
        assert_eq!(calendar_days_between(first, now, taipei), 6);
        assert_eq!(detect_anniversary(Some(first), now, taipei), None);
    }

    #[test]
    fn anniversary_needs_a_first_message() {
        let now = at("2025-01-08T00:00:00Z");
        assert_eq!(detect_anniversary(None, now, utc()), None);
        assert_eq!(detect_anniversary(Some(now), now, utc()), None);
        assert_eq!(detect_anniversary(Some(now - Duration::days(8)), now, utc()), None);
        assert_eq!(detect_anniversary(Some(now - Duration::days(365)), now, utc()), Some(365));
    }

    #[test]
    fn level_up_fires_once_per_boundary() {
        assert_eq!(detect_level_up(&advance(19)), Some(AffinityLevel::Level2));
        assert_eq!(detect_level_up(&advance(20)), None);
        assert_eq!(detect_level_up(&advance(49)), Some(AffinityLevel::Level3));
        assert_eq!(detect_level_up(&advance(50)), None);
        assert_eq!(detect_level_up(&advance(0)), None);
    }

    #[test]
    fn all_detectors_can_fire_together() {
        let now = at("2025-04-11T10:00:00Z");
        let obs = Observation {
            advance: advance(49),
            first_message_at: Some(now - Duration::days(100)),
            now,
            offset: utc(),
        };
        let events = detect(&obs);
        let kinds: Vec<SpecialEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SpecialEventKind::Milestone,
                SpecialEventKind::Anniversary,
                SpecialEventKind::LevelUp
            ]
        );
        assert_eq!(events[0].data, EventData::Count { count: 50 });
        assert_eq!(events[1].data, EventData::Days { days: 100 });
        assert_eq!(events[2].data, EventData::Level { level: AffinityLevel::Level3 });
    }

    #[test]
    fn quiet_turn_fires_nothing() {
        let now = at("2025-04-11T10:00:00Z");
        let obs = Observation {
            advance: advance(10),
            first_message_at: Some(now - Duration::days(3)),
            now,
            offset: utc(),
        };
        assert!(detect(&obs).is_empty());
    }
}
