//! Three-tier affinity state machine. The level is a pure function of the
//! per-character message counter; the counter only ever moves up by one.

use amity_db::models::FavorabilityRow;
use amity_types::models::AffinityLevel;
use tracing::warn;

pub const LEVEL_1_THRESHOLD: u64 = 0;
pub const LEVEL_2_THRESHOLD: u64 = 20;
pub const LEVEL_3_THRESHOLD: u64 = 50;

pub fn level_for(message_count: u64) -> AffinityLevel {
    if message_count >= LEVEL_3_THRESHOLD {
        AffinityLevel::Level3
    } else if message_count >= LEVEL_2_THRESHOLD {
        AffinityLevel::Level2
    } else {
        AffinityLevel::Level1
    }
}

/// Result of advancing the counter by one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub previous: AffinityLevel,
    pub level: AffinityLevel,
    pub message_count: u64,
}

impl Advance {
    pub fn increased(&self) -> bool {
        self.level > self.previous
    }
}

/// Increments the counter and recomputes the level in place.
///
/// The previous level is taken from the stored row; an out-of-range stored
/// value is treated as whatever the old count implies.
pub fn advance(row: &mut FavorabilityRow) -> Advance {
    let previous = AffinityLevel::try_from(row.current_level).unwrap_or_else(|e| {
        warn!("Character {}: {}", row.character_id, e);
        level_for(row.message_count)
    });

    row.message_count = row.message_count.saturating_add(1);
    let level = level_for(row.message_count);
    row.current_level = level.as_u8();

    Advance {
        previous,
        level,
        message_count: row.message_count,
    }
}
