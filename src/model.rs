//! Records passed from the game into the storage pipeline.
//!
//! Values are normalized here, once, so providers can trust them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::PLAYER_NAME_LENGTH_MAX;

// =============================================================================
// PlayerRef
// =============================================================================

/// Identity of a player record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRef {
    /// Stable player id
    pub id: Uuid,
    /// Sanitized display name
    pub name: String,
}

impl PlayerRef {
    /// Create a reference, sanitizing the display name.
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: sanitize_player_name(name),
        }
    }
}

/// Strip control characters, trim, and cap the length of a display name.
#[must_use]
pub fn sanitize_player_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !c.is_control()).collect();
    cleaned.trim().chars().take(PLAYER_NAME_LENGTH_MAX).collect()
}

// =============================================================================
// Experience
// =============================================================================

/// Experience snapshot of a player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// Level, never negative
    pub level: i32,
    /// Total experience points, never negative
    pub total: i32,
    /// Progress toward the next level in `[0, 1]`
    pub progress: f32,
}

impl Experience {
    /// Create an experience record, clamping every field into range.
    #[must_use]
    pub fn new(level: i32, total: i32, progress: f32) -> Self {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        Self {
            level: level.max(0),
            total: total.max(0),
            progress,
        }
    }
}

// =============================================================================
// TopEntry
// =============================================================================

/// One row of a ranked leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopEntry {
    /// Display name
    pub name: String,
    /// Statistic value
    pub value: i64,
}

impl TopEntry {
    /// Create an entry.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Copy with a sanitized name and a non-negative value.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            name: sanitize_player_name(&self.name),
            value: self.value.max(0),
        }
    }
}
