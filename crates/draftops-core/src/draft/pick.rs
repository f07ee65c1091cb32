// Individual pick representation and roster position codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ESPN default position IDs (from the ESPN Fantasy API player records)
// ---------------------------------------------------------------------------

pub const ESPN_POS_QB: u16 = 1;
pub const ESPN_POS_RB: u16 = 2;
pub const ESPN_POS_WR: u16 = 3;
pub const ESPN_POS_TE: u16 = 4;
pub const ESPN_POS_K: u16 = 5;
pub const ESPN_POS_DST: u16 = 16;

/// Roster positions a drafted player can be placed at.
///
/// `Bench` doubles as the sentinel for "position unknown": every lookup that
/// cannot produce a concrete position resolves to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
    Kicker,
    Defense,
    Flex,
    Bench,
}

impl Position {
    /// Every position, in roster display order.
    pub const ALL: [Position; 8] = [
        Position::Quarterback,
        Position::RunningBack,
        Position::WideReceiver,
        Position::TightEnd,
        Position::Flex,
        Position::Kicker,
        Position::Defense,
        Position::Bench,
    ];

    /// Parse a position code into a Position.
    ///
    /// Accepts the ESPN spellings seen in player feeds:
    /// - "DST", "D/ST", "DEF" -> Defense
    /// - "BENCH", "BE", "BN" -> Bench
    /// - "FLEX", "RB/WR/TE" -> Flex
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            "K" | "PK" => Some(Position::Kicker),
            "DST" | "D/ST" | "DEF" => Some(Position::Defense),
            "FLEX" | "RB/WR/TE" => Some(Position::Flex),
            "BENCH" | "BE" | "BN" => Some(Position::Bench),
            _ => None,
        }
    }

    /// Parse a position code, degrading to `Bench` for anything unrecognized.
    pub fn from_str_or_bench(s: &str) -> Self {
        Self::from_str_pos(s).unwrap_or(Position::Bench)
    }

    /// Return the canonical code for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
            Position::Kicker => "K",
            Position::Defense => "DST",
            Position::Flex => "FLEX",
            Position::Bench => "BENCH",
        }
    }

    /// Whether this is the unresolved sentinel.
    pub fn is_bench(&self) -> bool {
        matches!(self, Position::Bench)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Map an ESPN default position ID to a Position.
/// Unknown IDs resolve to the `Bench` sentinel.
pub fn position_from_espn_id(position_id: u16) -> Position {
    match position_id {
        ESPN_POS_QB => Position::Quarterback,
        ESPN_POS_RB => Position::RunningBack,
        ESPN_POS_WR => Position::WideReceiver,
        ESPN_POS_TE => Position::TightEnd,
        ESPN_POS_K => Position::Kicker,
        ESPN_POS_DST => Position::Defense,
        _ => Position::Bench,
    }
}

/// A single completed draft pick. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPick {
    /// ESPN player ID as it appears on the wire.
    pub player_id: String,
    /// Roster position resolved at the moment the pick completed.
    pub position: Position,
    /// Team that made the pick.
    pub team_id: u32,
    /// Overall pick number (1-indexed).
    pub pick_number: u32,
    /// When the pick was recorded locally.
    pub timestamp: DateTime<Utc>,
}

impl DraftPick {
    pub fn new(player_id: impl Into<String>, position: Position, team_id: u32, pick_number: u32) -> Self {
        Self {
            player_id: player_id.into(),
            position,
            team_id,
            pick_number,
            timestamp: Utc::now(),
        }
    }
}
