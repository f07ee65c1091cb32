// Event processor: the single writer of DraftState.
//
// Each raw line is parsed, checked against the current phase and pick counter,
// and then applied under one write lock, so readers only ever see fully
// applied events. Nothing on this path awaits or returns a fatal error: every
// input ends up as a `ProcessOutcome`.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::draft::pick::DraftPick;
use crate::draft::state::{
    DraftPhase, DraftState, DraftStateReader, DraftStateSnapshot, SharedDraftState,
};
use crate::protocol::{self, DraftEvent, ParseError};
use crate::resolver::{BenchResolver, PositionResolver};
use crate::validator::{validate_draft_consistency, ValidationResult};

/// Snapshots kept for rollback; the oldest is dropped beyond this.
pub const MAX_SNAPSHOTS: usize = 100;

const NOTIFICATION_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A well-formed event that does not fit the current draft state. The event
/// is discarded and the state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("pick #{got} arrived while pick #{expected} is expected")]
    PickOutOfOrder { expected: u32, got: u32 },

    #[error("team {team_id} picked but the team on the clock is {on_clock:?}")]
    TeamNotOnClock { team_id: u32, on_clock: Option<u32> },

    #[error("player {player_id} was already drafted at pick #{pick_number}")]
    AlreadyDrafted { player_id: String, pick_number: u32 },

    #[error("pick #{pick_number} is recorded as {recorded} but was reported as {player_id}")]
    ConflictingPick {
        pick_number: u32,
        recorded: String,
        player_id: String,
    },

    #[error("team {team_id} is outside 1..={team_count}")]
    UnknownTeam { team_id: u32, team_count: u32 },

    #[error("team {team_id} announced while team {on_clock} is still on the clock")]
    ClockConflict { team_id: u32, on_clock: u32 },

    #[error("draft already completed after {total_picks} picks")]
    DraftComplete { total_picks: u32 },
}

/// What processing one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event changed draft state. Carries the event kind.
    Applied(&'static str),
    /// Repeat delivery of a pick that is already recorded.
    Duplicate { pick_number: u32 },
    /// Accepted with no state change (session traffic, unknown commands,
    /// stray clock ticks).
    Ignored,
    /// The line could not be parsed.
    Rejected(ParseError),
    Anomaly(Anomaly),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    #[error("snapshot index {index} out of range ({len} snapshots)")]
    OutOfRange { index: isize, len: usize },
}

/// Published to subscribers after an event is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DraftNotification {
    TeamSelecting {
        team_id: u32,
        pick_number: u32,
        time_remaining_ms: u64,
    },
    PickMade(DraftPick),
    AutodraftChanged { team_id: u32, enabled: bool },
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Message counters since creation or the last `reset_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessorStats {
    pub total_messages: u64,
    pub selecting_messages: u64,
    pub selected_messages: u64,
    pub clock_messages: u64,
    pub autodraft_messages: u64,
    pub session_messages: u64,
    pub unknown_messages: u64,
    pub parse_errors: u64,
    pub anomalies: u64,
    pub duplicates: u64,
}

impl ProcessorStats {
    /// Share of messages that were neither malformed nor anomalous.
    pub fn success_rate(&self) -> f64 {
        if self.total_messages == 0 {
            return 1.0;
        }
        let failed = self.parse_errors + self.anomalies;
        (self.total_messages - failed) as f64 / self.total_messages as f64
    }

    pub fn parse_error_rate(&self) -> f64 {
        self.rate(self.parse_errors)
    }

    pub fn anomaly_rate(&self) -> f64 {
        self.rate(self.anomalies)
    }

    fn rate(&self, count: u64) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            count as f64 / self.total_messages as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct EventProcessor {
    state: SharedDraftState,
    resolver: Arc<dyn PositionResolver>,
    stats: ProcessorStats,
    snapshots: VecDeque<DraftStateSnapshot>,
    notifications: broadcast::Sender<DraftNotification>,
}

impl EventProcessor {
    /// Create a processor for a fresh draft. Until a resolver is injected,
    /// every pick is recorded as `Bench`.
    pub fn new(league_id: impl Into<String>, team_id: u32, team_count: u32, roster_size: u32) -> Self {
        Self::from_state(DraftState::new(league_id, team_id, team_count, roster_size))
    }

    pub fn from_state(state: DraftState) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            state: state.into_shared(),
            resolver: Arc::new(BenchResolver),
            stats: ProcessorStats::default(),
            snapshots: VecDeque::new(),
            notifications,
        }
    }

    /// A read handle on the draft state. Holders can read but not mutate.
    pub fn state(&self) -> DraftStateReader {
        DraftStateReader::new(&self.state)
    }

    /// Inject the position lookup used for completed picks.
    ///
    /// `PositionResolver::resolve` is synchronous, so a resolver that could
    /// suspend the event stream cannot be expressed.
    pub fn set_position_resolver(&mut self, resolver: Arc<dyn PositionResolver>) {
        self.resolver = resolver;
        debug!("Position resolver replaced");
    }

    pub fn initialize_player_pool<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().initialize_player_pool(ids);
    }

    /// Set round-one draft order (team ids) for snake-order tracking.
    pub fn set_draft_order(&mut self, order: Vec<u32>) {
        self.state.write().set_draft_order(order);
    }

    /// Receive a notification for every applied event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DraftNotification> {
        self.notifications.subscribe()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ProcessorStats::default();
    }

    /// Run the consistency checks against the current state.
    pub fn validate(&self) -> ValidationResult {
        validate_draft_consistency(&self.state.read())
    }

    // --- Message handling ---

    /// Parse and apply one raw draft-room line.
    pub fn process_message(&mut self, raw: &str) -> ProcessOutcome {
        match protocol::parse(raw) {
            Ok(event) => {
                debug!("Received {} message", event.kind());
                self.process_event(event)
            }
            Err(e) => {
                self.stats.total_messages += 1;
                self.stats.parse_errors += 1;
                warn!("Discarding malformed message {:?}: {}", raw.trim(), e);
                ProcessOutcome::Rejected(e)
            }
        }
    }

    /// Apply an already-parsed event.
    pub fn process_event(&mut self, event: DraftEvent) -> ProcessOutcome {
        self.stats.total_messages += 1;

        let outcome = match event {
            DraftEvent::Selecting { team_id, time_remaining_ms } => {
                self.stats.selecting_messages += 1;
                self.apply_selecting(team_id, time_remaining_ms)
            }
            DraftEvent::Selected { pick_number, player_id, team_id, .. } => {
                self.stats.selected_messages += 1;
                self.apply_selected(pick_number, player_id, team_id)
            }
            DraftEvent::Clock { team_id, time_remaining_ms, .. } => {
                self.stats.clock_messages += 1;
                self.apply_clock(team_id, time_remaining_ms)
            }
            DraftEvent::Autodraft { team_id, enabled } => {
                self.stats.autodraft_messages += 1;
                self.apply_autodraft(team_id, enabled)
            }
            DraftEvent::Session { kind, .. } => {
                self.stats.session_messages += 1;
                if !kind.is_heartbeat() {
                    debug!("Session message: {:?}", kind);
                }
                ProcessOutcome::Ignored
            }
            DraftEvent::Unknown { command } => {
                self.stats.unknown_messages += 1;
                debug!("Ignoring unknown command {}", command);
                ProcessOutcome::Ignored
            }
        };

        match &outcome {
            ProcessOutcome::Anomaly(anomaly) => {
                self.stats.anomalies += 1;
                warn!("Draft anomaly, event discarded: {}", anomaly);
            }
            ProcessOutcome::Duplicate { pick_number } => {
                self.stats.duplicates += 1;
                debug!("Duplicate delivery of pick #{} ignored", pick_number);
            }
            _ => {}
        }
        outcome
    }

    fn apply_selecting(&mut self, team_id: u32, time_remaining_ms: u64) -> ProcessOutcome {
        let mut state = self.state.write();

        if state.is_complete() {
            return ProcessOutcome::Anomaly(Anomaly::DraftComplete {
                total_picks: state.total_picks(),
            });
        }
        if let Some(anomaly) = check_team(&state, team_id) {
            return ProcessOutcome::Anomaly(anomaly);
        }
        if let DraftPhase::OnClock(on_clock) = state.phase() {
            if on_clock != team_id {
                return ProcessOutcome::Anomaly(Anomaly::ClockConflict { team_id, on_clock });
            }
            // Re-announcement of the same team refreshes its clock.
            state.update_clock(time_remaining_ms);
            return ProcessOutcome::Applied("SELECTING");
        }

        let pick_number = state.current_pick();
        if let Some(expected) = state.team_for_pick(pick_number) {
            if expected != team_id {
                warn!(
                    "Team {} selecting for pick #{}, snake order expects team {}",
                    team_id, pick_number, expected
                );
            }
        }

        push_snapshot(&mut self.snapshots, state.snapshot());
        state.begin_pick(team_id, time_remaining_ms);
        drop(state);

        info!(
            "Team {} on the clock for pick #{} ({} ms)",
            team_id, pick_number, time_remaining_ms
        );
        self.notify(DraftNotification::TeamSelecting {
            team_id,
            pick_number,
            time_remaining_ms,
        });
        ProcessOutcome::Applied("SELECTING")
    }

    fn apply_selected(&mut self, pick_number: u32, player_id: String, team_id: u32) -> ProcessOutcome {
        let mut state = self.state.write();

        if let Some(recorded) = state.pick(pick_number) {
            if recorded.player_id == player_id && recorded.team_id == team_id {
                return ProcessOutcome::Duplicate { pick_number };
            }
            return ProcessOutcome::Anomaly(Anomaly::ConflictingPick {
                pick_number,
                recorded: recorded.player_id.clone(),
                player_id,
            });
        }
        if state.is_complete() {
            return ProcessOutcome::Anomaly(Anomaly::DraftComplete {
                total_picks: state.total_picks(),
            });
        }
        if let Some(anomaly) = check_team(&state, team_id) {
            return ProcessOutcome::Anomaly(anomaly);
        }
        if let Some(earlier) = state
            .drafted_players()
            .iter()
            .find(|p| p.player_id == player_id)
        {
            return ProcessOutcome::Anomaly(Anomaly::AlreadyDrafted {
                player_id,
                pick_number: earlier.pick_number,
            });
        }
        if pick_number != state.current_pick() {
            return ProcessOutcome::Anomaly(Anomaly::PickOutOfOrder {
                expected: state.current_pick(),
                got: pick_number,
            });
        }
        if state.on_the_clock() != Some(team_id) {
            return ProcessOutcome::Anomaly(Anomaly::TeamNotOnClock {
                team_id,
                on_clock: state.on_the_clock(),
            });
        }

        let position = self.resolver.resolve(&player_id);
        let pick = DraftPick::new(player_id, position, team_id, pick_number);

        push_snapshot(&mut self.snapshots, state.snapshot());
        state.complete_pick(pick.clone());
        let available = state.player_pool().len();
        drop(state);

        info!(
            "Pick #{}: player {} ({}) to team {}, {} players available",
            pick.pick_number, pick.player_id, pick.position, pick.team_id, available
        );
        self.notify(DraftNotification::PickMade(pick));
        ProcessOutcome::Applied("SELECTED")
    }

    fn apply_clock(&mut self, team_id: u32, time_remaining_ms: u64) -> ProcessOutcome {
        let mut state = self.state.write();
        if state.on_the_clock() == Some(team_id) {
            state.update_clock(time_remaining_ms);
            ProcessOutcome::Applied("CLOCK")
        } else {
            debug!("Clock tick for team {} which is not on the clock", team_id);
            ProcessOutcome::Ignored
        }
    }

    fn apply_autodraft(&mut self, team_id: u32, enabled: bool) -> ProcessOutcome {
        let mut state = self.state.write();
        if let Some(anomaly) = check_team(&state, team_id) {
            return ProcessOutcome::Anomaly(anomaly);
        }
        if state.is_autodraft(team_id) == enabled {
            return ProcessOutcome::Ignored;
        }

        push_snapshot(&mut self.snapshots, state.snapshot());
        state.set_autodraft(team_id, enabled);
        drop(state);

        info!("Team {} autodraft {}", team_id, if enabled { "on" } else { "off" });
        self.notify(DraftNotification::AutodraftChanged { team_id, enabled });
        ProcessOutcome::Applied("AUTODRAFT")
    }

    fn notify(&self, notification: DraftNotification) {
        // No subscribers is not an error.
        let _ = self.notifications.send(notification);
    }

    // --- Snapshots ---

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Snapshot by position, oldest first.
    pub fn snapshot(&self, index: usize) -> Option<&DraftStateSnapshot> {
        self.snapshots.get(index)
    }

    /// Restore the state captured in a snapshot. That snapshot and every
    /// later one are discarded.
    ///
    /// Negative indices count from the newest snapshot, so `-1` undoes the
    /// most recent mutating event.
    pub fn rollback_to_snapshot(&mut self, index: isize) -> Result<(), RollbackError> {
        let len = self.snapshots.len();
        let resolved = if index < 0 { len as isize + index } else { index };
        if resolved < 0 || resolved as usize >= len {
            return Err(RollbackError::OutOfRange { index, len });
        }
        let resolved = resolved as usize;

        let mut state = self.state.write();
        state.restore(&self.snapshots[resolved]);
        let current_pick = state.current_pick();
        drop(state);

        self.snapshots.truncate(resolved);
        info!(
            "Rolled back to snapshot {} of {}, current pick is now #{}",
            resolved, len, current_pick
        );
        Ok(())
    }
}

fn check_team(state: &DraftState, team_id: u32) -> Option<Anomaly> {
    if team_id == 0 || team_id > state.team_count() {
        Some(Anomaly::UnknownTeam {
            team_id,
            team_count: state.team_count(),
        })
    } else {
        None
    }
}

fn push_snapshot(snapshots: &mut VecDeque<DraftStateSnapshot>, snapshot: DraftStateSnapshot) {
    if snapshots.len() == MAX_SNAPSHOTS {
        snapshots.pop_front();
    }
    snapshots.push_back(snapshot);
}
