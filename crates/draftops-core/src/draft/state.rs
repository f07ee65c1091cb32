// Draft state: pick counter, completed picks, player pool, clock.
//
// Only the event processor mutates a DraftState. Every mutating method here is
// crate-private and infallible; the processor checks preconditions first and
// then applies a whole event under one write lock.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::pick::{DraftPick, Position};

/// A draft state shared between its single writer and any number of readers.
pub(crate) type SharedDraftState = Arc<RwLock<DraftState>>;

/// Read-only handle on a processor's draft state.
///
/// Cloning is cheap. The write side of the lock stays with the processor, so
/// a holder can only take read guards:
///
/// ```compile_fail
/// let processor = draftops_core::processor::EventProcessor::new("league", 1, 2, 2);
/// let reader = processor.state();
/// let _guard = reader.write();
/// ```
#[derive(Debug, Clone)]
pub struct DraftStateReader(SharedDraftState);

impl DraftStateReader {
    pub(crate) fn new(state: &SharedDraftState) -> Self {
        DraftStateReader(Arc::clone(state))
    }

    /// Block until no event is being applied, then borrow the state.
    pub fn read(&self) -> RwLockReadGuard<'_, DraftState> {
        self.0.read()
    }
}

/// Overall lifecycle of the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftStatus {
    Waiting,
    InProgress,
    Completed,
}

/// Where the pick cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftPhase {
    /// No team on the clock yet.
    Idle,
    /// The given team has been announced as selecting.
    OnClock(u32),
    /// The most recent pick resolved; waiting for the next team.
    PickComplete,
}

/// The complete state of one draft session.
#[derive(Debug, Clone)]
pub struct DraftState {
    league_id: String,
    team_id: u32,
    team_count: u32,
    roster_size: u32,
    /// Pick number on the clock (or about to be). Starts at 1.
    current_pick: u32,
    drafted_players: Vec<DraftPick>,
    player_pool: HashSet<String>,
    position_cache: HashMap<String, Position>,
    phase: DraftPhase,
    status: DraftStatus,
    time_remaining_ms: u64,
    autodraft_teams: BTreeSet<u32>,
    /// Team ids in round-one order, empty until known.
    draft_order: Vec<u32>,
    /// Overall pick numbers belonging to `team_id` under snake order.
    my_pick_numbers: Vec<u32>,
}

impl DraftState {
    /// Create a new draft state.
    ///
    /// # Arguments
    /// - `league_id`: ESPN league identifier
    /// - `team_id`: The user's team (1-based)
    /// - `team_count`: Number of teams in the draft
    /// - `roster_size`: Picks per team, which is also the number of rounds
    pub fn new(league_id: impl Into<String>, team_id: u32, team_count: u32, roster_size: u32) -> Self {
        let league_id = league_id.into();
        info!(
            "Initialized draft state for league {}, team {} ({} teams x {} rounds)",
            league_id, team_id, team_count, roster_size
        );
        DraftState {
            league_id,
            team_id,
            team_count,
            roster_size,
            current_pick: 1,
            drafted_players: Vec::new(),
            player_pool: HashSet::new(),
            position_cache: HashMap::new(),
            phase: DraftPhase::Idle,
            status: DraftStatus::Waiting,
            time_remaining_ms: 0,
            autodraft_teams: BTreeSet::new(),
            draft_order: Vec::new(),
            my_pick_numbers: Vec::new(),
        }
    }

    /// Wrap this state for sharing with readers.
    pub(crate) fn into_shared(self) -> SharedDraftState {
        Arc::new(RwLock::new(self))
    }

    // --- Session parameters ---

    pub fn league_id(&self) -> &str {
        &self.league_id
    }

    pub fn team_id(&self) -> u32 {
        self.team_id
    }

    pub fn team_count(&self) -> u32 {
        self.team_count
    }

    pub fn roster_size(&self) -> u32 {
        self.roster_size
    }

    /// Total picks in the draft, saturating at `u32::MAX`.
    pub fn total_picks(&self) -> u32 {
        self.team_count.saturating_mul(self.roster_size)
    }

    // --- Progress ---

    pub fn current_pick(&self) -> u32 {
        self.current_pick
    }

    /// Completed picks in completion order.
    pub fn drafted_players(&self) -> &[DraftPick] {
        &self.drafted_players
    }

    pub fn player_pool(&self) -> &HashSet<String> {
        &self.player_pool
    }

    pub fn position_cache(&self) -> &HashMap<String, Position> {
        &self.position_cache
    }

    pub fn phase(&self) -> DraftPhase {
        self.phase
    }

    pub fn status(&self) -> DraftStatus {
        self.status
    }

    pub fn time_remaining_ms(&self) -> u64 {
        self.time_remaining_ms
    }

    /// The team on the clock, if any.
    pub fn on_the_clock(&self) -> Option<u32> {
        match self.phase {
            DraftPhase::OnClock(team) => Some(team),
            _ => None,
        }
    }

    pub fn is_available(&self, player_id: &str) -> bool {
        self.player_pool.contains(player_id)
    }

    pub fn is_drafted(&self, player_id: &str) -> bool {
        self.drafted_players.iter().any(|p| p.player_id == player_id)
    }

    /// The completed pick with the given overall number, if recorded.
    pub fn pick(&self, pick_number: u32) -> Option<&DraftPick> {
        self.drafted_players.iter().find(|p| p.pick_number == pick_number)
    }

    pub fn is_autodraft(&self, team_id: u32) -> bool {
        self.autodraft_teams.contains(&team_id)
    }

    pub fn is_complete(&self) -> bool {
        self.status == DraftStatus::Completed
    }

    // --- Snake order ---

    pub fn draft_order(&self) -> &[u32] {
        &self.draft_order
    }

    /// The user's overall pick numbers, empty until the draft order is known.
    pub fn my_pick_numbers(&self) -> &[u32] {
        &self.my_pick_numbers
    }

    /// Picks between the current pick and the user's next one.
    /// `Some(0)` means the user is picking now; `None` means no picks remain.
    pub fn picks_until_next(&self) -> Option<u32> {
        self.my_pick_numbers
            .iter()
            .find(|&&n| n >= self.current_pick)
            .map(|&n| n - self.current_pick)
    }

    /// The team expected to make `pick_number` under snake order.
    pub fn team_for_pick(&self, pick_number: u32) -> Option<u32> {
        let n = self.draft_order.len() as u32;
        if n == 0 || pick_number == 0 || pick_number > self.total_picks() {
            return None;
        }
        let round = (pick_number - 1) / n;
        let idx = (pick_number - 1) % n;
        let slot = if round % 2 == 0 { idx } else { n - 1 - idx };
        self.draft_order.get(slot as usize).copied()
    }

    /// A team's picks grouped by position, in roster display order.
    pub fn roster(&self, team_id: u32) -> Vec<(Position, Vec<String>)> {
        Position::ALL
            .iter()
            .filter_map(|&pos| {
                let players: Vec<String> = self
                    .drafted_players
                    .iter()
                    .filter(|p| p.team_id == team_id && p.position == pos)
                    .map(|p| p.player_id.clone())
                    .collect();
                (!players.is_empty()).then_some((pos, players))
            })
            .collect()
    }

    /// A serializable overview for logging and downstream consumers.
    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            league_id: self.league_id.clone(),
            team_id: self.team_id,
            status: self.status,
            current_pick: self.current_pick,
            completed_picks: self.drafted_players.len(),
            my_picks: self
                .drafted_players
                .iter()
                .filter(|p| p.team_id == self.team_id)
                .count(),
            available_players: self.player_pool.len(),
            on_the_clock: self.on_the_clock(),
            time_remaining_ms: self.time_remaining_ms,
            picks_until_next: self.picks_until_next(),
        }
    }

    // --- Mutation (processor only) ---

    /// Replace the available pool.
    pub(crate) fn initialize_player_pool<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.player_pool = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| !self.drafted_players.iter().any(|p| &p.player_id == id))
            .collect();
        info!("Initialized player pool with {} players", self.player_pool.len());
    }

    /// Set round-one order and compute the user's snake pick numbers.
    pub(crate) fn set_draft_order(&mut self, order: Vec<u32>) {
        let n = order.len() as u32;
        self.my_pick_numbers = match order.iter().position(|&t| t == self.team_id) {
            Some(slot) => {
                let slot = slot as u32;
                (0..self.roster_size)
                    .map_while(|round| {
                        let offset = if round % 2 == 0 { slot + 1 } else { n - slot };
                        round.checked_mul(n)?.checked_add(offset)
                    })
                    .collect()
            }
            None => {
                warn!("Team {} not found in draft order {:?}", self.team_id, order);
                Vec::new()
            }
        };
        self.draft_order = order;
        info!("Set draft order, our picks: {:?}", self.my_pick_numbers);
    }

    /// Put a team on the clock.
    pub(crate) fn begin_pick(&mut self, team_id: u32, time_remaining_ms: u64) {
        self.phase = DraftPhase::OnClock(team_id);
        self.time_remaining_ms = time_remaining_ms;
        if self.status == DraftStatus::Waiting {
            self.status = DraftStatus::InProgress;
        }
    }

    /// Append a completed pick and advance the counter past it.
    pub(crate) fn complete_pick(&mut self, pick: DraftPick) {
        if !self.player_pool.remove(&pick.player_id) {
            warn!("Player {} was not in the available pool", pick.player_id);
        }
        self.position_cache
            .entry(pick.player_id.clone())
            .or_insert(pick.position);
        self.current_pick = pick.pick_number.saturating_add(1);
        self.phase = DraftPhase::PickComplete;
        self.time_remaining_ms = 0;
        self.drafted_players.push(pick);

        if self.current_pick > self.total_picks() {
            self.status = DraftStatus::Completed;
            info!("Draft completed after {} picks", self.drafted_players.len());
        }
    }

    pub(crate) fn update_clock(&mut self, time_remaining_ms: u64) {
        self.time_remaining_ms = time_remaining_ms;
    }

    pub(crate) fn set_autodraft(&mut self, team_id: u32, enabled: bool) {
        if enabled {
            self.autodraft_teams.insert(team_id);
        } else {
            self.autodraft_teams.remove(&team_id);
        }
    }

    /// Capture everything a rollback needs to restore.
    pub fn snapshot(&self) -> DraftStateSnapshot {
        DraftStateSnapshot {
            taken_at: Utc::now(),
            current_pick: self.current_pick,
            drafted_players: self.drafted_players.clone(),
            player_pool: self.player_pool.clone(),
            phase: self.phase,
            status: self.status,
            time_remaining_ms: self.time_remaining_ms,
            autodraft_teams: self.autodraft_teams.clone(),
        }
    }

    /// Restore progress from a snapshot. The position cache is kept: it only
    /// ever grows.
    pub(crate) fn restore(&mut self, snapshot: &DraftStateSnapshot) {
        self.current_pick = snapshot.current_pick;
        self.drafted_players = snapshot.drafted_players.clone();
        self.player_pool = snapshot.player_pool.clone();
        self.phase = snapshot.phase;
        self.status = snapshot.status;
        self.time_remaining_ms = snapshot.time_remaining_ms;
        self.autodraft_teams = snapshot.autodraft_teams.clone();
        debug!("Restored snapshot taken at {}", snapshot.taken_at);
    }

    #[cfg(test)]
    pub(crate) fn force_current_pick(&mut self, pick: u32) {
        self.current_pick = pick;
    }

    #[cfg(test)]
    pub(crate) fn force_push_pick(&mut self, pick: DraftPick) {
        self.drafted_players.push(pick);
    }
}

/// Immutable copy of draft progress at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftStateSnapshot {
    pub taken_at: DateTime<Utc>,
    pub current_pick: u32,
    pub drafted_players: Vec<DraftPick>,
    pub player_pool: HashSet<String>,
    pub phase: DraftPhase,
    pub status: DraftStatus,
    pub time_remaining_ms: u64,
    pub autodraft_teams: BTreeSet<u32>,
}

/// Draft overview as reported to logs and downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSummary {
    pub league_id: String,
    pub team_id: u32,
    pub status: DraftStatus,
    pub current_pick: u32,
    pub completed_picks: usize,
    pub my_picks: usize,
    pub available_players: usize,
    pub on_the_clock: Option<u32>,
    pub time_remaining_ms: u64,
    pub picks_until_next: Option<u32>,
}
