// Draft state consistency checks.
//
// Read-only and safe to call at any point in a session. Errors make the state
// invalid; warnings are informational and never change `is_valid`.

use std::collections::HashSet;

use serde::Serialize;

use crate::draft::state::DraftState;

pub const PICK_COUNTER_BEHIND: &str = "pick counter behind completed picks";
pub const PICK_COUNTER_AHEAD: &str = "pick counter ahead of completed picks";
const DUPLICATE_PLAYER: &str = "duplicate player";

/// Outcome of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Failed checks, in check order.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// True when the state shows counter regression or duplicated picks,
    /// the failures that indicate the processor itself went wrong.
    pub fn has_critical_errors(&self) -> bool {
        self.errors.iter().any(|e| {
            e.starts_with(PICK_COUNTER_BEHIND)
                || e.starts_with(PICK_COUNTER_AHEAD)
                || e.starts_with(DUPLICATE_PLAYER)
        })
    }
}

/// Check the pick counter against the completed-pick history and the pool.
///
/// `current_pick == drafted_players.len() + 1` is the normal between-picks
/// state and is valid.
pub fn validate_draft_consistency(state: &DraftState) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let current_pick = state.current_pick() as usize;
    let drafted = state.drafted_players();

    if current_pick < drafted.len() {
        errors.push(format!(
            "{PICK_COUNTER_BEHIND}: current_pick={} but {} picks recorded",
            current_pick,
            drafted.len()
        ));
    }

    if current_pick > drafted.len() + 1 {
        errors.push(format!(
            "{PICK_COUNTER_AHEAD}: current_pick={} but only {} picks recorded",
            current_pick,
            drafted.len()
        ));
    }

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for pick in drafted {
        let id = pick.player_id.as_str();
        if !seen.insert(id) && !duplicates.contains(&id) {
            duplicates.push(id);
        }
    }
    if !duplicates.is_empty() {
        errors.push(format!(
            "{DUPLICATE_PLAYER} in drafted players: {}",
            duplicates.join(", ")
        ));
    }

    let mut listed = HashSet::new();
    let still_available: Vec<&str> = drafted
        .iter()
        .map(|p| p.player_id.as_str())
        .filter(|id| state.is_available(id) && listed.insert(*id))
        .collect();
    if !still_available.is_empty() {
        errors.push(format!(
            "drafted player still in available pool: {}",
            still_available.join(", ")
        ));
    }

    // --- Warnings ---

    let out_of_sequence = drafted
        .iter()
        .enumerate()
        .filter(|(i, p)| p.pick_number as usize != i + 1)
        .count();
    if out_of_sequence > 0 {
        warnings.push(format!(
            "{out_of_sequence} completed picks are not numbered contiguously from 1"
        ));
    }

    let bench = drafted
        .iter()
        .filter(|p| p.position.is_bench())
        .count();
    if bench > 0 {
        warnings.push(format!("{bench} picks recorded without a resolved position"));
    }

    if state.player_pool().is_empty() {
        warnings.push("available player pool is empty".to_string());
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::pick::{DraftPick, Position};

    fn state() -> DraftState {
        let mut state = DraftState::new("league", 1, 12, 16);
        state.initialize_player_pool(["3918298", "4362238", "4429795"]);
        state
    }

    #[test]
    fn fresh_state_is_valid() {
        let result = validate_draft_consistency(&state());
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn pick_in_progress_is_valid() {
        let mut state = state();
        state.begin_pick(1, 30_000);
        state.complete_pick(DraftPick::new("3918298", Position::Quarterback, 1, 1));
        assert_eq!(state.current_pick(), 2);
        assert!(validate_draft_consistency(&state).is_valid);
    }

    #[test]
    fn counter_regression_is_reported() {
        let mut state = state();
        state.complete_pick(DraftPick::new("3918298", Position::Quarterback, 1, 1));
        state.force_current_pick(0);

        let result = validate_draft_consistency(&state);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("pick counter behind completed picks"));
        assert!(result.has_critical_errors());
    }

    #[test]
    fn counter_ahead_is_reported() {
        let mut state = state();
        state.force_current_pick(5);
        let result = validate_draft_consistency(&state);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("pick counter ahead of completed picks"));
    }

    #[test]
    fn duplicate_player_reported_once() {
        let mut state = state();
        state.complete_pick(DraftPick::new("4362238", Position::WideReceiver, 2, 1));
        state.force_push_pick(DraftPick::new("4362238", Position::WideReceiver, 3, 2));
        state.force_push_pick(DraftPick::new("4362238", Position::WideReceiver, 4, 3));
        state.force_current_pick(4);

        let result = validate_draft_consistency(&state);
        assert!(!result.is_valid);
        let dupes: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.starts_with("duplicate player"))
            .collect();
        assert_eq!(dupes.len(), 1);
        assert!(result.has_critical_errors());
    }

    #[test]
    fn drafted_player_left_in_pool_is_reported() {
        let mut state = state();
        state.force_push_pick(DraftPick::new("4429795", Position::RunningBack, 1, 1));
        state.force_current_pick(2);

        let result = validate_draft_consistency(&state);
        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec!["drafted player still in available pool: 4429795".to_string()]
        );
        assert!(!result.has_critical_errors());
    }

    #[test]
    fn each_failing_check_reports_once() {
        let mut state = state();
        state.force_push_pick(DraftPick::new("3918298", Position::Quarterback, 1, 1));
        state.force_push_pick(DraftPick::new("4362238", Position::WideReceiver, 2, 2));
        state.force_push_pick(DraftPick::new("4362238", Position::WideReceiver, 1, 3));
        state.force_push_pick(DraftPick::new("3918298", Position::Quarterback, 2, 4));
        state.force_current_pick(5);

        let result = validate_draft_consistency(&state);
        assert_eq!(
            result.errors,
            vec![
                "duplicate player in drafted players: 4362238, 3918298".to_string(),
                "drafted player still in available pool: 3918298, 4362238".to_string(),
            ]
        );
    }

    #[test]
    fn two_players_left_in_pool_give_one_error() {
        let mut state = state();
        state.force_push_pick(DraftPick::new("3918298", Position::Quarterback, 1, 1));
        state.force_push_pick(DraftPick::new("4429795", Position::RunningBack, 2, 2));
        state.force_current_pick(3);

        let result = validate_draft_consistency(&state);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0],
            "drafted player still in available pool: 3918298, 4429795"
        );
    }

    #[test]
    fn errors_follow_check_order() {
        let mut state = state();
        state.force_push_pick(DraftPick::new("4429795", Position::RunningBack, 1, 1));
        state.force_push_pick(DraftPick::new("4429795", Position::RunningBack, 1, 2));
        state.force_current_pick(0);

        let result = validate_draft_consistency(&state);
        assert!(result.errors[0].starts_with(PICK_COUNTER_BEHIND));
        assert!(result.errors[1].starts_with("duplicate player"));
        assert!(result.errors[2].starts_with("drafted player still in available pool"));
    }

    #[test]
    fn warnings_do_not_affect_validity() {
        let mut state = DraftState::new("league", 1, 2, 2);
        state.force_push_pick(DraftPick::new("a", Position::Bench, 1, 2));
        state.force_current_pick(2);

        let result = validate_draft_consistency(&state);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 3);
        assert!(result.warnings[0].contains("not numbered contiguously"));
        assert!(result.warnings[1].contains("without a resolved position"));
        assert!(result.warnings[2].contains("pool is empty"));
    }
}
