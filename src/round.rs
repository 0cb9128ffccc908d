//! Round bookkeeping.

use std::collections::BTreeSet;

use crate::environment::PlayerId;

/// Turn bookkeeping of an episode, owned by the game master.
///
/// A round is complete once every player acted at least once since the previous round boundary
/// and the last turn did not end with a request violation.
#[derive(Debug, Default, Clone)]
pub struct RoundState {
    acted: BTreeSet<PlayerId>,
    last_actor: Option<PlayerId>,
    request_violation: bool,
    violations: usize,
    rounds: usize,
}

impl RoundState {
    /// Fresh state, nobody acted yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the violation flag for the upcoming turn.
    pub fn begin_turn(&mut self) {
        self.request_violation = false;
    }

    /// Record that `player_id` was given its turn.
    pub fn mark_acted(&mut self, player_id: PlayerId) {
        self.acted.insert(player_id);
        self.last_actor = Some(player_id);
    }

    /// Raise the violation flag for the current turn.
    pub fn flag_violation(&mut self) {
        self.request_violation = true;
        self.violations += 1;
    }

    /// True if the round can be closed.
    pub fn is_boundary(&self, players: &[PlayerId]) -> bool {
        !self.request_violation && players.iter().all(|id| self.acted.contains(id))
    }

    /// Close the round.
    pub fn advance(&mut self) {
        self.acted.clear();
        self.rounds += 1;
    }

    /// Player that was given the latest turn.
    pub fn last_actor(&self) -> Option<PlayerId> {
        self.last_actor
    }

    /// True if the current turn ended with a violation.
    pub fn request_violation(&self) -> bool {
        self.request_violation
    }

    /// True if `player_id` acted since the last boundary.
    pub fn has_acted(&self, player_id: PlayerId) -> bool {
        self.acted.contains(&player_id)
    }

    /// Number of violations flagged during the episode.
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// Number of completed rounds.
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_players_alternating() {
        let players = [0, 1];
        let mut round = RoundState::new();
        let mut boundaries = 0;
        for turn in 0..6 {
            round.begin_turn();
            round.mark_acted(turn % 2);
            if round.is_boundary(&players) {
                round.advance();
                boundaries += 1;
            }
        }
        assert_eq!(boundaries, 3);
        assert_eq!(round.rounds(), 3);
        assert_eq!(round.last_actor(), Some(1));
    }

    #[test]
    fn violation_blocks_boundary() {
        let players = [0, 1, 2];
        let mut round = RoundState::new();
        round.mark_acted(0);
        round.mark_acted(1);
        round.begin_turn();
        round.mark_acted(2);
        round.flag_violation();
        assert!(!round.is_boundary(&players));

        // the reprompted player plays again without violation
        round.begin_turn();
        round.mark_acted(2);
        assert!(round.is_boundary(&players));
        assert_eq!(round.violations(), 1);
    }

    #[test]
    fn advance_clears_acted_set() {
        let mut round = RoundState::new();
        round.mark_acted(0);
        assert!(round.is_boundary(&[0]));
        round.advance();
        assert!(!round.has_acted(0));
        assert!(!round.is_boundary(&[0]));
        assert_eq!(round.last_actor(), Some(0));
    }
}
