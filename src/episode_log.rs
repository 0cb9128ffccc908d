//! Episode records handed to the hosting harness.
//!
//! This is the product output of an episode (keys, rounds, registrations), not diagnostics.
//! Diagnostics go through `tracing`, see [`Configuration::with_log`](crate::configuration::Configuration::with_log).

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::metrics::BENCH_SCORE;

/// Where the game master writes what happened during an episode.
pub trait EpisodeLog {
    /// Record a named value.
    fn log_key(&mut self, name: &str, value: Value);

    /// A round boundary was declared.
    fn log_round_advance(&mut self);

    /// A player joined the episode.
    fn log_player_registration(&mut self, name: &str, role: &str, model_id: &str);

    /// Free-form transcript event.
    fn log_event(&mut self, kind: &str, value: Value);

    /// A request violation was detected.
    fn count_request_violation(&mut self);

    /// The episode is over.
    fn log_game_end(&mut self);
}

/// One record of an [`EpisodeRecorder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    /// See [`EpisodeLog::log_key`].
    Key {
        /// Key name.
        name: String,
        /// Value.
        value: Value,
    },
    /// See [`EpisodeLog::log_round_advance`].
    RoundAdvance {
        /// Index of the round that starts.
        round: usize,
    },
    /// See [`EpisodeLog::log_player_registration`].
    Player {
        /// Display name.
        name: String,
        /// Game role.
        role: String,
        /// Model behind the player.
        model_id: String,
    },
    /// See [`EpisodeLog::log_event`].
    Event {
        /// Event kind.
        kind: String,
        /// Payload.
        value: Value,
    },
    /// See [`EpisodeLog::count_request_violation`].
    RequestViolation,
    /// See [`EpisodeLog::log_game_end`].
    GameEnd,
}

/// Keeps every record in memory, in order.
#[derive(Debug, Default, Clone)]
pub struct EpisodeRecorder {
    records: Vec<LogRecord>,
}

impl EpisodeRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Latest value logged under `name`.
    pub fn key(&self, name: &str) -> Option<&Value> {
        self.records.iter().rev().find_map(|record| match record {
            LogRecord::Key { name: n, value } if n == name => Some(value),
            _ => None,
        })
    }

    /// Latest payload of the event `kind`.
    pub fn event(&self, kind: &str) -> Option<&Value> {
        self.records.iter().rev().find_map(|record| match record {
            LogRecord::Event { kind: k, value } if k == kind => Some(value),
            _ => None,
        })
    }

    /// Number of round boundaries.
    pub fn round_count(&self) -> usize {
        self.count(|r| matches!(r, LogRecord::RoundAdvance { .. }))
    }

    /// Number of request violations.
    pub fn request_violations(&self) -> usize {
        self.count(|r| matches!(r, LogRecord::RequestViolation))
    }

    /// Registered players as `(name, role, model_id)`.
    pub fn players(&self) -> Vec<(&str, &str, &str)> {
        self.records
            .iter()
            .filter_map(|record| match record {
                LogRecord::Player {
                    name,
                    role,
                    model_id,
                } => Some((name.as_str(), role.as_str(), model_id.as_str())),
                _ => None,
            })
            .collect()
    }

    /// True once the game end was logged.
    pub fn game_ended(&self) -> bool {
        self.records.iter().any(|r| matches!(r, LogRecord::GameEnd))
    }

    fn count(&self, predicate: impl Fn(&LogRecord) -> bool) -> usize {
        self.records.iter().filter(|r| predicate(r)).count()
    }
}

impl EpisodeLog for EpisodeRecorder {
    fn log_key(&mut self, name: &str, value: Value) {
        self.records.push(LogRecord::Key {
            name: name.to_owned(),
            value,
        });
    }

    fn log_round_advance(&mut self) {
        let round = self.round_count() + 1;
        self.records.push(LogRecord::RoundAdvance { round });
    }

    fn log_player_registration(&mut self, name: &str, role: &str, model_id: &str) {
        self.records.push(LogRecord::Player {
            name: name.to_owned(),
            role: role.to_owned(),
            model_id: model_id.to_owned(),
        });
    }

    fn log_event(&mut self, kind: &str, value: Value) {
        self.records.push(LogRecord::Event {
            kind: kind.to_owned(),
            value,
        });
    }

    fn count_request_violation(&mut self) {
        self.records.push(LogRecord::RequestViolation);
    }

    fn log_game_end(&mut self) {
        self.records.push(LogRecord::GameEnd);
    }
}

/// Forwards every record to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EpisodeLog for TracingLog {
    fn log_key(&mut self, name: &str, value: Value) {
        info!(key = name, %value);
    }

    fn log_round_advance(&mut self) {
        debug!("next round");
    }

    fn log_player_registration(&mut self, name: &str, role: &str, model_id: &str) {
        info!(name, role, model_id, "player registered");
    }

    fn log_event(&mut self, kind: &str, value: Value) {
        debug!(kind, %value);
    }

    fn count_request_violation(&mut self) {
        info!("request violation");
    }

    fn log_game_end(&mut self) {
        info!("game end");
    }
}

/// Bench score of a finished episode, `None` when it is undefined.
///
/// This is what the benchmark scorer keeps from an episode.
pub fn score_episode(records: &EpisodeRecorder) -> Option<f64> {
    records.key(BENCH_SCORE).and_then(Value::as_f64)
}
