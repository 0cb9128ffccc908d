//! End-of-episode metric decoding.
//!
//! Environments report their final reward in different shapes depending on the kind of game.
//! Each [`GameFamily`] has a decoder turning the raw payload into the common [`Metrics`]
//! vector. The decoder is chosen from the declared family when the game master is built and is
//! never inferred from the payload.

use std::{collections::BTreeMap, fmt};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::environment::{PlayerId, RawRewards};

/// Metric key: the episode was aborted.
pub const METRIC_ABORTED: &str = "Aborted";
/// Metric key: the episode was won.
pub const METRIC_SUCCESS: &str = "Success";
/// Metric key: the episode was lost.
pub const METRIC_LOSE: &str = "Lose";
/// Metric key: headline score in `[0, 100]`.
pub const BENCH_SCORE: &str = "Main Score";

/// Best-case length assumed by the length-delta decoder when none is configured.
pub const DEFAULT_LENGTH_CEILING: f64 = 20.0;

fn default_ceiling() -> f64 {
    DEFAULT_LENGTH_CEILING
}

/// How the environment rewards an episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameFamily {
    /// One player, reward in `[-1, 1]`: `1` solved, `-1` aborted, anything else is the
    /// completed fraction.
    SinglePlayer,
    /// Several players, per-player win/lose rewards.
    ///
    /// The bench score is the fraction of players that won, in `[0, 1]`, not a percentage like
    /// the other families.
    Competitive,
    /// Score is the growth of a shared token (e.g. the word of a word chain).
    LengthDelta {
        /// Token length of a perfect game.
        #[serde(default = "default_ceiling")]
        ceiling: f64,
    },
}

impl GameFamily {
    /// Length-delta family with the default ceiling.
    pub fn length_delta() -> Self {
        GameFamily::LengthDelta {
            ceiling: DEFAULT_LENGTH_CEILING,
        }
    }
}

/// The common metric vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Metrics {
    /// 1 if the episode was aborted.
    pub aborted: u8,
    /// Success, `0`, `1` or a fraction.
    pub success: f64,
    /// 1 if the episode was lost.
    pub lose: u8,
    /// Headline score. `None` means undefined.
    pub bench_score: Option<f64>,
}

impl Metrics {
    /// Aborted and lost, bench score undefined.
    pub fn aborted() -> Self {
        Self {
            aborted: 1,
            success: 0.0,
            lose: 1,
            bench_score: None,
        }
    }

    /// `(key, value)` pairs in logging order. An undefined bench score is `null`.
    pub fn entries(&self) -> [(&'static str, Value); 4] {
        [
            (METRIC_ABORTED, json!(self.aborted)),
            (METRIC_SUCCESS, json!(self.success)),
            (METRIC_LOSE, json!(self.lose)),
            (
                BENCH_SCORE,
                self.bench_score.map_or(Value::Null, |score| json!(score)),
            ),
        ]
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let score = self
            .bench_score
            .map_or_else(|| "undefined".to_owned(), |s| format!("{s:.1}"));
        write!(
            f,
            "aborted: {}, success: {}, lose: {}, score: {score}",
            self.aborted, self.success, self.lose
        )
    }
}

/// A decoder needed the reward of a player the environment did not report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPlayerRewardError {
    /// Requested player.
    pub player_id: PlayerId,
    /// Players present in the payload.
    pub available: Vec<PlayerId>,
}

impl fmt::Display for MissingPlayerRewardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "player {} not found in rewards (available: {:?})",
            self.player_id, self.available
        )
    }
}

impl std::error::Error for MissingPlayerRewardError {}

/// Numeric reward of `player_id`.
///
/// # Errors
/// [`MissingPlayerRewardError`] when the payload has no entry for `player_id`.
pub fn reward_for_player(
    rewards: &RawRewards,
    player_id: PlayerId,
) -> Result<f64, MissingPlayerRewardError> {
    rewards
        .numeric
        .get(&player_id)
        .copied()
        .ok_or_else(|| MissingPlayerRewardError {
            player_id,
            available: rewards.numeric.keys().copied().collect(),
        })
}

/// What the master knows about the end of the episode besides the raw rewards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeEnd {
    /// Every configured player, in declaration order.
    pub players: Vec<PlayerId>,
    /// Player that acted last.
    pub last_actor: Option<PlayerId>,
    /// True if the last move was flagged as a violation.
    pub last_move_invalid: bool,
    /// Tracked token when the episode ended.
    pub end_token: Option<String>,
}

/// Reward payload interpreted for one family.
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyReward {
    /// Scalar reward of the only player.
    SinglePlayer(f64),
    /// Per-player rewards of a competitive game.
    Competitive {
        /// Reward per player.
        rewards: BTreeMap<PlayerId, f64>,
        /// Whether the last acting player's final move was invalid.
        last_move_invalid: bool,
    },
    /// Start and end value of the tracked token.
    LengthDelta {
        /// Token at setup.
        start: String,
        /// Token at the end.
        end: String,
        /// Token length of a perfect game.
        ceiling: f64,
    },
}

/// Start and end of the tracked token, logged by the length-delta decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    /// Token at setup.
    pub start_token: String,
    /// Its length in characters.
    pub start_length: usize,
    /// Token at the end.
    pub end_token: String,
    /// Its length in characters.
    pub end_length: usize,
    /// `end_length - start_length`.
    pub length_diff: i64,
}

/// Decoder output.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The common metric vector.
    pub metrics: Metrics,
    /// Extra per-family statistics to log.
    pub extra: Option<(&'static str, Value)>,
}

impl From<Metrics> for Decoded {
    fn from(metrics: Metrics) -> Self {
        Self {
            metrics,
            extra: None,
        }
    }
}

/// Decoder of one [`GameFamily`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetricDecoder {
    /// See [`GameFamily::SinglePlayer`].
    SinglePlayer,
    /// See [`GameFamily::Competitive`].
    Competitive,
    /// See [`GameFamily::LengthDelta`].
    LengthDelta {
        /// Token length of a perfect game.
        ceiling: f64,
        /// Token captured at setup.
        start: Option<String>,
    },
}

impl MetricDecoder {
    /// Decoder for `family`.
    pub fn for_family(family: GameFamily) -> Self {
        match family {
            GameFamily::SinglePlayer => MetricDecoder::SinglePlayer,
            GameFamily::Competitive => MetricDecoder::Competitive,
            GameFamily::LengthDelta { ceiling } => MetricDecoder::LengthDelta {
                ceiling,
                start: None,
            },
        }
    }

    /// Capture setup-time state. `token` is the environment's tracked token after reset.
    pub fn on_setup(&mut self, token: Option<String>) {
        if let MetricDecoder::LengthDelta { start, .. } = self {
            *start = token;
        }
    }

    /// Interpret `rewards` for this family.
    ///
    /// # Errors
    /// Fails when a needed player reward is missing, or when the length-delta family has no
    /// tracked token or a ceiling that is not a positive number.
    pub fn interpret(&self, rewards: &RawRewards, end: &EpisodeEnd) -> anyhow::Result<FamilyReward> {
        Ok(match self {
            MetricDecoder::SinglePlayer => FamilyReward::SinglePlayer(reward_for_player(rewards, 0)?),
            MetricDecoder::Competitive => {
                let mut per_player = BTreeMap::new();
                for &player_id in &end.players {
                    per_player.insert(player_id, reward_for_player(rewards, player_id)?);
                }
                let flagged_by_env = end
                    .last_actor
                    .and_then(|id| rewards.other.get(&id))
                    .is_some_and(|info| info.invalid_move);
                FamilyReward::Competitive {
                    rewards: per_player,
                    last_move_invalid: end.last_move_invalid || flagged_by_env,
                }
            }
            MetricDecoder::LengthDelta { ceiling, start } => {
                anyhow::ensure!(
                    ceiling.is_finite() && *ceiling > 0.0,
                    "length ceiling must be a positive number, got {ceiling}"
                );
                FamilyReward::LengthDelta {
                    start: start
                        .clone()
                        .context("no tracked token was captured at setup")?,
                    end: end
                        .end_token
                        .clone()
                        .context("environment reports no tracked token at the end")?,
                    ceiling: *ceiling,
                }
            }
        })
    }

    /// Interpret and decode `rewards`.
    ///
    /// # Errors
    /// See [`MetricDecoder::interpret`].
    pub fn decode(&self, rewards: &RawRewards, end: &EpisodeEnd) -> anyhow::Result<Decoded> {
        Ok(decode(&self.interpret(rewards, end)?))
    }
}

/// Map a family reward to the common metrics.
pub fn decode(reward: &FamilyReward) -> Decoded {
    match reward {
        FamilyReward::SinglePlayer(reward) => decode_single_player(*reward).into(),
        FamilyReward::Competitive {
            rewards,
            last_move_invalid,
        } => decode_competitive(rewards, *last_move_invalid).into(),
        FamilyReward::LengthDelta {
            start,
            end,
            ceiling,
        } => decode_length_delta(start, end, *ceiling),
    }
}

fn decode_single_player(reward: f64) -> Metrics {
    if reward == 1.0 {
        Metrics {
            success: 1.0,
            bench_score: Some(100.0),
            ..Metrics::default()
        }
    } else if reward == -1.0 {
        Metrics::aborted()
    } else {
        Metrics {
            bench_score: Some(reward * 100.0),
            ..Metrics::default()
        }
    }
}

fn decode_competitive(rewards: &BTreeMap<PlayerId, f64>, last_move_invalid: bool) -> Metrics {
    if last_move_invalid {
        return Metrics::aborted();
    }
    let wins = rewards.values().filter(|reward| **reward > 0.0).count();
    let bench_score = if rewards.is_empty() {
        None
    } else {
        Some(wins as f64 / rewards.len() as f64)
    };
    Metrics {
        aborted: 0,
        success: 1.0,
        lose: 0,
        bench_score,
    }
}

fn decode_length_delta(start: &str, end: &str, ceiling: f64) -> Decoded {
    let start_length = start.chars().count();
    let end_length = end.chars().count();
    let stats = TokenStats {
        start_token: start.to_owned(),
        start_length,
        end_token: end.to_owned(),
        end_length,
        length_diff: end_length as i64 - start_length as i64,
    };

    let metrics = if stats.length_diff == 0 {
        Metrics::aborted()
    } else {
        Metrics {
            aborted: 0,
            success: 1.0,
            lose: 0,
            bench_score: Some((end_length as f64 / ceiling).min(1.0) * 100.0),
        }
    };
    Decoded {
        metrics,
        extra: Some(("token_stats", json!(stats))),
    }
}
