//! Module defining what a simulation environment must implement to be driven by the
//! [`GameMaster`](crate::master::GameMaster).
//!
//! The environment owns the game rules. The master only asks it whose turn it is, hands it the
//! player replies and collects the observations it produces for each player.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::overrides::Attributes;

/// Environment-native player identifier. Player ids are the declaration index of the player.
pub type PlayerId = usize;

/// Who emitted an observation fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The environment itself (rules, prompts, referee messages).
    Game,
    /// Another (or the same) player.
    Player(PlayerId),
}

/// Optional tag attached to a fragment by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Game prompt or rule description.
    Prompt,
    /// Message relayed from another party.
    Message,
    /// Description of a move that was played.
    Action,
    /// Rendering of the current board or game state.
    Board,
}

/// A single atomic piece of observation text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Emitter of the text.
    pub sender: Sender,
    /// Raw text.
    pub text: String,
    /// Optional environment tag.
    pub kind: Option<FragmentKind>,
}

impl Fragment {
    /// Fragment without a kind.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            kind: None,
        }
    }

    /// Fragment emitted by the environment and tagged as a prompt.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(Sender::Game, text).with_kind(FragmentKind::Prompt)
    }

    /// Set the kind.
    pub fn with_kind(mut self, kind: FragmentKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// What [`Environment::observation`] returns for one player.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Nothing new since the previous call.
    Nothing,
    /// A single piece of text, attributed to the game.
    Text(String),
    /// Ordered fragments, each with its own sender.
    Fragments(Vec<Fragment>),
}

impl From<Vec<(Sender, String)>> for Observation {
    fn from(messages: Vec<(Sender, String)>) -> Self {
        Observation::Fragments(
            messages
                .into_iter()
                .map(|(sender, text)| Fragment::new(sender, text))
                .collect(),
        )
    }
}

/// Result of [`Environment::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// True once the episode is over.
    pub done: bool,
    /// Free-form information returned by the environment. Logged, never interpreted.
    pub info: Option<serde_json::Value>,
}

impl StepOutcome {
    /// The episode goes on.
    pub fn running() -> Self {
        Self::default()
    }

    /// The episode is over.
    pub fn finished() -> Self {
        Self {
            done: true,
            info: None,
        }
    }
}

/// Per-player details attached to the end-of-episode reward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardInfo {
    /// Whether the player's last move was rejected by the environment.
    pub invalid_move: bool,
    /// Why the game ended, as reported by the environment.
    pub reason: String,
    /// Number of turns played.
    pub turn_count: usize,
}

/// Raw reward payload returned by [`Environment::close`].
///
/// Opaque to the master; only the metric decoder interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRewards {
    /// Numeric reward per player.
    pub numeric: BTreeMap<PlayerId, f64>,
    /// Additional information per player.
    pub other: BTreeMap<PlayerId, RewardInfo>,
}

/// What the simulation environment should implement.
///
/// The [`Attributes`] supertrait exposes the mutable state the override hook may rewrite
/// before [`reset`](Environment::reset). Environments without overridable state can rely on
/// the default `Attributes` methods.
pub trait Environment: Attributes {
    /// Start a new episode. Every randomized choice must be derived from `seed`.
    fn reset(&mut self, num_players: usize, seed: u64) -> anyhow::Result<()>;

    /// Observations produced for `player_id` since the previous call for the same player.
    fn observation(&mut self, player_id: PlayerId) -> Observation;

    /// Apply the current player's move.
    ///
    /// `None` means the player forfeited its move (no reply in time). The environment decides
    /// what a forfeit means for the game, usually the same thing as an invalid move.
    ///
    /// # Errors
    /// Returned on unexpected failures only. Invalid moves are part of the game and must be
    /// reported through observations.
    fn step(&mut self, action: Option<&str>) -> anyhow::Result<StepOutcome>;

    /// The player that should play now.
    fn current_player_id(&self) -> PlayerId;

    /// End the episode and return the raw rewards.
    fn close(&mut self) -> RawRewards;

    /// The shared token some games grow over the episode (e.g. the current word of a chain).
    fn tracked_token(&self) -> Option<String> {
        None
    }
}
