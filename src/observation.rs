//! Per-player observation buffers.
//!
//! The environment emits observation fragments for each player. They are recorded here as they
//! come and merged into a single [`Context`] when the player is asked to play. Every fragment
//! is delivered exactly once, in recording order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::environment::{Fragment, FragmentKind, Observation, PlayerId, Sender};

/// Text the environment uses to report an illegal move.
pub const INVALID_MOVE_MARKER: &str = "attempted an invalid move";

/// Prepended to the first context a player receives.
pub const STANDARD_PREAMBLE: &str = "You are taking part in a text game. Each message below is prefixed with the name of its sender in brackets. Reply with your next move only.";

/// Display name used for fragments emitted by the environment.
pub const GAME_SENDER_NAME: &str = "GAME";

/// True if `text` reports an invalid move.
///
/// This is a substring heuristic over free-form environment text. It is the only place where
/// invalid moves are recognized.
pub fn is_invalid_move(text: &str) -> bool {
    text.contains(INVALID_MOVE_MARKER)
}

/// Role of a context message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input for the agent.
    User,
    /// Output of the agent.
    Assistant,
    /// System instructions.
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        write!(f, "{s}")
    }
}

/// The merged, role-tagged text handed to an agent for its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Context {
    /// A `user` context.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Channel {
    name: Option<String>,
    /// Recorded, not yet merged into a context.
    pending: Vec<Fragment>,
    greeted: bool,
}

/// Buffers observation fragments per player and merges them on demand.
#[derive(Debug, Default)]
pub struct ObservationAggregator {
    channels: BTreeMap<PlayerId, Channel>,
}

impl ObservationAggregator {
    /// Empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player and the name other players will see in front of its messages.
    pub fn register(&mut self, player_id: PlayerId, name: impl Into<String>) {
        self.channels.entry(player_id).or_default().name = Some(name.into());
    }

    /// Append `observation` to the buffer of `player_id`.
    ///
    /// Returns true if any of the fragments recorded by this call reports an invalid move.
    /// Only incoming fragments are scanned, so a marker is reported by exactly one call.
    pub fn record_observation(&mut self, player_id: PlayerId, observation: Observation) -> bool {
        let incoming = match observation {
            Observation::Nothing => vec![],
            Observation::Text(text) => vec![Fragment::prompt(text)],
            Observation::Fragments(fragments) => fragments,
        };
        let violation = incoming.iter().any(|f| is_invalid_move(&f.text));
        if violation {
            trace!(player_id, "invalid move marker recorded");
        }
        self.channels
            .entry(player_id)
            .or_default()
            .pending
            .extend(incoming);
        violation
    }

    /// Merge and drain every pending fragment of `player_id`.
    ///
    /// Fragments sent by the player itself are skipped. The very first context of a player
    /// starts with [`STANDARD_PREAMBLE`]. Asking for a player that never received anything is
    /// not an error.
    pub fn merged_context_for(&mut self, player_id: PlayerId) -> Context {
        let names = self
            .channels
            .iter()
            .filter_map(|(id, c)| c.name.clone().map(|name| (*id, name)))
            .collect::<BTreeMap<_, _>>();
        let channel = self.channels.entry(player_id).or_default();

        let mut lines = vec![];
        if !channel.greeted {
            channel.greeted = true;
            lines.push(STANDARD_PREAMBLE.to_owned());
        }
        for fragment in std::mem::take(&mut channel.pending) {
            if fragment.sender == Sender::Player(player_id) {
                continue;
            }
            lines.push(format!("[{}] {}", sender_name(&names, fragment.sender), fragment.text));
        }

        Context::user(lines.join("\n"))
    }

    /// Fragments waiting for `player_id`, in recording order.
    pub fn pending(&self, player_id: PlayerId) -> &[Fragment] {
        self.channels
            .get(&player_id)
            .map(|c| c.pending.as_slice())
            .unwrap_or(&[])
    }

    /// Pending prompts for `player_id`, in order.
    pub fn pending_prompts(&self, player_id: PlayerId) -> impl Iterator<Item = &str> {
        self.pending(player_id)
            .iter()
            .filter(|f| f.kind == Some(FragmentKind::Prompt))
            .map(|f| f.text.as_str())
    }
}

fn sender_name(names: &BTreeMap<PlayerId, String>, sender: Sender) -> String {
    match sender {
        Sender::Game => GAME_SENDER_NAME.to_owned(),
        Sender::Player(id) => names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Player {}", id + 1)),
    }
}
