//! Players and the agents behind them.

use std::{
    fmt,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use rand::{rngs::StdRng, seq::SliceRandom};
use tracing::{debug, warn};

use crate::{
    configuration::PlayerSpec,
    environment::PlayerId,
    observation::{Context, Role},
    round::RoundState,
};

/// Model name reported by [`Programmatic`].
pub const PROGRAMMATIC_MODEL: &str = "programmatic";

/// What produces the replies of a player, usually a language model behind some backend.
pub trait Agent {
    /// Identifier of the model, used for logging.
    fn model_name(&self) -> &str;

    /// Programmatic agents are never called: the player answers with one of its configured
    /// replies instead.
    fn is_programmatic(&self) -> bool {
        false
    }

    /// Produce a reply for `context`.
    ///
    /// `deadline` is when the reply stops being useful. Backends enforcing their own timeout
    /// should return a [`ResponseTimeoutError`] when it expires.
    fn generate(&mut self, context: &Context, deadline: Option<Instant>) -> anyhow::Result<String>;
}

/// Agent standing for a player that answers with its configured replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct Programmatic;

impl Agent for Programmatic {
    fn model_name(&self) -> &str {
        PROGRAMMATIC_MODEL
    }

    fn is_programmatic(&self) -> bool {
        true
    }

    fn generate(&mut self, _context: &Context, _deadline: Option<Instant>) -> anyhow::Result<String> {
        anyhow::bail!("programmatic agents do not generate replies")
    }
}

/// A player was handed a context whose role is not `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidContextError {
    /// Role of the rejected context.
    pub role: Role,
}

impl fmt::Display for InvalidContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a 'user' context, got '{}'", self.role)
    }
}

impl std::error::Error for InvalidContextError {}

/// The agent did not reply in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseTimeoutError {
    /// Time the agent was given.
    pub timeout: Option<Duration>,
}

impl fmt::Display for ResponseTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timeout {
            Some(timeout) => write!(f, "Timeout Error (after {timeout:?})"),
            None => write!(f, "Timeout Error"),
        }
    }
}

impl std::error::Error for ResponseTimeoutError {}

/// What a player does with its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerReply {
    /// Text to forward to the environment.
    Move(String),
    /// No reply in time.
    Forfeit,
}

impl PlayerReply {
    /// The action to give to the environment.
    pub fn as_action(&self) -> Option<&str> {
        match self {
            PlayerReply::Move(text) => Some(text),
            PlayerReply::Forfeit => None,
        }
    }
}

/// One player of an episode: an agent, its environment id and its display data.
///
/// The role is only used for display. All players behave the same way.
pub struct PlayerProxy<'a> {
    env_id: PlayerId,
    name: String,
    role: String,
    agent: &'a mut dyn Agent,
    fallback_replies: Vec<String>,
    rng: StdRng,
}

impl fmt::Debug for PlayerProxy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerProxy")
            .field("env_id", &self.env_id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("model", &self.agent.model_name())
            .finish()
    }
}

impl<'a> PlayerProxy<'a> {
    /// Wrap `agent` as the player `env_id`. Programmatic replies are drawn from `rng`.
    pub fn new(env_id: PlayerId, spec: &PlayerSpec, agent: &'a mut dyn Agent, rng: StdRng) -> Self {
        Self {
            env_id,
            name: format!("Player {}", env_id + 1),
            role: spec.role.clone(),
            agent,
            fallback_replies: spec.fallback_replies(),
            rng,
        }
    }

    /// Environment player id.
    pub fn env_id(&self) -> PlayerId {
        self.env_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Game role.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Model behind the player.
    pub fn model_name(&self) -> &str {
        self.agent.model_name()
    }

    /// Turn bookkeeping, done when the player is handed its context.
    ///
    /// The player counts as having had its turn even if it then fails to reply.
    pub fn perceive_context(&self, round: &mut RoundState) {
        round.mark_acted(self.env_id);
    }

    /// Ask the player for its move.
    ///
    /// A reply arriving after `timeout`, or a [`ResponseTimeoutError`] from the agent, is a
    /// [`PlayerReply::Forfeit`].
    ///
    /// # Errors
    /// [`InvalidContextError`] if `context` is not a `user` context, or any other agent failure.
    pub fn respond(
        &mut self,
        context: &Context,
        timeout: Option<Duration>,
    ) -> anyhow::Result<PlayerReply> {
        if context.role != Role::User {
            return Err(InvalidContextError { role: context.role }.into());
        }

        if self.agent.is_programmatic() {
            let reply = self
                .fallback_replies
                .choose(&mut self.rng)
                .context("no reply to choose from")?
                .clone();
            debug!(player = %self.name, %reply, "programmatic reply");
            return Ok(PlayerReply::Move(reply));
        }

        let start = Instant::now();
        let deadline = timeout.map(|t| start + t);
        match self.agent.generate(context, deadline) {
            Ok(_) if deadline.is_some_and(|d| Instant::now() > d) => {
                warn!(player = %self.name, elapsed = ?start.elapsed(), "reply arrived too late");
                Ok(PlayerReply::Forfeit)
            }
            Ok(reply) => {
                debug!(player = %self.name, %reply, "model reply");
                Ok(PlayerReply::Move(reply))
            }
            Err(err) if err.downcast_ref::<ResponseTimeoutError>().is_some() => {
                warn!(player = %self.name, "{err}");
                Ok(PlayerReply::Forfeit)
            }
            Err(err) => {
                Err(err.context(format!("{} ({}) could not reply", self.name, self.model_name())))
            }
        }
    }
}
