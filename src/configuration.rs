//! Config for episodes and for the game master behaviors
//!
//! Two kinds of configuration live here:
//!
//! - [`EpisodeConfig`] describes one episode (environment, seed, players, overrides). It is
//!   usually read from a game instance file with [`EpisodeConfig::from_json`].
//! - [`Configuration`] controls how the game master runs, and can be created programmatically
//!   using [`Configuration::new()`] or by reading environment variables using
//!   [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Set a flag to `"true"` (case-insensitive) to enable it.
//!
//! - `ARENA_VERBOSE`: Print the final metrics of every episode to stdout (default: `false`)
//! - `ARENA_LOG`: Enable logging to a file (default: `false`)
//! - `ARENA_ACTION_TIMEOUT_MS`: Maximum time for a player to reply, in milliseconds (default: none)

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::overrides::AttributeOverride;

/// Reply used by programmatic players that have no configured reply.
pub const DEFAULT_CUSTOM_RESPONSE: &str = "Whatever";

/// One player slot of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSpec {
    /// Role name, used for display only.
    #[serde(default = "default_role")]
    pub role: String,
    /// Replies a programmatic player picks from.
    #[serde(default)]
    pub custom_response: Option<Vec<String>>,
}

fn default_role() -> String {
    "Player".to_owned()
}

impl PlayerSpec {
    /// Player with the given role and no custom replies.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            custom_response: None,
        }
    }

    /// Set the replies a programmatic player picks from.
    pub fn with_custom_response<S: Into<String>>(
        mut self,
        replies: impl IntoIterator<Item = S>,
    ) -> Self {
        self.custom_response = Some(replies.into_iter().map(Into::into).collect());
        self
    }

    /// Configured replies, or [`DEFAULT_CUSTOM_RESPONSE`].
    pub fn fallback_replies(&self) -> Vec<String> {
        match &self.custom_response {
            Some(replies) if !replies.is_empty() => replies.clone(),
            _ => vec![DEFAULT_CUSTOM_RESPONSE.to_owned()],
        }
    }
}

impl Default for PlayerSpec {
    fn default() -> Self {
        Self::new(default_role())
    }
}

/// Everything needed to set up one episode. Not modified once setup begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeConfig {
    /// Environment identifier.
    pub env_id: String,
    /// Seed of every random choice of the episode.
    pub seed: u64,
    /// Players in declaration order. The index is the environment player id.
    pub players: Vec<PlayerSpec>,
    /// Overrides applied before the environment resets.
    #[serde(default, rename = "override_variables")]
    pub overrides: Vec<AttributeOverride>,
}

impl EpisodeConfig {
    /// Episode without players nor overrides.
    pub fn new(env_id: impl Into<String>, seed: u64) -> Self {
        Self {
            env_id: env_id.into(),
            seed,
            players: vec![],
            overrides: vec![],
        }
    }

    /// Append a player.
    pub fn with_player(mut self, player: PlayerSpec) -> Self {
        self.players.push(player);
        self
    }

    /// Append an override.
    pub fn with_override(mut self, item: AttributeOverride) -> Self {
        self.overrides.push(item);
        self
    }

    /// Parse a game instance.
    ///
    /// # Errors
    /// Returned when `json` is not a valid instance.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid episode configuration")
    }
}

/// Configuration for game master behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) action_timeout: Option<Duration>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Nothing is printed to stdout.
    /// - Logging to file is disabled.
    /// - Players have no time limit.
    pub fn new() -> Self {
        Self {
            verbose: false,
            log: false,
            action_timeout: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// The following environment variables are recognized:
    /// - `ARENA_VERBOSE`: if set to `"true"`, prints episode results (default: `false`)
    /// - `ARENA_LOG`: if set to `"true"`, enables logging to file (default: `false`)
    /// - `ARENA_ACTION_TIMEOUT_MS`: player reply timeout in milliseconds (default: none)
    ///
    /// Any other value (including unset) will result in using the default value for each field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_millis(var: &str) -> Option<Duration> {
            std::env::var(var)
                .ok()?
                .parse::<u64>()
                .ok()
                .map(Duration::from_millis)
        }

        Self {
            verbose: get_env_flag("ARENA_VERBOSE", false),
            log: get_env_flag("ARENA_LOG", false),
            action_timeout: get_env_millis("ARENA_ACTION_TIMEOUT_MS"),
        }
    }

    /// Enable or disable printing episode results.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Set the maximum time a player may take to reply.
    ///
    /// A player that does not reply in time forfeits its move, which counts as a request
    /// violation.
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// The configured reply timeout.
    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
