//! # Arena Master
//!
//! Turn orchestration for running language-model agents through text game environments.
//!
//! It provides:
//! - A [`GameMaster`](crate::master::GameMaster) that drives one episode: whose turn it is,
//!   what context each player sees, when a round is over
//! - Per-player observation buffering and merging ([`ObservationAggregator`](crate::observation::ObservationAggregator))
//! - Invalid-move ("request violation") detection from environment feedback
//! - Attribute overrides applied before reset, to force reproducible episodes
//! - Decoding of heterogeneous end-of-episode rewards into one metric vector
//!   ([`Metrics`](crate::metrics::Metrics))
//!
//! The game rules live in the environment, behind the [`Environment`](crate::environment::Environment)
//! trait. Replies are produced by [`Agent`](crate::player::Agent)s, usually a language model
//! behind some backend.
//!
//! # Documentation Overview
//!
//! - For the turn loop and the episode lifecycle, see the [`master`] module.
//! - For implementing an environment, see the [`Environment`](crate::environment::Environment)
//!   and [`Attributes`](crate::overrides::Attributes) traits.
//! - For the end-of-episode metrics of each kind of game, see [`metrics`].
//! - For configuring episodes and the game master, see [`configuration`].
//!
//! # Usage Example
//!
//! ```no_run
//! # use arena_master::overrides::Attributes;
//! # struct YourEnv;
//! # impl Attributes for YourEnv {}
//! # impl arena_master::environment::Environment for YourEnv {
//! #     fn reset(&mut self, _num_players: usize, _seed: u64) -> anyhow::Result<()> { Ok(()) }
//! #     fn observation(&mut self, _player_id: usize) -> Observation { Observation::Nothing }
//! #     fn step(&mut self, _action: Option<&str>) -> anyhow::Result<StepOutcome> { Ok(StepOutcome::finished()) }
//! #     fn current_player_id(&self) -> usize { 0 }
//! #     fn close(&mut self) -> RawRewards { RawRewards::default() }
//! # }
//! # struct YourModel;
//! # impl Agent for YourModel {
//! #     fn model_name(&self) -> &str { "your-model" }
//! #     fn generate(&mut self, _context: &Context, _deadline: Option<std::time::Instant>) -> anyhow::Result<String> { Ok("[move]".into()) }
//! # }
//! use arena_master::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let episode = EpisodeConfig::new("TowerOfHanoi-v0", 525119131)
//!         .with_player(PlayerSpec::new("Solver"));
//!
//!     let mut records = EpisodeRecorder::new();
//!     let mut model = YourModel;
//!     let mut master = GameMaster::new(
//!         GameFamily::SinglePlayer,
//!         YourEnv,
//!         &mut records,
//!         Configuration::from_env(),
//!     );
//!     master.setup(episode, vec![&mut model as &mut dyn Agent])?;
//!     master.play()?;
//!
//!     println!("{}", master.metrics().unwrap_or_default());
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod configuration;
pub mod environment;
pub mod episode_log;
mod logger;
pub mod master;
pub mod metrics;
pub mod observation;
pub mod overrides;
pub mod player;
pub mod round;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use arena_master::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::{Configuration, EpisodeConfig, PlayerSpec};
    pub use crate::environment::{
        Environment, Fragment, Observation, PlayerId, RawRewards, RewardInfo, Sender, StepOutcome,
    };
    pub use crate::episode_log::{EpisodeLog, EpisodeRecorder, TracingLog};
    pub use crate::master::GameMaster;
    pub use crate::metrics::{GameFamily, Metrics};
    pub use crate::observation::Context;
    pub use crate::overrides::{AttrValue, AttributeOverride, Attributes};
    pub use crate::player::{Agent, PlayerReply, Programmatic};
}
