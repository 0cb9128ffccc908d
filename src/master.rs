//! Core turn orchestration.
//!
//! This module defines the [`GameMaster`] type, which drives one episode of an environment.
//! Its responsibilities include:
//!
//! - Applying attribute overrides before the environment resets
//! - Asking the environment whose turn it is and handing that player its merged context
//! - Forwarding the reply to the environment and detecting request violations
//! - Declaring round boundaries
//! - Decoding the end-of-episode reward into the common metrics
//!
//! # Lifecycle
//!
//! A game master starts `Uninitialized`. [`GameMaster::setup`] resets the environment and
//! registers the players, after which the master is `Running`. [`GameMaster::play`] runs turns
//! until the environment reports the end of the episode, then the master is `Terminated` and
//! refuses any further turn.
//!
//! Hosts that drive turns themselves can call [`GameMaster::observe`], [`GameMaster::ask`] and
//! [`GameMaster::step`] in a loop instead of `play`.
//!
//! # Rounds
//!
//! A round is complete once every player acted since the previous boundary and the latest
//! move was not a request violation. Strictly alternating two-player games close a round
//! every two turns. In simultaneous games a player reprompted after an invalid move keeps the
//! round open until it plays a valid move.

use anyhow::Context as _;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, info, instrument, trace, warn};

use crate::configuration::{Configuration, EpisodeConfig};
use crate::environment::{Environment, PlayerId};
use crate::episode_log::EpisodeLog;
use crate::logger::init_logger;
use crate::metrics::{EpisodeEnd, GameFamily, MetricDecoder, Metrics};
use crate::observation::{Context, ObservationAggregator};
use crate::overrides::{apply_all, Attributes, SetupReport};
use crate::player::{Agent, PlayerProxy, PlayerReply};
use crate::round::RoundState;

/// Lifecycle of a [`GameMaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    /// Built, not set up yet.
    Uninitialized,
    /// Turns are being played.
    Running,
    /// The episode is over.
    Terminated,
}

/// Drives one episode of an environment with a set of agents.
///
/// # Type Parameters
/// - `E`: The environment implementing [`Environment`]
pub struct GameMaster<'a, E: Environment> {
    env: E,
    state: MasterState,
    config: Configuration,
    episode: Option<EpisodeConfig>,
    decoder: MetricDecoder,
    players: Vec<PlayerProxy<'a>>,
    observations: ObservationAggregator,
    round: RoundState,
    rng: StdRng,
    log: &'a mut dyn EpisodeLog,
    metrics: Option<Metrics>,
}

impl<'a, E: Environment> GameMaster<'a, E> {
    /// Create a game master for an environment of the given `family`.
    ///
    /// The metric decoder is chosen from `family` here, once.
    #[instrument(skip_all)]
    pub fn new(
        family: GameFamily,
        env: E,
        log: &'a mut dyn EpisodeLog,
        config: Configuration,
    ) -> Self {
        if config.log {
            if let Err(err) = init_logger() {
                eprintln!("{err:#}");
            }
        }
        trace!(?family, ?config);

        GameMaster {
            env,
            state: MasterState::Uninitialized,
            config,
            episode: None,
            decoder: MetricDecoder::for_family(family),
            players: vec![],
            observations: ObservationAggregator::new(),
            round: RoundState::new(),
            rng: StdRng::seed_from_u64(0),
            log,
            metrics: None,
        }
    }

    /// Prepare the episode: apply overrides, seed, reset the environment and register one
    /// player per [`PlayerSpec`](crate::configuration::PlayerSpec), in declaration order.
    ///
    /// `agents[i]` plays the player declared at index `i`.
    ///
    /// # Errors
    /// Returned if the master was already set up, if the number of agents does not match the
    /// number of players, or if the environment fails to reset. Failing overrides are not
    /// errors: they are listed in the returned [`SetupReport`].
    #[instrument(skip_all, fields(env_id = %episode.env_id, seed = episode.seed))]
    pub fn setup(
        &mut self,
        episode: EpisodeConfig,
        agents: Vec<&'a mut dyn Agent>,
    ) -> anyhow::Result<SetupReport> {
        if self.state != MasterState::Uninitialized {
            anyhow::bail!("episode '{}' was already set up", episode.env_id);
        }
        if episode.players.is_empty() {
            anyhow::bail!("episode '{}' has no player", episode.env_id);
        }
        if agents.len() != episode.players.len() {
            anyhow::bail!(
                "{} players declared but {} agents given",
                episode.players.len(),
                agents.len()
            );
        }

        let report = apply_all(self, &episode.overrides);

        self.rng = StdRng::seed_from_u64(episode.seed);
        self.env
            .reset(episode.players.len(), episode.seed)
            .with_context(|| format!("could not reset '{}'", episode.env_id))?;

        for (env_id, (spec, agent)) in episode.players.iter().zip(agents).enumerate() {
            let player = PlayerProxy::new(env_id, spec, agent, StdRng::seed_from_u64(self.rng.gen()));
            self.observations.register(env_id, player.name());
            self.log
                .log_player_registration(player.name(), player.role(), player.model_name());
            info!(name = player.name(), role = player.role(), model = player.model_name());
            self.players.push(player);
        }

        self.decoder.on_setup(self.env.tracked_token());
        self.episode = Some(episode);
        self.state = MasterState::Running;
        Ok(report)
    }

    /// Play turns until the episode is over.
    ///
    /// # Errors
    /// Returned if the master is not running, if a player receives an invalid context, if an
    /// agent or the environment fails, or if the final reward cannot be decoded.
    #[instrument(skip_all)]
    pub fn play(&mut self) -> anyhow::Result<()> {
        self.ensure_running()?;
        while self.state == MasterState::Running {
            let (player_id, context) = self.observe()?;
            let reply = self.ask(player_id, &context)?;
            self.step(reply)?;
        }
        Ok(())
    }

    /// The player whose turn it is and its merged context.
    ///
    /// Starts a new turn: the request violation flag is cleared.
    ///
    /// # Errors
    /// Returned if the master is not running.
    pub fn observe(&mut self) -> anyhow::Result<(PlayerId, Context)> {
        self.ensure_running()?;
        let player_id = self.env.current_player_id();
        // markers found here were already accounted to the player that caused them
        let observation = self.env.observation(player_id);
        self.observations.record_observation(player_id, observation);
        self.round.begin_turn();
        Ok((player_id, self.observations.merged_context_for(player_id)))
    }

    /// Hand `context` to the player `player_id` and get its reply.
    ///
    /// # Errors
    /// Returned if the master is not running, if `player_id` is unknown, if `context` is not a
    /// `user` context or if the agent fails.
    pub fn ask(&mut self, player_id: PlayerId, context: &Context) -> anyhow::Result<PlayerReply> {
        self.ensure_running()?;
        let timeout = self.config.action_timeout;
        let player = self
            .players
            .get_mut(player_id)
            .with_context(|| format!("environment asked for unknown player {player_id}"))?;
        player.perceive_context(&mut self.round);
        player.respond(context, timeout)
    }

    /// Forward `reply` to the environment on behalf of the current player.
    ///
    /// Returns true when the episode is over. The violation flag only reflects this step, even
    /// when the host did not [`observe`](Self::observe) first.
    ///
    /// # Errors
    /// Returned if the master is not running, if the environment step fails, or if the final
    /// reward cannot be decoded.
    pub fn step(&mut self, reply: PlayerReply) -> anyhow::Result<bool> {
        self.ensure_running()?;
        self.round.begin_turn();
        let actor = self.env.current_player_id();
        let outcome = self
            .env
            .step(reply.as_action())
            .with_context(|| format!("environment step failed for player {actor}"))?;

        let observation = self.env.observation(actor);
        let flagged = self.observations.record_observation(actor, observation);
        if flagged || reply == PlayerReply::Forfeit {
            debug!(actor, forfeit = reply == PlayerReply::Forfeit, "request violation");
            self.round.flag_violation();
            self.log.count_request_violation();
        }
        if let Some(info) = &outcome.info {
            info!(%info, "environment step info");
        }

        if !outcome.done {
            if self.round.is_boundary(&self.player_ids()) {
                self.round.advance();
                self.log.log_round_advance();
                debug!(round = self.round.rounds(), "next round");
            }
        } else {
            self.state = MasterState::Terminated;
            self.on_after_game()?;
        }
        Ok(outcome.done)
    }

    fn on_after_game(&mut self) -> anyhow::Result<()> {
        let end_token = self.env.tracked_token();
        let rewards = self.env.close();
        self.log.log_event("numeric rewards", json!(rewards.numeric));
        self.log.log_event("other rewards", json!(rewards.other));
        self.log.log_key("env_rewards", json!(rewards));

        let end = EpisodeEnd {
            players: self.player_ids(),
            last_actor: self.round.last_actor(),
            last_move_invalid: self.round.request_violation(),
            end_token,
        };
        let decoded = self
            .decoder
            .decode(&rewards, &end)
            .context("could not decode the episode rewards")?;

        if let Some((key, value)) = decoded.extra {
            self.log.log_key(key, value);
        }
        for (key, value) in decoded.metrics.entries() {
            self.log.log_key(key, value);
        }
        self.log.log_game_end();

        info!(metrics = %decoded.metrics, rounds = self.round.rounds(), "episode finished");
        if self.config.verbose {
            let env_id = self.episode.as_ref().map_or("?", |e| e.env_id.as_str());
            // green episode, default metrics
            println!("\x1b[32m{env_id}: \x1b[39m{}", decoded.metrics);
        }
        self.metrics = Some(decoded.metrics);
        Ok(())
    }

    fn ensure_running(&self) -> anyhow::Result<()> {
        match self.state {
            MasterState::Running => Ok(()),
            MasterState::Uninitialized => anyhow::bail!("the game master was not set up"),
            MasterState::Terminated => anyhow::bail!("the episode is already over"),
        }
    }

    fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(PlayerProxy::env_id).collect()
    }

    /// True once [`setup`](Self::setup) succeeded.
    pub fn has_started(&self) -> bool {
        self.state != MasterState::Uninitialized
    }

    /// True once the episode is over.
    pub fn is_done(&self) -> bool {
        self.state == MasterState::Terminated
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MasterState {
        self.state
    }

    /// The player whose turn it is, if the episode is running.
    pub fn current_player(&self) -> Option<&PlayerProxy<'a>> {
        if self.state != MasterState::Running {
            return None;
        }
        self.players.get(self.env.current_player_id())
    }

    /// Registered players, in declaration order.
    pub fn players(&self) -> &[PlayerProxy<'a>] {
        &self.players
    }

    /// Round bookkeeping.
    pub fn round(&self) -> &RoundState {
        &self.round
    }

    /// Observation buffers.
    pub fn observations(&self) -> &ObservationAggregator {
        &self.observations
    }

    /// Final metrics, once the episode is over.
    pub fn metrics(&self) -> Option<Metrics> {
        self.metrics
    }

    /// The environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Give the environment back.
    pub fn into_env(self) -> E {
        if self.state == MasterState::Running {
            warn!("environment taken back before the end of the episode");
        }
        self.env
    }
}

impl<E: Environment> Attributes for GameMaster<'_, E> {
    fn child_mut(&mut self, name: &str) -> Option<&mut dyn Attributes> {
        match name {
            "env" => Some(&mut self.env),
            _ => None,
        }
    }
}
