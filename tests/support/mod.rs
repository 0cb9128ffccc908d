#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use arena_master::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub fn invalid_move(player_id: PlayerId, reason: &str) -> Fragment {
    Fragment::new(
        Sender::Game,
        format!("Player {player_id} attempted an invalid move. Reason: {reason} Please resubmit a valid move."),
    )
}

/// Pending observations per player.
#[derive(Debug, Default)]
pub struct Outbox {
    queues: BTreeMap<PlayerId, Vec<Fragment>>,
}

impl Outbox {
    pub fn reset(&mut self, num_players: usize) {
        self.queues = (0..num_players).map(|id| (id, vec![])).collect();
    }

    pub fn send(&mut self, to: PlayerId, fragment: Fragment) {
        self.queues.entry(to).or_default().push(fragment);
    }

    pub fn broadcast(&mut self, fragment: Fragment) {
        for queue in self.queues.values_mut() {
            queue.push(fragment.clone());
        }
    }

    pub fn take(&mut self, player_id: PlayerId) -> Observation {
        match self.queues.get_mut(&player_id) {
            Some(queue) if !queue.is_empty() => Observation::Fragments(std::mem::take(queue)),
            _ => Observation::Nothing,
        }
    }
}

/// Single-player stepwise puzzle: reply `[advance]` until `goal` is reached.
#[derive(Debug)]
pub struct StepPuzzle {
    pub goal: usize,
    pub max_turns: usize,
    pub max_invalid: usize,
    progress: usize,
    turns: usize,
    invalid: usize,
    last_invalid: bool,
    reward: Option<f64>,
    outbox: Outbox,
}

impl StepPuzzle {
    pub fn new(goal: usize, max_turns: usize, max_invalid: usize) -> Self {
        Self {
            goal,
            max_turns,
            max_invalid,
            progress: 0,
            turns: 0,
            invalid: 0,
            last_invalid: false,
            reward: None,
            outbox: Outbox::default(),
        }
    }
}

impl Attributes for StepPuzzle {
    fn get_attribute(&self, name: &str) -> Option<AttrValue> {
        match name {
            "goal" => Some(AttrValue::Int(self.goal as i64)),
            _ => None,
        }
    }
}

impl Environment for StepPuzzle {
    fn reset(&mut self, num_players: usize, _seed: u64) -> anyhow::Result<()> {
        anyhow::ensure!(num_players == 1, "single-player puzzle");
        self.outbox.reset(1);
        self.progress = 0;
        self.turns = 0;
        self.invalid = 0;
        self.reward = None;
        self.outbox.send(
            0,
            Fragment::prompt(format!("Reach step {}. Reply with [advance].", self.goal)),
        );
        Ok(())
    }

    fn observation(&mut self, player_id: PlayerId) -> Observation {
        self.outbox.take(player_id)
    }

    fn step(&mut self, action: Option<&str>) -> anyhow::Result<StepOutcome> {
        self.turns += 1;
        self.last_invalid = action.map(str::trim) != Some("[advance]");
        if self.last_invalid {
            self.invalid += 1;
            self.outbox.send(0, invalid_move(0, "unknown command."));
        } else {
            self.progress += 1;
            self.outbox.send(
                0,
                Fragment::new(Sender::Game, format!("Advanced to step {}", self.progress)),
            );
        }

        self.reward = if self.progress == self.goal {
            Some(1.0)
        } else if self.invalid >= self.max_invalid {
            Some(-1.0)
        } else if self.turns >= self.max_turns {
            Some(self.progress as f64 / self.goal as f64)
        } else {
            None
        };
        Ok(StepOutcome {
            done: self.reward.is_some(),
            info: None,
        })
    }

    fn current_player_id(&self) -> PlayerId {
        0
    }

    fn close(&mut self) -> RawRewards {
        let mut rewards = RawRewards::default();
        rewards.numeric.insert(0, self.reward.unwrap_or(0.0));
        rewards.other.insert(
            0,
            RewardInfo {
                invalid_move: self.last_invalid,
                reason: "puzzle over".into(),
                turn_count: self.turns,
            },
        );
        rewards
    }
}

/// Two players take turns counting up. Whoever says `target` wins.
#[derive(Debug)]
pub struct CountingDuel {
    pub target: u32,
    pub end_on_invalid: bool,
    pub forget_player: Option<PlayerId>,
    count: u32,
    current: PlayerId,
    loser: Option<PlayerId>,
    winner: Option<PlayerId>,
    last_invalid: Option<PlayerId>,
    turns: usize,
    outbox: Outbox,
}

impl CountingDuel {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            end_on_invalid: false,
            forget_player: None,
            count: 0,
            current: 0,
            loser: None,
            winner: None,
            last_invalid: None,
            turns: 0,
            outbox: Outbox::default(),
        }
    }

    pub fn ending_on_invalid(mut self) -> Self {
        self.end_on_invalid = true;
        self
    }
}

impl Attributes for CountingDuel {}

impl Environment for CountingDuel {
    fn reset(&mut self, num_players: usize, _seed: u64) -> anyhow::Result<()> {
        anyhow::ensure!(num_players == 2, "two-player game");
        self.outbox.reset(2);
        self.count = 0;
        self.current = 0;
        self.outbox.broadcast(Fragment::prompt(format!(
            "Count up to {} in turns. Whoever says {} wins.",
            self.target, self.target
        )));
        Ok(())
    }

    fn observation(&mut self, player_id: PlayerId) -> Observation {
        self.outbox.take(player_id)
    }

    fn step(&mut self, action: Option<&str>) -> anyhow::Result<StepOutcome> {
        self.turns += 1;
        let actor = self.current;
        let other = 1 - actor;
        let said = action.and_then(|a| a.trim().parse::<u32>().ok());

        if said != Some(self.count + 1) {
            self.last_invalid = Some(actor);
            self.outbox.broadcast(invalid_move(actor, "wrong number."));
            if self.end_on_invalid {
                self.loser = Some(actor);
                self.winner = Some(other);
                return Ok(StepOutcome::finished());
            }
            return Ok(StepOutcome::running());
        }

        self.last_invalid = None;
        self.count += 1;
        let text = self.count.to_string();
        self.outbox.send(actor, Fragment::new(Sender::Player(actor), text.clone()));
        self.outbox.send(
            other,
            Fragment::new(Sender::Player(actor), text).with_kind(arena_master::environment::FragmentKind::Action),
        );
        if self.count == self.target {
            self.winner = Some(actor);
            self.loser = Some(other);
            return Ok(StepOutcome {
                done: true,
                info: Some(serde_json::json!({"reason": "target reached"})),
            });
        }
        self.current = other;
        Ok(StepOutcome::running())
    }

    fn current_player_id(&self) -> PlayerId {
        self.current
    }

    fn close(&mut self) -> RawRewards {
        let mut rewards = RawRewards::default();
        for id in 0..2 {
            if Some(id) == self.forget_player {
                continue;
            }
            let reward = if Some(id) == self.winner { 1.0 } else { -1.0 };
            rewards.numeric.insert(id, reward);
            rewards.other.insert(
                id,
                RewardInfo {
                    invalid_move: self.last_invalid == Some(id),
                    reason: "duel over".into(),
                    turn_count: self.turns,
                },
            );
        }
        rewards
    }
}

/// N players bid in turns. A reply not starting with `[bid` is invalid and the same player is
/// asked again.
#[derive(Debug)]
pub struct BiddingTable {
    pub rounds: usize,
    num_players: usize,
    current: PlayerId,
    valid_turns: usize,
    bids: BTreeMap<PlayerId, usize>,
    offenders: BTreeSet<PlayerId>,
    outbox: Outbox,
}

impl BiddingTable {
    pub fn new(rounds: usize) -> Self {
        Self {
            rounds,
            num_players: 0,
            current: 0,
            valid_turns: 0,
            bids: BTreeMap::new(),
            offenders: BTreeSet::new(),
            outbox: Outbox::default(),
        }
    }
}

impl Attributes for BiddingTable {}

impl Environment for BiddingTable {
    fn reset(&mut self, num_players: usize, _seed: u64) -> anyhow::Result<()> {
        self.num_players = num_players;
        self.outbox.reset(num_players);
        self.outbox
            .broadcast(Fragment::prompt("Place your bids with [bid <amount>]."));
        Ok(())
    }

    fn observation(&mut self, player_id: PlayerId) -> Observation {
        self.outbox.take(player_id)
    }

    fn step(&mut self, action: Option<&str>) -> anyhow::Result<StepOutcome> {
        let actor = self.current;
        match action {
            Some(bid) if bid.starts_with("[bid") => {
                *self.bids.entry(actor).or_default() += 1;
                for id in (0..self.num_players).filter(|id| *id != actor) {
                    self.outbox.send(id, Fragment::new(Sender::Player(actor), bid));
                }
                self.valid_turns += 1;
                self.current = (self.current + 1) % self.num_players;
            }
            _ => {
                self.offenders.insert(actor);
                self.outbox.send(actor, invalid_move(actor, "not a bid."));
            }
        }
        Ok(StepOutcome {
            done: self.valid_turns == self.rounds * self.num_players,
            info: None,
        })
    }

    fn current_player_id(&self) -> PlayerId {
        self.current
    }

    fn close(&mut self) -> RawRewards {
        let mut rewards = RawRewards::default();
        for id in 0..self.num_players {
            let reward = if self.offenders.contains(&id) { 0.0 } else { 1.0 };
            rewards.numeric.insert(id, reward);
            rewards.other.insert(id, RewardInfo::default());
        }
        rewards
    }
}

/// Two players chain words: each word starts with the last letter of the previous one.
#[derive(Debug)]
pub struct WordChain {
    pub word_list: Vec<String>,
    pub max_turns: usize,
    fixed_start: Option<String>,
    current_word: String,
    used: BTreeSet<String>,
    current: PlayerId,
    turns: usize,
    loser: Option<PlayerId>,
    outbox: Outbox,
}

impl WordChain {
    pub fn new(words: &[&str], max_turns: usize) -> Self {
        Self {
            word_list: words.iter().map(|w| w.to_string()).collect(),
            max_turns,
            fixed_start: None,
            current_word: String::new(),
            used: BTreeSet::new(),
            current: 0,
            turns: 0,
            loser: None,
            outbox: Outbox::default(),
        }
    }

    pub fn starting_with(mut self, word: &str) -> Self {
        self.fixed_start = Some(word.to_owned());
        self
    }

    pub fn current_word(&self) -> &str {
        &self.current_word
    }

    fn is_valid(&self, word: &str) -> bool {
        let Some(last) = self.current_word.chars().last() else {
            return false;
        };
        word.starts_with(last) && self.word_list.iter().any(|w| w == word) && !self.used.contains(word)
    }
}

impl Attributes for WordChain {
    fn get_attribute(&self, name: &str) -> Option<AttrValue> {
        match name {
            "word_list" => Some(self.word_list.clone().into()),
            "max_turns" => Some(AttrValue::Int(self.max_turns as i64)),
            _ => None,
        }
    }

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> anyhow::Result<()> {
        match name {
            "word_list" => self.word_list = value.try_into()?,
            _ => anyhow::bail!("'{name}' cannot be overridden"),
        }
        Ok(())
    }
}

impl Environment for WordChain {
    fn reset(&mut self, num_players: usize, seed: u64) -> anyhow::Result<()> {
        anyhow::ensure!(num_players == 2, "two-player game");
        anyhow::ensure!(!self.word_list.is_empty(), "empty word list");
        let mut rng = StdRng::seed_from_u64(seed);
        self.current_word = match &self.fixed_start {
            Some(word) => word.clone(),
            None => self.word_list[rng.gen_range(0..self.word_list.len())].clone(),
        };
        self.used = BTreeSet::from([self.current_word.clone()]);
        self.current = 0;
        self.turns = 0;
        self.outbox.reset(2);
        self.outbox.broadcast(Fragment::prompt(format!(
            "Starting word: {}",
            self.current_word
        )));
        Ok(())
    }

    fn observation(&mut self, player_id: PlayerId) -> Observation {
        self.outbox.take(player_id)
    }

    fn step(&mut self, action: Option<&str>) -> anyhow::Result<StepOutcome> {
        self.turns += 1;
        let actor = self.current;
        let word = action.unwrap_or_default().trim().to_lowercase();
        if !self.is_valid(&word) {
            self.loser = Some(actor);
            self.outbox.broadcast(invalid_move(actor, "word does not chain."));
            return Ok(StepOutcome::finished());
        }
        self.used.insert(word.clone());
        self.current_word = word;
        self.outbox.send(
            1 - actor,
            Fragment::new(Sender::Player(actor), self.current_word.clone()),
        );
        self.current = 1 - actor;
        Ok(StepOutcome {
            done: self.turns >= self.max_turns,
            info: None,
        })
    }

    fn current_player_id(&self) -> PlayerId {
        self.current
    }

    fn close(&mut self) -> RawRewards {
        let mut rewards = RawRewards::default();
        for id in 0..2 {
            rewards
                .numeric
                .insert(id, if Some(id) == self.loser { -1.0 } else { 0.0 });
        }
        rewards
    }

    fn tracked_token(&self) -> Option<String> {
        Some(self.current_word.clone())
    }
}

/// Environment whose step always fails.
#[derive(Debug, Default)]
pub struct Broken;

impl Attributes for Broken {}

impl Environment for Broken {
    fn reset(&mut self, _num_players: usize, _seed: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn observation(&mut self, _player_id: PlayerId) -> Observation {
        Observation::Text("ready".into())
    }

    fn step(&mut self, _action: Option<&str>) -> anyhow::Result<StepOutcome> {
        anyhow::bail!("simulation crashed")
    }

    fn current_player_id(&self) -> PlayerId {
        0
    }

    fn close(&mut self) -> RawRewards {
        RawRewards::default()
    }
}

/// Replies from a script, remembering every context it was given.
#[derive(Debug)]
pub struct Scripted {
    replies: VecDeque<String>,
    delay: Option<Duration>,
    pub seen: Vec<Context>,
}

impl Scripted {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            delay: None,
            seen: vec![],
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            replies: VecDeque::from(vec!["[advance]".to_owned(); 16]),
            delay: Some(delay),
            seen: vec![],
        }
    }

    pub fn transcript(&self) -> String {
        self.seen
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Agent for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn generate(&mut self, context: &Context, _deadline: Option<Instant>) -> anyhow::Result<String> {
        self.seen.push(context.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.replies.pop_front().context("script exhausted")
    }
}
