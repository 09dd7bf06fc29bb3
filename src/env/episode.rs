//! Episode engine: the per-episode state machine
//!
//! [`EpisodeEngine`] owns the mutable state of one search episode and turns
//! `(action, detector output, pose)` into `(observation, reward, done)`.
//! It performs no I/O: images, detection and navigation happen in the
//! surrounding environment loop, which hands the engine immutable snapshots.
//!
//! # Lifecycle
//!
//! ```text
//! reset ──► Initialized ──step──► Active ──step (done)──► Terminated
//!                 │                  ▲  │
//!                 └──────step────────┘  └─step─┐ (not done)
//!                                       ▲──────┘
//! ```
//!
//! A terminated episode accepts no further steps; a new `reset` starts the
//! next one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    action::Action,
    config::EngineConfig,
    detector::DetectorOutput,
    features::FeatureAssembler,
    reward::{clamp_reward, EpisodeCounters, RewardDecision, RewardPolicy},
    types::{Pose, Stop},
    viewpoint::ViewpointSet,
};
use crate::error::EngineError;

/// Lifecycle phase of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodePhase {
    /// Reset done, no step taken yet
    Initialized,
    /// At least one step taken, episode still running
    Active,
    /// A step returned done
    Terminated,
}

/// Frame that earned the best reward so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestFrame {
    /// Reward of that step
    pub reward: f64,
    /// Step index (1-based)
    pub step: usize,
    /// Camera pose of the frame
    pub pose: Pose,
}

/// Mutable aggregate of one episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeState {
    /// Target of the search
    pub stop: Stop,
    /// Pose at reset; zero point of every observation delta
    pub anchor: Pose,
    /// Lifecycle phase
    pub phase: EpisodePhase,
    /// Step, press, zoom and found counters
    pub counters: EpisodeCounters,
    /// Best reward seen and the frame it came from
    pub best: Option<BestFrame>,
    /// Sum of all rewards so far
    pub cumulative_reward: f64,
    /// Best confidence per detector label over the episode
    pub label_scores: BTreeMap<String, f64>,
    /// Viewpoints at which the target was confirmed
    pub viewpoints: ViewpointSet,
    /// Actions in the order they were taken
    pub actions: Vec<Action>,
    /// Navigation fetches that returned no imagery
    pub retries: usize,
}

impl EpisodeState {
    fn new(stop: Stop, anchor: Pose) -> Self {
        Self {
            stop,
            anchor,
            phase: EpisodePhase::Initialized,
            counters: EpisodeCounters::default(),
            best: None,
            cumulative_reward: 0.0,
            label_scores: BTreeMap::new(),
            viewpoints: ViewpointSet::new(),
            actions: Vec::new(),
            retries: 0,
        }
    }

    /// Best reward seen so far
    pub fn best_reward(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.reward)
    }

    /// Summary handed to the completion log
    pub fn completion_record(&self) -> CompletionRecord {
        CompletionRecord {
            place_name: self.stop.name.clone(),
            latitude: self.stop.latitude,
            longitude: self.stop.longitude,
            is_known_positive: self.stop.is_known_positive,
            amenity_scores: self.label_scores.clone(),
            total_reward: self.cumulative_reward,
            steps_taken: self.counters.steps,
            viewpoints: self.viewpoints.count(),
            best_reward: self.best_reward(),
        }
    }

    fn merge_labels(&mut self, labels: &BTreeMap<String, f64>) {
        for (label, &score) in labels {
            let best = self.label_scores.entry(label.clone()).or_insert(score);
            if score > *best {
                *best = score;
            }
        }
    }
}

/// Completed-episode summary for the logging collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Stop display name
    pub place_name: String,
    /// Stop latitude
    pub latitude: f64,
    /// Stop longitude
    pub longitude: f64,
    /// Whether the stop was a known positive
    #[serde(default)]
    pub is_known_positive: bool,
    /// Best confidence per detector label
    pub amenity_scores: BTreeMap<String, f64>,
    /// Sum of rewards over the episode
    pub total_reward: f64,
    /// Steps taken
    pub steps_taken: usize,
    /// Distinct confirmed viewpoints
    #[serde(default)]
    pub viewpoints: usize,
    /// Best single-step reward
    #[serde(default)]
    pub best_reward: Option<f64>,
}

/// Result of one engine step
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation after the step
    pub observation: Vec<f32>,
    /// Reward in [-1, 1]
    pub reward: f64,
    /// Whether the episode ended
    pub done: bool,
    /// Rule that produced the reward
    pub decision: RewardDecision,
    /// Whether this frame added a new viewpoint
    pub new_viewpoint: bool,
    /// Completion summary, present exactly when `done`
    pub completion: Option<CompletionRecord>,
}

/// What the navigation layer delivered for a step
#[derive(Debug, Clone, Copy)]
pub enum Capture<'a> {
    /// A new frame was captured and run through the detector
    Frame {
        /// Detector output for the frame
        detection: &'a DetectorOutput,
        /// Pose of the frame
        pose: &'a Pose,
    },
    /// No imagery exists where the action would have moved the camera
    NoImagery,
}

/// Result of submitting a capture to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The episode advanced by one step
    Advanced(Transition),
    /// Nothing changed; the caller should pick another action or retry
    Retry {
        /// Retries seen so far in this episode
        retries: usize,
    },
}

/// Per-episode state machine
///
/// # Example
///
/// ```rust
/// use stopfinder_rl::env::{
///     action::Action, config::EngineConfig, detector::DetectorOutput,
///     episode::EpisodeEngine, types::{Pose, Stop},
/// };
///
/// let config = EngineConfig::new().embedding_dim(4);
/// let mut engine = EpisodeEngine::new(config).unwrap();
///
/// let stop = Stop::new(10.0, 20.0, "Main St & 1st Ave", true);
/// let pose = Pose::new(10.0, 20.0, 0.0);
/// let blank = DetectorOutput::empty(4);
///
/// let obs = engine.reset(stop, &pose, &blank).unwrap();
/// assert_eq!(obs.len(), engine.config().frame_dim());
///
/// let t = engine.step(Action::Forward, &blank, &pose).unwrap();
/// assert!(!t.done);
/// ```
#[derive(Debug, Clone)]
pub struct EpisodeEngine {
    config: EngineConfig,
    state: Option<EpisodeState>,
}

impl EpisodeEngine {
    /// Create an engine; the configuration is validated here
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current episode state, if an episode was started
    pub fn state(&self) -> Option<&EpisodeState> {
        self.state.as_ref()
    }

    /// Current lifecycle phase, if an episode was started
    pub fn phase(&self) -> Option<EpisodePhase> {
        self.state.as_ref().map(|s| s.phase)
    }

    /// Start a new episode anchored at `pose`
    ///
    /// All counters are cleared. The initial frame goes through viewpoint
    /// detection like any other, so a stop visible from the start registers
    /// its first viewpoint, but the found flag is only ever set by a step.
    pub fn reset(
        &mut self,
        stop: Stop,
        pose: &Pose,
        detection: &DetectorOutput,
    ) -> Result<Vec<f32>, EngineError> {
        detection.validate(&self.config)?;

        let mut state = EpisodeState::new(stop, pose.clone());
        let assembler = FeatureAssembler::new(&self.config);

        let confirmed = assembler.primary_in_kept(detection);
        state.viewpoints.observe(pose.lat, pose.lon, pose.heading, confirmed);
        let observation = assembler.assemble(
            detection,
            &state.anchor,
            pose,
            &state.counters,
            state.viewpoints.count(),
        );

        tracing::debug!(
            "Episode reset at stop '{}' ({}), anchor heading {:.1}",
            state.stop.name,
            state.stop.coords(),
            pose.heading
        );
        self.state = Some(state);
        Ok(observation)
    }

    /// Advance the episode by one action
    ///
    /// The detector output is validated before any state changes, so a
    /// rejected frame leaves the episode exactly as it was.
    pub fn step(
        &mut self,
        action: Action,
        detection: &DetectorOutput,
        pose: &Pose,
    ) -> Result<Transition, EngineError> {
        let config = &self.config;
        let state = self.state.as_mut().ok_or(EngineError::NotReset)?;
        if state.phase == EpisodePhase::Terminated {
            return Err(EngineError::EpisodeTerminated);
        }
        detection.validate(config)?;

        let counters = &mut state.counters;
        counters.steps += 1;
        if action == Action::ResetToStart {
            counters.space_presses += 1;
        }
        if action == Action::ZoomIn {
            counters.zoom_amt += 1;
        } else if action.resets_zoom() {
            counters.zoom_amt = 0;
        }

        let assembler = FeatureAssembler::new(config);
        let confirmed = assembler.primary_in_kept(detection);
        let new_viewpoint = state.viewpoints.observe(pose.lat, pose.lon, pose.heading, confirmed);
        let observation = assembler.assemble(
            detection,
            &state.anchor,
            pose,
            &state.counters,
            state.viewpoints.count(),
        );

        let policy = RewardPolicy::new(config);
        let decision = if action == Action::Finish {
            policy.decide_finish(detection.found, state.viewpoints.count(), &state.counters)
        } else {
            policy.score(
                detection.confidence,
                action,
                detection.found,
                detection.biggest_primary_area,
                &state.counters,
            )
        };
        let reward = clamp_reward(decision.reward);
        let done = decision.done;

        let counters = &mut state.counters;
        if detection.found && !counters.found {
            counters.found = true;
            counters.steps_since_found = 1;
        } else if counters.found {
            counters.steps_since_found += 1;
        }

        state.merge_labels(&detection.labels);
        state.actions.push(action);

        if state.best.as_ref().map_or(true, |b| reward > b.reward) {
            state.best = Some(BestFrame {
                reward,
                step: state.counters.steps,
                pose: pose.clone(),
            });
        }
        state.cumulative_reward += reward;

        tracing::debug!(
            "[Step {}] Action: {:?} | Reward: {:.3} | Viewpoints: {} | Since Found: {} | Stop: {}",
            state.counters.steps,
            action,
            reward,
            state.viewpoints.count(),
            state.counters.steps_since_found,
            state.stop.name
        );

        let completion = if done {
            state.phase = EpisodePhase::Terminated;
            let record = state.completion_record();
            tracing::info!(
                "Episode finished at '{}' after {} steps ({:?}): total reward {:.3}, {} viewpoints",
                record.place_name,
                record.steps_taken,
                decision.kind,
                record.total_reward,
                record.viewpoints
            );
            Some(record)
        } else {
            state.phase = EpisodePhase::Active;
            None
        };

        Ok(Transition {
            observation,
            reward,
            done,
            decision,
            new_viewpoint,
            completion,
        })
    }

    /// Advance the episode with whatever the navigation layer delivered
    ///
    /// [`Capture::NoImagery`] does not count as a step: counters, rewards and
    /// the phase stay untouched and only the retry tally grows.
    pub fn submit(
        &mut self,
        action: Action,
        capture: Capture<'_>,
    ) -> Result<StepOutcome, EngineError> {
        match capture {
            Capture::Frame { detection, pose } => {
                self.step(action, detection, pose).map(StepOutcome::Advanced)
            }
            Capture::NoImagery => {
                let state = self.state.as_mut().ok_or(EngineError::NotReset)?;
                if state.phase == EpisodePhase::Terminated {
                    return Err(EngineError::EpisodeTerminated);
                }
                state.retries += 1;
                tracing::warn!(
                    "No imagery for {:?} at stop '{}' (retry {})",
                    action,
                    state.stop.name,
                    state.retries
                );
                Ok(StepOutcome::Retry {
                    retries: state.retries,
                })
            }
        }
    }
}
