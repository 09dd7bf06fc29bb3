//! Environment traits and implementations
//!
//! This module defines the core environment interface and the stop-search
//! environment built on it. The pure pieces (geometry, viewpoints, features,
//! rewards and the [`episode::EpisodeEngine`] state machine) do no I/O;
//! [`streetview::StreetViewEnv`] wires them to the navigation and detection
//! collaborators.

use anyhow::Result;

use self::reward::DecisionKind;

/// Core trait for RL environments
pub trait Environment {
    /// Observation type
    type Observation;

    /// Action type
    type Action;

    /// Reset the environment and return initial observation
    fn reset(&mut self) -> Result<Self::Observation>;

    /// Step the environment with an action
    fn step(&mut self, action: Self::Action) -> Result<StepResult<Self::Observation>>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult<O> {
    /// Next observation
    pub observation: O,

    /// Reward received
    pub reward: f32,

    /// Whether the episode terminated
    pub terminated: bool,

    /// Whether the episode was truncated
    pub truncated: bool,

    /// Additional info
    pub info: StepInfo,
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Continuous,
}

/// Additional step information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Steps taken in the episode
    pub step: usize,

    /// Steps since the stop was first confirmed
    pub steps_since_found: usize,

    /// Distinct confirmed viewpoints
    pub viewpoints: usize,

    /// Whether this step added a viewpoint
    pub new_viewpoint: bool,

    /// Rule that produced the reward; `None` on a retry
    pub decision: Option<DecisionKind>,

    /// The action found no imagery and nothing advanced
    pub retry: bool,
}

pub mod action;
pub mod config;
pub mod detector;
pub mod episode;
pub mod features;
pub mod geo;
pub mod navigation;
pub mod pool;
pub mod reward;
pub mod sim;
pub mod streetview;
pub mod types;
pub mod viewpoint;
