//! Vectorized environment pool for parallel execution
//!
//! Runs N independent environments on Rayon's thread pool. Each environment
//! owns its own episode engine and collaborators, so nothing is shared
//! between slots. A failure in one slot is reported in that slot and leaves
//! the others untouched.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use stopfinder_rl::{
//!     env::{
//!         config::EngineConfig,
//!         pool::EnvPool,
//!         sim::{SimConfig, SimNavigator, SyntheticDetector},
//!         streetview::StreetViewEnv,
//!         types::Stop,
//!     },
//!     stops::StopLoader,
//!     telemetry::NullSink,
//! };
//!
//! let config = EngineConfig::new().embedding_dim(8);
//! let make_env = || {
//!     let stops = (0..3)
//!         .map(|i| Stop::new(33.77, -84.39 + 0.01 * i as f64, format!("Stop {}", i), true));
//!     StreetViewEnv::new(
//!         config.clone(),
//!         SimNavigator::new(SimConfig::default()),
//!         SyntheticDetector::new(config.clone()),
//!         StopLoader::from_stops(stops.collect()),
//!         Arc::new(NullSink),
//!     )
//!     .unwrap()
//! };
//!
//! // Create pool with 4 parallel environments
//! let mut pool = EnvPool::new(make_env, 4);
//!
//! // Reset all environments in parallel
//! let observations = pool.reset();
//! assert!(observations.iter().all(|o| o.is_ok()));
//!
//! // Step all environments in parallel, one action per environment
//! let results = pool.step(&[0, 1, 2, 3]);
//! assert_eq!(results.len(), 4);
//! ```

use anyhow::Result;
use rayon::prelude::*;

use crate::env::{Environment, SpaceInfo, StepResult};

/// A pool of environments for parallel execution
///
/// For N environments with average step time T, a sequential loop takes
/// O(N * T) while the pool takes roughly O(T) when N ≤ num_cores. Stepping
/// is dominated by detector inference and imagery fetches, so the gain is
/// close to linear.
pub struct EnvPool<E> {
    /// Vector of environment instances
    envs: Vec<E>,
}

impl<E> EnvPool<E>
where
    E: Environment<Observation = Vec<f32>, Action = i64> + Send,
{
    /// Create a new environment pool
    ///
    /// # Arguments
    ///
    /// * `env_fn` - Factory function to create environment instances
    /// * `num_envs` - Number of parallel environments
    pub fn new<F>(env_fn: F, num_envs: usize) -> Self
    where
        F: Fn() -> E,
    {
        let envs = (0..num_envs).map(|_| env_fn()).collect();
        Self { envs }
    }

    /// Create a pool from already built environments
    pub fn from_envs(envs: Vec<E>) -> Self {
        Self { envs }
    }

    /// Reset all environments in parallel
    ///
    /// Returns one initial observation (or error) per environment.
    pub fn reset(&mut self) -> Vec<Result<Vec<f32>>> {
        self.envs.par_iter_mut().map(|env| env.reset()).collect()
    }

    /// Step all environments in parallel with given actions
    ///
    /// # Panics
    ///
    /// Panics if the number of actions doesn't match the number of
    /// environments.
    pub fn step(&mut self, actions: &[i64]) -> Vec<Result<StepResult<Vec<f32>>>> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "Number of actions must match number of environments"
        );

        self.envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(env, &action)| env.step(action))
            .collect()
    }

    /// Get the number of environments in the pool
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Get observation space information from first environment
    pub fn observation_space(&self) -> Option<SpaceInfo> {
        self.envs.first().map(|env| env.observation_space())
    }

    /// Get action space information from first environment
    pub fn action_space(&self) -> Option<SpaceInfo> {
        self.envs.first().map(|env| env.action_space())
    }

    /// Reset a specific environment by index
    pub fn reset_env(&mut self, env_id: usize) -> Result<Vec<f32>> {
        let env = self
            .envs
            .get_mut(env_id)
            .ok_or_else(|| anyhow::anyhow!("no environment at index {}", env_id))?;
        env.reset()
    }

    /// Access one environment
    pub fn env(&self, env_id: usize) -> Option<&E> {
        self.envs.get(env_id)
    }
}

/// Result of stepping an environment pool
///
/// Contains observations, rewards, and done flags for all environments that
/// stepped successfully, plus the failures by slot.
#[derive(Debug, Default)]
pub struct PoolStepResult<O> {
    /// Observations for each environment
    pub observations: Vec<O>,

    /// Rewards for each environment
    pub rewards: Vec<f32>,

    /// Termination flags for each environment
    pub terminated: Vec<bool>,

    /// Truncation flags for each environment
    pub truncated: Vec<bool>,

    /// Slot index and error of every environment that failed
    pub errors: Vec<(usize, anyhow::Error)>,
}

impl<E> EnvPool<E>
where
    E: Environment<Observation = Vec<f32>, Action = i64> + Send,
{
    /// Step all environments and return structured result
    ///
    /// Failed slots get an empty observation, zero reward and
    /// `terminated = true` so the caller resets them.
    pub fn step_structured(&mut self, actions: &[i64]) -> PoolStepResult<Vec<f32>> {
        let results = self.step(actions);
        let n = results.len();

        let mut out = PoolStepResult {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            errors: Vec::new(),
        };

        for (slot, result) in results.into_iter().enumerate() {
            match result {
                Ok(result) => {
                    out.observations.push(result.observation);
                    out.rewards.push(result.reward);
                    out.terminated.push(result.terminated);
                    out.truncated.push(result.truncated);
                }
                Err(e) => {
                    tracing::warn!("Environment {} failed to step: {:#}", slot, e);
                    out.observations.push(Vec::new());
                    out.rewards.push(0.0);
                    out.terminated.push(true);
                    out.truncated.push(false);
                    out.errors.push((slot, e));
                }
            }
        }
        out
    }
}
