//! Observation history for the policy
//!
//! The policy sees the last `depth` observations side by side, oldest
//! first. At episode start the history is zero-filled so the stacked vector
//! always has length `depth * obs_dim`.

use std::collections::VecDeque;

use anyhow::{ensure, Result};

/// Default number of stacked observations
pub const DEFAULT_STACK_DEPTH: usize = 30;

/// Fixed-depth stack of observations
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: VecDeque<Vec<f32>>,
    depth: usize,
    obs_dim: usize,
}

impl FrameStack {
    /// Create a zero-filled stack
    ///
    /// # Arguments
    /// * `depth` - Number of observations kept
    /// * `obs_dim` - Length of one observation
    pub fn new(depth: usize, obs_dim: usize) -> Self {
        let depth = depth.max(1);
        let frames = (0..depth).map(|_| vec![0.0; obs_dim]).collect();
        Self {
            frames,
            depth,
            obs_dim,
        }
    }

    /// Zero the history and push the first observation of an episode
    pub fn reset(&mut self, observation: &[f32]) -> Result<Vec<f32>> {
        for frame in &mut self.frames {
            frame.iter_mut().for_each(|v| *v = 0.0);
        }
        self.push(observation)
    }

    /// Push an observation, dropping the oldest, and return the stacked vector
    pub fn push(&mut self, observation: &[f32]) -> Result<Vec<f32>> {
        ensure!(
            observation.len() == self.obs_dim,
            "observation has {} values, stack expects {}",
            observation.len(),
            self.obs_dim
        );
        // Reuse the oldest buffer
        if let Some(mut oldest) = self.frames.pop_front() {
            oldest.copy_from_slice(observation);
            self.frames.push_back(oldest);
        }
        Ok(self.stacked())
    }

    /// Stacked observations, oldest first
    pub fn stacked(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.depth * self.obs_dim);
        for frame in &self.frames {
            out.extend_from_slice(frame);
        }
        out
    }

    /// Number of stacked observations
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Length of the stacked vector
    pub fn stacked_dim(&self) -> usize {
        self.depth * self.obs_dim
    }
}
