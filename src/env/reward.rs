//! Reward shaping and termination decisions
//!
//! Two paths exist. Every ordinary action goes through
//! [`RewardPolicy::score`], which never ends the episode except through the
//! two hard step limits. The finish action goes through
//! [`RewardPolicy::decide_finish`], which either accepts (episode ends) or
//! rejects (episode continues) the agent's request to move on.
//!
//! Both paths read the counters as they stand when the step is scored: the
//! step counter and press counter already include the current step, while
//! the found flag and `steps_since_found` still describe earlier steps.

use serde::{Deserialize, Serialize};

use super::{action::Action, config::EngineConfig};

/// Lower bound of every reward
pub const REWARD_MIN: f64 = -1.0;

/// Upper bound of every reward
pub const REWARD_MAX: f64 = 1.0;

/// Per-episode counters read by the reward policy and the observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCounters {
    /// Steps taken in this episode
    pub steps: usize,
    /// Steps since the target was first confirmed (0 until then)
    pub steps_since_found: usize,
    /// Return-to-start presses
    pub space_presses: usize,
    /// Consecutive zoom-in actions since the camera last moved
    pub zoom_amt: usize,
    /// Whether the target was confirmed on an earlier step
    pub found: bool,
}

/// Why a reward was assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Ordinary step scored from detector evidence
    Scored,
    /// Episode hit the hard step limit
    MaxSteps,
    /// Episode hit the step limit after first confirmation
    MaxStepsAfterFound,
    /// Finish refused: nothing found and `min_steps` not yet reached
    PrematureFinish,
    /// Finish refused: found, but from too few viewpoints
    UnderevidencedRejected,
    /// Finish accepted with a penalty: too few viewpoints, free steps used up
    UnderevidencedAccepted,
    /// Finish accepted
    Finished,
}

impl DecisionKind {
    /// Whether the decision came from the finish action
    pub fn is_finish(self) -> bool {
        matches!(
            self,
            DecisionKind::PrematureFinish
                | DecisionKind::UnderevidencedRejected
                | DecisionKind::UnderevidencedAccepted
                | DecisionKind::Finished
        )
    }
}

/// Reward and continue/stop outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardDecision {
    /// Scalar reward in [-1, 1]
    pub reward: f64,
    /// Whether the episode ends
    pub done: bool,
    /// Which rule produced the reward
    pub kind: DecisionKind,
}

impl RewardDecision {
    fn new(reward: f64, done: bool, kind: DecisionKind) -> Self {
        Self {
            reward: clamp_reward(reward),
            done,
            kind,
        }
    }
}

/// Clamp a reward into [-1, 1]
pub fn clamp_reward(reward: f64) -> f64 {
    reward.clamp(REWARD_MIN, REWARD_MAX)
}

/// Pure scoring function over the engine configuration
#[derive(Debug, Clone, Copy)]
pub struct RewardPolicy<'a> {
    config: &'a EngineConfig,
}

impl<'a> RewardPolicy<'a> {
    /// Create a policy for a configuration
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Decide on an explicit finish request
    ///
    /// * Nothing found, now or before, and `steps <= min_steps`: rejected
    ///   with `premature_end`.
    /// * Found but fewer than `min_finish_viewpoints` viewpoints: accepted
    ///   with a penalty once the free steps after found are used up,
    ///   rejected with a larger penalty before that.
    /// * Otherwise accepted with `move_on_reward`, plus `efficiency_bonus`
    ///   when the target was found on an earlier step and the agent moves on
    ///   within the free steps.
    pub fn decide_finish(
        &self,
        found: bool,
        viewpoint_count: usize,
        counters: &EpisodeCounters,
    ) -> RewardDecision {
        let config = self.config;

        if !found && !counters.found {
            if counters.steps <= config.min_steps {
                return RewardDecision::new(
                    config.premature_end,
                    false,
                    DecisionKind::PrematureFinish,
                );
            }
        } else if viewpoint_count < config.min_finish_viewpoints {
            return if counters.steps_since_found > config.free_steps_after_found {
                RewardDecision::new(
                    config.underevidenced_finish_penalty,
                    true,
                    DecisionKind::UnderevidencedAccepted,
                )
            } else {
                RewardDecision::new(
                    config.underevidenced_reject_penalty,
                    false,
                    DecisionKind::UnderevidencedRejected,
                )
            };
        }

        let mut reward = config.move_on_reward;
        if counters.found && counters.steps_since_found <= config.free_steps_after_found {
            reward += config.efficiency_bonus;
        }
        RewardDecision::new(reward, true, DecisionKind::Finished)
    }

    /// Score an ordinary step
    ///
    /// The hard step limits are checked first and end the episode with
    /// `forced_end_penalty`. Otherwise the reward is the dampened confidence,
    /// minus a growing penalty for lingering after the target was found,
    /// minus a press-proportional penalty for excess return-to-start presses,
    /// plus a bonus for re-confirming an already found target, plus a capped
    /// bonus for a large primary box; clamped to [-1, 1].
    pub fn score(
        &self,
        confidence: f64,
        action: Action,
        found: bool,
        box_area: f64,
        counters: &EpisodeCounters,
    ) -> RewardDecision {
        let config = self.config;

        if counters.steps >= config.max_steps {
            return RewardDecision::new(config.forced_end_penalty, true, DecisionKind::MaxSteps);
        }
        if counters.steps_since_found >= config.max_steps_after_found {
            return RewardDecision::new(
                config.forced_end_penalty,
                true,
                DecisionKind::MaxStepsAfterFound,
            );
        }

        let mut reward = confidence * config.dampen_scalar;

        if counters.steps_since_found > config.free_steps_after_found {
            let overdue = (counters.steps_since_found - config.free_steps_after_found) as f64;
            reward -= overdue * config.after_found_punishment;
        }

        if action == Action::ResetToStart && counters.space_presses > config.free_spacebar_presses {
            reward -= config.spacebar_penalty * counters.space_presses as f64;
        }

        if found && counters.found {
            reward += config.consecutive_boost;
        }

        reward += (box_area * config.size_scalar).min(config.max_size_bonus);

        RewardDecision::new(reward, false, DecisionKind::Scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(steps: usize, since_found: usize, found: bool) -> EpisodeCounters {
        EpisodeCounters {
            steps,
            steps_since_found: since_found,
            found,
            ..Default::default()
        }
    }

    #[test]
    fn test_finish_premature_boundary() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let at_min = policy.decide_finish(false, 0, &counters(25, 0, false));
        assert_eq!(at_min.kind, DecisionKind::PrematureFinish);
        assert_eq!(at_min.reward, -0.7);
        assert!(!at_min.done);

        let past_min = policy.decide_finish(false, 0, &counters(26, 0, false));
        assert_eq!(past_min.kind, DecisionKind::Finished);
        assert_eq!(past_min.reward, 0.1, "no efficiency bonus without a find");
        assert!(past_min.done);
    }

    #[test]
    fn test_finish_underevidenced() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let early = policy.decide_finish(true, 1, &counters(10, 7, true));
        assert_eq!(early.kind, DecisionKind::UnderevidencedRejected);
        assert_eq!(early.reward, -0.4);
        assert!(!early.done);

        let late = policy.decide_finish(true, 1, &counters(10, 8, true));
        assert_eq!(late.kind, DecisionKind::UnderevidencedAccepted);
        assert_eq!(late.reward, -0.3);
        assert!(late.done);

        // Found only on this frame still needs viewpoints, even before min_steps
        let first_sight = policy.decide_finish(true, 1, &counters(3, 0, false));
        assert_eq!(first_sight.kind, DecisionKind::UnderevidencedRejected);
    }

    #[test]
    fn test_finish_with_evidence() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let quick = policy.decide_finish(true, 2, &counters(12, 4, true));
        assert_eq!(quick.kind, DecisionKind::Finished);
        assert!((quick.reward - 0.4).abs() < 1e-12);
        assert!(quick.done);

        let slow = policy.decide_finish(false, 3, &counters(20, 9, true));
        assert!((slow.reward - 0.1).abs() < 1e-12);

        // Seen for the first time on this frame: no efficiency bonus
        let fresh = policy.decide_finish(true, 2, &counters(5, 0, false));
        assert!((fresh.reward - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_score_hard_cutoffs() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let timeout = policy.score(1.0, Action::Forward, true, 0.5, &counters(35, 0, false));
        assert_eq!(timeout.kind, DecisionKind::MaxSteps);
        assert_eq!(timeout.reward, -0.85);
        assert!(timeout.done);

        let lingering = policy.score(1.0, Action::Forward, true, 0.5, &counters(22, 20, true));
        assert_eq!(lingering.kind, DecisionKind::MaxStepsAfterFound);
        assert!(lingering.done);

        let just_before = policy.score(0.0, Action::Forward, false, 0.0, &counters(34, 19, true));
        assert!(!just_before.done);
    }

    #[test]
    fn test_score_first_detection() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let d = policy.score(0.9, Action::Forward, true, 0.1, &counters(1, 0, false));
        assert!((d.reward - 0.74).abs() < 1e-9, "got {}", d.reward);
        assert!(!d.done);
        assert_eq!(d.kind, DecisionKind::Scored);
    }

    #[test]
    fn test_score_consecutive_boost() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let d = policy.score(0.5, Action::RotateLeft, true, 0.0, &counters(4, 2, true));
        assert!(
            (d.reward - 0.5).abs() < 1e-9,
            "0.3 + 0.2 boost, got {}",
            d.reward
        );

        let lost = policy.score(0.5, Action::RotateLeft, false, 0.0, &counters(4, 2, true));
        assert!((lost.reward - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_score_lingering_penalty() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        // 3 steps over the free budget: 0 - 3 * 0.15
        let d = policy.score(0.0, Action::Forward, false, 0.0, &counters(15, 10, true));
        assert!((d.reward + 0.45).abs() < 1e-9, "got {}", d.reward);
    }

    #[test]
    fn test_score_spacebar_penalty() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let free = EpisodeCounters {
            steps: 5,
            space_presses: 2,
            ..Default::default()
        };
        assert_eq!(
            policy.score(0.0, Action::ResetToStart, false, 0.0, &free).reward,
            0.0
        );

        let excess = EpisodeCounters {
            steps: 5,
            space_presses: 3,
            ..Default::default()
        };
        let d = policy.score(0.0, Action::ResetToStart, false, 0.0, &excess);
        assert!(
            (d.reward + 0.9).abs() < 1e-9,
            "0.3 per press, got {}",
            d.reward
        );

        // Penalty applies only to the press itself
        let d = policy.score(0.0, Action::Forward, false, 0.0, &excess);
        assert_eq!(d.reward, 0.0);
    }

    #[test]
    fn test_score_clamped() {
        let mut config = EngineConfig::default();
        config.consecutive_boost = 0.5;
        let policy = RewardPolicy::new(&config);

        let high = policy.score(1.0, Action::Forward, true, 1.0, &counters(5, 2, true));
        assert_eq!(high.reward, 1.0);

        let low = EpisodeCounters {
            steps: 30,
            steps_since_found: 19,
            space_presses: 6,
            zoom_amt: 0,
            found: true,
        };
        let d = policy.score(0.0, Action::ResetToStart, false, 0.0, &low);
        assert_eq!(d.reward, -1.0);
    }

    #[test]
    fn test_box_bonus_capped() {
        let config = EngineConfig::default();
        let policy = RewardPolicy::new(&config);

        let small = policy.score(0.0, Action::Forward, false, 0.01, &counters(2, 0, false));
        assert!((small.reward - 0.07).abs() < 1e-9);

        let big = policy.score(0.0, Action::Forward, false, 0.5, &counters(2, 0, false));
        assert!((big.reward - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_decision_kind_is_finish() {
        assert!(DecisionKind::PrematureFinish.is_finish());
        assert!(DecisionKind::Finished.is_finish());
        assert!(!DecisionKind::Scored.is_finish());
        assert!(!DecisionKind::MaxSteps.is_finish());
    }
}
