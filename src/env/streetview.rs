//! Stop-search environment
//!
//! [`StreetViewEnv`] runs the outer loop around an
//! [`EpisodeEngine`]: pick a stop, position the camera, run the detector on
//! every captured frame and feed the results to the engine. Navigation,
//! detection and the stop list are collaborators supplied by the caller.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use stopfinder_rl::{
//!     env::{
//!         config::EngineConfig,
//!         sim::{SimConfig, SimNavigator, SyntheticDetector},
//!         streetview::StreetViewEnv,
//!         types::Stop,
//!         Environment,
//!     },
//!     stops::StopLoader,
//!     telemetry::MemorySink,
//! };
//!
//! let config = EngineConfig::new().embedding_dim(8);
//! let stops = StopLoader::from_stops(vec![Stop::new(33.77, -84.39, "Peachtree & 10th", true)]);
//! let mut env = StreetViewEnv::new(
//!     config.clone(),
//!     SimNavigator::new(SimConfig::default()),
//!     SyntheticDetector::new(config),
//!     stops,
//!     Arc::new(MemorySink::new()),
//! )
//! .unwrap();
//!
//! let obs = env.reset().unwrap();
//! let result = env.step(0).unwrap();
//! assert_eq!(result.observation.len(), obs.len());
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};

use super::{
    action::Action,
    config::EngineConfig,
    detector::Detector,
    episode::{Capture, EpisodeEngine, StepOutcome},
    navigation::{NavOutcome, Navigator},
    types::Frame,
    Environment, SpaceInfo, SpaceType, StepInfo, StepResult,
};
use crate::{error::EngineError, stops::StopSource, telemetry::CompletionSink};

/// Stops tried per reset before giving up
pub const DEFAULT_MAX_STOP_ATTEMPTS: usize = 10;

/// Environment searching stops in street-level imagery
pub struct StreetViewEnv<N, D, S> {
    engine: EpisodeEngine,
    navigator: N,
    detector: D,
    stops: S,
    sink: Arc<dyn CompletionSink>,
    max_stop_attempts: usize,
    frame: Option<Frame>,
    best_frame: Option<Frame>,
    last_observation: Vec<f32>,
}

impl<N, D, S> StreetViewEnv<N, D, S>
where
    N: Navigator,
    D: Detector,
    S: StopSource,
{
    /// Create an environment; fails on an invalid configuration
    pub fn new(
        config: EngineConfig,
        navigator: N,
        detector: D,
        stops: S,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<Self> {
        let engine = EpisodeEngine::new(config)?;
        Ok(Self {
            engine,
            navigator,
            detector,
            stops,
            sink,
            max_stop_attempts: DEFAULT_MAX_STOP_ATTEMPTS,
            frame: None,
            best_frame: None,
            last_observation: Vec::new(),
        })
    }

    /// Set how many stops a reset tries before failing
    pub fn max_stop_attempts(mut self, attempts: usize) -> Self {
        self.max_stop_attempts = attempts.max(1);
        self
    }

    /// Episode engine
    pub fn engine(&self) -> &EpisodeEngine {
        &self.engine
    }

    /// Navigation collaborator
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Detection collaborator
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Frame behind the latest observation
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Frame of the best-reward step in the current episode
    pub fn best_frame(&self) -> Option<&Frame> {
        self.best_frame.as_ref()
    }

    fn info(&self) -> StepInfo {
        match self.engine.state() {
            Some(state) => StepInfo {
                step: state.counters.steps,
                steps_since_found: state.counters.steps_since_found,
                viewpoints: state.viewpoints.count(),
                ..Default::default()
            },
            None => StepInfo::default(),
        }
    }
}

impl<N, D, S> Environment for StreetViewEnv<N, D, S>
where
    N: Navigator,
    D: Detector,
    S: StopSource,
{
    type Observation = Vec<f32>;
    type Action = i64;

    fn reset(&mut self) -> Result<Vec<f32>> {
        for _ in 0..self.max_stop_attempts {
            let Some(stop) = self.stops.next_stop() else {
                bail!("stop source exhausted");
            };

            let frame = match self.navigator.goto_stop(&stop)? {
                NavOutcome::Moved(frame) => frame,
                NavOutcome::NoImagery => {
                    tracing::warn!(
                        "No imagery for stop '{}' ({}), skipping",
                        stop.name,
                        stop.coords()
                    );
                    continue;
                }
            };

            self.detector.begin_episode(&stop);
            let detection = self.detector.detect(&frame)?;
            let observation = self.engine.reset(stop, &frame.pose, &detection)?;

            self.frame = Some(frame);
            self.best_frame = None;
            self.last_observation = observation.clone();
            return Ok(observation);
        }
        bail!(
            "no imagery for {} consecutive stops",
            self.max_stop_attempts
        )
    }

    fn step(&mut self, action: i64) -> Result<StepResult<Vec<f32>>> {
        let action = Action::from_index(action)?;
        let frame = self.frame.as_ref().ok_or(EngineError::NotReset)?;

        // Finish re-scores the current frame without touching the camera
        let outcome = if action == Action::Finish {
            NavOutcome::Moved(frame.clone())
        } else {
            self.navigator.apply(action)?
        };

        match outcome {
            NavOutcome::Moved(frame) => {
                let detection = self.detector.detect(&frame)?;
                let capture = Capture::Frame {
                    detection: &detection,
                    pose: &frame.pose,
                };
                let StepOutcome::Advanced(transition) = self.engine.submit(action, capture)? else {
                    bail!("engine returned a retry for a captured frame");
                };

                let best_now = self
                    .engine
                    .state()
                    .and_then(|s| s.best.as_ref().map(|b| b.step == s.counters.steps))
                    .unwrap_or(false);
                if best_now {
                    self.best_frame = Some(frame.clone());
                }

                if let Some(record) = &transition.completion {
                    self.sink.submit(record.clone());
                    if let Some(best) = &self.best_frame {
                        self.sink.submit_best_frame(record, best);
                    }
                }
                self.frame = Some(frame);
                self.last_observation = transition.observation.clone();

                let info = StepInfo {
                    new_viewpoint: transition.new_viewpoint,
                    decision: Some(transition.decision.kind),
                    ..self.info()
                };
                Ok(StepResult {
                    observation: transition.observation,
                    reward: transition.reward as f32,
                    terminated: transition.done,
                    truncated: false,
                    info,
                })
            }
            NavOutcome::NoImagery => {
                self.engine.submit(action, Capture::NoImagery)?;
                Ok(StepResult {
                    observation: self.last_observation.clone(),
                    reward: 0.0,
                    terminated: false,
                    truncated: false,
                    info: StepInfo {
                        retry: true,
                        ..self.info()
                    },
                })
            }
        }
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo {
            shape: vec![self.engine.config().frame_dim()],
            dtype: SpaceType::Continuous,
        }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo {
            shape: vec![],
            dtype: SpaceType::Discrete(Action::COUNT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{
            detector::{BoxDetection, DetectorOutput},
            reward::DecisionKind,
            sim::{ScriptedDetector, SimConfig, SimNavigator},
            types::Stop,
        },
        stops::StopLoader,
        telemetry::MemorySink,
    };

    const DIM: usize = 4;

    fn config() -> EngineConfig {
        EngineConfig::new().embedding_dim(DIM)
    }

    fn sighting(conf: f64) -> DetectorOutput {
        DetectorOutput::from_boxes(
            vec![BoxDetection::new("sign", 1, (0.5, 0.5), (0.1, 0.2), conf)],
            vec![0.1; DIM],
            &config(),
        )
    }

    fn stops(names: &[&str]) -> StopLoader {
        let stops = names
            .iter()
            .map(|n| Stop::new(33.77, -84.39, *n, true))
            .collect();
        StopLoader::from_stops(stops)
    }

    fn make_env(
        script: Vec<DetectorOutput>,
        nav: SimNavigator,
        names: &[&str],
        sink: Arc<MemorySink>,
    ) -> StreetViewEnv<SimNavigator, ScriptedDetector, StopLoader> {
        let detector = ScriptedDetector::new(script, DIM);
        StreetViewEnv::new(config(), nav, detector, stops(names), sink).unwrap()
    }

    #[test]
    fn test_spaces() {
        let sink = Arc::new(MemorySink::new());
        let env = make_env(vec![], SimNavigator::default(), &["A"], sink);
        assert_eq!(env.observation_space().shape, vec![config().frame_dim()]);
        assert_eq!(env.action_space().dtype, SpaceType::Discrete(7));
    }

    #[test]
    fn test_step_before_reset() {
        let sink = Arc::new(MemorySink::new());
        let mut env = make_env(vec![], SimNavigator::default(), &["A"], sink);
        let err = env.step(0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::NotReset)
        );
    }

    #[test]
    fn test_invalid_action() {
        let sink = Arc::new(MemorySink::new());
        let mut env = make_env(vec![], SimNavigator::default(), &["A"], sink);
        env.reset().unwrap();
        let err = env.step(7).unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::InvalidAction(7))
        );
    }

    #[test]
    fn test_reset_skips_stops_without_imagery() {
        let nav = SimNavigator::default().with_unavailable(["A", "B"]);
        let mut env = make_env(vec![], nav, &["A", "B", "C"], Arc::new(MemorySink::new()));

        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), config().frame_dim());
        assert_eq!(env.engine().state().unwrap().stop.name, "C");
        assert_eq!(env.detector().episodes(), 1);
    }

    #[test]
    fn test_reset_gives_up() {
        let nav = SimNavigator::default().with_unavailable(["A", "B", "C"]);
        let sink = Arc::new(MemorySink::new());
        let names = ["A", "B", "C", "D"];
        let mut env = make_env(vec![], nav, &names, sink.clone()).max_stop_attempts(3);
        assert!(env.reset().is_err());

        let mut exhausted = make_env(vec![], SimNavigator::default(), &[], sink);
        assert!(exhausted.reset().is_err());
    }

    #[test]
    fn test_finish_rescores_current_frame() {
        let script = vec![DetectorOutput::empty(DIM), sighting(0.9), sighting(0.8)];
        let sink = Arc::new(MemorySink::new());
        let mut env = make_env(script, SimNavigator::default(), &["A"], sink);
        env.reset().unwrap();

        env.step(Action::RotateLeft.index()).unwrap();
        let pose_before = env.frame().unwrap().pose.clone();

        let result = env.step(Action::Finish.index()).unwrap();
        assert_eq!(
            env.frame().unwrap().pose,
            pose_before,
            "finish does not move the camera"
        );
        assert_eq!(
            result.info.decision,
            Some(DecisionKind::UnderevidencedRejected)
        );
        assert!(!result.terminated);
        assert_eq!(env.detector().frames_seen(), 3);
    }

    #[test]
    fn test_retry_keeps_observation() {
        let config = SimConfig {
            coverage_radius_m: 5.0,
            ..SimConfig::default()
        };
        let nav = SimNavigator::new(config);
        let mut env = make_env(vec![], nav, &["A"], Arc::new(MemorySink::new()));

        // Start panorama is outside the 5 m coverage disc
        assert!(env.reset().is_err());

        let config = SimConfig {
            coverage_radius_m: 13.0,
            ..SimConfig::default()
        };
        let sink = Arc::new(MemorySink::new());
        let mut env = make_env(vec![], SimNavigator::new(config), &["A"], sink);
        let obs = env.reset().unwrap();

        // Walking away from the stop leaves coverage
        let result = env.step(Action::Backward.index()).unwrap();
        assert!(result.info.retry);
        assert_eq!(result.reward, 0.0);
        assert_eq!(result.observation, obs);
        assert_eq!(result.info.step, 0);
        assert_eq!(env.engine().state().unwrap().retries, 1);
    }

    #[test]
    fn test_best_frame_goes_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let config = EngineConfig::new().embedding_dim(DIM).min_steps(1).max_steps(3);
        let script = vec![DetectorOutput::empty(DIM), sighting(0.9), DetectorOutput::empty(DIM)];
        let mut env = StreetViewEnv::new(
            config,
            SimNavigator::default(),
            ScriptedDetector::new(script, DIM),
            stops(&["A", "B"]),
            sink.clone(),
        )
        .unwrap();

        env.reset().unwrap();
        assert!(env.best_frame().is_none());

        env.step(Action::RotateLeft.index()).unwrap();
        let sighted = env.frame().unwrap().clone();
        env.step(Action::RotateLeft.index()).unwrap();
        assert_eq!(
            env.best_frame(),
            Some(&sighted),
            "a weaker step keeps the best frame"
        );

        let result = env.step(Action::RotateLeft.index()).unwrap();
        assert!(result.terminated);

        let frames = sink.best_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, "A");
        assert_eq!(frames[0].1, sighted);

        env.reset().unwrap();
        assert!(env.best_frame().is_none());
    }

    #[test]
    fn test_completion_goes_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let config = EngineConfig::new().embedding_dim(DIM).min_steps(1).max_steps(5);
        let mut env = StreetViewEnv::new(
            config,
            SimNavigator::default(),
            ScriptedDetector::new(vec![], DIM),
            stops(&["A", "B"]),
            sink.clone(),
        )
        .unwrap();

        env.reset().unwrap();
        let mut steps = 0;
        loop {
            steps += 1;
            let result = env.step(Action::RotateRight.index()).unwrap();
            if result.terminated {
                assert_eq!(result.info.decision, Some(DecisionKind::MaxSteps));
                break;
            }
        }
        assert_eq!(steps, 5);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].place_name, "A");
        assert_eq!(sink.records()[0].steps_taken, 5);

        assert!(env.step(0).is_err(), "terminated episode needs a reset");
        env.reset().unwrap();
        assert_eq!(env.engine().state().unwrap().stop.name, "B");
    }
}
