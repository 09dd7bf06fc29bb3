//! End-to-end episode scenarios against the engine
//!
//! Each test drives an [`EpisodeEngine`] through a scripted sequence of
//! detector outputs and checks rewards, termination and bookkeeping.

use stopfinder_rl::{
    env::{
        action::Action,
        config::EngineConfig,
        detector::{BoxDetection, DetectorOutput},
        episode::{CompletionRecord, EpisodeEngine, EpisodePhase},
        reward::DecisionKind,
        types::{Pose, Stop},
    },
    error::EngineError,
};

const DIM: usize = 8;

fn config() -> EngineConfig {
    EngineConfig::new().embedding_dim(DIM)
}

fn blank() -> DetectorOutput {
    DetectorOutput::empty(DIM)
}

/// Frame with a single sign box of the given confidence and area
fn sign(confidence: f64, area: f64) -> DetectorOutput {
    let side = area.sqrt();
    DetectorOutput::from_boxes(
        vec![BoxDetection::new("sign", 1, (0.5, 0.5), (side, side), confidence)],
        vec![0.25; DIM],
        &config(),
    )
}

fn anchor() -> Pose {
    Pose::new(10.0, 20.0, 0.0)
}

fn started_engine(config: EngineConfig) -> EpisodeEngine {
    let mut engine = EpisodeEngine::new(config).unwrap();
    let stop = Stop::new(10.0, 20.0, "Elm St & 3rd Ave", true);
    engine.reset(stop, &anchor(), &blank()).unwrap();
    engine
}

#[test]
fn test_first_detection_scenario() {
    let mut engine = started_engine(config());

    let t = engine.step(Action::Forward, &sign(0.9, 0.1), &anchor()).unwrap();

    // 0.9 * 0.6 + min(0.1 * 7, 0.2)
    assert!((t.reward - 0.74).abs() < 1e-9, "got {}", t.reward);
    assert!(!t.done);
    let counters = engine.state().unwrap().counters;
    assert!(counters.found);
    assert_eq!(counters.steps_since_found, 1);
    assert_eq!(counters.steps, 1);
}

#[test]
fn test_forced_cutoff_after_found() {
    let mut engine = started_engine(config());

    engine.step(Action::Forward, &sign(0.9, 0.1), &anchor()).unwrap();

    // steps_since_found reaches 20 on the 21st step
    for step in 2..=20 {
        let t = engine.step(Action::RotateLeft, &sign(1.0, 0.2), &anchor()).unwrap();
        assert!(!t.done, "step {} ended early", step);
    }
    assert_eq!(engine.state().unwrap().counters.steps_since_found, 20);

    let t = engine.step(Action::RotateLeft, &sign(1.0, 0.2), &anchor()).unwrap();
    assert!(t.done);
    assert_eq!(t.reward, -0.85);
    assert_eq!(t.decision.kind, DecisionKind::MaxStepsAfterFound);
    assert_eq!(engine.phase(), Some(EpisodePhase::Terminated));
}

#[test]
fn test_forced_cutoff_at_max_steps() {
    let mut engine = started_engine(config());

    for step in 1..35 {
        let t = engine.step(Action::RotateRight, &blank(), &anchor()).unwrap();
        assert!(!t.done, "step {} ended early", step);
    }
    let t = engine.step(Action::RotateRight, &sign(0.9, 0.1), &anchor()).unwrap();
    assert!(t.done);
    assert_eq!(t.reward, -0.85);
    assert_eq!(t.decision.kind, DecisionKind::MaxSteps);
}

#[test]
fn test_premature_finish_scenario() {
    let mut engine = started_engine(config());

    for _ in 0..4 {
        engine.step(Action::RotateLeft, &blank(), &anchor()).unwrap();
    }
    let t = engine.step(Action::Finish, &blank(), &anchor()).unwrap();

    assert_eq!(engine.state().unwrap().counters.steps, 5);
    assert_eq!(t.reward, -0.7);
    assert!(!t.done);
    assert_eq!(engine.phase(), Some(EpisodePhase::Active));

    // The episode keeps going
    assert!(engine.step(Action::Forward, &blank(), &anchor()).is_ok());
}

#[test]
fn test_finish_boundary_at_min_steps() {
    let mut engine = started_engine(config());
    for _ in 0..24 {
        engine.step(Action::RotateLeft, &blank(), &anchor()).unwrap();
    }
    // steps == min_steps: still premature
    let t = engine.step(Action::Finish, &blank(), &anchor()).unwrap();
    assert_eq!(t.decision.kind, DecisionKind::PrematureFinish);

    // steps == min_steps + 1: accepted without a bonus
    let t = engine.step(Action::Finish, &blank(), &anchor()).unwrap();
    assert_eq!(t.decision.kind, DecisionKind::Finished);
    assert!((t.reward - 0.1).abs() < 1e-12);
    assert!(t.done);
}

#[test]
fn test_finish_after_two_viewpoints() {
    let mut engine = started_engine(config());

    let first = anchor();
    let second = Pose::new(10.0, 20.0, 45.0);
    engine.step(Action::Forward, &sign(0.8, 0.05), &first).unwrap();

    // One viewpoint only: finish is refused
    let t = engine.step(Action::Finish, &sign(0.8, 0.05), &first).unwrap();
    assert_eq!(t.decision.kind, DecisionKind::UnderevidencedRejected);
    assert_eq!(t.reward, -0.4);

    let t = engine.step(Action::RotateRight, &sign(0.7, 0.05), &second).unwrap();
    assert!(t.new_viewpoint);

    let t = engine.step(Action::Finish, &sign(0.7, 0.05), &second).unwrap();
    assert_eq!(t.decision.kind, DecisionKind::Finished);
    assert!(
        (t.reward - 0.4).abs() < 1e-12,
        "move-on plus efficiency bonus"
    );
    assert!(t.done);

    let record = t.completion.unwrap();
    assert_eq!(record.viewpoints, 2);
    assert_eq!(record.steps_taken, 4);
    assert_eq!(record.amenity_scores.get("sign"), Some(&0.8));
    assert!(record.is_known_positive);
}

#[test]
fn test_underevidenced_finish_accepted_late() {
    let mut engine = started_engine(config());
    engine.step(Action::Forward, &sign(0.8, 0.05), &anchor()).unwrap();

    for _ in 0..7 {
        engine.step(Action::RotateLeft, &blank(), &anchor()).unwrap();
    }
    // steps_since_found is now 8 > 7 free steps
    let t = engine.step(Action::Finish, &blank(), &anchor()).unwrap();
    assert_eq!(t.decision.kind, DecisionKind::UnderevidencedAccepted);
    assert_eq!(t.reward, -0.3);
    assert!(t.done);
}

#[test]
fn test_spacebar_presses() {
    let mut engine = started_engine(config());

    let first = engine.step(Action::ResetToStart, &blank(), &anchor()).unwrap();
    let second = engine.step(Action::ResetToStart, &blank(), &anchor()).unwrap();
    assert_eq!(first.reward, 0.0);
    assert_eq!(second.reward, 0.0);

    let third = engine.step(Action::ResetToStart, &blank(), &anchor()).unwrap();
    assert!(
        (third.reward + 0.9).abs() < 1e-9,
        "3 presses * 0.3, got {}",
        third.reward
    );
}

#[test]
fn test_completion_record_round_trip() {
    let config = config().min_steps(2);
    let mut engine = started_engine(config);

    let bench = DetectorOutput::from_boxes(
        vec![BoxDetection::new("bench", 2, (0.3, 0.8), (0.2, 0.1), 0.6)],
        vec![0.5; DIM],
        &EngineConfig::new().embedding_dim(DIM),
    );
    engine.step(Action::Forward, &bench, &anchor()).unwrap();
    engine.step(Action::RotateLeft, &blank(), &Pose::new(10.0, 20.0, 315.0)).unwrap();
    let t = engine.step(Action::Finish, &blank(), &Pose::new(10.0, 20.0, 315.0)).unwrap();
    assert!(t.done);

    let record = t.completion.unwrap();
    assert_eq!(record, engine.state().unwrap().completion_record());

    let json = serde_json::to_string(&record).unwrap();
    let back: CompletionRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back.total_reward, record.total_reward);
    assert_eq!(back.steps_taken, record.steps_taken);
    assert_eq!(back.amenity_scores.get("bench"), Some(&0.6));
    assert_eq!(back, record);
}

#[test]
fn test_completion_record_reads_minimal_log_entries() {
    let json = r#"{
        "place_name": "Elm St & 3rd Ave",
        "latitude": 10.0,
        "longitude": 20.0,
        "amenity_scores": { "sign": 0.91 },
        "total_reward": 1.234,
        "steps_taken": 17
    }"#;
    let record: CompletionRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.steps_taken, 17);
    assert!(!record.is_known_positive);
    assert_eq!(record.best_reward, None);
}

#[test]
fn test_phase_errors() {
    let mut engine = EpisodeEngine::new(config()).unwrap();
    assert_eq!(
        engine.step(Action::Forward, &blank(), &anchor()).unwrap_err(),
        EngineError::NotReset
    );

    let mut engine = started_engine(config().min_steps(0));
    let t = engine.step(Action::Finish, &blank(), &anchor()).unwrap();
    assert!(t.done);
    assert_eq!(
        engine.step(Action::Forward, &blank(), &anchor()).unwrap_err(),
        EngineError::EpisodeTerminated
    );
}

#[test]
fn test_independent_engines() {
    let strict = config().max_steps(27);
    let lenient = config().max_steps(60);
    let mut a = started_engine(strict);
    let mut b = started_engine(lenient);

    let mut a_done = None;
    for step in 1..=27 {
        let ta = a.step(Action::RotateLeft, &blank(), &anchor()).unwrap();
        let tb = b.step(Action::RotateLeft, &blank(), &anchor()).unwrap();
        if ta.done && a_done.is_none() {
            a_done = Some(step);
        }
        assert!(!tb.done);
    }
    assert_eq!(a_done, Some(27));
    assert_eq!(b.phase(), Some(EpisodePhase::Active));
}
