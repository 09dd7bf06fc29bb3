//! # Stopfinder RL
//!
//! Episode engine and environments for training agents that search for
//! transit stops in street-level imagery.
//!
//! An agent is dropped near a recorded stop location and moves a virtual
//! camera (walk, rotate, zoom, return to start, finish). Each captured frame
//! goes through an object detector; the [`env::episode::EpisodeEngine`] turns
//! the detector output into a fixed-length observation and a shaped reward,
//! and decides when the episode ends.
//!
//! ## Quick Start
//!
//! ```rust
//! use stopfinder_rl::prelude::*;
//!
//! let config = EngineConfig::new().embedding_dim(4);
//! let mut engine = EpisodeEngine::new(config).unwrap();
//!
//! let pose = Pose::new(33.77, -84.39, 0.0);
//! let stop = Stop::new(33.7701, -84.39, "Peachtree & 10th", true);
//! engine.reset(stop, &pose, &DetectorOutput::empty(4)).unwrap();
//!
//! let t = engine.step(Action::RotateLeft, &DetectorOutput::empty(4), &pose).unwrap();
//! assert_eq!(t.reward, 0.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment traits and implementations
pub mod env;

/// Engine error types
pub mod error;

/// Stop lists and loaders
pub mod stops;

/// Completion logging and tracing setup
pub mod telemetry;

/// Utility functions and helpers
pub mod utils;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        env::{
            action::Action,
            config::EngineConfig,
            detector::{BoxDetection, Detector, DetectorOutput},
            episode::{CompletionRecord, EpisodeEngine, EpisodePhase, Transition},
            navigation::{NavOutcome, Navigator},
            pool::EnvPool,
            streetview::StreetViewEnv,
            types::{Frame, Pose, Stop},
            Environment, StepResult,
        },
        error::{ConfigError, EngineError},
        stops::{StopLoader, StopSource},
        telemetry::{CompletionSink, JsonLogWriter, MemorySink},
    };
}

/// Current version of stopfinder-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
