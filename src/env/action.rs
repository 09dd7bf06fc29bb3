//! Discrete action set of the stop-search agent

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Camera action chosen by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Advance to the next panorama along the heading
    Forward,
    /// Rotate the camera counterclockwise
    RotateLeft,
    /// Step back to the previous panorama
    Backward,
    /// Rotate the camera clockwise
    RotateRight,
    /// Zoom in on the current view
    ZoomIn,
    /// Declare the search over
    Finish,
    /// Return the camera to the episode's start pose
    ResetToStart,
}

impl Action {
    /// Number of actions in the action space
    pub const COUNT: usize = 7;

    /// All actions in index order
    pub const ALL: [Action; Action::COUNT] = [
        Action::Forward,
        Action::RotateLeft,
        Action::Backward,
        Action::RotateRight,
        Action::ZoomIn,
        Action::Finish,
        Action::ResetToStart,
    ];

    /// Decode a policy output index
    pub fn from_index(index: i64) -> Result<Self, EngineError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(EngineError::InvalidAction(index))
    }

    /// Index of this action in the action space
    pub fn index(self) -> i64 {
        match self {
            Action::Forward => 0,
            Action::RotateLeft => 1,
            Action::Backward => 2,
            Action::RotateRight => 3,
            Action::ZoomIn => 4,
            Action::Finish => 5,
            Action::ResetToStart => 6,
        }
    }

    /// Whether the camera position changes, which resets any zoom
    pub fn resets_zoom(self) -> bool {
        matches!(
            self,
            Action::Forward | Action::Backward | Action::ResetToStart
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for (i, action) in Action::ALL.iter().enumerate() {
            assert_eq!(action.index(), i as i64);
            assert_eq!(Action::from_index(i as i64), Ok(*action));
        }
    }

    #[test]
    fn test_out_of_range_index() {
        assert_eq!(Action::from_index(7), Err(EngineError::InvalidAction(7)));
        assert_eq!(Action::from_index(-1), Err(EngineError::InvalidAction(-1)));
    }

    #[test]
    fn test_resets_zoom() {
        assert!(Action::Forward.resets_zoom());
        assert!(Action::ResetToStart.resets_zoom());
        assert!(!Action::RotateLeft.resets_zoom());
        assert!(!Action::ZoomIn.resets_zoom());
        assert!(!Action::Finish.resets_zoom());
    }
}
