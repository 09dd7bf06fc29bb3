//! Utility functions and helpers

pub mod frame_stack;
