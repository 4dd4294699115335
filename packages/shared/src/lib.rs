//! Shared utilities for the utakata chat system.
//!
//! Small helpers used by every binary: time handling and logger setup.

pub mod logger;
pub mod time;
