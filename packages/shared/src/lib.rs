//! Utilities shared by the Huddle library and its binaries.

pub mod logger;
pub mod time;
