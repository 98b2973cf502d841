//! Input/Output for near-field integration

pub mod native;

pub use native::*;
