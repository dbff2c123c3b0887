//! Shared helpers for unit tests: logger setup, instance fixtures and a
//! directory whose queries are answered by hand.
mod scripted;

pub use common::*;
pub use scripted::*;
