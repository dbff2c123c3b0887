//! Service-discovery watch multiplexer
//!
//! Sits between local consumers that follow the live instances of a named
//! service and a directory that only offers a blocking, index-based long-poll
//! query:
//!
//! - one long-poll loop per service name, however many watchers follow it
//! - the latest snapshot is cached, so new watchers get data immediately
//! - change notifications are coalesced, a slow watcher only learns that
//!   something newer exists and re-reads it
//!
//! See [`Registry`] for the entry point and [`DirectoryClient`] for the
//! directory seam.

mod config;
mod directory;
mod errors;
mod registry;
mod utils;

pub use config::*;
pub use directory::*;
pub use errors::*;
pub use registry::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
