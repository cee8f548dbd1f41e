//! Test-execution history reporting: authorship velocity, run-to-run deltas,
//! slowest tests and commit deltas, computed from the JSON artifacts a
//! test-reporting pipeline publishes.

pub mod artifacts;
pub mod commits;
pub mod delta;
pub mod executions;
pub mod filter;
pub mod metrics;
pub mod render;
pub mod session;
pub mod slowest;
pub mod stats;
pub mod window;
