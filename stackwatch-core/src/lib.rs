pub mod catalog;
pub mod config;
pub mod snapshot;

// Readiness
pub mod probe;
pub mod readiness;

// Container backend
pub mod compose;
pub mod runtime;

pub mod orchestrator;

// Dashboard state and input
pub mod dashboard;
pub mod keys;

// Scripted runtime and probe for tests
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
