//! Orchestration of the replay, record and verify phases.

mod controller;
pub mod pool;
mod state;

pub use controller::{Collaborators, PhaseController, RunOutcome};
pub use state::{RunState, StateEntry, StateLog};
