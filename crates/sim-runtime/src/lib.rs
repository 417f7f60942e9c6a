#![deny(warnings)]

//! Season runtime for Farm Navigator.
//!
//! [`Simulation`] is the pure state machine; it never sleeps or spawns.
//! [`Session`] drives it on tokio time, owning the pending phase timers and
//! the in-flight environmental data fetch.

pub mod machine;
pub mod session;

pub use machine::{
    Command, DataState, PhaseTimer, SimError, SimEvent, SimPhase, SimView, Simulation, Step,
};
pub use session::Session;
