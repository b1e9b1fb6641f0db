//! Submission Handler: validates an inbound message, runs it through the
//! sandbox subprocess, and decides the broker-level outcome (spec §4.2).

pub mod decision;
pub mod handler;
pub mod runner;
pub mod validate;

pub use decision::Decision;
pub use handler::{handle, HandlerConfig};
pub use runner::{ChildProcessRunner, RunnerError, SandboxRunner};
pub use validate::{validate, ValidationFailure};
