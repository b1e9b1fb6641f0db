//! Sandbox Executor: compiles a submission once, then runs its test cases
//! inside `isolate` boxes in bounded-parallel batches.

pub mod box_pool;
pub mod executor;
pub mod isolate;
pub mod meta;
pub mod protocol;

pub use box_pool::{BoxHandle, BoxPool};
pub use executor::{execute, ExecutorConfig};
pub use protocol::{SandboxRequest, SandboxResponse};
