//! Sorting agent
//!
//! One session per file (`agent_loop`), sequential batches over a container
//! (`batch`).

pub mod agent_loop;
pub mod batch;
pub mod session;

pub use agent_loop::{LoopConfig, Orchestrator};
pub use batch::{BatchConfig, BatchRequest, BatchResponse, BatchRunner, BatchStatus};
pub use session::{LoopState, SessionOutcome, SessionState};
