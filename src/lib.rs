//! Sorterra
//!
//! Rule- and memory-guided document sorting. Each file is extracted,
//! analyzed (recursively when large), matched against a memory of earlier
//! placements, and handed to a reasoning model that moves it with storage
//! tools until it gives a final answer.

pub mod agent;
pub mod ai;
pub mod analyzer;
pub mod config;
pub mod execution;
pub mod extract;
pub mod models;
pub mod storage;
pub mod utils;
pub mod vector;

pub use agent::{BatchRequest, BatchResponse, BatchRunner, Orchestrator};
pub use config::SorterraConfig;
