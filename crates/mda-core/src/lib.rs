//! Mirror-aware download engine: finds mirrors for a file, measures how far
//! away each one is with TTL-limited probes, ranks them, and pulls the file
//! over several ranged streams into a memory-mapped destination.

pub mod checksum;
pub mod config;
pub mod fetch;
pub mod hosts;
pub mod logging;
pub mod mirrors;
pub mod probe;
pub mod progress;
pub mod rank;
pub mod retry;
pub mod session;
pub mod storage;
pub mod transfer;
pub mod url_model;
