//! Infrastructure adapters: result caches, subprocess plumbing, provisioning and telemetry.

pub mod cache;
pub mod error;
pub mod process;
pub mod provision;
pub mod telemetry;
