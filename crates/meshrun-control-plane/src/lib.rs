//! MeshRun Control Plane Library
//!
//! This crate provides the job API, the in-memory task store, the embedded
//! executor and the worker coordination endpoints.

pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod metrics;
pub mod publish;
pub mod state;
pub mod store;

pub use config::Config;
pub use executor::EmbeddedExecutor;
pub use publish::LocalPublisher;
pub use state::AppState;
pub use store::{StoreError, TaskStore};
