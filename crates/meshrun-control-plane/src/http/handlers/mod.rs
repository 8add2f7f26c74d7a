//! HTTP request handlers.

mod assets;
mod health;
mod jobs;
mod tasks;

pub use assets::upload_asset;
pub use health::{health_check, index, metrics_handler};
pub use jobs::{get_status, submit};
pub use tasks::{claim, report};
