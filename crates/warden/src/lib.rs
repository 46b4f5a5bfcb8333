//! Warden: a reliability agent.
//!
//! Periodically ingests application logs, clusters them into incidents,
//! enriches each with a language-model analysis, opens tracking issues, and
//! (when enabled) synthesizes, sandbox-validates, and submits automated
//! fixes as pull requests.

pub mod activities;
pub mod detect;
pub mod health;
pub mod loki;
pub mod workflow;

pub use activities::{ActivityHandlers, AppContext};
pub use detect::detect_incidents;
pub use loki::LokiClient;
