//! Sirberus: systemd services and containers behind one HTTP + SSE API.
//!
//! ## Architecture
//!
//! - **metrics**: CPU baselines and per-entity resource readings
//! - **logs**: cursor positioning and restartable log sessions over any `LogSource`
//! - **events**: SSE event model and the publisher that multiplexes output, errors and heartbeats
//! - **systemd** / **container**: backend traits, their implementations and snapshot assembly
//! - **api**: axum router and handlers

pub mod api;
pub mod config;
pub mod container;
pub mod events;
pub mod logging;
pub mod logs;
pub mod metrics;
pub mod systemd;
pub mod util;

pub use api::{AppState, router};
pub use config::Config;
pub use sirberus_shared::{SirberusError, SirberusResult};
