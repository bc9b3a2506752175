//! spinwheel-core: the probability and state engine behind the reward wheel.
//!
//! Control flow for one spin:
//!   load user state → draw → select → compare-and-swap commit
//!   → dispatch grant (best effort) → record telemetry (fire and forget)

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod reward;
pub mod rng;
pub mod selection;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;
