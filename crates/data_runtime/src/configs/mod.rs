//! Runtime configuration loaded from `data/config/*.toml` with env overrides.

pub mod group;
pub mod telemetry;
