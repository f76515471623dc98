// src/health/mod.rs
mod prober;

pub use prober::{is_reachable, HealthProber, ProbeResult};
