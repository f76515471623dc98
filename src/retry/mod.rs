// src/retry/mod.rs
mod context;
mod policy;

pub use context::RequestContext;
pub use policy::{Escalation, RetryPolicy};
