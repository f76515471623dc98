// src/lib.rs
pub mod cli;
pub mod config;
pub mod server;
pub mod proxy;
pub mod load_balancer;
pub mod health;
pub mod retry;
pub mod metrics;
