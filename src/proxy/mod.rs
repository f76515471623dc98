// src/proxy/mod.rs
mod backend;
mod dispatcher;
mod error;
mod forward;
mod pool;

pub use backend::Backend;
pub use dispatcher::Dispatcher;
pub use error::ProxyError;
pub use forward::{build_client, ClientAddr, Forward, ForwardRequest, HttpClient, HttpForwarder};
pub use pool::BackendPool;
