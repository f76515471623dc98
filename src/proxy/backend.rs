// src/proxy/backend.rs
use super::forward::Forward;
use crate::config::{authority, normalize_address};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

/// One upstream server.
///
/// `address` is the identity key and never changes. `alive` is the only
/// mutable field; reads share the lock, writes take it exclusively.
pub struct Backend {
    pub id: String,
    pub url: Url,
    address: String,
    alive: RwLock<bool>,
    forwarder: Arc<dyn Forward>,
}

impl Backend {
    /// New backends start alive.
    pub fn new(url: Url, forwarder: Arc<dyn Forward>) -> Self {
        Self {
            id: authority(&url),
            address: normalize_address(&url),
            url,
            alive: RwLock::new(true),
            forwarder,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn forwarder(&self) -> &dyn Forward {
        self.forwarder.as_ref()
    }

    pub async fn is_alive(&self) -> bool {
        *self.alive.read().await
    }

    /// Returns the previous liveness.
    pub async fn set_alive(&self, alive: bool) -> bool {
        let mut guard = self.alive.write().await;
        std::mem::replace(&mut *guard, alive)
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
