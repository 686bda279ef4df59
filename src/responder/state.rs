//! Latest route text shared between trace handling and reply composition.
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::path::UNKNOWN_PATH;

/// Cloneable handle to the most recent formatted path; starts as the unknown placeholder.
#[derive(Debug, Clone)]
pub struct PathInfoState {
    inner: Arc<RwLock<String>>,
}

impl Default for PathInfoState {
    fn default() -> Self {
        Self::new()
    }
}

impl PathInfoState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(UNKNOWN_PATH.to_string())),
        }
    }

    pub async fn current(&self) -> String {
        self.inner.read().await.clone()
    }

    /// Store a new route text, returning the previous one.
    pub async fn replace(&self, text: String) -> String {
        std::mem::replace(&mut *self.inner.write().await, text)
    }
}
