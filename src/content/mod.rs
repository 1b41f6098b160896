/// Content-addressed store collaborator
///
/// Certificate documents are pinned as JSON; the returned content hash is the
/// commitment checked by strict hash verification.

mod pinata;

pub use pinata::PinataContentStore;

use crate::degraded::Degraded;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SERVICE: &str = "content";

/// Reference to pinned content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedContent {
    pub cid: String,
    pub url: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Pin a JSON document under a human-readable name
    async fn pin(&self, name: &str, document: &Value) -> Result<PinnedContent, Degraded>;
}

/// Stand-in used when no pinning service is configured
#[derive(Debug, Clone, Default)]
pub struct DisabledContentStore;

#[async_trait]
impl ContentStore for DisabledContentStore {
    async fn pin(&self, _name: &str, _document: &Value) -> Result<PinnedContent, Degraded> {
        Err(Degraded::disabled(SERVICE, "pin"))
    }
}
