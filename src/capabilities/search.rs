//! Capability search seam.

use async_trait::async_trait;

use super::capability::CapabilityLocator;

/// Maps a natural-language query to at most one capability locator.
///
/// Implementations never fail: configuration problems, transport errors and
/// empty result sets all come back as `None` and are told apart in the logs.
#[async_trait]
pub trait CapabilitySearch: Send + Sync {
    async fn search(&self, query: &str) -> Option<CapabilityLocator>;
}
