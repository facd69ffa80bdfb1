//! The `BrowserPool` port (§4.6): headless-browser automation is explicitly
//! out-of-scope for the core pipeline (Non-goal), but a handful of resolvers
//! (e.g. bilibili preview pages) need a context to render JS before scraping.
//! The trait exists so `clipcore` never depends on a concrete automation
//! crate — a real adapter (e.g. built on `headless_chrome`) lives in the
//! binary crate.

use async_trait::async_trait;

use crate::error::ResolverError;

/// A browser fingerprint override, used to keep per-platform sessions distinct.
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
}

/// A single browsing context a resolver can navigate and scrape from.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), ResolverError>;
    async fn content(&self) -> Result<String, ResolverError>;
    async fn close(self: Box<Self>);
}

/// Pool of reusable browser contexts.
#[async_trait]
pub trait BrowserPool: Send + Sync + 'static {
    async fn new_context(
        &self,
        proxy: Option<&str>,
        fingerprint: Option<Fingerprint>,
    ) -> Result<Box<dyn BrowserContext>, ResolverError>;
}
