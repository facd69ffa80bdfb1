//! [`BrowserPool`] adapter over `headless_chrome` (§4.8): a single shared
//! browser process, one fresh tab per request. Deliberately thin — headless
//! browser automation is incidental plumbing for the handful of resolvers
//! that need to render JS before scraping, not a first-class feature of
//! this crate.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};

use clipcore::error::ResolverError;
use clipcore::ports::{BrowserContext, BrowserPool, Fingerprint};

pub struct ChromeBrowserPool {
    browser: Browser,
}

impl ChromeBrowserPool {
    pub fn launch() -> Result<Self, ResolverError> {
        let browser = Browser::new(LaunchOptions::default_builder().build().map_err(|e| ResolverError::Browser(e.to_string()))?)
            .map_err(|e| ResolverError::Browser(e.to_string()))?;
        Ok(Self { browser })
    }
}

#[async_trait]
impl BrowserPool for ChromeBrowserPool {
    async fn new_context(
        &self,
        _proxy: Option<&str>,
        fingerprint: Option<Fingerprint>,
    ) -> Result<Box<dyn BrowserContext>, ResolverError> {
        let tab = self.browser.new_tab().map_err(|e| ResolverError::Browser(e.to_string()))?;
        if let Some(fp) = fingerprint {
            if let Some(ua) = fp.user_agent {
                tab.set_user_agent(&ua, fp.accept_language.as_deref(), None)
                    .map_err(|e| ResolverError::Browser(e.to_string()))?;
            }
        }
        Ok(Box::new(ChromeTabContext { tab }))
    }
}

struct ChromeTabContext {
    tab: std::sync::Arc<headless_chrome::Tab>,
}

#[async_trait]
impl BrowserContext for ChromeTabContext {
    async fn goto(&self, url: &str) -> Result<(), ResolverError> {
        self.tab.navigate_to(url).map_err(|e| ResolverError::Browser(e.to_string()))?;
        self.tab.wait_until_navigated().map_err(|e| ResolverError::Browser(e.to_string()))?;
        Ok(())
    }

    async fn content(&self) -> Result<String, ResolverError> {
        self.tab.get_content().map_err(|e| ResolverError::Browser(e.to_string()))
    }

    async fn close(self: Box<Self>) {
        let _ = self.tab.close(true);
    }
}
