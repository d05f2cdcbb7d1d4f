//! Ways of turning a source URL into HTML the extractor can read.

pub mod browser;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use url::Url;

use crate::error::AcquireError;

pub use browser::BrowserChannel;
pub use http::HttpChannel;

/// Produce parsable content for a URL within `timeout`.
///
/// Implementations hold no per-fetch state: every call acquires and releases
/// whatever client or browser it needs.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_raw_content(&self, url: &Url, timeout: Duration)
    -> Result<String, AcquireError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChannelKind {
    /// Plain GET + static HTML. Fast, no script execution.
    Http,
    /// Headless Chromium; waits for the page to render.
    Browser,
}

impl ChannelKind {
    pub fn default_timeout(self) -> Duration {
        match self {
            ChannelKind::Http => Duration::from_millis(15_000),
            ChannelKind::Browser => Duration::from_millis(60_000),
        }
    }
}
