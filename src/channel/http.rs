use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, DNT, HeaderMap, HeaderName, HeaderValue, PRAGMA,
    REFERER, UPGRADE_INSECURE_REQUESTS,
};
use tracing::debug;
use url::Url;

use super::Channel;
use crate::error::AcquireError;

/// GET the page and hand back the body untouched.
///
/// A fresh client per fetch, so cookies or a poisoned connection from a
/// failed attempt never leak into the next one.
#[derive(Debug, Default, Clone)]
pub struct HttpChannel;

#[async_trait]
impl Channel for HttpChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_raw_content(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<String, AcquireError> {
        let client = reqwest::Client::builder()
            .user_agent(random_desktop_ua())
            .redirect(reqwest::redirect::Policy::limited(8))
            .timeout(timeout)
            .build()
            .map_err(AcquireError::Network)?;

        let rsp = client
            .get(url.as_str())
            .headers(navigation_headers(url))
            .send()
            .await
            .map_err(|e| AcquireError::from_reqwest(e, timeout))?;

        let status = rsp.status();
        debug!(%url, %status, final_url = %rsp.url(), "fetched source page");
        if !status.is_success() {
            return Err(AcquireError::Http {
                status: status.as_u16(),
            });
        }

        rsp.text()
            .await
            .map_err(|e| AcquireError::from_reqwest(e, timeout))
    }
}

// -------------------------
// Header helpers
// -------------------------

fn navigation_headers(url: &Url) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    h.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    if let Ok(origin) = HeaderValue::from_str(&url.origin().ascii_serialization()) {
        h.insert(REFERER, origin);
    }
    h.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    h.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    h.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    h.insert(DNT, HeaderValue::from_static("1"));
    h.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    h
}

fn random_desktop_ua() -> &'static str {
    const UAS: &[&str] = &[
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    ];
    UAS[rng().random_range(0..UAS.len())]
}
