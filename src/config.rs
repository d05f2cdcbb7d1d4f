use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, value_parser};
use url::Url;

use crate::channel::{BrowserChannel, Channel, ChannelKind, HttpChannel};
use crate::extract::{DEFAULT_UNIT_KEYWORD, ExtractionTarget};
use crate::refresh::{DEFAULT_FALLBACK_PRICE, RefreshPolicy};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "aurum",
    version,
    about = "Serves a jewelry catalog priced from a scraped gold-per-gram quote"
)]
pub struct Config {
    /// Address to bind the HTTP server on
    #[arg(long, env = "AURUM_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "AURUM_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Product catalog (JSON array)
    #[arg(long, env = "AURUM_CATALOG", default_value = "products.json")]
    pub catalog: PathBuf,

    /// Page that quotes the price per gram
    #[arg(long, env = "AURUM_SOURCE_URL")]
    pub source_url: Url,

    #[arg(long, env = "AURUM_CHANNEL", value_enum, default_value_t = ChannelKind::Http)]
    pub channel: ChannelKind,

    #[arg(
        long,
        env = "AURUM_REFRESH_PERIOD_MS",
        default_value_t = 60_000,
        value_parser = value_parser!(u64).range(1..)
    )]
    pub refresh_period_ms: u64,

    /// Per-attempt timeout [default: 15000 for http, 60000 for browser]
    #[arg(long, env = "AURUM_TIMEOUT_MS", value_parser = value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Attempts per refresh cycle
    #[arg(
        long,
        env = "AURUM_ATTEMPTS",
        default_value_t = 3,
        value_parser = value_parser!(u32).range(1..)
    )]
    pub attempts: u32,

    #[arg(long, env = "AURUM_RETRY_BACKOFF_MS", default_value_t = 1000)]
    pub retry_backoff_ms: u64,

    /// Price per gram used until a live quote has been scraped once
    #[arg(
        long,
        env = "AURUM_FALLBACK_PRICE",
        default_value_t = DEFAULT_FALLBACK_PRICE,
        value_parser = positive_price
    )]
    pub fallback_price: f64,

    /// Elements that each hold one quote row
    #[arg(long, env = "AURUM_OUTER_SELECTOR", default_value = "tr")]
    pub outer_selector: String,

    /// Label inside a row, matched against the unit keyword
    #[arg(long, env = "AURUM_LABEL_SELECTOR", default_value = "td:first-child")]
    pub label_selector: String,

    /// Value inside the matched row
    #[arg(long, env = "AURUM_VALUE_SELECTOR", default_value = "td:nth-child(2)")]
    pub value_selector: String,

    #[arg(long, env = "AURUM_UNIT_KEYWORD", default_value = DEFAULT_UNIT_KEYWORD)]
    pub unit_keyword: String,

    /// Skip value nodes with this class (e.g. "down")
    #[arg(long, env = "AURUM_EXCLUDE_CLASS")]
    pub exclude_class: Option<String>,

    /// Chromium executable; autodetected when omitted
    #[arg(long, env = "AURUM_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,
}

fn positive_price(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(v) => Err(format!("{v} is not a positive price")),
        Err(e) => Err(e.to_string()),
    }
}

impl Config {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.channel.default_timeout())
    }

    pub fn policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            attempts: self.attempts,
            timeout: self.timeout(),
            backoff: Duration::from_millis(self.retry_backoff_ms),
            fallback: self.fallback_price,
        }
    }

    pub fn extraction_target(&self) -> Result<ExtractionTarget> {
        ExtractionTarget::new(
            &self.outer_selector,
            &self.label_selector,
            &self.value_selector,
            &self.unit_keyword,
            self.exclude_class.clone(),
        )
    }

    pub fn build_channel(&self, target: &ExtractionTarget) -> Arc<dyn Channel> {
        match self.channel {
            ChannelKind::Http => Arc::new(HttpChannel),
            ChannelKind::Browser => Arc::new(BrowserChannel::new(
                self.chrome_path.clone(),
                Some(target.outer_selector().to_string()),
            )),
        }
    }
}
