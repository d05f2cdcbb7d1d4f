//! The process-wide cached price.
//!
//! One [`PriceWriter`] (owned by the refresher) and any number of
//! [`PriceReader`]s (one per request handler). Every commit replaces the whole
//! quote, so a reader sees either the previous quote or the new one.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    /// Extracted from the source page.
    Live,
    /// Substituted because nothing was ever extracted.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub per_gram: f64,
    pub source: QuoteSource,
    pub updated_at: OffsetDateTime,
}

impl Quote {
    pub fn now(per_gram: f64, source: QuoteSource) -> Self {
        Self {
            per_gram,
            source,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

pub struct PriceWriter(watch::Sender<Option<Quote>>);

#[derive(Clone)]
pub struct PriceReader(watch::Receiver<Option<Quote>>);

/// Create an unset price cell.
pub fn price_cell() -> (PriceWriter, PriceReader) {
    let (tx, rx) = watch::channel(None);
    (PriceWriter(tx), PriceReader(rx))
}

impl PriceWriter {
    pub fn commit(&self, quote: Quote) {
        self.0.send_replace(Some(quote));
    }

    pub fn current(&self) -> Option<Quote> {
        *self.0.borrow()
    }

    pub fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }

    pub fn reader(&self) -> PriceReader {
        PriceReader(self.0.subscribe())
    }
}

impl PriceReader {
    /// Last committed quote. Never waits on an in-flight refresh.
    pub fn current(&self) -> Option<Quote> {
        *self.0.borrow()
    }
}
