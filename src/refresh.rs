//! Keeping the cached price fresh.
//!
//! A cycle makes up to `attempts` independent fetch + extract tries. The
//! first success is committed. If every try fails the cell keeps its last
//! good quote, or gets the fallback price if it was never set. Failures never
//! leave this module.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, rng};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::Channel;
use crate::error::{AcquireError, ExtractionError};
use crate::extract::ExtractionTarget;
use crate::price::{PriceWriter, Quote, QuoteSource};

pub const DEFAULT_FALLBACK_PRICE: f64 = 92.67;

#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub attempts: u32,
    /// Per attempt; enforced by the channel.
    pub timeout: Duration,
    /// Pause between failed attempts, plus up to half again as jitter.
    pub backoff: Duration,
    pub fallback: f64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(15),
            backoff: Duration::from_secs(1),
            fallback: DEFAULT_FALLBACK_PRICE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// A live price was committed.
    Refreshed(f64),
    /// Nothing was ever acquired; the fallback price was committed.
    FellBack(f64),
    /// This cycle failed; the previous quote stays in effect.
    KeptStale(f64),
}

impl CycleOutcome {
    /// The price in effect after the cycle.
    pub fn per_gram(self) -> f64 {
        match self {
            CycleOutcome::Refreshed(v) | CycleOutcome::FellBack(v) | CycleOutcome::KeptStale(v) => v,
        }
    }
}

pub struct Refresher {
    channel: Arc<dyn Channel>,
    target: ExtractionTarget,
    source: Url,
    policy: RefreshPolicy,
    writer: PriceWriter,
}

impl Refresher {
    pub fn new(
        channel: Arc<dyn Channel>,
        target: ExtractionTarget,
        source: Url,
        policy: RefreshPolicy,
        writer: PriceWriter,
    ) -> Self {
        Self {
            channel,
            target,
            source,
            policy,
            writer,
        }
    }

    async fn attempt(&self) -> Result<f64, AcquireError> {
        let html = self
            .channel
            .fetch_raw_content(&self.source, self.policy.timeout)
            .await?;
        let value = self.target.extract_from_str(&html)?;
        if value <= 0.0 {
            return Err(ExtractionError::NotPositive { value }.into());
        }
        Ok(value)
    }

    async fn pause(&self) {
        if self.policy.backoff.is_zero() {
            return;
        }
        let max_jitter = self.policy.backoff.as_millis() as u64 / 2;
        let jitter = rng().random_range(0..=max_jitter);
        sleep(self.policy.backoff + Duration::from_millis(jitter)).await;
    }

    /// Run one acquisition cycle to completion.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let attempts = self.policy.attempts.max(1);
        let channel = self.channel.name();

        for attempt in 1..=attempts {
            match self.attempt().await {
                Ok(per_gram) => {
                    self.writer.commit(Quote::now(per_gram, QuoteSource::Live));
                    info!(per_gram, attempt, channel, "price refreshed");
                    return CycleOutcome::Refreshed(per_gram);
                }
                Err(e) => {
                    warn!(attempt, attempts, channel, error = %e, "price acquisition failed");
                    if attempt < attempts {
                        self.pause().await;
                    }
                }
            }
        }

        match self.writer.current() {
            Some(quote) => {
                warn!(
                    per_gram = quote.per_gram,
                    source = ?quote.source,
                    "all {attempts} attempts failed, keeping last known price"
                );
                CycleOutcome::KeptStale(quote.per_gram)
            }
            None => {
                let fallback = self.policy.fallback;
                self.writer.commit(Quote::now(fallback, QuoteSource::Fallback));
                warn!(per_gram = fallback, "all {attempts} attempts failed, using fallback price");
                CycleOutcome::FellBack(fallback)
            }
        }
    }

    /// Refresh every `period` until `shutdown` fires.
    ///
    /// The first tick is one period from now; the caller runs the initial
    /// cycle itself. A slow cycle delays the next tick instead of overlapping.
    pub async fn run(self, period: Duration, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.run_cycle() => debug!(?outcome, "refresh cycle finished"),
            }
        }
        info!("price refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DEFAULT_UNIT_KEYWORD;
    use crate::price::{PriceReader, price_cell};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote_page(value: &str) -> String {
        format!(
            "<table><tr class=quote><td class=label>Gram Altın</td>\
             <td class=value>{value}</td></tr></table>"
        )
    }

    /// Replies from a script, then fails with 503 forever.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, AcquireError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, AcquireError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Channel for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_raw_content(
            &self,
            _url: &Url,
            _timeout: Duration,
        ) -> Result<String, AcquireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(AcquireError::Http { status: 503 }))
        }
    }

    fn refresher(channel: Arc<dyn Channel>, attempts: u32) -> (Refresher, PriceReader) {
        refresher_with_backoff(channel, attempts, Duration::ZERO)
    }

    fn refresher_with_backoff(
        channel: Arc<dyn Channel>,
        attempts: u32,
        backoff: Duration,
    ) -> (Refresher, PriceReader) {
        let (writer, reader) = price_cell();
        let target =
            ExtractionTarget::new("tr.quote", "td.label", "td.value", DEFAULT_UNIT_KEYWORD, None)
                .unwrap();
        let policy = RefreshPolicy {
            attempts,
            backoff,
            ..RefreshPolicy::default()
        };
        let source = Url::parse("https://quotes.example/altin").unwrap();
        (
            Refresher::new(channel, target, source, policy, writer),
            reader,
        )
    }

    #[tokio::test]
    async fn test_retries_until_first_success() {
        let channel = Scripted::new(vec![
            Err(AcquireError::Timeout {
                after: Duration::from_secs(15),
            }),
            Ok(quote_page("2.450,80")),
            Ok(quote_page("1,00")),
        ]);
        let (refresher, reader) = refresher(channel.clone(), 3);

        assert_eq!(refresher.run_cycle().await, CycleOutcome::Refreshed(2450.8));
        assert_eq!(channel.calls(), 2);
        let quote = reader.current().unwrap();
        assert_eq!(quote.per_gram, 2450.8);
        assert_eq!(quote.source, QuoteSource::Live);
    }

    #[tokio::test]
    async fn test_fallback_applied_once_when_never_set() {
        let channel = Scripted::new(vec![]);
        let (refresher, reader) = refresher(channel.clone(), 3);

        assert_eq!(refresher.run_cycle().await, CycleOutcome::FellBack(92.67));
        assert_eq!(channel.calls(), 3);
        let first = reader.current().unwrap();
        assert_eq!(first.source, QuoteSource::Fallback);

        // A second failing cycle keeps the fallback quote instead of re-applying it.
        assert_eq!(refresher.run_cycle().await, CycleOutcome::KeptStale(92.67));
        assert_eq!(reader.current().unwrap(), first);
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_last_live_price() {
        let channel = Scripted::new(vec![Ok(quote_page("123,45"))]);
        let (refresher, reader) = refresher(channel.clone(), 2);

        assert_eq!(refresher.run_cycle().await, CycleOutcome::Refreshed(123.45));
        assert_eq!(refresher.run_cycle().await, CycleOutcome::KeptStale(123.45));
        assert_eq!(channel.calls(), 3);
        let quote = reader.current().unwrap();
        assert_eq!(quote.per_gram, 123.45);
        assert_eq!(quote.source, QuoteSource::Live);
    }

    #[tokio::test]
    async fn test_live_price_replaces_fallback() {
        let channel = Scripted::new(vec![
            Err(AcquireError::Http { status: 403 }),
            Ok(quote_page("99,10")),
        ]);
        let (refresher, reader) = refresher(channel, 1);

        assert_eq!(refresher.run_cycle().await, CycleOutcome::FellBack(92.67));
        assert_eq!(refresher.run_cycle().await, CycleOutcome::Refreshed(99.1));
        assert_eq!(reader.current().unwrap().source, QuoteSource::Live);
    }

    #[tokio::test]
    async fn test_extraction_failures_use_up_attempts() {
        let channel = Scripted::new(vec![
            Ok("<table><tr class=quote><td class=label>Ons</td><td class=value>1</td></tr></table>".into()),
            Ok(quote_page("-0,35")),
            Ok(quote_page("n/a")),
        ]);
        let (refresher, _reader) = refresher(channel.clone(), 3);

        assert_eq!(refresher.run_cycle().await, CycleOutcome::FellBack(92.67));
        assert_eq!(channel.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts_is_jittered_within_half() {
        let backoff = Duration::from_secs(1);
        let channel = Scripted::new(vec![
            Err(AcquireError::Http { status: 502 }),
            Ok(quote_page("88,8")),
        ]);
        let (refresher, _reader) = refresher_with_backoff(channel.clone(), 3, backoff);

        let started = Instant::now();
        assert_eq!(refresher.run_cycle().await, CycleOutcome::Refreshed(88.8));
        let waited = started.elapsed();
        assert_eq!(channel.calls(), 2);
        assert!(waited >= backoff, "{waited:?}");
        assert!(waited <= backoff * 3 / 2, "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pause_after_last_attempt() {
        let backoff = Duration::from_secs(2);
        let channel = Scripted::new(vec![]);
        let (refresher, _reader) = refresher_with_backoff(channel.clone(), 3, backoff);

        let started = Instant::now();
        assert_eq!(refresher.run_cycle().await, CycleOutcome::FellBack(92.67));
        let waited = started.elapsed();
        // two pauses for three attempts
        assert!(waited >= backoff * 2, "{waited:?}");
        assert!(waited <= backoff * 3, "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_cycles_until_shutdown() {
        let channel = Scripted::new(vec![Ok(quote_page("10,0")), Ok(quote_page("11,0"))]);
        let (refresher, reader) = refresher(channel.clone(), 1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(refresher.run(Duration::from_secs(60), shutdown.clone()));

        sleep(Duration::from_secs(59)).await;
        assert_eq!(channel.calls(), 0);
        assert_eq!(reader.current(), None);

        sleep(Duration::from_secs(66)).await;
        assert_eq!(channel.calls(), 2);
        assert_eq!(reader.current().unwrap().per_gram, 11.0);

        shutdown.cancel();
        task.await.unwrap();
        sleep(Duration::from_secs(600)).await;
        assert_eq!(channel.calls(), 2);
    }

    /// Takes 90s per fetch and records how many fetches overlap.
    #[derive(Default)]
    struct Slow {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Channel for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch_raw_content(
            &self,
            _url: &Url,
            _timeout: Duration,
        ) -> Result<String, AcquireError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_secs(90)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(quote_page("50,5"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_never_overlap() {
        let channel = Arc::new(Slow::default());
        let (refresher, _reader) = refresher(channel.clone(), 1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(refresher.run(Duration::from_secs(60), shutdown.clone()));

        // cycles start at 60s, 150s and 240s
        sleep(Duration::from_secs(305)).await;
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
        assert_eq!(channel.max_in_flight.load(Ordering::SeqCst), 1);

        // cancelling mid-fetch stops the task without waiting for the fetch
        shutdown.cancel();
        task.await.unwrap();
    }
}
