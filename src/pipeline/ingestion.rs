//! Ingestion loop: fetch -> store -> window -> (alert check) -> sleep
//!
//! The loop owns all of its mutable state (the rolling windows and the
//! alert schedule). It shares nothing in memory with the aggregate
//! refresher; the two only meet in the SQLite file.
//!
//! Every tick ends in exactly one `TickOutcome`. A failed fetch becomes a
//! `Backoff` whose length depends on the error kind; anything that goes
//! wrong after a successful fetch is logged per symbol and the tick still
//! completes.

use super::alerts::AlertEvaluator;
use super::coingecko::MarketFetcher;
use super::config::PipelineConfig;
use super::db::ObservationStore;
use super::error::{FetchError, SinkError, StoreError};
use super::retry::RetryBackoff;
use super::sink::AlertSink;
use super::types::{AlertEvent, Observation};
use super::windows::RollingWindowTracker;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration, Instant};

/// Timing knobs for the ingestion loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Target cadence between fetches
    pub fetch_interval: Duration,
    /// Pause after a rate-limited fetch
    pub rate_limit_backoff: Duration,
    /// Pause after a transient or unexpected fetch failure
    pub error_backoff: Duration,
    /// Upper bound on one fetch call
    pub fetch_timeout: Duration,
    /// Upper bound on one store append
    pub store_timeout: Duration,
    /// Upper bound on one alert sink write
    pub sink_timeout: Duration,
    /// Extra attempts for a failed append
    pub store_retry_attempts: u32,
    pub store_retry_delay: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            fetch_interval: config.fetch_interval(),
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            sink_timeout: Duration::from_millis(config.store_timeout_ms),
            store_retry_attempts: config.store_retry_attempts,
            store_retry_delay: Duration::from_millis(50),
        }
    }

    /// Backoff for a failed fetch, chosen by error kind
    pub fn backoff_for(&self, error: &FetchError) -> Duration {
        match error {
            FetchError::RateLimited(_) => self.rate_limit_backoff,
            FetchError::Transient(_) | FetchError::Unexpected(_) => self.error_backoff,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(60),
            error_backoff: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            sink_timeout: Duration::from_secs(5),
            store_retry_attempts: 2,
            store_retry_delay: Duration::from_millis(50),
        }
    }
}

/// Wall-clock aligned alert schedule
///
/// Checks fire on multiples of the interval since the Unix epoch (e.g.
/// :00, :05, :10 for five minutes), so restarts do not shift alert timing.
#[derive(Debug, Clone)]
pub struct AlertSchedule {
    interval: ChronoDuration,
    next_alert_time: DateTime<Utc>,
}

impl AlertSchedule {
    pub fn new(interval: ChronoDuration, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            next_alert_time: next_boundary(now, interval),
        }
    }

    pub fn next_alert_time(&self) -> DateTime<Utc> {
        self.next_alert_time
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_alert_time
    }

    /// Step forward by whole intervals until the next check is in the future
    ///
    /// A loop stalled across several boundaries performs one check, not a
    /// burst of catch-up checks.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.next_alert_time = self.next_alert_time + self.interval;
        while self.next_alert_time <= now {
            self.next_alert_time = self.next_alert_time + self.interval;
        }
    }
}

/// First multiple of `interval` (since the epoch) strictly after `now`
pub fn next_boundary(now: DateTime<Utc>, interval: ChronoDuration) -> DateTime<Utc> {
    let step = interval.num_milliseconds().max(1);
    let now_ms = now.timestamp_millis();
    let next_ms = (now_ms.div_euclid(step) + 1) * step;

    Utc.timestamp_millis_opt(next_ms)
        .single()
        .unwrap_or(now + interval)
}

/// Sleep that keeps the fetch cadence: `max(target - elapsed, 0)`
pub fn cadence_sleep(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

/// Per-tick counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub fetched: usize,
    pub stored: usize,
    pub store_failures: usize,
    pub alert_check: bool,
    pub alerts: usize,
    pub sink_failures: usize,
}

/// How a tick ended
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Fetch succeeded; sleep out the rest of the cadence
    Completed(TickReport),
    /// Fetch failed; sleep `delay` and start a fresh tick
    Backoff { kind: &'static str, delay: Duration },
}

/// Loop driver for fetch -> store -> window -> alert
pub struct IngestionLoop {
    fetcher: Arc<dyn MarketFetcher>,
    store: Arc<dyn ObservationStore>,
    sink: Arc<dyn AlertSink>,
    tracker: RollingWindowTracker,
    evaluator: AlertEvaluator,
    schedule: AlertSchedule,
    settings: LoopSettings,
    tracked_symbols: Vec<String>,
}

impl IngestionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn MarketFetcher>,
        store: Arc<dyn ObservationStore>,
        sink: Arc<dyn AlertSink>,
        tracker: RollingWindowTracker,
        evaluator: AlertEvaluator,
        schedule: AlertSchedule,
        settings: LoopSettings,
        tracked_symbols: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            sink,
            tracker,
            evaluator,
            schedule,
            settings,
            tracked_symbols,
        }
    }

    /// Build a loop from runtime config, with the alert schedule anchored at `now`
    pub fn from_config(
        config: &PipelineConfig,
        fetcher: Arc<dyn MarketFetcher>,
        store: Arc<dyn ObservationStore>,
        sink: Arc<dyn AlertSink>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            fetcher,
            store,
            sink,
            RollingWindowTracker::new(config.window_duration()),
            AlertEvaluator::new(config.alert_threshold_pct),
            AlertSchedule::new(config.alert_interval(), now),
            LoopSettings::from_config(config),
            config.tracked_symbols.clone(),
        )
    }

    pub fn tracker(&self) -> &RollingWindowTracker {
        &self.tracker
    }

    pub fn schedule(&self) -> &AlertSchedule {
        &self.schedule
    }

    /// Run ticks forever
    pub async fn run(mut self) {
        log::info!("🚀 Starting ingestion loop");
        log::info!("   ├─ Fetch interval: {}ms", self.settings.fetch_interval.as_millis());
        log::info!("   ├─ Alert threshold: {}%", self.evaluator.threshold_pct());
        log::info!("   ├─ Window: {}s", self.tracker.window_duration().num_seconds());
        log::info!("   └─ Next alert check: {} UTC", self.schedule.next_alert_time());

        loop {
            let tick_start = Instant::now();

            match self.run_tick(Utc::now()).await {
                TickOutcome::Backoff { kind, delay } => {
                    log::warn!("⏳ Fetch failed ({}), backing off {}s", kind, delay.as_secs());
                    sleep(delay).await;
                    continue;
                }
                TickOutcome::Completed(report) => {
                    if report.store_failures > 0 || report.sink_failures > 0 {
                        log::warn!(
                            "⚠️  Tick completed with {} store / {} sink failures",
                            report.store_failures,
                            report.sink_failures
                        );
                    }
                }
            }

            let elapsed = tick_start.elapsed();
            let pause = cadence_sleep(self.settings.fetch_interval, elapsed);
            if pause.is_zero() {
                log::debug!("Tick overran cadence by {}ms", (elapsed - self.settings.fetch_interval).as_millis());
            }
            sleep(pause).await;
        }
    }

    /// Execute one tick at tick time `now`
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        // Fetching
        let observations = match self.fetch().await {
            Ok(observations) => observations,
            Err(e) => {
                log::error!("❌ {}", e);
                return TickOutcome::Backoff {
                    kind: e.kind(),
                    delay: self.settings.backoff_for(&e),
                };
            }
        };

        let mut report = TickReport {
            fetched: observations.len(),
            ..TickReport::default()
        };

        // Storing + WindowUpdate
        for observation in observations {
            match self.store_with_retry(&observation).await {
                Ok(()) => {
                    report.stored += 1;
                    log::debug!(
                        "Inserted data for {} at {} UTC",
                        observation.symbol,
                        observation.timestamp
                    );
                }
                Err(e) => {
                    report.store_failures += 1;
                    log::error!("❌ Failed to store {} observation: {}", observation.symbol, e);
                }
            }

            let symbol = observation.symbol.clone();
            self.tracker.record(&symbol, observation);
        }

        // AlertCheck
        if self.schedule.is_due(now) {
            report.alert_check = true;
            log::info!("🔎 Performing alert checks at {} UTC", now);

            let (alerts, sink_failures) = self.check_alerts().await;
            report.alerts = alerts;
            report.sink_failures = sink_failures;

            self.schedule.advance(now);
            log::info!("   └─ Next alert check scheduled at {} UTC", self.schedule.next_alert_time());
        }

        TickOutcome::Completed(report)
    }

    async fn fetch(&self) -> Result<Vec<Observation>, FetchError> {
        match timeout(self.settings.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transient(format!(
                "fetch timed out after {}ms",
                self.settings.fetch_timeout.as_millis()
            ))),
        }
    }

    async fn store_with_retry(&self, observation: &Observation) -> Result<(), StoreError> {
        let mut backoff = RetryBackoff::new(
            self.settings.store_retry_delay,
            self.settings.store_retry_delay * 4,
            self.settings.store_retry_attempts,
        );

        loop {
            let attempt = match timeout(self.settings.store_timeout, self.store.append(observation)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::WriteFailed(format!(
                    "insert timed out after {}ms",
                    self.settings.store_timeout.as_millis()
                ))),
            };

            match attempt {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                    log::debug!("Retrying insert for {}: {}", observation.symbol, e);
                }
            }
        }
    }

    /// Evaluate every configured or observed symbol and persist the alerts
    ///
    /// Returns (alerts raised, sink failures).
    async fn check_alerts(&self) -> (usize, usize) {
        let mut symbols = self.tracked_symbols.clone();
        for symbol in self.tracker.symbols() {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        let mut raised = 0;
        let mut sink_failures = 0;

        for symbol in &symbols {
            let Some(latest) = self.tracker.window(symbol).and_then(|w| w.latest()) else {
                log::warn!("⚠️  No data available for {} to perform alert checks (insufficient data)", symbol);
                continue;
            };
            let window = self.tracker.snapshot(symbol);

            for event in self.evaluator.evaluate(symbol, &window, latest) {
                raised += 1;
                log::warn!("🚨 {}", event.message);

                if let Err(e) = self.write_alert(&event).await {
                    sink_failures += 1;
                    log::error!("❌ Failed to write alert to {} sink: {}", self.sink.backend_type(), e);
                }
            }
        }

        (raised, sink_failures)
    }

    async fn write_alert(&self, event: &AlertEvent) -> Result<(), SinkError> {
        match timeout(self.settings.sink_timeout, self.sink.append(event)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::WriteFailed(format!(
                "alert write timed out after {}ms",
                self.settings.sink_timeout.as_millis()
            ))),
        }
    }
}
