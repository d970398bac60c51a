//! Threshold alerts against the rolling-window average

use super::types::{AlertEvent, AlertKind, Observation};

/// Compares the latest observation to its window's average
pub struct AlertEvaluator {
    threshold_pct: f64,
}

impl AlertEvaluator {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    /// Evaluate one symbol's window
    ///
    /// # Alerts
    /// - **Price**: |latest.price - avg price| / avg price > threshold
    /// - **Volume**: same test on volume, independent of price
    ///
    /// Returns 0, 1 or 2 events. An empty window yields nothing. A zero
    /// average has no percentage baseline and never alerts.
    pub fn evaluate(&self, symbol: &str, window: &[Observation], latest: &Observation) -> Vec<AlertEvent> {
        if window.is_empty() {
            return Vec::new();
        }

        let count = window.len() as f64;
        let avg_price = window.iter().map(|o| o.price).sum::<f64>() / count;
        let avg_volume = window.iter().map(|o| o.volume).sum::<f64>() / count;

        let checks = [
            (AlertKind::Price, change_pct(latest.price, avg_price)),
            (AlertKind::Volume, change_pct(latest.volume, avg_volume)),
        ];

        let mut events = Vec::new();
        for (kind, change) in checks {
            match change {
                Some(pct) if pct > self.threshold_pct => {
                    events.push(AlertEvent::new(latest.timestamp, symbol, kind, pct));
                }
                Some(_) => {}
                None => {
                    log::debug!("{} {} average is zero, skipping", symbol, kind.metric());
                }
            }
        }

        events
    }
}

/// Absolute percentage change of `latest` from `average`
///
/// `None` when the average is zero (or not finite).
pub fn change_pct(latest: f64, average: f64) -> Option<f64> {
    if average == 0.0 || !average.is_finite() {
        return None;
    }
    Some((latest - average).abs() / average * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn obs(secs: i64, price: f64, volume: f64) -> Observation {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Observation::new(ts, "BTC", price, volume)
    }

    #[test]
    fn test_price_alert_at_three_percent() {
        let evaluator = AlertEvaluator::new(2.0);

        // average price 100, latest 103
        let window = vec![obs(0, 97.0, 50.0), obs(1, 100.0, 50.0), obs(2, 103.0, 50.0)];
        let latest = window.last().unwrap().clone();

        let events = evaluator.evaluate("BTC", &window, &latest);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlertKind::Price);
        assert_eq!(events[0].symbol, "BTC");
        assert!((events[0].observed_change_pct - 3.0).abs() < 1e-9);
        assert_eq!(events[0].timestamp, latest.timestamp);
        assert!(events[0].message.contains("changed by 3.00%"));
    }

    #[test]
    fn test_single_point_window_never_alerts() {
        let evaluator = AlertEvaluator::new(2.0);

        let window = vec![obs(0, 64_000.0, 1_000.0)];
        let events = evaluator.evaluate("BTC", &window, &window[0]);

        assert!(events.is_empty());
        assert_eq!(change_pct(64_000.0, 64_000.0), Some(0.0));
    }

    #[test]
    fn test_zero_volume_average_no_alert() {
        let evaluator = AlertEvaluator::new(2.0);

        let window = vec![obs(0, 100.0, 0.0), obs(1, 100.0, 0.0)];
        let latest = obs(2, 100.0, 5_000.0);

        let events = evaluator.evaluate("BTC", &window, &latest);
        assert!(events.is_empty());
    }

    #[test]
    fn test_price_and_volume_alert_together() {
        let evaluator = AlertEvaluator::new(2.0);

        let window = vec![obs(0, 100.0, 100.0), obs(1, 100.0, 100.0), obs(2, 112.0, 160.0)];
        let latest = window.last().unwrap().clone();

        let events = evaluator.evaluate("BTC", &window, &latest);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AlertKind::Price);
        assert_eq!(events[1].kind, AlertKind::Volume);
        // price avg 104 -> 7.69%, volume avg 120 -> 33.33%
        assert!((events[0].observed_change_pct - 800.0 / 104.0).abs() < 1e-9);
        assert!((events[1].observed_change_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_change_at_threshold_does_not_alert() {
        let evaluator = AlertEvaluator::new(50.0);

        // avg 100, latest 150 -> exactly 50%
        let window = vec![obs(0, 50.0, 1.0), obs(1, 150.0, 1.0)];
        let events = evaluator.evaluate("BTC", &window, &window[1]);

        assert!(events.is_empty());
    }

    #[test]
    fn test_drop_below_average_alerts() {
        let evaluator = AlertEvaluator::new(2.0);

        let window = vec![obs(0, 100.0, 10.0), obs(1, 100.0, 10.0), obs(2, 91.0, 10.0)];
        let events = evaluator.evaluate("BTC", &window, &window[2]);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlertKind::Price);
    }

    #[test]
    fn test_empty_window_skipped() {
        let evaluator = AlertEvaluator::new(2.0);
        let latest = obs(0, 100.0, 10.0);

        assert!(evaluator.evaluate("BTC", &[], &latest).is_empty());
    }
}
