use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::debug;

/// A single sampled metric value. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricPoint {
    pub timestamp: SystemTime,
    pub value: f64,
}

/// An insertion-ordered, bounded sequence of metric points for one stream.
///
/// Points arrive in timestamp order (the API never produces out-of-order
/// points within one entity's stream); the bound is applied by the owning
/// [`HistoryStore`], never by the series itself.
#[derive(Debug, Clone, Default)]
pub struct MetricSeries {
    points: VecDeque<MetricPoint>,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate points in insertion order.
    pub fn points(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }

    /// The values in insertion order, ready for a chart dataset.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn latest(&self) -> Option<&MetricPoint> {
        self.points.back()
    }

    fn push(&mut self, point: MetricPoint) {
        self.points.push_back(point);
    }

    fn pop_oldest(&mut self) {
        self.points.pop_front();
    }

    fn retain_since(&mut self, cutoff: SystemTime) {
        while let Some(front) = self.points.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.points.pop_front();
        }
    }

    fn clear(&mut self) {
        self.points.clear();
    }
}

/// The four correlated metric streams of one monitored entity.
///
/// All four series always have equal length; appends and retention run in
/// lockstep across them.
#[derive(Debug, Clone, Default)]
pub struct EntityHistory {
    pub cpu: MetricSeries,
    pub memory: MetricSeries,
    pub net_rx: MetricSeries,
    pub net_tx: MetricSeries,
}

impl EntityHistory {
    /// Number of points per series (identical across all four).
    pub fn len(&self) -> usize {
        self.cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
    }

    fn push(&mut self, timestamp: SystemTime, cpu: f64, memory: f64, rx: f64, tx: f64) {
        self.cpu.push(MetricPoint {
            timestamp,
            value: cpu,
        });
        self.memory.push(MetricPoint {
            timestamp,
            value: memory,
        });
        self.net_rx.push(MetricPoint {
            timestamp,
            value: rx,
        });
        self.net_tx.push(MetricPoint {
            timestamp,
            value: tx,
        });
    }

    fn pop_oldest(&mut self) {
        self.cpu.pop_oldest();
        self.memory.pop_oldest();
        self.net_rx.pop_oldest();
        self.net_tx.pop_oldest();
    }

    fn retain_since(&mut self, cutoff: SystemTime) {
        self.cpu.retain_since(cutoff);
        self.memory.retain_since(cutoff);
        self.net_rx.retain_since(cutoff);
        self.net_tx.retain_since(cutoff);
    }

    fn clear(&mut self) {
        self.cpu.clear();
        self.memory.clear();
        self.net_rx.clear();
        self.net_tx.clear();
    }
}

/// Selectable time window for window-bounded retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum RetentionWindow {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl RetentionWindow {
    pub fn duration(&self) -> Duration {
        match self {
            Self::OneHour => Duration::from_secs(3600),
            Self::SixHours => Duration::from_secs(6 * 3600),
            Self::TwelveHours => Duration::from_secs(12 * 3600),
            Self::OneDay => Duration::from_secs(24 * 3600),
            Self::SevenDays => Duration::from_secs(7 * 24 * 3600),
        }
    }

    /// The wire form used in `?window=` query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "24h",
            Self::SevenDays => "7d",
        }
    }
}

/// Retention policy bounding every series in a store. Exactly one mode is
/// active per store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep at most `max_points` points per series.
    Count { max_points: usize },
    /// Keep only points younger than `window` relative to the latest append.
    Window { window: RetentionWindow },
}

/// Rolling metric history for all monitored entities.
///
/// Entities are created lazily on first append and never removed; an entity
/// that disappears from the listing simply stops receiving updates.
#[derive(Debug)]
pub struct HistoryStore {
    entities: HashMap<String, EntityHistory>,
    retention: Retention,
}

impl HistoryStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            entities: HashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Append one point to each of the four series for `id`, then apply
    /// retention in lockstep. Non-finite values are coerced to 0 so chart
    /// rendering never sees NaN.
    pub fn append(
        &mut self,
        id: &str,
        timestamp: SystemTime,
        cpu_pct: f64,
        mem_pct: f64,
        rx_bytes: f64,
        tx_bytes: f64,
    ) {
        let history = self.entities.entry(id.to_string()).or_default();

        history.push(
            timestamp,
            sanitize(cpu_pct),
            sanitize(mem_pct),
            sanitize(rx_bytes),
            sanitize(tx_bytes),
        );

        match self.retention {
            Retention::Count { max_points } => {
                while history.len() > max_points {
                    history.pop_oldest();
                }
            }
            Retention::Window { window } => {
                if let Some(cutoff) = timestamp.checked_sub(window.duration()) {
                    history.retain_since(cutoff);
                }
            }
        }
    }

    /// A read-only copy of one entity's history, if it has ever been seen.
    pub fn snapshot(&self, id: &str) -> Option<EntityHistory> {
        self.entities.get(id).cloned()
    }

    /// Empty all four series for `id` without removing the entity. The
    /// render boundary uses this to distinguish "no data yet" from
    /// "entity gone".
    pub fn clear(&mut self, id: &str) {
        if let Some(history) = self.entities.get_mut(id) {
            history.clear();
        }
    }

    /// Switch to window-bounded retention with the given window and
    /// re-filter existing points against the current time. Narrowing the
    /// window shrinks every series; it never discards whole histories.
    pub fn set_window(&mut self, window: RetentionWindow) {
        self.retention = Retention::Window { window };

        let Some(cutoff) = SystemTime::now().checked_sub(window.duration()) else {
            return;
        };

        for (id, history) in &mut self.entities {
            let before = history.len();
            history.retain_since(cutoff);
            if history.len() < before {
                debug!(
                    entity = %id,
                    dropped = before - history.len(),
                    window = window.as_str(),
                    "re-filtered history for new window",
                );
            }
        }
    }
}

/// Coerce a possibly missing or non-numeric API value to something a chart
/// can render.
fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn count_store(max_points: usize) -> HistoryStore {
        HistoryStore::new(Retention::Count { max_points })
    }

    #[test]
    fn test_append_creates_entity_lazily() {
        let mut store = count_store(20);
        assert!(store.snapshot("c1").is_none());

        store.append("c1", at(0), 10.0, 40.0, 100.0, 200.0);

        let history = store.snapshot("c1").expect("entity exists");
        assert_eq!(history.len(), 1);
        assert_eq!(history.cpu.values(), vec![10.0]);
        assert_eq!(history.memory.values(), vec![40.0]);
        assert_eq!(history.net_rx.values(), vec![100.0]);
        assert_eq!(history.net_tx.values(), vec![200.0]);
    }

    #[test]
    fn test_four_series_stay_in_lockstep() {
        let mut store = count_store(5);
        for i in 0..37 {
            store.append("c1", at(i), i as f64, 0.0, 0.0, 0.0);
        }

        let history = store.snapshot("c1").expect("entity exists");
        assert_eq!(history.cpu.len(), history.memory.len());
        assert_eq!(history.cpu.len(), history.net_rx.len());
        assert_eq!(history.cpu.len(), history.net_tx.len());
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn test_count_retention_keeps_most_recent_twenty() {
        let mut store = count_store(20);
        for i in 1..=25 {
            store.append("c1", at(i), i as f64, 0.0, 0.0, 0.0);
        }

        let history = store.snapshot("c1").expect("entity exists");
        assert_eq!(history.len(), 20);
        // Points 6..=25 survive, in insertion order.
        let expected: Vec<f64> = (6..=25).map(|i| i as f64).collect();
        assert_eq!(history.cpu.values(), expected);
    }

    #[test]
    fn test_window_retention_bounds_age_at_every_append() {
        let window = RetentionWindow::OneHour;
        let mut store = HistoryStore::new(Retention::Window { window });

        // One point every 10 minutes for 2 hours.
        for i in 0..=12 {
            store.append("c1", at(i * 600), i as f64, 0.0, 0.0, 0.0);

            let history = store.snapshot("c1").expect("entity exists");
            let now = at(i * 600);
            for point in history.cpu.points() {
                let age = now
                    .duration_since(point.timestamp)
                    .expect("points are not newer than the append");
                assert!(age <= window.duration(), "point older than window");
            }
        }

        // 1h window at 10-minute cadence holds the last 7 points (0..=60min).
        let history = store.snapshot("c1").expect("entity exists");
        assert_eq!(history.len(), 7);
    }

    #[test]
    fn test_set_window_narrowing_strictly_shrinks() {
        let mut store = HistoryStore::new(Retention::Window {
            window: RetentionWindow::SixHours,
        });

        let now = SystemTime::now();
        // Points 5h, 3h, 30m and 5m old: all inside 6h, two inside 1h.
        for age_secs in [5 * 3600, 3 * 3600, 1800, 300] {
            let ts = now - Duration::from_secs(age_secs);
            store.append("c1", ts, 1.0, 1.0, 1.0, 1.0);
        }
        assert_eq!(store.snapshot("c1").expect("entity exists").len(), 4);

        store.set_window(RetentionWindow::OneHour);

        let history = store.snapshot("c1").expect("entity exists");
        assert_eq!(history.len(), 2);
        assert_eq!(history.cpu.len(), history.net_tx.len());
        assert_eq!(
            store.retention(),
            Retention::Window {
                window: RetentionWindow::OneHour,
            }
        );
    }

    #[test]
    fn test_clear_empties_series_but_keeps_entity() {
        let mut store = count_store(20);
        store.append("c1", at(0), 10.0, 20.0, 30.0, 40.0);

        store.clear("c1");

        let history = store.snapshot("c1").expect("entity still present");
        assert!(history.is_empty());
        assert!(history.net_rx.is_empty());
    }

    #[test]
    fn test_clear_unknown_entity_is_noop() {
        let mut store = count_store(20);
        store.clear("ghost");
        assert!(store.snapshot("ghost").is_none());
    }

    #[test]
    fn test_non_finite_values_coerce_to_zero() {
        let mut store = count_store(20);
        store.append("c1", at(0), f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 5.0);

        let history = store.snapshot("c1").expect("entity exists");
        assert_eq!(history.cpu.values(), vec![0.0]);
        assert_eq!(history.memory.values(), vec![0.0]);
        assert_eq!(history.net_rx.values(), vec![0.0]);
        assert_eq!(history.net_tx.values(), vec![5.0]);
    }

    #[test]
    fn test_entities_are_independent() {
        let mut store = count_store(2);
        store.append("c1", at(0), 1.0, 0.0, 0.0, 0.0);
        store.append("c1", at(1), 2.0, 0.0, 0.0, 0.0);
        store.append("c1", at(2), 3.0, 0.0, 0.0, 0.0);
        store.append("c2", at(2), 9.0, 0.0, 0.0, 0.0);

        assert_eq!(
            store.snapshot("c1").expect("c1 exists").cpu.values(),
            vec![2.0, 3.0]
        );
        assert_eq!(
            store.snapshot("c2").expect("c2 exists").cpu.values(),
            vec![9.0]
        );
    }

    #[test]
    fn test_window_durations() {
        assert_eq!(
            RetentionWindow::OneHour.duration(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            RetentionWindow::SevenDays.duration(),
            Duration::from_secs(604_800)
        );
        assert_eq!(RetentionWindow::OneDay.as_str(), "24h");
    }

    #[test]
    fn test_latest_returns_newest_point() {
        let mut store = count_store(20);
        store.append("c1", at(0), 1.0, 0.0, 0.0, 0.0);
        store.append("c1", at(1), 2.0, 0.0, 0.0, 0.0);

        let history = store.snapshot("c1").expect("entity exists");
        let latest = history.cpu.latest().expect("series non-empty");
        assert_eq!(latest.value, 2.0);
        assert_eq!(latest.timestamp, at(1));
    }
}
