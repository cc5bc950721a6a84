use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

/// Chart-worthy system metrics kept in rolling history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMetric {
    CpuPercent,
    CoreCpuPercent(usize),
    MemoryPercent,
    /// Disk read + write, bytes per second.
    DiskRate,
    /// Network received + transmitted, bytes per second.
    NetworkRate,
}

impl fmt::Display for HistoryMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryMetric::CpuPercent => write!(f, "cpu_percent"),
            HistoryMetric::CoreCpuPercent(core) => write!(f, "core{core}_cpu_percent"),
            HistoryMetric::MemoryPercent => write!(f, "memory_percent"),
            HistoryMetric::DiskRate => write!(f, "disk_rate"),
            HistoryMetric::NetworkRate => write!(f, "network_rate"),
        }
    }
}

/// Fixed-capacity FIFO of scalar samples, pre-filled with a baseline so it
/// always holds exactly `capacity` values.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingHistory {
    pub fn new(capacity: usize) -> Self {
        Self::with_baseline(capacity, 0.0)
    }

    pub fn with_baseline(capacity: usize, baseline: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: std::iter::repeat(baseline).take(capacity).collect(),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn latest(&self) -> f64 {
        self.values.back().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Rolling history for every charted metric, shared between the system
/// sampler (writer) and consumers (readers).
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    series: RwLock<HashMap<HistoryMetric, RollingHistory>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, metric: HistoryMetric, value: f64) {
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        series
            .entry(metric)
            .or_insert_with(|| RollingHistory::new(self.capacity))
            .push(value);
    }

    /// Appends a batch under a single write lock so readers never see a
    /// half-applied tick.
    pub fn append_all<I>(&self, samples: I)
    where
        I: IntoIterator<Item = (HistoryMetric, f64)>,
    {
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        for (metric, value) in samples {
            series
                .entry(metric)
                .or_insert_with(|| RollingHistory::new(self.capacity))
                .push(value);
        }
    }

    /// Copy of the series, oldest first. Metrics that never received data
    /// return the zero baseline.
    pub fn snapshot(&self, metric: HistoryMetric) -> Vec<f64> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        match series.get(&metric) {
            Some(history) => history.to_vec(),
            None => vec![0.0; self.capacity],
        }
    }

    pub fn metrics(&self) -> Vec<HistoryMetric> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut metrics: Vec<HistoryMetric> = series.keys().copied().collect();
        metrics.sort();
        metrics
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_history_is_prefilled() {
        let history = RollingHistory::new(5);

        assert_eq!(history.len(), 5);
        assert_eq!(history.to_vec(), vec![0.0; 5]);
    }

    #[test]
    fn test_push_keeps_length_constant() {
        let mut history = RollingHistory::new(3);

        for i in 0..10 {
            history.push(i as f64);
            assert_eq!(history.len(), 3);
        }

        assert_eq!(history.to_vec(), vec![7.0, 8.0, 9.0]);
        assert_eq!(history.latest(), 9.0);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut history = RollingHistory::new(4);
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.push(v);
        }

        history.push(5.0);

        let values = history.to_vec();
        assert!(!values.contains(&1.0));
        assert_eq!(values, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let history = RollingHistory::new(0);
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_store_unknown_metric_returns_baseline() {
        let store = HistoryStore::new(8);
        assert_eq!(store.snapshot(HistoryMetric::DiskRate), vec![0.0; 8]);
        assert!(store.metrics().is_empty());
    }

    #[test]
    fn test_store_partial_fill_is_padded() {
        let store = HistoryStore::new(4);
        store.append(HistoryMetric::CpuPercent, 10.0);
        store.append(HistoryMetric::CpuPercent, 20.0);

        assert_eq!(
            store.snapshot(HistoryMetric::CpuPercent),
            vec![0.0, 0.0, 10.0, 20.0]
        );
    }

    #[test]
    fn test_store_snapshot_is_a_copy() {
        let store = HistoryStore::new(2);
        store.append(HistoryMetric::MemoryPercent, 1.0);

        let before = store.snapshot(HistoryMetric::MemoryPercent);
        store.append(HistoryMetric::MemoryPercent, 2.0);

        assert_eq!(before, vec![0.0, 1.0]);
        assert_eq!(store.snapshot(HistoryMetric::MemoryPercent), vec![1.0, 2.0]);
    }

    #[test]
    fn test_store_append_all() {
        let store = HistoryStore::new(2);
        store.append_all([
            (HistoryMetric::CpuPercent, 5.0),
            (HistoryMetric::CoreCpuPercent(1), 6.0),
        ]);

        assert_eq!(
            store.metrics(),
            vec![HistoryMetric::CpuPercent, HistoryMetric::CoreCpuPercent(1)]
        );
        assert_eq!(store.snapshot(HistoryMetric::CoreCpuPercent(1)), vec![0.0, 6.0]);
    }

    #[test]
    fn test_concurrent_append_and_snapshot() {
        let store = Arc::new(HistoryStore::new(16));
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    store.append(HistoryMetric::NetworkRate, i as f64);
                }
            })
        };

        for _ in 0..100 {
            assert_eq!(store.snapshot(HistoryMetric::NetworkRate).len(), 16);
        }

        writer.join().unwrap();
        assert_eq!(store.snapshot(HistoryMetric::NetworkRate).last(), Some(&999.0));
    }

    #[test]
    fn test_metric_display() {
        assert_eq!(HistoryMetric::CoreCpuPercent(3).to_string(), "core3_cpu_percent");
        assert_eq!(HistoryMetric::DiskRate.to_string(), "disk_rate");
    }
}
