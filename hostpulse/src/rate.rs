use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// One unprocessed OS counter value and the moment it was captured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCounter {
    value: f64,
    at: Instant,
}

impl RawCounter {
    pub fn new(value: f64, at: Instant) -> Self {
        Self {
            value: value.max(0.0),
            at,
        }
    }

    pub fn from_bytes(bytes: u64, at: Instant) -> Self {
        Self::new(bytes as f64, at)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn at(&self) -> Instant {
        self.at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    System,
    Process(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    DiskRead,
    DiskWrite,
    NetReceived,
    NetTransmitted,
    ProcessIo,
    ProcessNet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub subject: Subject,
    pub metric: Metric,
}

impl CounterKey {
    pub fn system(metric: Metric) -> Self {
        Self {
            subject: Subject::System,
            metric,
        }
    }

    pub fn process(pid: u32, metric: Metric) -> Self {
        Self {
            subject: Subject::Process(pid),
            metric,
        }
    }
}

/// Per-second rate derived from two raw counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Rate {
    PerSecond(f64),
    #[default]
    Unavailable,
}

impl Rate {
    /// Rate between two observations. Counter resets and non-increasing
    /// timestamps yield zero, never a negative rate.
    pub fn between(previous: &RawCounter, current: &RawCounter) -> Self {
        let elapsed = current
            .at
            .checked_duration_since(previous.at)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        if elapsed <= 0.0 {
            return Rate::PerSecond(0.0);
        }

        let delta = current.value - previous.value;
        if delta <= 0.0 {
            return Rate::PerSecond(0.0);
        }

        Rate::PerSecond(delta / elapsed)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Rate::PerSecond(_))
    }

    pub fn per_second(&self) -> Option<f64> {
        match self {
            Rate::PerSecond(v) => Some(*v),
            Rate::Unavailable => None,
        }
    }

    pub fn or_zero(&self) -> f64 {
        self.per_second().unwrap_or(0.0)
    }
}

/// Previous raw counter per (subject, metric). Owned by exactly one sampler.
#[derive(Debug, Default)]
pub struct CounterStore {
    entries: HashMap<CounterKey, RawCounter>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `raw` for `key` and returns the rate against the entry it
    /// replaces. The first observation of a key has nothing to diff against.
    pub fn update(&mut self, key: CounterKey, raw: RawCounter) -> Rate {
        match self.entries.insert(key, raw) {
            Some(previous) => Rate::between(&previous, &raw),
            None => Rate::Unavailable,
        }
    }

    pub fn get(&self, key: &CounterKey) -> Option<&RawCounter> {
        self.entries.get(key)
    }

    pub fn contains_subject(&self, subject: Subject) -> bool {
        self.entries.keys().any(|k| k.subject == subject)
    }

    pub fn remove_subject(&mut self, subject: Subject) {
        self.entries.retain(|k, _| k.subject != subject);
    }

    /// Drops every process subject whose pid is not in `alive`.
    pub fn retain_processes(&mut self, alive: &HashSet<u32>) {
        self.entries.retain(|k, _| match k.subject {
            Subject::System => true,
            Subject::Process(pid) => alive.contains(&pid),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn test_first_observation_is_unavailable() {
        let mut store = CounterStore::new();
        let now = Instant::now();

        let rate = store.update(
            CounterKey::system(Metric::DiskRead),
            RawCounter::from_bytes(1000, now),
        );

        assert_eq!(rate, Rate::Unavailable);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_increasing_counters_give_delta_over_time() {
        let mut store = CounterStore::new();
        let key = CounterKey::system(Metric::NetReceived);
        let base = Instant::now();

        let samples = [(0.0, 100.0), (1.0, 1100.0), (3.0, 2100.0), (3.5, 2600.0)];
        let mut previous: Option<(f64, f64)> = None;

        for (secs, value) in samples {
            let rate = store.update(key, RawCounter::new(value, at(base, secs)));
            match previous {
                None => assert_eq!(rate, Rate::Unavailable),
                Some((prev_secs, prev_value)) => {
                    let expected = (value - prev_value) / (secs - prev_secs);
                    let got = rate.per_second().unwrap();
                    assert!(got >= 0.0);
                    assert!((got - expected).abs() < 1e-6, "got {got}, expected {expected}");
                }
            }
            previous = Some((secs, value));
        }
    }

    #[test]
    fn test_counter_reset_yields_zero() {
        let mut store = CounterStore::new();
        let key = CounterKey::process(42, Metric::ProcessIo);
        let base = Instant::now();

        store.update(key, RawCounter::new(5000.0, base));
        let rate = store.update(key, RawCounter::new(10.0, at(base, 1.0)));

        assert_eq!(rate, Rate::PerSecond(0.0));
    }

    #[test]
    fn test_zero_elapsed_yields_zero() {
        let base = Instant::now();
        let previous = RawCounter::new(10.0, base);
        let current = RawCounter::new(20.0, base);

        assert_eq!(Rate::between(&previous, &current), Rate::PerSecond(0.0));
    }

    #[test]
    fn test_backwards_timestamp_yields_zero() {
        let base = Instant::now();
        let previous = RawCounter::new(10.0, at(base, 2.0));
        let current = RawCounter::new(20.0, base);

        assert_eq!(Rate::between(&previous, &current), Rate::PerSecond(0.0));
    }

    #[test]
    fn test_update_replaces_entry() {
        let mut store = CounterStore::new();
        let key = CounterKey::system(Metric::DiskWrite);
        let base = Instant::now();

        store.update(key, RawCounter::new(1.0, base));
        store.update(key, RawCounter::new(7.0, at(base, 1.0)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().value(), 7.0);
    }

    #[test]
    fn test_negative_raw_value_is_clamped() {
        let counter = RawCounter::new(-5.0, Instant::now());
        assert_eq!(counter.value(), 0.0);
    }

    #[test]
    fn test_retain_processes_drops_exited() {
        let mut store = CounterStore::new();
        let now = Instant::now();

        store.update(CounterKey::system(Metric::DiskRead), RawCounter::new(1.0, now));
        store.update(CounterKey::process(1, Metric::ProcessIo), RawCounter::new(1.0, now));
        store.update(CounterKey::process(1, Metric::ProcessNet), RawCounter::new(1.0, now));
        store.update(CounterKey::process(2, Metric::ProcessIo), RawCounter::new(1.0, now));

        let alive: HashSet<u32> = [2].into_iter().collect();
        store.retain_processes(&alive);

        assert!(!store.contains_subject(Subject::Process(1)));
        assert!(store.contains_subject(Subject::Process(2)));
        assert!(store.contains_subject(Subject::System));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_subject() {
        let mut store = CounterStore::new();
        let now = Instant::now();

        store.update(CounterKey::process(9, Metric::ProcessIo), RawCounter::new(1.0, now));
        store.remove_subject(Subject::Process(9));

        assert!(store.is_empty());
    }

    #[test]
    fn test_rate_or_zero() {
        assert_eq!(Rate::Unavailable.or_zero(), 0.0);
        assert_eq!(Rate::PerSecond(3.5).or_zero(), 3.5);
        assert!(!Rate::Unavailable.is_available());
    }
}
