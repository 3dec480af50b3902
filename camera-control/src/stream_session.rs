use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Averages below this read as `0.00` on the two-decimal display.
const ZERO_THROUGHPUT_MBPS: f64 = 0.005;

/// Smoothed throughput of a session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Throughput {
    Unknown,
    Mbps(f64),
}

impl Throughput {
    pub fn mbps(self) -> Option<f64> {
        match self {
            Self::Unknown => None,
            Self::Mbps(value) => Some(value),
        }
    }

    /// Unknown counts as zero for stall detection.
    pub fn is_zero(self) -> bool {
        match self {
            Self::Unknown => true,
            Self::Mbps(value) => value < ZERO_THROUGHPUT_MBPS,
        }
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mbps(value) if !self.is_zero() => write!(f, "{value:.2} Mbps"),
            _ => f.write_str("-- Mbps"),
        }
    }
}

/// Fixed-capacity window of throughput samples, oldest evicted first.
#[derive(Clone, Debug)]
pub struct BitrateHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl BitrateHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, mbps: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(mbps);
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

#[derive(Clone, Copy, Debug)]
struct ByteSample {
    bytes: u64,
    at: Instant,
}

/// Parameters of the throughput estimator.
#[derive(Clone, Debug)]
pub struct SamplingConfig {
    pub history_len: usize,
    pub min_elapsed: Duration,
    pub max_mbps: f64,
    pub missing_stats_grace: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            history_len: 5,
            min_elapsed: Duration::from_secs(1),
            max_mbps: 100.0,
            missing_stats_grace: 3,
        }
    }
}

/// Measurement state of one playback session.
///
/// Created when playback starts and dropped at teardown. Restarts keep it,
/// so the history and counters survive a reload of the same source.
#[derive(Clone, Debug)]
pub struct StreamSession {
    config: SamplingConfig,
    history: BitrateHistory,
    baseline: Option<ByteSample>,
    last_average: Throughput,
    missing_stats: u32,
    pub(crate) consecutive_zero_samples: u32,
    pub(crate) restart_attempt: u32,
}

impl StreamSession {
    pub fn new(config: SamplingConfig) -> Self {
        let history = BitrateHistory::new(config.history_len);
        Self {
            config,
            history,
            baseline: None,
            last_average: Throughput::Unknown,
            missing_stats: 0,
            consecutive_zero_samples: 0,
            restart_attempt: 0,
        }
    }

    /// Applies one backend reading. `None` means the backend had no stats.
    pub fn record(&mut self, now: Instant, reading: Option<u64>) -> Throughput {
        let Some(bytes) = reading else {
            self.missing_stats = self.missing_stats.saturating_add(1);
            return self.throughput();
        };
        self.missing_stats = 0;

        let baseline = match self.baseline {
            Some(previous) if previous.bytes > 0 => previous,
            _ => {
                self.baseline = Some(ByteSample { bytes, at: now });
                return self.last_average;
            }
        };
        let elapsed = now.saturating_duration_since(baseline.at);
        if elapsed < self.config.min_elapsed {
            return self.last_average;
        }

        // A counter that went backwards belongs to a reloaded media.
        let delta = bytes.saturating_sub(baseline.bytes);
        let mbps = (delta as f64 * 8.0) / (elapsed.as_secs_f64() * 1_000_000.0);
        self.history.push(mbps);
        if let Some(average) = self.history.average() {
            self.last_average = Throughput::Mbps(average.clamp(0.0, self.config.max_mbps));
        }
        self.baseline = Some(ByteSample { bytes, at: now });
        self.last_average
    }

    /// Moving average, degraded to `Unknown` once stats have been missing
    /// for longer than the grace window.
    pub fn throughput(&self) -> Throughput {
        if self.missing_stats > self.config.missing_stats_grace {
            return Throughput::Unknown;
        }
        self.last_average
    }

    pub fn history(&self) -> &BitrateHistory {
        &self.history
    }

    pub fn missing_stats(&self) -> u32 {
        self.missing_stats
    }

    pub fn consecutive_zero_samples(&self) -> u32 {
        self.consecutive_zero_samples
    }

    pub fn restart_attempt(&self) -> u32 {
        self.restart_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new(SamplingConfig::default())
    }

    #[test]
    fn average_of_five_samples() {
        let mut history = BitrateHistory::new(5);
        for sample in [2.0, 4.0, 6.0, 8.0, 10.0] {
            history.push(sample);
        }
        assert_eq!(history.average(), Some(6.0));

        history.push(12.0);
        assert_eq!(history.len(), 5);
        assert_eq!(history.samples().collect::<Vec<_>>(), vec![4.0, 6.0, 8.0, 10.0, 12.0]);
        assert_eq!(history.average(), Some(8.0));
    }

    #[test]
    fn first_reading_only_sets_baseline() {
        let mut session = session();
        let start = Instant::now();
        assert_eq!(session.record(start, Some(1_000_000)), Throughput::Unknown);
        assert!(session.history().is_empty());
    }

    #[test]
    fn computes_megabits_per_second() {
        let mut session = session();
        let start = Instant::now();
        session.record(start, Some(1_000_000));
        let throughput = session.record(start + Duration::from_secs(2), Some(2_000_000));
        assert_eq!(throughput, Throughput::Mbps(4.0));
    }

    #[test]
    fn short_interval_is_not_a_sample() {
        let mut session = session();
        let start = Instant::now();
        session.record(start, Some(1_000_000));
        session.record(start + Duration::from_secs(1), Some(1_250_000));
        let throughput = session.record(start + Duration::from_millis(1500), Some(9_000_000));
        assert_eq!(throughput, Throughput::Mbps(2.0));
        assert_eq!(session.history().len(), 1);

        // The one-second baseline is still in place.
        let throughput = session.record(start + Duration::from_secs(2), Some(1_500_000));
        assert_eq!(throughput, Throughput::Mbps(2.0));
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn zero_byte_counter_is_not_a_baseline() {
        let mut session = session();
        let start = Instant::now();
        session.record(start, Some(0));
        session.record(start + Duration::from_secs(1), Some(500_000));
        assert!(session.history().is_empty());
    }

    #[test]
    fn counter_reset_reads_as_zero() {
        let mut session = session();
        let start = Instant::now();
        session.record(start, Some(5_000_000));
        let throughput = session.record(start + Duration::from_secs(1), Some(100));
        assert_eq!(throughput, Throughput::Mbps(0.0));
        assert!(throughput.is_zero());
    }

    #[test]
    fn average_is_clamped() {
        let mut session = session();
        let start = Instant::now();
        session.record(start, Some(1));
        let throughput = session.record(start + Duration::from_secs(1), Some(100_000_000));
        assert_eq!(throughput, Throughput::Mbps(100.0));
    }

    #[test]
    fn missing_stats_keep_last_value_for_three_misses() {
        let mut session = session();
        let start = Instant::now();
        session.record(start, Some(1_000_000));
        session.record(start + Duration::from_secs(1), Some(1_500_000));
        for _ in 0..3 {
            assert_eq!(session.record(start, None), Throughput::Mbps(4.0));
        }
        assert_eq!(session.record(start, None), Throughput::Unknown);
        assert_eq!(session.throughput(), Throughput::Unknown);

        session.record(start + Duration::from_secs(2), Some(2_000_000));
        assert_eq!(session.missing_stats(), 0);
        assert_eq!(session.throughput(), Throughput::Mbps(4.0));
    }

    #[test]
    fn display_uses_placeholder_for_zero() {
        assert_eq!(Throughput::Mbps(3.456).to_string(), "3.46 Mbps");
        assert_eq!(Throughput::Mbps(0.001).to_string(), "-- Mbps");
        assert_eq!(Throughput::Unknown.to_string(), "-- Mbps");
    }
}
