//! RSSI smoothing for locate mode.
//!
//! Locate mode turns raw tag reads into a "warmer/colder" signal for the
//! operator. Raw RSSI is noisy and arrives far faster than a UI can usefully
//! render, so the smoother keeps a bounded history per session, computes
//! simple and recency-weighted averages on every observation, and emits at
//! most one update per minimum interval.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taglink_core::Epc;
use taglink_protocol::TagRecord;

/// One throttled locate update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateUpdate {
    /// EPC of the observed tag.
    pub epc: Epc,

    /// Raw RSSI of the latest observation, dBm.
    pub rssi_dbm: i8,

    /// Recency-weighted average over the history window.
    pub smoothed_dbm: f32,

    /// Simple average over the history window.
    pub average_dbm: f32,

    /// Antenna index of the latest observation, when reported.
    pub antenna: Option<u8>,

    /// When the latest observation was captured.
    pub timestamp: DateTime<Utc>,
}

/// Bounded RSSI history with throttled emission.
///
/// Created when locate mode starts and discarded when it ends; the history
/// never survives across locate sessions.
#[derive(Debug)]
pub struct LocateSmoother {
    history: VecDeque<i8>,
    depth: usize,
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl LocateSmoother {
    /// Create a smoother with the given history depth and emit interval.
    pub fn new(depth: usize, min_interval: Duration) -> Self {
        Self {
            history: VecDeque::with_capacity(depth),
            depth,
            min_interval,
            last_emit: None,
        }
    }

    /// Record an observation and possibly emit an update.
    ///
    /// Internal state advances on every call; the return value is `Some`
    /// only when the minimum interval since the last emission has passed.
    pub fn observe(&mut self, record: &TagRecord) -> Option<LocateUpdate> {
        self.observe_at(record, Instant::now())
    }

    /// [`observe`](Self::observe) with an explicit clock, for deterministic
    /// throttling tests.
    pub fn observe_at(&mut self, record: &TagRecord, now: Instant) -> Option<LocateUpdate> {
        if self.history.len() == self.depth {
            self.history.pop_front();
        }
        self.history.push_back(record.rssi_dbm);

        let average_dbm = self.simple_average();
        let smoothed_dbm = self.weighted_average();

        if let Some(last) = self.last_emit
            && now.duration_since(last) < self.min_interval
        {
            return None;
        }
        self.last_emit = Some(now);

        Some(LocateUpdate {
            epc: record.epc.clone(),
            rssi_dbm: record.rssi_dbm,
            smoothed_dbm,
            average_dbm,
            antenna: record.antenna,
            timestamp: record.timestamp,
        })
    }

    /// Drop all history and throttle state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_emit = None;
    }

    /// Number of samples currently held.
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Pick the strongest-signal record of a batch.
    ///
    /// In locate mode only the strongest tag of a parse batch is a
    /// candidate for emission.
    pub fn strongest(batch: &[TagRecord]) -> Option<&TagRecord> {
        batch.iter().max_by_key(|record| record.rssi_dbm)
    }

    fn simple_average(&self) -> f32 {
        let sum: i32 = self.history.iter().map(|&s| s as i32).sum();
        sum as f32 / self.history.len() as f32
    }

    /// Linear recency weighting: the newest sample gets weight `n`, the
    /// oldest weight 1.
    fn weighted_average(&self) -> f32 {
        let mut weighted_sum = 0i32;
        let mut weight_total = 0i32;
        for (index, &sample) in self.history.iter().enumerate() {
            let weight = index as i32 + 1;
            weighted_sum += sample as i32 * weight;
            weight_total += weight;
        }
        weighted_sum as f32 / weight_total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglink_core::constants::{DEFAULT_LOCATE_EMIT_INTERVAL_MS, DEFAULT_RSSI_HISTORY_DEPTH};
    use taglink_protocol::ReportMode;

    fn smoother() -> LocateSmoother {
        LocateSmoother::new(
            DEFAULT_RSSI_HISTORY_DEPTH,
            Duration::from_millis(DEFAULT_LOCATE_EMIT_INTERVAL_MS),
        )
    }

    fn record(rssi: i8) -> TagRecord {
        TagRecord {
            epc: Epc::new("E2801170000002").unwrap(),
            pc: 7 << 11,
            rssi_dbm: rssi,
            wideband_rssi: None,
            phase: None,
            antenna: Some(1),
            sequence: 0,
            timestamp: Utc::now(),
            mode: ReportMode::Compact,
        }
    }

    #[test]
    fn test_first_observation_emits() {
        let mut smoother = smoother();
        let update = smoother.observe_at(&record(-60), Instant::now()).unwrap();

        assert_eq!(update.rssi_dbm, -60);
        assert_eq!(update.average_dbm, -60.0);
        assert_eq!(update.smoothed_dbm, -60.0);
        assert_eq!(update.antenna, Some(1));
    }

    #[test]
    fn test_burst_within_interval_emits_once() {
        let mut smoother = smoother();
        let start = Instant::now();

        let mut emitted = 0;
        for i in 0..20 {
            let at = start + Duration::from_millis(i);
            if smoother.observe_at(&record(-60), at).is_some() {
                emitted += 1;
            }
        }

        assert_eq!(emitted, 1);
        // State kept advancing even while throttled
        assert_eq!(smoother.sample_count(), 10);
    }

    #[test]
    fn test_spaced_observations_each_emit() {
        let mut smoother = smoother();
        let start = Instant::now();

        let mut emitted = 0;
        for i in 0..5 {
            let at = start + Duration::from_millis(i * (DEFAULT_LOCATE_EMIT_INTERVAL_MS + 1));
            if smoother.observe_at(&record(-55), at).is_some() {
                emitted += 1;
            }
        }

        assert_eq!(emitted, 5);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut smoother = LocateSmoother::new(3, Duration::ZERO);
        let start = Instant::now();

        for (i, rssi) in [-90i8, -80, -70, -60].iter().enumerate() {
            smoother.observe_at(&record(*rssi), start + Duration::from_millis(i as u64));
        }

        assert_eq!(smoother.sample_count(), 3);
        // Oldest sample (-90) fell out: average over [-80, -70, -60]
        let update = smoother
            .observe_at(&record(-60), start + Duration::from_secs(1))
            .unwrap();
        // History now [-70, -60, -60]
        let expected = (-70.0 - 60.0 - 60.0) / 3.0;
        assert!((update.average_dbm - expected).abs() < f32::EPSILON);
    }

    #[test]
    fn test_weighted_average_favors_recent() {
        let mut smoother = LocateSmoother::new(10, Duration::ZERO);
        let start = Instant::now();

        // Weak history followed by a strong sample
        smoother.observe_at(&record(-90), start);
        smoother.observe_at(&record(-90), start + Duration::from_millis(60));
        let update = smoother
            .observe_at(&record(-40), start + Duration::from_millis(120))
            .unwrap();

        // weights 1,2,3 over [-90, -90, -40]
        let expected_weighted = (-90.0 * 1.0 + -90.0 * 2.0 + -40.0 * 3.0) / 6.0;
        let expected_simple = (-90.0 - 90.0 - 40.0) / 3.0;

        assert!((update.smoothed_dbm - expected_weighted).abs() < f32::EPSILON);
        assert!((update.average_dbm - expected_simple).abs() < f32::EPSILON);
        assert!(update.smoothed_dbm > update.average_dbm);
    }

    #[test]
    fn test_reset_clears_history_and_throttle() {
        let mut smoother = smoother();
        let start = Instant::now();

        smoother.observe_at(&record(-60), start);
        assert_eq!(smoother.sample_count(), 1);

        smoother.reset();
        assert_eq!(smoother.sample_count(), 0);

        // Emits again immediately after reset
        let update = smoother.observe_at(&record(-50), start + Duration::from_millis(1));
        assert!(update.is_some());
    }

    #[test]
    fn test_strongest_of_batch() {
        let batch = vec![record(-80), record(-45), record(-60)];
        let strongest = LocateSmoother::strongest(&batch).unwrap();
        assert_eq!(strongest.rssi_dbm, -45);

        assert!(LocateSmoother::strongest(&[]).is_none());
    }
}
