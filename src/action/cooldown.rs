//! Per-action cooldowns and their on-disk snapshot.
//!
//! [`CooldownTracker`] is a pure function of the last execution time, the
//! cooldown length and "now". [`CooldownRecord`] is the persisted form; a
//! record whose end time has passed is cleared before it reports ready.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SnapshotError;

/// Minutes between `since` and `now`, negative if `since` is in the future.
pub fn elapsed_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since).num_milliseconds() as f64 / 60_000.0
}

/// Longest cooldown accepted: ten years, in minutes. Longer values are clamped.
pub const MAX_COOLDOWN_MINUTES: f64 = 60.0 * 24.0 * 365.0 * 10.0;

fn clamp_cooldown(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_COOLDOWN_MINUTES)
}

fn minutes(value: f64) -> Option<Duration> {
    Duration::try_milliseconds((value * 60_000.0).round() as i64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CooldownTracker {
    cooldown_minutes: f64,
    last_execution: Option<DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new(cooldown_minutes: f64) -> Self {
        Self {
            cooldown_minutes: clamp_cooldown(cooldown_minutes),
            last_execution: None,
        }
    }

    pub fn cooldown_minutes(&self) -> f64 {
        self.cooldown_minutes
    }

    pub fn set_cooldown_minutes(&mut self, cooldown_minutes: f64) {
        self.cooldown_minutes = clamp_cooldown(cooldown_minutes);
    }

    pub fn last_execution(&self) -> Option<DateTime<Utc>> {
        self.last_execution
    }

    pub fn mark_executed(&mut self, at: DateTime<Utc>) {
        self.last_execution = Some(at);
    }

    /// `elapsed < cooldown`; never on cooldown before the first execution.
    pub fn is_on_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_execution {
            Some(last) => elapsed_minutes(last, now) < self.cooldown_minutes,
            None => false,
        }
    }

    /// `max(0, cooldown - elapsed)` in minutes.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> f64 {
        match self.last_execution {
            Some(last) => (self.cooldown_minutes - elapsed_minutes(last, now)).max(0.0),
            None => 0.0,
        }
    }

    pub fn record(&self, now: DateTime<Utc>) -> CooldownRecord {
        let mut record = match self.last_execution {
            Some(start) => {
                let end = minutes(self.cooldown_minutes)
                    .and_then(|length| start.checked_add_signed(length))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                CooldownRecord::active(start, end)
            }
            None => CooldownRecord::inactive(),
        };
        record.settle(now);
        record
    }

    /// Re-anchor the last execution so the cooldown ends at the record's end
    /// time. Expired or inactive records leave the tracker ready.
    pub fn restore(&mut self, record: &CooldownRecord, now: DateTime<Utc>) {
        let mut record = record.clone();
        record.settle(now);
        self.last_execution = match (record.is_active, record.end_time) {
            (true, Some(end)) => Some(
                minutes(self.cooldown_minutes)
                    .and_then(|length| end.checked_sub_signed(length))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            _ => None,
        };
    }
}

/// Persisted cooldown state of one action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub is_active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CooldownRecord {
    pub fn inactive() -> Self {
        Self::default()
    }

    /// An active record; collapses to inactive unless `end > start`.
    pub fn active(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end <= start {
            return Self::inactive();
        }
        Self {
            is_active: true,
            start_time: Some(start),
            end_time: Some(end),
        }
    }

    /// Clear the record once `now >= end`. Returns whether it was cleared.
    pub fn settle(&mut self, now: DateTime<Utc>) -> bool {
        let expired = match (self.is_active, self.end_time) {
            (true, Some(end)) => now >= end,
            // Active without an end time cannot be honoured.
            (true, None) => true,
            (false, _) => self.start_time.is_some() || self.end_time.is_some(),
        };
        if expired {
            *self = Self::inactive();
        }
        expired
    }

    pub fn is_ready(&mut self, now: DateTime<Utc>) -> bool {
        self.settle(now);
        !self.is_active
    }

    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> f64 {
        match (self.is_active, self.end_time) {
            (true, Some(end)) => elapsed_minutes(now, end).max(0.0),
            _ => 0.0,
        }
    }
}

/// Cooldown records keyed by action key, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CooldownSnapshot {
    pub records: BTreeMap<String, CooldownRecord>,
}

impl CooldownSnapshot {
    pub fn insert(&mut self, key: impl Into<String>, record: CooldownRecord) {
        self.records.insert(key.into(), record);
    }

    pub fn get(&self, key: &str) -> Option<&CooldownRecord> {
        self.records.get(key)
    }

    pub fn settle_all(&mut self, now: DateTime<Utc>) {
        for record in self.records.values_mut() {
            record.settle(now);
        }
    }

    /// Read a snapshot; a missing file yields an empty snapshot.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cooldown snapshot, starting fresh");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn never_executed_is_ready() {
        let tracker = CooldownTracker::new(30.0);
        assert!(!tracker.is_on_cooldown(at(0)));
        assert_eq!(tracker.remaining_minutes(at(0)), 0.0);
        assert_eq!(tracker.record(at(0)), CooldownRecord::inactive());
    }

    #[test]
    fn on_cooldown_iff_elapsed_below_cooldown() {
        let mut tracker = CooldownTracker::new(30.0);
        tracker.mark_executed(at(0));

        assert!(tracker.is_on_cooldown(at(29)));
        assert!(!tracker.is_on_cooldown(at(30)));
        assert!(!tracker.is_on_cooldown(at(45)));
    }

    #[test]
    fn remaining_is_non_increasing_and_stays_zero() {
        let mut tracker = CooldownTracker::new(10.0);
        tracker.mark_executed(at(0));

        let samples: Vec<f64> = (0..=20).map(|m| tracker.remaining_minutes(at(m))).collect();
        assert_eq!(samples[0], 10.0);
        assert!(samples.windows(2).all(|w| w[1] <= w[0]));
        assert!(samples[10..].iter().all(|r| *r == 0.0));
    }

    #[test]
    fn zero_cooldown_is_never_active() {
        let mut tracker = CooldownTracker::new(0.0);
        tracker.mark_executed(at(0));
        assert!(!tracker.is_on_cooldown(at(0)));
        assert!(!tracker.record(at(0)).is_active);
    }

    #[test]
    fn oversized_cooldown_is_clamped() {
        let mut tracker = CooldownTracker::new(1e12);
        assert_eq!(tracker.cooldown_minutes(), MAX_COOLDOWN_MINUTES);
        tracker.mark_executed(at(0));

        let record = tracker.record(at(1));
        assert!(record.is_active);
        assert!(record.end_time.unwrap() > at(0) + Duration::days(3650 - 1));

        let mut reloaded = CooldownTracker::new(f64::INFINITY);
        reloaded.restore(&record, at(2));
        assert_eq!(reloaded.last_execution(), Some(at(0)));
        assert!(reloaded.is_on_cooldown(at(2)));
    }

    #[test]
    fn record_near_the_end_of_time_does_not_overflow() {
        let mut tracker = CooldownTracker::new(MAX_COOLDOWN_MINUTES);
        let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        tracker.mark_executed(late);
        let record = tracker.record(late);
        assert_eq!(record.end_time, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn record_clears_once_end_has_passed() {
        let mut record = CooldownRecord::active(at(0), at(30));
        assert!(!record.is_ready(at(10)));
        assert_eq!(record.remaining_minutes(at(10)), 20.0);

        assert!(record.is_ready(at(30)));
        assert_eq!(record, CooldownRecord::inactive());
    }

    #[test]
    fn inverted_record_collapses_to_inactive() {
        assert_eq!(CooldownRecord::active(at(5), at(5)), CooldownRecord::inactive());
    }

    #[test]
    fn restore_reproduces_remaining_time() {
        let mut original = CooldownTracker::new(30.0);
        original.mark_executed(at(0));
        let saved = original.record(at(5));

        let mut reloaded = CooldownTracker::new(30.0);
        reloaded.restore(&saved, at(12));

        assert!(reloaded.is_on_cooldown(at(12)));
        assert_eq!(reloaded.remaining_minutes(at(12)), original.remaining_minutes(at(12)));
        assert_eq!(reloaded.last_execution(), Some(at(0)));
    }

    #[test]
    fn restore_of_expired_record_leaves_tracker_ready() {
        let mut tracker = CooldownTracker::new(30.0);
        tracker.restore(&CooldownRecord::active(at(0), at(30)), at(31));
        assert!(!tracker.is_on_cooldown(at(31)));
        assert_eq!(tracker.last_execution(), None);
    }

    #[test]
    fn snapshot_survives_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cooldowns.json");

        let mut tracker = CooldownTracker::new(60.0);
        tracker.mark_executed(at(0));
        let mut snapshot = CooldownSnapshot::default();
        snapshot.insert("gather_resources", tracker.record(at(1)));
        snapshot.insert("open_mails", CooldownRecord::inactive());
        snapshot.save(&path).unwrap();

        let loaded = CooldownSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);

        let mut restored = CooldownTracker::new(60.0);
        restored.restore(loaded.get("gather_resources").unwrap(), at(40));
        assert_eq!(restored.remaining_minutes(at(40)), 20.0);
    }

    #[test]
    fn snapshot_json_uses_iso_timestamps() {
        let mut snapshot = CooldownSnapshot::default();
        snapshot.insert("a", CooldownRecord::active(at(0), at(30)));
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"a\":{\"is_active\":true"));
        assert!(json.contains("2024-05-01T12:30:00Z"));
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CooldownSnapshot::load(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.records.is_empty());
    }

    #[test]
    fn settle_all_clears_expired_records() {
        let mut snapshot = CooldownSnapshot::default();
        snapshot.insert("done", CooldownRecord::active(at(0), at(10)));
        snapshot.insert("busy", CooldownRecord::active(at(0), at(90)));
        snapshot.settle_all(at(20));
        assert!(!snapshot.get("done").unwrap().is_active);
        assert!(snapshot.get("busy").unwrap().is_active);
    }
}
