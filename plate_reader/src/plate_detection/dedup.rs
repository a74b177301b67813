//! Anti-duplicate policy and the recent plates list.
//!
//! Two gates decide what happens to a validated plate:
//!
//! * the *report* gate looks at the last plate seen and when it was seen. A
//!   plate that differs from the last one, or the same plate after the dedup
//!   window, is a new report and refreshes the last-seen state;
//! * the *append* gate only lets a reported plate into the recent list when the
//!   list does not already hold it.
//!
//! A plate that stays in view is therefore reported again every window, but
//! never shows up twice in the list.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use super::PlateRecord;
use crate::config::DetectionConfig;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DedupConfig {
    pub window: Duration,
    pub capacity: usize,
}

impl From<&DetectionConfig> for DedupConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            window: config.dedup_window(),
            capacity: config.recent_capacity,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3),
            capacity: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupDecision {
    /// Same plate as last time, still inside the window.
    Suppressed,
    /// Last-seen state was refreshed. `appended` is false when the plate was
    /// already in the recent list.
    Reported { appended: bool },
}

#[derive(Debug, Default)]
pub struct DedupState {
    last_text: Option<PlateRecord>,
    last_seen_at: Option<Instant>,
}

impl DedupState {
    fn is_new_report(&self, plate: &PlateRecord, now: Instant, window: Duration) -> bool {
        match (&self.last_text, self.last_seen_at) {
            (Some(last), Some(seen_at)) => {
                last != plate || now.saturating_duration_since(seen_at) > window
            }
            _ => true,
        }
    }
}

/// Insertion ordered, duplicate free, oldest evicted first.
#[derive(Debug)]
pub struct RecentPlates {
    plates: VecDeque<String>,
    capacity: usize,
}

impl RecentPlates {
    pub fn new(capacity: usize) -> Self {
        Self {
            plates: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn contains(&self, plate: &str) -> bool {
        self.plates.iter().any(|p| p == plate)
    }

    /// Appends `plate` unless already present. Returns whether it was added.
    pub fn push_unique(&mut self, plate: &str) -> bool {
        if self.contains(plate) {
            return false;
        }
        self.plates.push_back(plate.to_string());
        while self.plates.len() > self.capacity {
            self.plates.pop_front();
        }
        true
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.plates.iter().cloned().collect()
    }
}

struct LedgerState {
    dedup: DedupState,
    recent: RecentPlates,
}

/// Dedup state and recent plates behind one lock, shared between the
/// processing loop and whoever serves the results.
pub struct PlateLedger {
    window: Duration,
    state: Mutex<LedgerState>,
}

impl PlateLedger {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            window: config.window,
            state: Mutex::new(LedgerState {
                dedup: DedupState::default(),
                recent: RecentPlates::new(config.capacity),
            }),
        }
    }

    pub fn observe(&self, plate: &PlateRecord, now: Instant) -> DedupDecision {
        let mut state = self.state.lock();

        if !state.dedup.is_new_report(plate, now, self.window) {
            return DedupDecision::Suppressed;
        }

        state.dedup.last_text = Some(plate.clone());
        state.dedup.last_seen_at = Some(now);
        info!(plate = %plate, "plate detected");

        let appended = state.recent.push_unique(plate.as_str());
        DedupDecision::Reported { appended }
    }

    /// Oldest first, most recent last.
    pub fn recent_plates(&self) -> Vec<String> {
        self.state.lock().recent.to_vec()
    }

    pub fn last_seen(&self) -> Option<(PlateRecord, Instant)> {
        let state = self.state.lock();
        match (&state.dedup.last_text, state.dedup.last_seen_at) {
            (Some(plate), Some(seen_at)) => Some((plate.clone(), seen_at)),
            _ => None,
        }
    }
}

impl Default for PlateLedger {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}
