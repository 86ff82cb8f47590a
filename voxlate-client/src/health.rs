use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::probe::ProbeStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthState {
    pub checked: bool,
    pub healthy: bool,
    /// The strategy that won the last healthy round.
    pub reached_via: Option<ProbeStrategy>,
    pub last_checked_at: Option<SystemTime>,
}

/// Last connectivity verdict, shared by everything that talks to one backend.
///
/// A single slot with last-writer-wins semantics: a `reset` racing an in-flight
/// probe round can be overwritten by that round's `record`.
#[derive(Debug)]
pub struct HealthCache {
    staleness: Duration,
    state: Mutex<HealthState>,
}

impl HealthCache {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness,
            state: Mutex::new(HealthState::default()),
        }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    pub fn snapshot(&self) -> HealthState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The cached verdict, if one exists and is younger than the staleness window at `now`.
    pub fn fresh_verdict(&self, now: SystemTime) -> Option<HealthState> {
        let state = self.snapshot();
        if !state.checked {
            return None;
        }
        let checked_at = state.last_checked_at?;

        // A clock that went backwards counts as fresh; the next forward step re-probes.
        let age = now.duration_since(checked_at).unwrap_or_default();
        (age < self.staleness).then_some(state)
    }

    /// Store a round's result; `None` means every strategy failed.
    pub fn record(&self, reached_via: Option<ProbeStrategy>, now: SystemTime) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = HealthState {
            checked: true,
            healthy: reached_via.is_some(),
            reached_via,
            last_checked_at: Some(now),
        };
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = HealthState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 + secs)
    }

    fn healthy_at(cache: &HealthCache, now: SystemTime) -> Option<bool> {
        cache.fresh_verdict(now).map(|s| s.healthy)
    }

    #[test]
    fn empty_cache_is_never_fresh() {
        let cache = HealthCache::new(WINDOW);
        assert_eq!(healthy_at(&cache, t(0)), None);
    }

    #[test]
    fn verdict_is_reused_inside_window_only() {
        let cache = HealthCache::new(WINDOW);
        cache.record(Some(ProbeStrategy::HealthCheck), t(0));

        assert_eq!(healthy_at(&cache, t(0)), Some(true));
        assert_eq!(healthy_at(&cache, t(299)), Some(true));
        assert_eq!(healthy_at(&cache, t(300)), None);
    }

    #[test]
    fn unhealthy_verdicts_are_cached_too() {
        let cache = HealthCache::new(WINDOW);
        cache.record(None, t(10));
        assert_eq!(healthy_at(&cache, t(20)), Some(false));
        assert_eq!(cache.snapshot().reached_via, None);
    }

    #[test]
    fn winning_strategy_is_remembered() {
        let cache = HealthCache::new(WINDOW);
        cache.record(Some(ProbeStrategy::PipelineOptions), t(0));

        let state = cache.fresh_verdict(t(1)).unwrap();
        assert!(state.healthy);
        assert_eq!(state.reached_via, Some(ProbeStrategy::PipelineOptions));
    }

    #[test]
    fn reset_discards_verdict() {
        let cache = HealthCache::new(WINDOW);
        cache.record(Some(ProbeStrategy::RootPath), t(0));
        cache.reset();
        assert_eq!(healthy_at(&cache, t(1)), None);
        assert_eq!(cache.snapshot(), HealthState::default());
    }

    #[test]
    fn last_write_wins() {
        let cache = HealthCache::new(WINDOW);
        cache.reset();
        cache.record(None, t(5));
        assert_eq!(cache.snapshot().last_checked_at, Some(t(5)));
        assert_eq!(healthy_at(&cache, t(6)), Some(false));
    }
}
