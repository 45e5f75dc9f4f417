//! Per-provider circuit breaker for quota exhaustion.
//!
//! Two states: available, or exhausted since some instant. An exhausted provider is
//! skipped until `recheck_interval` has elapsed, after which one attempt probes it.
//! While that probe is in flight, other requests keep skipping the provider.
//! Any success resets it. Only quota exhaustion moves a provider into the exhausted
//! state; transient and permanent failures leave health untouched.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy)]
struct Exhaustion {
    at: Instant,
    wall: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct HealthState {
    exhausted: Option<Exhaustion>,
    probing: bool,
}

/// Health of one provider at the moment of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub exhausted: bool,
    pub exhausted_at: Option<DateTime<Utc>>,
    /// Time left before the next probe is allowed; zero when one is allowed now.
    pub retry_in: Option<Duration>,
}

impl HealthSnapshot {
    #[must_use]
    pub fn is_attemptable(&self) -> bool {
        self.retry_in.is_none_or(|d| d.is_zero())
    }
}

/// Outcome of [`HealthTracker::record_success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    WasAvailable,
    Recovered,
}

/// Result of [`HealthTracker::begin_attempt`].
#[derive(Debug)]
pub enum Admission<'a> {
    Available,
    /// The recheck interval has elapsed and this caller holds the single probe.
    Probe(ProbeGuard<'a>),
    Skip,
}

impl Admission<'_> {
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

/// Probe claim on an exhausted provider, released on drop.
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    tracker: &'a HealthTracker,
    provider: String,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.tracker.lock().get_mut(&self.provider) {
            state.probing = false;
        }
    }
}

#[derive(Debug)]
pub struct HealthTracker {
    recheck_interval: Duration,
    state: Mutex<HashMap<String, HealthState>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RECHECK_INTERVAL)
    }
}

impl HealthTracker {
    #[must_use]
    pub fn new(recheck_interval: Duration) -> Self {
        Self {
            recheck_interval,
            state: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn recheck_interval(&self) -> Duration {
        self.recheck_interval
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HealthState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an available record for `provider` if none exists.
    pub fn register(&self, provider: &str) {
        self.lock().entry(provider.to_owned()).or_default();
    }

    fn remaining(&self, exhaustion: Exhaustion, now: Instant) -> Duration {
        self.recheck_interval
            .saturating_sub(now.saturating_duration_since(exhaustion.at))
    }

    /// Whether the executor should call `provider` now.
    ///
    /// Unknown providers are treated as available. An exhausted provider whose probe
    /// is already in flight is not.
    #[must_use]
    pub fn should_attempt(&self, provider: &str) -> bool {
        let now = Instant::now();
        self.lock().get(provider).is_none_or(|s| {
            s.exhausted
                .is_none_or(|e| self.remaining(e, now).is_zero() && !s.probing)
        })
    }

    /// Check and claim in one step: an elapsed exhaustion hands out one [`ProbeGuard`]
    /// until that guard is dropped.
    pub fn begin_attempt(&self, provider: &str) -> Admission<'_> {
        let now = Instant::now();
        let mut state = self.lock();
        let entry = state.entry(provider.to_owned()).or_default();
        let elapsed = entry.exhausted.map(|e| self.remaining(e, now).is_zero());
        match elapsed {
            None => Admission::Available,
            Some(true) if !entry.probing => {
                entry.probing = true;
                drop(state);
                Admission::Probe(ProbeGuard {
                    tracker: self,
                    provider: provider.to_owned(),
                })
            }
            Some(_) => Admission::Skip,
        }
    }

    /// Mark `provider` exhausted as of now, restarting the recheck interval.
    pub fn mark_exhausted(&self, provider: &str) {
        let exhaustion = Exhaustion {
            at: Instant::now(),
            wall: Utc::now(),
        };
        self.lock()
            .entry(provider.to_owned())
            .or_default()
            .exhausted = Some(exhaustion);
    }

    /// Reset `provider` to available after a successful call.
    pub fn record_success(&self, provider: &str) -> Recovery {
        let mut state = self.lock();
        match state
            .entry(provider.to_owned())
            .or_default()
            .exhausted
            .take()
        {
            Some(_) => Recovery::Recovered,
            None => Recovery::WasAvailable,
        }
    }

    #[must_use]
    pub fn snapshot(&self, provider: &str) -> HealthSnapshot {
        let now = Instant::now();
        match self.lock().get(provider).and_then(|s| s.exhausted) {
            Some(e) => HealthSnapshot {
                exhausted: true,
                exhausted_at: Some(e.wall),
                retry_in: Some(self.remaining(e, now)),
            },
            None => HealthSnapshot {
                exhausted: false,
                exhausted_at: None,
                retry_in: None,
            },
        }
    }

    /// How long ago `provider` was marked exhausted, if it is.
    #[must_use]
    pub fn exhausted_for(&self, provider: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(provider)
            .and_then(|s| s.exhausted)
            .map(|e| now.saturating_duration_since(e.at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn unknown_provider_is_attemptable() {
        let t = HealthTracker::default();
        assert!(t.should_attempt("nobody"));
        assert!(!t.snapshot("nobody").exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_provider_skipped_until_interval() {
        let t = HealthTracker::new(HOUR);
        t.register("openai");
        t.mark_exhausted("openai");
        assert!(!t.should_attempt("openai"));

        tokio::time::advance(HOUR - Duration::from_secs(1)).await;
        assert!(!t.should_attempt("openai"));
        assert_eq!(
            t.snapshot("openai").retry_in,
            Some(Duration::from_secs(1))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(t.should_attempt("openai"));
        assert!(t.snapshot("openai").is_attemptable());
    }

    #[tokio::test(start_paused = true)]
    async fn one_probe_per_elapsed_interval() {
        let t = HealthTracker::new(HOUR);
        t.mark_exhausted("openai");
        assert!(t.begin_attempt("openai").is_skip());

        tokio::time::advance(HOUR).await;
        let probe = t.begin_attempt("openai");
        assert!(matches!(probe, Admission::Probe(_)));
        assert!(t.begin_attempt("openai").is_skip());
        assert!(!t.should_attempt("openai"));

        drop(probe);
        assert!(t.should_attempt("openai"));
        assert!(matches!(t.begin_attempt("openai"), Admission::Probe(_)));
    }

    #[test]
    fn available_provider_is_never_claimed() {
        let t = HealthTracker::default();
        t.register("google");
        assert!(matches!(t.begin_attempt("google"), Admission::Available));
        assert!(matches!(t.begin_attempt("google"), Admission::Available));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_restarts_interval() {
        let t = HealthTracker::new(HOUR);
        t.mark_exhausted("ai_builder");
        tokio::time::advance(HOUR).await;
        assert!(t.should_attempt("ai_builder"));

        t.mark_exhausted("ai_builder");
        assert!(!t.should_attempt("ai_builder"));
        tokio::time::advance(HOUR / 2).await;
        assert!(!t.should_attempt("ai_builder"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_immediately() {
        let t = HealthTracker::new(HOUR);
        t.mark_exhausted("google");
        assert_eq!(t.record_success("google"), Recovery::Recovered);
        assert!(t.should_attempt("google"));
        assert_eq!(t.record_success("google"), Recovery::WasAvailable);
        let snap = t.snapshot("google");
        assert!(!snap.exhausted);
        assert!(snap.exhausted_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_for_tracks_age() {
        let t = HealthTracker::new(HOUR);
        assert!(t.exhausted_for("a").is_none());
        t.mark_exhausted("a");
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(t.exhausted_for("a"), Some(Duration::from_secs(90)));
    }

    #[test]
    fn register_does_not_reset_exhaustion() {
        let t = HealthTracker::new(HOUR);
        t.mark_exhausted("a");
        t.register("a");
        assert!(t.snapshot("a").exhausted);
    }

    #[test]
    fn concurrent_marks_keep_single_record() {
        let t = std::sync::Arc::new(HealthTracker::new(HOUR));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let t = std::sync::Arc::clone(&t);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        t.mark_exhausted("shared");
                    } else {
                        t.record_success("shared");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.lock().len(), 1);
    }
}
