//! Process-wide usage counters. Observability only, never consulted for routing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct UsageState {
    per_provider: HashMap<String, ProviderUsage>,
    last_successful: Option<String>,
}

#[derive(Debug, Default)]
pub struct UsageCounters {
    state: Mutex<UsageState>,
}

impl UsageCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, UsageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(&self, provider: &str) {
        let mut state = self.lock();
        state
            .per_provider
            .entry(provider.to_owned())
            .or_default()
            .successes += 1;
        state.last_successful = Some(provider.to_owned());
    }

    pub fn record_failure(&self, provider: &str) {
        self.lock()
            .per_provider
            .entry(provider.to_owned())
            .or_default()
            .failures += 1;
    }

    #[must_use]
    pub fn get(&self, provider: &str) -> ProviderUsage {
        self.lock()
            .per_provider
            .get(provider)
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_successful(&self) -> Option<String> {
        self.lock().last_successful.clone()
    }
}
