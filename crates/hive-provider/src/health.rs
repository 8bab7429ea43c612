//! Per-provider health tracking: consecutive failures, degraded cooldowns,
//! permanent unavailability.

use hive_config::FallbackConfig;
use hive_core::types::{ProviderFailure, ProviderHealth};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Read-only view of one provider's health, for the metrics surface.
#[derive(Debug, Clone)]
pub struct ProviderHealthSnapshot {
    pub id: String,
    pub health: ProviderHealth,
    pub consecutive_failures: u32,
    /// Remaining cooldown in ms, if currently cooling down.
    pub cooldown_remaining_ms: Option<u64>,
}

#[derive(Debug)]
struct State {
    health: ProviderHealth,
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
    /// Why the provider is permanently out of rotation, when it is.
    unavailable_reason: Option<ProviderFailure>,
}

/// Health state for one provider, shared between concurrent callers of the
/// fallback client. All transitions happen under the mutex so racing task
/// bodies never lose failure-count updates.
pub struct HealthSlot {
    id: String,
    policy: FallbackConfig,
    state: Mutex<State>,
}

impl HealthSlot {
    pub fn new(id: impl Into<String>, policy: FallbackConfig) -> Self {
        Self {
            id: id.into(),
            policy,
            state: Mutex::new(State {
                health: ProviderHealth::Healthy,
                consecutive_failures: 0,
                cooldown_until: None,
                unavailable_reason: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the provider permanently out of rotation (e.g. credentials
    /// absent at startup).
    pub fn mark_unavailable(&self, reason: ProviderFailure) {
        let mut st = self.lock();
        st.health = ProviderHealth::Unavailable;
        st.unavailable_reason = Some(reason);
    }

    /// Whether this provider may be attempted right now.
    ///
    /// Cooldown expiry is checked lazily here; an expired cooldown makes a
    /// DEGRADED provider eligible again (it stays DEGRADED until a success).
    pub fn check_eligible(&self) -> Result<(), ProviderFailure> {
        let mut st = self.lock();
        match st.health {
            ProviderHealth::Unavailable => Err(st
                .unavailable_reason
                .clone()
                .unwrap_or(ProviderFailure::Unavailable)),
            _ => {
                if let Some(until) = st.cooldown_until {
                    let now = Instant::now();
                    if now < until {
                        return Err(ProviderFailure::InCooldown {
                            remaining_secs: (until - now).as_secs().max(1),
                        });
                    }
                    st.cooldown_until = None;
                }
                Ok(())
            }
        }
    }

    pub fn on_success(&self) {
        let mut st = self.lock();
        if st.health == ProviderHealth::Unavailable {
            return;
        }
        st.consecutive_failures = 0;
        st.cooldown_until = None;
        st.health = ProviderHealth::Healthy;
    }

    pub fn on_failure(&self) {
        let mut st = self.lock();
        if st.health == ProviderHealth::Unavailable {
            return;
        }
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);

        if st.consecutive_failures >= self.policy.unavailable_threshold {
            st.health = ProviderHealth::Unavailable;
            st.cooldown_until = None;
        } else if st.consecutive_failures >= self.policy.degraded_threshold {
            st.health = ProviderHealth::Degraded;
            st.cooldown_until =
                Some(Instant::now() + self.cooldown_for(st.consecutive_failures));
        }
    }

    /// Cooldown window: exponential in failures past the degraded
    /// threshold, capped at `cooldown_max_secs`.
    fn cooldown_for(&self, consecutive_failures: u32) -> Duration {
        let exp = consecutive_failures.saturating_sub(self.policy.degraded_threshold);
        let secs = self
            .policy
            .cooldown_base_secs
            .saturating_mul(1u64 << exp.min(16))
            .min(self.policy.cooldown_max_secs);
        Duration::from_secs(secs)
    }

    pub fn health(&self) -> ProviderHealth {
        self.lock().health
    }

    pub fn snapshot(&self) -> ProviderHealthSnapshot {
        let now = Instant::now();
        let st = self.lock();
        let cooldown_remaining_ms = st.cooldown_until.and_then(|until| {
            (until > now).then(|| (until - now).as_millis() as u64)
        });
        ProviderHealthSnapshot {
            id: self.id.clone(),
            health: st.health,
            consecutive_failures: st.consecutive_failures,
            cooldown_remaining_ms,
        }
    }
}
