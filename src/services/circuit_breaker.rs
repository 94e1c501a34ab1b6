//! Circuit breaker for outbound calls
//!
//! CLOSED -> OPEN when the failure rate over a rolling window of recent calls
//! crosses the threshold; OPEN -> HALF_OPEN after a cooldown; HALF_OPEN admits
//! a single probe whose outcome closes or reopens the breaker.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of recent call outcomes kept in the rolling window.
    pub window_size: usize,
    /// Failure rate in [0,1] that trips the breaker.
    pub failure_rate_threshold: f64,
    /// Minimum calls in the window before the rate is evaluated.
    pub min_calls: usize,
    /// How long the breaker stays OPEN before admitting a probe.
    pub open_cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_rate_threshold: 0.5,
            min_calls: 10,
            open_cooldown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// true = failure
    outcomes: VecDeque<bool>,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                opened_at: None,
                probe_in_flight: false,
                outcomes: VecDeque::new(),
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Gate a call. Fails fast with CIRCUIT_OPEN while the breaker is open or
    /// a half-open probe is already in flight.
    pub fn try_acquire(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(breaker = %self.name, "breaker HALF_OPEN, admitting probe");
                    Ok(())
                } else {
                    Err(CoreError::CircuitOpen(self.name.clone()))
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(CoreError::CircuitOpen(self.name.clone()))
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.probe_in_flight = false;
                inner.opened_at = None;
                inner.outcomes.clear();
                tracing::info!(breaker = %self.name, "probe succeeded, breaker CLOSED");
            }
            _ => {
                Self::push_outcome(&mut inner, false, &self.config);
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.probe_in_flight = false;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(breaker = %self.name, "probe failed, breaker OPEN again");
            }
            BreakerState::Open => {}
            BreakerState::Closed => {
                Self::push_outcome(&mut inner, true, &self.config);
                if Self::should_trip(&inner, &self.config) {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        breaker = %self.name,
                        window = inner.outcomes.len(),
                        "failure rate over threshold, breaker OPEN"
                    );
                }
            }
        }
    }

    fn push_outcome(inner: &mut BreakerInner, failed: bool, config: &BreakerConfig) {
        inner.outcomes.push_back(failed);
        while inner.outcomes.len() > config.window_size {
            inner.outcomes.pop_front();
        }
    }

    fn should_trip(inner: &BreakerInner, config: &BreakerConfig) -> bool {
        if inner.outcomes.len() < config.min_calls {
            return false;
        }
        let failures = inner.outcomes.iter().filter(|&&failed| failed).count();
        failures as f64 / inner.outcomes.len() as f64 >= config.failure_rate_threshold
    }
}

/// Per-downstream breaker registry.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn breaker(&self, downstream: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(downstream.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(downstream, self.config.clone())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cooldown: Duration) -> BreakerConfig {
        BreakerConfig {
            window_size: 10,
            failure_rate_threshold: 0.5,
            min_calls: 4,
            open_cooldown: cooldown,
        }
    }

    #[test]
    fn stays_closed_under_min_calls() {
        let breaker = CircuitBreaker::new("pg", config(Duration::from_secs(60)));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn trips_on_failure_rate() {
        let breaker = CircuitBreaker::new("pg", config(Duration::from_secs(60)));
        breaker.record_success();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        // 2/4 failures hits the 0.5 threshold
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(matches!(
            breaker.try_acquire(),
            Err(CoreError::CircuitOpen(_))
        ));
    }

    #[test]
    fn half_open_admits_single_probe_then_closes() {
        let breaker = CircuitBreaker::new("pg", config(Duration::ZERO));
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        // cooldown of zero: next acquire becomes the probe
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // concurrent call while the probe is in flight is rejected
        assert!(breaker.try_acquire().is_err());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new("pg", config(Duration::ZERO));
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert!(breaker.try_acquire().is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn registry_reuses_breakers_per_downstream() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let a = registry.breaker("pg-gateway");
        let b = registry.breaker("pg-gateway");
        assert!(Arc::ptr_eq(&a, &b));
        let other = registry.breaker("notification");
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
