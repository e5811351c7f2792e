//! Circuit Breaker (I, §4.9). A per-operation-key failure counter with
//! closed/open/half_open states, guarding any operation that can fail
//! repeatedly (the update loop's `vessel_update` key, primarily).

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct OperationState {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
}

impl OperationState {
    fn new() -> Self {
        Self { state: BreakerState::Closed, failure_count: 0, last_failure_at: None }
    }
}

/// Registry of circuit breakers, one per operation name (§4.9). All
/// transitions are guarded by a single mutex, held only for the duration of
/// the state check/transition.
pub struct CircuitBreaker {
    threshold: u32,
    reset_interval: Duration,
    operations: Mutex<HashMap<String, OperationState>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_interval: Duration) -> Self {
        Self { threshold, reset_interval, operations: Mutex::new(HashMap::new()) }
    }

    /// Checks (and, if the reset interval has elapsed, advances) the state
    /// for `op`, returning whether it is currently open. Call this before
    /// attempting a guarded operation; an open breaker means skip entirely
    /// without recording either a success or a failure.
    pub fn is_open(&self, op: &str) -> bool {
        let mut operations = self.operations.lock().expect("breaker lock poisoned");
        let entry = operations.entry(op.to_string()).or_insert_with(OperationState::new);

        if entry.state == BreakerState::Open {
            let elapsed_ok = entry
                .last_failure_at
                .map(|at| Utc::now().signed_duration_since(at).to_std().unwrap_or_default() >= self.reset_interval)
                .unwrap_or(false);
            if elapsed_ok {
                debug!(op, "circuit breaker transitioning open -> half_open");
                entry.state = BreakerState::HalfOpen;
            }
        }

        entry.state == BreakerState::Open
    }

    pub fn record_success(&self, op: &str) {
        let mut operations = self.operations.lock().expect("breaker lock poisoned");
        let entry = operations.entry(op.to_string()).or_insert_with(OperationState::new);
        entry.state = BreakerState::Closed;
        entry.failure_count = 0;
    }

    pub fn record_failure(&self, op: &str) {
        let mut operations = self.operations.lock().expect("breaker lock poisoned");
        let entry = operations.entry(op.to_string()).or_insert_with(OperationState::new);
        entry.failure_count += 1;
        entry.last_failure_at = Some(Utc::now());

        match entry.state {
            BreakerState::HalfOpen => {
                warn!(op, "probe failed, circuit breaker reopening");
                entry.state = BreakerState::Open;
            }
            BreakerState::Closed if entry.failure_count >= self.threshold => {
                warn!(op, failures = entry.failure_count, "circuit breaker opening");
                entry.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    pub fn state(&self, op: &str) -> BreakerState {
        let operations = self.operations.lock().expect("breaker lock poisoned");
        operations.get(op).map(|e| e.state).unwrap_or(BreakerState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));
        assert!(!breaker.is_open("op"));
        breaker.record_failure("op");
        breaker.record_failure("op");
        assert!(!breaker.is_open("op"));
        breaker.record_failure("op");
        assert!(breaker.is_open("op"));
    }

    #[test]
    fn success_resets_closed_counter() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));
        breaker.record_failure("op");
        breaker.record_failure("op");
        breaker.record_success("op");
        breaker.record_failure("op");
        breaker.record_failure("op");
        assert!(!breaker.is_open("op"));
    }

    #[test]
    fn half_open_probe_is_allowed_through_and_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure("op");
        assert_eq!(breaker.state("op"), BreakerState::Open);

        // is_open() immediately advances an expired-reset-interval breaker to
        // half_open and lets this one probe call through (is_open == false).
        assert!(!breaker.is_open("op"));
        assert_eq!(breaker.state("op"), BreakerState::HalfOpen);

        breaker.record_failure("op");
        assert_eq!(breaker.state("op"), BreakerState::Open);
    }

    #[test]
    fn half_open_probe_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure("op");
        assert!(!breaker.is_open("op"));
        assert_eq!(breaker.state("op"), BreakerState::HalfOpen);

        breaker.record_success("op");
        assert_eq!(breaker.state("op"), BreakerState::Closed);
    }

    #[test]
    fn independent_operations_do_not_share_state() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(300));
        breaker.record_failure("a");
        assert!(breaker.is_open("a"));
        assert!(!breaker.is_open("b"));
    }
}
