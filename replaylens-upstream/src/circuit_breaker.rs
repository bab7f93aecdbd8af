//! Circuit breaker for a single upstream operation.
//!
//! `closed -> open -> half_open -> closed`, or back to `open` when the
//! half-open trial fails. One breaker instance guards one operation and is
//! shared by every in-flight request through an `Arc`.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use replaylens_core::{CircuitState, ParserError};
use tokio::time::Instant;
use tracing::{info, warn};

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// Default seconds an open circuit waits before probing.
pub const DEFAULT_CIRCUIT_RECOVERY_SECS: u64 = 60;

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_secs(DEFAULT_CIRCUIT_RECOVERY_SECS),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create CircuitBreakerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `REPLAYLENS_CIRCUIT_FAILURE_THRESHOLD`: failures before opening (default: 5)
    /// - `REPLAYLENS_CIRCUIT_RECOVERY_SECS`: how long the circuit stays open (default: 60)
    pub fn from_env() -> Self {
        let failure_threshold = std::env::var("REPLAYLENS_CIRCUIT_FAILURE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(DEFAULT_CIRCUIT_FAILURE_THRESHOLD);

        let recovery_timeout = Duration::from_secs(
            std::env::var("REPLAYLENS_CIRCUIT_RECOVERY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CIRCUIT_RECOVERY_SECS),
        );

        Self {
            failure_threshold,
            recovery_timeout,
        }
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Errors a breaker can observe.
///
/// Only failures for which [`BreakerError::trips_breaker`] is true are
/// counted. Everything else passes through untouched.
pub trait BreakerError: Sized {
    fn trips_breaker(&self) -> bool;

    /// The error returned when the breaker rejects a call.
    fn circuit_open(operation: &str) -> Self;
}

impl BreakerError for ParserError {
    fn trips_breaker(&self) -> bool {
        self.is_upstream_failure()
    }

    fn circuit_open(operation: &str) -> Self {
        ParserError::CircuitOpen {
            operation: operation.to_string(),
        }
    }
}

// ============================================================================
// CIRCUIT BREAKER
// ============================================================================

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    tripped_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding one upstream operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Admission ticket for one call.
///
/// Dropping an unsettled trial permit (for example when the caller's future
/// is cancelled) frees the half-open slot without changing state.
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                tripped_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a call, or `None` if the circuit is rejecting.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let recovered = inner
                    .tripped_at
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if !recovered {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!(breaker = %self.name, "Circuit half-open, probing upstream");
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
        };
        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Record a successful call.
    pub fn record_success(&self, mut permit: Permit<'_>) {
        permit.settled = true;
        let mut inner = self.lock();
        if permit.trial {
            inner.state = CircuitState::Closed;
            inner.failures = 0;
            inner.tripped_at = None;
            inner.trial_in_flight = false;
            info!(breaker = %self.name, "Circuit closed after successful trial");
        } else if inner.state == CircuitState::Closed {
            inner.failures = 0;
        }
    }

    /// Record a counted failure.
    pub fn record_failure(&self, mut permit: Permit<'_>) {
        permit.settled = true;
        let mut inner = self.lock();
        if permit.trial {
            inner.state = CircuitState::Open;
            inner.tripped_at = Some(Instant::now());
            inner.trial_in_flight = false;
            warn!(breaker = %self.name, "Half-open trial failed, circuit re-opened");
            return;
        }
        if inner.state != CircuitState::Closed {
            return;
        }
        inner.failures += 1;
        if inner.failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            inner.tripped_at = Some(Instant::now());
            warn!(
                breaker = %self.name,
                failures = inner.failures,
                "Circuit opened"
            );
        }
    }

    /// Run `operation` under the breaker.
    ///
    /// Rejected calls return `E::circuit_open` without invoking `operation`.
    /// Errors that do not trip the breaker are returned as-is and leave the
    /// counters alone.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: BreakerError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.try_acquire() else {
            warn!(breaker = %self.name, "Circuit open, rejecting call");
            return Err(E::circuit_open(&self.name));
        };

        match operation().await {
            Ok(value) => {
                self.record_success(permit);
                Ok(value)
            }
            Err(err) if err.trips_breaker() => {
                self.record_failure(permit);
                Err(err)
            }
            // Dropping the permit frees a trial slot.
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("failures", &inner.failures)
            .finish()
    }
}
