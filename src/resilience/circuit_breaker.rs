//! Circuit breakers for registry node protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: node assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether the node recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within window
//! Open → Half-Open: after reset timeout, on the next call
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-node circuit breaker (not global), keyed by node URL
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering a recovering node)
//! - Callers only see `BreakerError::Open`; state is never exposed for branching

use std::collections::VecDeque;
use std::future::Future;

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state for a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker for `target` rejected the call without running it.
    #[error("circuit open for {target}")]
    Open { target: String },

    /// The call ran and failed; the failure has been recorded.
    #[error(transparent)]
    Failed(E),
}

#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// A set of circuit breakers, one per target.
#[derive(Debug)]
pub struct CircuitBreakerSet {
    config: BreakerConfig,
    breakers: DashMap<String, Breaker>,
}

impl CircuitBreakerSet {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Run `op` guarded by the breaker for `target`.
    ///
    /// Returns `BreakerError::Open` without running `op` if the breaker is
    /// open. Otherwise the result of `op` is recorded against `target`.
    pub async fn call<F, Fut, T, E>(&self, target: &str, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire(target).ok_or_else(|| BreakerError::Open {
            target: target.to_string(),
        })?;

        match op().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(BreakerError::Failed(e))
            }
        }
    }

    /// Current state of the breaker for `target`.
    ///
    /// An open breaker whose reset timeout has elapsed still reports `Open`
    /// until the next call turns it half-open.
    pub fn state(&self, target: &str) -> BreakerState {
        self.breakers
            .get(target)
            .map(|b| b.state)
            .unwrap_or(BreakerState::Closed)
    }

    fn try_acquire(&self, target: &str) -> Option<Permit<'_>> {
        let now = Instant::now();
        let mut breaker = self.breakers.entry(target.to_string()).or_insert_with(Breaker::new);

        let state = breaker.state;
        let trial = match state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                let cooled = breaker
                    .opened_at
                    .map(|at| now.duration_since(at) >= self.config.reset_timeout())
                    .unwrap_or(true);
                if !cooled {
                    return None;
                }
                self.transition(target, &mut breaker, BreakerState::HalfOpen);
                true
            }
            BreakerState::HalfOpen => {
                if breaker.trial_in_flight {
                    return None;
                }
                true
            }
        };

        if trial {
            breaker.trial_in_flight = true;
        }
        drop(breaker);

        Some(Permit {
            set: self,
            target: target.to_string(),
            trial,
            finished: false,
        })
    }

    /// Only the half-open trial settles a breaker that is not closed; late
    /// outcomes of calls admitted earlier leave it alone.
    fn record_success(&self, target: &str, trial: bool) {
        if let Some(mut breaker) = self.breakers.get_mut(target) {
            if trial {
                breaker.trial_in_flight = false;
            }
            let state = breaker.state;
            match state {
                BreakerState::Closed => breaker.failures.clear(),
                BreakerState::HalfOpen if trial => {
                    breaker.opened_at = None;
                    self.transition(target, &mut breaker, BreakerState::Closed);
                }
                BreakerState::HalfOpen | BreakerState::Open => {}
            }
        }
    }

    fn record_failure(&self, target: &str, trial: bool) {
        let now = Instant::now();
        let window = self.config.failure_window();
        let threshold = self.config.failure_threshold.max(1) as usize;

        if let Some(mut breaker) = self.breakers.get_mut(target) {
            if trial {
                breaker.trial_in_flight = false;
            }
            let state = breaker.state;
            match state {
                BreakerState::Closed => {
                    breaker.failures.push_back(now);
                    while let Some(&oldest) = breaker.failures.front() {
                        if now.duration_since(oldest) > window {
                            breaker.failures.pop_front();
                        } else {
                            break;
                        }
                    }
                    if breaker.failures.len() >= threshold {
                        breaker.opened_at = Some(now);
                        self.transition(target, &mut breaker, BreakerState::Open);
                    }
                }
                BreakerState::HalfOpen if trial => {
                    breaker.opened_at = Some(now);
                    self.transition(target, &mut breaker, BreakerState::Open);
                }
                BreakerState::HalfOpen => {}
                BreakerState::Open => {
                    // Late failure from a call admitted before the breaker opened.
                    breaker.opened_at = Some(now);
                }
            }
        }
    }

    fn release_trial(&self, target: &str) {
        if let Some(mut breaker) = self.breakers.get_mut(target) {
            breaker.trial_in_flight = false;
        }
    }

    fn transition(&self, target: &str, breaker: &mut Breaker, to: BreakerState) {
        let from = breaker.state;
        breaker.state = to;
        if to == BreakerState::Closed {
            breaker.failures.clear();
        }

        match to {
            BreakerState::Open => tracing::warn!(
                node = %target,
                from = from.as_str(),
                failures = breaker.failures.len(),
                "Circuit breaker opened"
            ),
            _ => tracing::info!(node = %target, from = from.as_str(), to = to.as_str(), "Circuit breaker state change"),
        }
        metrics::record_breaker_transition(target, to.as_str());
    }
}

/// Admission to run one guarded call.
///
/// Dropping a permit without reporting an outcome (e.g. the call future was
/// cancelled) releases a half-open trial without recording anything.
struct Permit<'a> {
    set: &'a CircuitBreakerSet,
    target: String,
    trial: bool,
    finished: bool,
}

impl Permit<'_> {
    fn success(mut self) {
        self.finished = true;
        self.set.record_success(&self.target, self.trial);
    }

    fn failure(mut self) {
        self.finished = true;
        self.set.record_failure(&self.target, self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.finished && self.trial {
            self.set.release_trial(&self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    fn breakers() -> CircuitBreakerSet {
        CircuitBreakerSet::new(BreakerConfig {
            failure_threshold: 2,
            reset_timeout_secs: 10,
            failure_window_secs: 60,
        })
    }

    async fn fail(set: &CircuitBreakerSet, target: &str) -> BreakerError<&'static str> {
        set.call(target, || async { Err::<(), _>("boom") }).await.unwrap_err()
    }

    async fn succeed(set: &CircuitBreakerSet, target: &str) -> Result<u32, BreakerError<&'static str>> {
        set.call(target, || async { Ok(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let set = breakers();
        assert!(matches!(fail(&set, "a").await, BreakerError::Failed("boom")));
        assert_eq!(set.state("a"), BreakerState::Closed);

        fail(&set, "a").await;
        assert_eq!(set.state("a"), BreakerState::Open);

        // Open breaker does not run the operation.
        let mut ran = false;
        let result = set
            .call("a", || {
                ran = true;
                async { Ok::<_, &str>(()) }
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert!(!ran);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_per_target() {
        let set = breakers();
        fail(&set, "a").await;
        fail(&set, "a").await;

        assert_eq!(set.state("a"), BreakerState::Open);
        assert_eq!(set.state("b"), BreakerState::Closed);
        assert_eq!(succeed(&set, "b").await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let set = breakers();
        fail(&set, "a").await;
        fail(&set, "a").await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(succeed(&set, "a").await.unwrap(), 7);
        assert_eq!(set.state("a"), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let set = breakers();
        fail(&set, "a").await;
        fail(&set, "a").await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(fail(&set, "a").await, BreakerError::Failed(_)));
        assert_eq!(set.state("a"), BreakerState::Open);
        assert!(matches!(succeed(&set, "a").await, Err(BreakerError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_are_forgotten() {
        let set = breakers();
        fail(&set, "a").await;
        tokio::time::advance(Duration::from_secs(61)).await;
        fail(&set, "a").await;
        assert_eq!(set.state("a"), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_heals_closed_breaker() {
        let set = breakers();
        fail(&set, "a").await;
        succeed(&set, "a").await.unwrap();
        fail(&set, "a").await;
        assert_eq!(set.state("a"), BreakerState::Closed);
    }

    type Outcome = Result<(), &'static str>;

    /// Start a call on `target` whose outcome is sent later; returns once
    /// the call has been admitted.
    async fn admitted_call(
        set: &Arc<CircuitBreakerSet>,
        target: &'static str,
    ) -> (oneshot::Sender<Outcome>, JoinHandle<Result<(), BreakerError<&'static str>>>) {
        let (outcome_tx, outcome_rx) = oneshot::channel::<Outcome>();
        let (admitted_tx, admitted_rx) = oneshot::channel();
        let set = set.clone();
        let handle = tokio::spawn(async move {
            set.call(target, move || {
                let _ = admitted_tx.send(());
                async move { outcome_rx.await.unwrap_or(Err("dropped")) }
            })
            .await
        });
        admitted_rx.await.unwrap();
        (outcome_tx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_outcome_does_not_settle_trial() {
        let set = Arc::new(breakers());
        let (late_tx, late) = admitted_call(&set, "a").await;

        fail(&set, "a").await;
        fail(&set, "a").await;
        tokio::time::advance(Duration::from_secs(11)).await;
        let (trial_tx, trial) = admitted_call(&set, "a").await;
        assert_eq!(set.state("a"), BreakerState::HalfOpen);

        late_tx.send(Ok(())).unwrap();
        assert!(late.await.unwrap().is_ok());
        assert_eq!(set.state("a"), BreakerState::HalfOpen);
        assert!(matches!(succeed(&set, "a").await, Err(BreakerError::Open { .. })));

        trial_tx.send(Err("boom")).unwrap();
        assert!(matches!(trial.await.unwrap(), Err(BreakerError::Failed("boom"))));
        assert_eq!(set.state("a"), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_does_not_reopen_trial() {
        let set = Arc::new(breakers());
        let (late_tx, late) = admitted_call(&set, "a").await;

        fail(&set, "a").await;
        fail(&set, "a").await;
        tokio::time::advance(Duration::from_secs(11)).await;
        let (trial_tx, trial) = admitted_call(&set, "a").await;

        late_tx.send(Err("late")).unwrap();
        assert!(late.await.unwrap().is_err());
        assert_eq!(set.state("a"), BreakerState::HalfOpen);

        trial_tx.send(Ok(())).unwrap();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(set.state("a"), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_is_released() {
        let set = breakers();
        fail(&set, "a").await;
        fail(&set, "a").await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let hung = set.call("a", || std::future::pending::<Result<(), &str>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), hung).await;
        assert!(timed_out.is_err());

        assert_eq!(succeed(&set, "a").await.unwrap(), 7);
        assert_eq!(set.state("a"), BreakerState::Closed);
    }
}
