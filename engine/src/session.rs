//! Session Controller - one authentication request from claim to outcome.
//!
//! ```text
//! PENDING --no reference--> IGNORE
//! PENDING --> CAPTURING --scorable--> SCORING --match--> SUCCESS
//!                ^   |                   |
//!                |   +--no sample--------+--no match (budget left)
//!                +-----------------------+
//! any state --deadline or attempts spent--> DENY
//! ```
//!
//! The deadline is checked before every capture and again before scoring; a
//! capture or extraction still running at the deadline is dropped, not awaited.
//! Attempts count capture calls, so a frame that yields `NoSample` costs the
//! same as one that yields `NoMatch`.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, timeout_at};

use hellou_store::{EnrollmentStore, StoreError};
use hellou_types::{Embedding, Identity, MatchDecision, Outcome, SessionPhase, Tolerance};

use crate::audit::{AuditRecord, AuditSink};
use crate::capture::Sensor;
use crate::matching::{DistanceMetric, Euclidean, MatchingEngine, NoSample};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Time and retry budget for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionPolicy {
    pub tolerance: Tolerance,
    pub timeout: Duration,
    pub max_attempts: u32,
}

/// Why a session resolved the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NotEnrolled,
    Matched,
    AttemptsExhausted,
    DeadlineElapsed,
    DeviceUnavailable(String),
}

impl Resolution {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotEnrolled => "not_enrolled",
            Self::Matched => "matched",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::DeadlineElapsed => "deadline_elapsed",
            Self::DeviceUnavailable(_) => "device_unavailable",
        }
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::DeviceUnavailable(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Terminal result of a session, produced exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub identity: Identity,
    pub outcome: Outcome,
    pub reason: Resolution,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Closest distance seen across scored attempts.
    pub best_distance: Option<f64>,
}

/// Why an individual attempt did not resolve the session.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    NoSample(NoSample),
    NoMatch { distance: f64 },
    Capture(String),
    Extract(String),
}

/// Progress callbacks for interactive front ends. Never sees the outcome.
pub trait SessionObserver: Send + Sync {
    fn attempt_started(&self, _attempt: u32, _max_attempts: u32) {}
    fn attempt_failed(&self, _attempt: u32, _failure: &AttemptFailure) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// In-flight session state. Consumed by [`Session::finish`].
#[derive(Debug)]
struct Session {
    identity: Identity,
    started_at: Instant,
    deadline: Instant,
    attempts_made: u32,
    attempts_max: u32,
    phase: SessionPhase,
    best_distance: Option<f64>,
}

impl Session {
    fn new(identity: Identity, policy: &SessionPolicy) -> Self {
        let started_at = Instant::now();
        Self {
            identity,
            started_at,
            deadline: started_at + policy.timeout,
            attempts_made: 0,
            attempts_max: policy.max_attempts,
            phase: SessionPhase::Pending,
            best_distance: None,
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        debug_assert!(
            !self.phase.is_terminal(),
            "session already resolved as {}",
            self.phase
        );
        tracing::trace!(identity = %self.identity, from = %self.phase, to = %phase, "Session transition");
        self.phase = phase;
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn observe_distance(&mut self, distance: f64) {
        self.best_distance = Some(match self.best_distance {
            Some(best) if best <= distance => best,
            _ => distance,
        });
    }

    fn finish(mut self, outcome: Outcome, reason: Resolution) -> SessionReport {
        self.enter(SessionPhase::Resolved(outcome));
        SessionReport {
            identity: self.identity,
            outcome,
            reason,
            attempts: self.attempts_made,
            elapsed: self.started_at.elapsed(),
            best_distance: self.best_distance,
        }
    }
}

pub struct SessionController<M = Euclidean> {
    store: EnrollmentStore,
    sensor: Sensor,
    matcher: MatchingEngine<M>,
    policy: SessionPolicy,
    audit: Box<dyn AuditSink>,
}

impl SessionController<Euclidean> {
    pub fn new(
        store: EnrollmentStore,
        sensor: Sensor,
        policy: SessionPolicy,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self::with_matcher(store, sensor, MatchingEngine::new(), policy, audit)
    }
}

impl<M: DistanceMetric> SessionController<M> {
    pub fn with_matcher(
        store: EnrollmentStore,
        sensor: Sensor,
        matcher: MatchingEngine<M>,
        policy: SessionPolicy,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            sensor,
            matcher,
            policy,
            audit,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Run one session for `identity`.
    ///
    /// Errors are reserved for store faults (including `Busy` while the
    /// identity is being re-enrolled); every biometric result is an outcome.
    pub async fn authenticate(&self, identity: &Identity) -> Result<SessionReport, SessionError> {
        self.authenticate_with(identity, &NoopObserver).await
    }

    pub async fn authenticate_with(
        &self,
        identity: &Identity,
        observer: &dyn SessionObserver,
    ) -> Result<SessionReport, SessionError> {
        let mut session = Session::new(identity.clone(), &self.policy);
        let _lease = self.store.lease(identity)?;

        let Some(reference) = self.store.lookup(identity)? else {
            tracing::debug!(identity = %identity, "No enrollment; ignoring");
            return Ok(self.resolve(session, Outcome::Ignore, Resolution::NotEnrolled));
        };

        session.enter(SessionPhase::Capturing);
        loop {
            if session.expired() {
                return Ok(self.resolve(session, Outcome::Deny, Resolution::DeadlineElapsed));
            }
            if session.attempts_made >= session.attempts_max {
                return Ok(self.resolve(session, Outcome::Deny, Resolution::AttemptsExhausted));
            }

            session.attempts_made += 1;
            let attempt = session.attempts_made;
            observer.attempt_started(attempt, session.attempts_max);

            match self.attempt(&mut session, &reference).await {
                Ok((outcome, reason)) => {
                    return Ok(self.resolve(session, outcome, reason));
                }
                Err(failure) => {
                    tracing::debug!(identity = %identity, attempt, ?failure, "Attempt failed");
                    observer.attempt_failed(attempt, &failure);
                    session.enter(SessionPhase::Capturing);
                }
            }
        }
    }

    /// One capture/extract/score pass. `Ok` resolves the session; `Err` hands
    /// the failure back to the loop, which retries while budget remains.
    async fn attempt(
        &self,
        session: &mut Session,
        reference: &Embedding,
    ) -> Result<(Outcome, Resolution), AttemptFailure> {
        let deadline = session.deadline;

        let raw = match timeout_at(deadline, self.sensor.capture()).await {
            Err(_) => {
                return Ok((Outcome::Deny, Resolution::DeadlineElapsed));
            }
            Ok(Err(e)) if e.is_fatal() => {
                tracing::error!(identity = %session.identity, "Capture device unavailable: {e}");
                return Ok((Outcome::Deny, Resolution::DeviceUnavailable(e.to_string())));
            }
            Ok(Err(e)) => return Err(AttemptFailure::Capture(e.to_string())),
            Ok(Ok(raw)) => raw,
        };

        let embeddings = match timeout_at(deadline, self.sensor.extract(raw)).await {
            Err(_) => {
                return Ok((Outcome::Deny, Resolution::DeadlineElapsed));
            }
            Ok(Err(e)) => return Err(AttemptFailure::Extract(e.to_string())),
            Ok(Ok(embeddings)) => embeddings,
        };

        let sample = self
            .matcher
            .select(embeddings)
            .map_err(AttemptFailure::NoSample)?;

        if session.expired() {
            return Ok((Outcome::Deny, Resolution::DeadlineElapsed));
        }

        session.enter(SessionPhase::Scoring);
        let distance = self.matcher.score(&sample, reference);
        session.observe_distance(distance);
        match self.matcher.decide(distance, self.policy.tolerance) {
            MatchDecision::Match => Ok((Outcome::Success, Resolution::Matched)),
            MatchDecision::NoMatch => Err(AttemptFailure::NoMatch { distance }),
        }
    }

    fn resolve(&self, session: Session, outcome: Outcome, reason: Resolution) -> SessionReport {
        let report = session.finish(outcome, reason);
        self.audit.record(&AuditRecord::from_report(&report));
        report
    }
}

impl<M> std::fmt::Debug for SessionController<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("store", &self.store)
            .field("sensor", &self.sensor)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
