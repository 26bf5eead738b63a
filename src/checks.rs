//! Readiness sub-checks.
//!
//! Each dependency the service needs before it can take traffic is a
//! [`ReadinessCheck`]. [`Readiness`] runs every registered check on each
//! probe, concurrently and each under its own timeout, and reports them in
//! registration order. The service is ready only when all of them pass.

use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::{
    future::{join_all, BoxFuture},
    FutureExt as _,
};
use serde::{ser::SerializeMap, Serialize, Serializer};
use tokio::sync::watch;

use crate::{fatal, lifecycle::ShutdownState};

/// Result of a single check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(String),
}

/// A named dependency probe consulted by `GET /ready`.
///
/// Implementations must be cheap and side-effect free: probes arrive at
/// arbitrary frequency and concurrency.
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> BoxFuture<'_, CheckOutcome>;
}

/// Stand-in for a dependency that is not wired up yet. Always passes.
#[derive(Debug, Clone)]
pub struct Placeholder {
    name: &'static str,
}

impl Placeholder {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl ReadinessCheck for Placeholder {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self) -> BoxFuture<'_, CheckOutcome> {
        Box::pin(async { CheckOutcome::Pass })
    }
}

/// The storage, cache, and downstream API slots, in reporting order.
pub fn placeholder_checks() -> Vec<Arc<dyn ReadinessCheck>> {
    vec![
        Arc::new(Placeholder::new("database")),
        Arc::new(Placeholder::new("cache")),
        Arc::new(Placeholder::new("external_api")),
    ]
}

/// Fails as soon as the listener leaves `Running`.
pub struct LifecycleCheck {
    state: watch::Receiver<ShutdownState>,
}

impl LifecycleCheck {
    pub fn new(state: watch::Receiver<ShutdownState>) -> Self {
        Self { state }
    }
}

impl ReadinessCheck for LifecycleCheck {
    fn name(&self) -> &str {
        "lifecycle"
    }

    fn check(&self) -> BoxFuture<'_, CheckOutcome> {
        let state = *self.state.borrow();
        Box::pin(async move {
            match state {
                ShutdownState::Running => CheckOutcome::Pass,
                other => CheckOutcome::Fail(format!("server is {}", other.as_str().to_lowercase())),
            }
        })
    }
}

/// One reported check in a readiness snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    fn new(outcome: CheckOutcome, elapsed: Duration) -> Self {
        let (status, reason) = match outcome {
            CheckOutcome::Pass => ("OK", None),
            CheckOutcome::Fail(reason) => ("FAILED", Some(reason)),
        };
        Self {
            status,
            reason,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn passed(&self) -> bool {
        self.reason.is_none()
    }
}

/// Check results keyed by name, serialized as a JSON object in run order.
#[derive(Debug, Clone, Default)]
pub struct CheckResults(pub Vec<(String, CheckResult)>);

impl CheckResults {
    pub fn all_passed(&self) -> bool {
        self.0.iter().all(|(_, r)| r.passed())
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }
}

impl Serialize for CheckResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, result) in &self.0 {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

/// The registered checks plus the per-check time bound.
pub struct Readiness {
    checks: Vec<Arc<dyn ReadinessCheck>>,
    timeout: Duration,
}

impl Readiness {
    pub fn new(checks: Vec<Arc<dyn ReadinessCheck>>, timeout: Duration) -> Self {
        Self { checks, timeout }
    }

    pub fn with_check(mut self, check: Arc<dyn ReadinessCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Run every check concurrently. A check that overruns the timeout or
    /// panics fails; the others are still reported.
    pub async fn evaluate(&self) -> CheckResults {
        let runs = self.checks.iter().map(|check| async move {
            let started = Instant::now();
            let guarded = AssertUnwindSafe(async { check.check().await }).catch_unwind();
            let outcome = match tokio::time::timeout(self.timeout, guarded).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(payload)) => CheckOutcome::Fail(format!(
                    "panicked: {}",
                    fatal::panic_message(payload.as_ref())
                )),
                Err(_) => CheckOutcome::Fail(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )),
            };
            (check.name().to_owned(), CheckResult::new(outcome, started.elapsed()))
        });
        CheckResults(join_all(runs).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Check with a fixed outcome, for tests across the crate.
    pub(crate) struct Fixed {
        pub name: &'static str,
        pub outcome: CheckOutcome,
    }

    impl ReadinessCheck for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn check(&self) -> BoxFuture<'_, CheckOutcome> {
            Box::pin(async move { self.outcome.clone() })
        }
    }

    struct Hangs;

    impl ReadinessCheck for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }

        fn check(&self) -> BoxFuture<'_, CheckOutcome> {
            Box::pin(std::future::pending())
        }
    }

    /// Check whose future panics when polled.
    pub(crate) struct Panics;

    impl ReadinessCheck for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn check(&self) -> BoxFuture<'_, CheckOutcome> {
            Box::pin(async { explode() })
        }
    }

    fn explode() -> CheckOutcome {
        panic!("driver bug")
    }

    fn readiness(checks: Vec<Arc<dyn ReadinessCheck>>) -> Readiness {
        Readiness::new(checks, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn placeholders_all_pass_in_declaration_order() {
        let results = readiness(placeholder_checks()).evaluate().await;
        assert!(results.all_passed());
        let names: Vec<&str> = results.0.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["database", "cache", "external_api"]);
    }

    #[tokio::test]
    async fn one_failure_fails_the_aggregate() {
        let results = readiness(placeholder_checks())
            .with_check(Arc::new(Fixed {
                name: "queue",
                outcome: CheckOutcome::Fail("broker unreachable".into()),
            }))
            .evaluate()
            .await;
        assert!(!results.all_passed());
        let queue = results.get("queue").unwrap();
        assert_eq!(queue.status, "FAILED");
        assert_eq!(queue.reason.as_deref(), Some("broker unreachable"));
        assert!(results.get("database").unwrap().passed());
    }

    #[tokio::test]
    async fn hung_check_fails_by_timeout() {
        let results = readiness(vec![Arc::new(Hangs)]).evaluate().await;
        let hung = results.get("hangs").unwrap();
        assert!(!hung.passed());
        assert!(hung.reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_check_fails_without_taking_down_the_others() {
        let results = readiness(placeholder_checks())
            .with_check(Arc::new(Panics))
            .evaluate()
            .await;
        assert!(!results.all_passed());
        assert_eq!(
            results.get("panics").unwrap().reason.as_deref(),
            Some("panicked: driver bug")
        );
        assert!(results.get("external_api").unwrap().passed());
    }

    #[tokio::test]
    async fn empty_registry_is_ready() {
        assert!(readiness(Vec::new()).evaluate().await.all_passed());
    }

    #[tokio::test]
    async fn lifecycle_check_tracks_shutdown_state() {
        let (tx, rx) = watch::channel(ShutdownState::Running);
        let check = LifecycleCheck::new(rx);
        assert_eq!(check.check().await, CheckOutcome::Pass);

        tx.send(ShutdownState::Draining).unwrap();
        assert_eq!(
            check.check().await,
            CheckOutcome::Fail("server is draining".into())
        );
    }

    #[test]
    fn results_serialize_as_ordered_object() {
        let results = CheckResults(vec![
            ("zeta".into(), CheckResult::new(CheckOutcome::Pass, Duration::ZERO)),
            (
                "alpha".into(),
                CheckResult::new(CheckOutcome::Fail("down".into()), Duration::from_millis(3)),
            ),
        ]);
        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(
            json,
            r#"{"zeta":{"status":"OK","duration_ms":0},"alpha":{"status":"FAILED","reason":"down","duration_ms":3}}"#
        );
    }
}
