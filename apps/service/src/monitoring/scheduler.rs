use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use super::checker::StatusChecker;
use crate::notify::FanoutNotifier;
use crate::registry::EndpointRegistry;

/// Phase of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Checking,
}

/// Counters for one pass over the endpoint registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Periodically re-checks every registered endpoint and fans out status changes
pub struct PollingScheduler {
    endpoints: Arc<EndpointRegistry>,
    checker: Arc<StatusChecker>,
    notifier: Arc<FanoutNotifier>,
    period: Duration,
    state: watch::Sender<SchedulerState>,
}

impl PollingScheduler {
    pub fn new(
        endpoints: Arc<EndpointRegistry>,
        checker: Arc<StatusChecker>,
        notifier: Arc<FanoutNotifier>,
        period: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self { endpoints, checker, notifier, period, state }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Run the polling loop on its own task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Check immediately, then again every `period` after each pass completes
    pub async fn run(&self) {
        let worst_case = self.checker.policy().worst_case();
        info!(period_secs = self.period.as_secs(), worst_case_check_secs = worst_case.as_secs(), "Polling scheduler started");

        loop {
            self.run_cycle().await;
            sleep(self.period).await;
        }
    }

    /// One pass over a snapshot of the registry.
    ///
    /// Endpoints are checked one after another; a change is fanned out before the
    /// next endpoint is checked. Each endpoint runs on its own task so a panic in
    /// one check is contained to that endpoint.
    pub async fn run_cycle(&self) -> CycleReport {
        self.state.send_replace(SchedulerState::Checking);

        let snapshot = self.endpoints.all().await;
        info!(endpoints = snapshot.len(), "Check servers cycle");

        let mut report = CycleReport::default();

        for endpoint in snapshot {
            let checker = self.checker.clone();
            let notifier = self.notifier.clone();
            let key = endpoint.key().clone();

            let unit = tokio::spawn(async move {
                let outcome = checker.check(&endpoint).await;
                if outcome.changed {
                    notifier.notify(&endpoint).await;
                }
                outcome.changed
            });

            report.checked += 1;
            match unit.await {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(endpoint = %key, "Server check aborted: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(checked = report.checked, changed = report.changed, "Cycle finished");
        self.state.send_replace(SchedulerState::Idle);
        report
    }
}
