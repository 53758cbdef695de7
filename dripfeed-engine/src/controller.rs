//! Run controller: the state machine that drives one drip-posting run.
//!
//! `Idle -> Running -> {Completed, Stopped, Failed}`. While running, each
//! candidate is evaluated, paced, rendered and dispatched in discovery order,
//! and every decision is appended to the audit log.

use crate::audit::AuditLog;
use crate::clock::RunClock;
use crate::collaborators::{AuditSink, Poster, RuleOracle};
use crate::eligibility::{evaluate, DispatchLedger, Verdict};
use crate::scheduler::Scheduler;
use crate::variation::{VariationEngine, VariationMemory};
use chrono::{DateTime, Utc};
use dripfeed_core::{
    ActionRecord, Candidate, ConfigError, CoreError, ErrorExt, LifecycleState, Outcome, RunConfig,
    TemplatePools,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shortest sleep while waiting for a slot, so a zero wait cannot spin.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Mutable state of a run, owned by the controller.
#[derive(Debug)]
pub struct RunState {
    pub lifecycle: LifecycleState,
    pub ledger: DispatchLedger,
    pub scheduler: Scheduler,
    pub audit: AuditLog,
    memory: VariationMemory,
    sequence: u64,
}

impl RunState {
    fn new(config: &RunConfig) -> Self {
        Self {
            lifecycle: LifecycleState::Idle,
            ledger: DispatchLedger::new(),
            scheduler: Scheduler::for_run(config),
            audit: AuditLog::new(),
            memory: VariationMemory::new(),
            sequence: 0,
        }
    }

    pub fn total_posted(&self) -> u32 {
        self.ledger.total()
    }

    pub fn next_allowed_dispatch(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_allowed()
    }
}

/// What a finished (or failed) run leaves behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: LifecycleState,
    pub records: Vec<ActionRecord>,
    pub total_posted: u32,
    pub per_subreddit: BTreeMap<String, u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn count(&self, label: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }
}

enum SlotWait {
    Ready(DateTime<Utc>),
    Cancelled,
    WindowClosed,
}

pub struct RunController<P: Poster, O: RuleOracle> {
    run_id: Uuid,
    config: RunConfig,
    engine: VariationEngine,
    poster: P,
    oracle: O,
    clock: RunClock,
    cancel: CancellationToken,
    sinks: Vec<Box<dyn AuditSink>>,
    state: RunState,
}

impl<P: Poster, O: RuleOracle> RunController<P, O> {
    pub fn new(config: RunConfig, pools: TemplatePools, poster: P, oracle: O) -> Self {
        let state = RunState::new(&config);
        Self {
            run_id: Uuid::new_v4(),
            config,
            engine: VariationEngine::new(pools),
            poster,
            oracle,
            clock: RunClock::system(),
            cancel: CancellationToken::new(),
            sinks: Vec::new(),
            state,
        }
    }

    pub fn with_clock(mut self, clock: RunClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn lifecycle(&self) -> &LifecycleState {
        &self.state.lifecycle
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn records(&self) -> &[ActionRecord] {
        self.state.audit.records()
    }

    /// Runs the candidate sequence to a terminal state.
    ///
    /// Configuration errors end the run as `Failed` without producing any
    /// records; they are reported through the returned report, not as `Err`.
    /// `Err` means the controller was not idle.
    pub async fn run<I>(&mut self, candidates: I) -> Result<RunReport, CoreError>
    where
        I: IntoIterator<Item = Candidate>,
    {
        if self.state.lifecycle != LifecycleState::Idle {
            return Err(CoreError::InvalidState {
                expected: LifecycleState::Idle.name().to_string(),
                actual: self.state.lifecycle.name().to_string(),
            });
        }

        let started_at = self.clock.now();

        if let Err(e) = self.validate() {
            let reason = e.to_string();
            CoreError::from(e).log_error();
            self.state.lifecycle = LifecycleState::Failed { reason };
            return Ok(self.report(started_at));
        }

        self.state.lifecycle = LifecycleState::Running;
        info!(
            run_id = %self.run_id,
            dry_run = self.config.dry_run,
            posts_per_hour = self.config.posts_per_hour,
            per_subreddit_cap = self.config.per_subreddit_cap,
            total_cap = self.config.total_cap,
            "Run started"
        );

        let terminal = self.drive(candidates).await;
        self.state.lifecycle = terminal;
        self.flush_sinks();

        info!(
            run_id = %self.run_id,
            state = %self.state.lifecycle,
            total_posted = self.state.total_posted(),
            records = self.state.audit.len(),
            "Run finished"
        );

        Ok(self.report(started_at))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        self.engine.pools().validate(&self.config)
    }

    async fn drive<I>(&mut self, candidates: I) -> LifecycleState
    where
        I: IntoIterator<Item = Candidate>,
    {
        for candidate in candidates {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping run");
                return LifecycleState::Stopped;
            }

            if self.window_closed(self.clock.now()) {
                info!("Run window closed");
                return LifecycleState::Completed;
            }

            let rules = self.oracle.rules_for(&candidate.subreddit);
            match evaluate(&candidate, &rules, &self.state.ledger, &self.config) {
                Verdict::Reject(reason) => {
                    debug!(
                        subreddit = %candidate.subreddit,
                        thread_id = %candidate.thread_id,
                        reason = %reason,
                        "Candidate skipped"
                    );
                    let now = self.clock.now();
                    self.append(ActionRecord::skipped(
                        now,
                        &candidate,
                        reason,
                        self.config.dry_run,
                    ));
                    continue;
                }
                Verdict::Accept => {}
            }

            let now = match self.wait_for_slot().await {
                SlotWait::Ready(now) => now,
                SlotWait::Cancelled => {
                    info!("Cancellation requested while waiting for the next slot");
                    return LifecycleState::Stopped;
                }
                SlotWait::WindowClosed => {
                    info!("Run window closed while waiting for the next slot");
                    return LifecycleState::Completed;
                }
            };

            if let Err(e) = self.dispatch(&candidate, now).await {
                error!(error = %e, "Rendering failed after validation");
                return LifecycleState::Failed {
                    reason: e.to_string(),
                };
            }
        }

        LifecycleState::Completed
    }

    /// The run's only suspension point. Cancellation is checked on entry,
    /// on every wake-up and right before the slot is reserved.
    async fn wait_for_slot(&mut self) -> SlotWait {
        loop {
            if self.cancel.is_cancelled() {
                return SlotWait::Cancelled;
            }

            let now = self.clock.now();
            if self.window_closed(now) {
                return SlotWait::WindowClosed;
            }
            if self.state.scheduler.try_advance(now) {
                return SlotWait::Ready(now);
            }

            let mut wait = self.state.scheduler.wait_time(now).max(MIN_WAIT);
            if let Some(end) = self.config.end_at {
                if let Ok(until_end) = (end - now).to_std() {
                    wait = wait.min(until_end.max(MIN_WAIT));
                }
            }
            debug!(wait_seconds = wait.as_secs_f64(), "Waiting for next pacing slot");

            tokio::select! {
                _ = self.cancel.cancelled() => return SlotWait::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn dispatch(
        &mut self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<(), ConfigError> {
        let previous = self.state.memory.previous(&candidate.subreddit);
        let rendering = self
            .engine
            .render(&self.config, self.state.sequence, previous)?;
        self.state.sequence += 1;
        self.state
            .memory
            .remember(&candidate.subreddit, rendering.selection);

        let dry_run = self.config.dry_run;
        if dry_run {
            info!(
                subreddit = %candidate.subreddit,
                thread_id = %candidate.thread_id,
                title = %candidate.title,
                "Dry run: comment queued"
            );
            self.state.ledger.record_dispatch(candidate);
            self.append(ActionRecord::dispatched(
                now,
                candidate,
                Outcome::Queued,
                rendering.text,
                dry_run,
            ));
            return Ok(());
        }

        match self
            .poster
            .submit(&candidate.subreddit, &candidate.thread_id, &rendering.text)
            .await
        {
            Ok(receipt) => {
                info!(
                    subreddit = %candidate.subreddit,
                    thread_id = %candidate.thread_id,
                    comment_id = ?receipt.comment_id,
                    permalink = ?receipt.permalink,
                    "Comment posted"
                );
                self.state.ledger.record_dispatch(candidate);
                self.append(ActionRecord::dispatched(
                    now,
                    candidate,
                    Outcome::Posted,
                    rendering.text,
                    dry_run,
                ));
            }
            Err(e) => {
                e.log_warn();
                warn!(
                    subreddit = %candidate.subreddit,
                    thread_id = %candidate.thread_id,
                    code = %e.error_code(),
                    "Post failed, moving on"
                );
                self.append(ActionRecord::dispatched(
                    now,
                    candidate,
                    Outcome::Failed {
                        code: e.error_code(),
                        message: e.to_string(),
                    },
                    rendering.text,
                    dry_run,
                ));
            }
        }

        Ok(())
    }

    fn window_closed(&self, now: DateTime<Utc>) -> bool {
        self.config.end_at.map_or(false, |end| now >= end)
    }

    fn append(&mut self, record: ActionRecord) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.append(&record) {
                CoreError::from(e).log_warn();
            }
        }
        self.state.audit.push(record);
    }

    fn flush_sinks(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                CoreError::from(e).log_warn();
            }
        }
    }

    fn report(&self, started_at: DateTime<Utc>) -> RunReport {
        RunReport {
            run_id: self.run_id,
            state: self.state.lifecycle.clone(),
            records: self.state.audit.records().to_vec(),
            total_posted: self.state.total_posted(),
            per_subreddit: self.state.ledger.per_subreddit().clone(),
            started_at,
            finished_at: self.clock.now(),
        }
    }
}
