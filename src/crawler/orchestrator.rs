//! Pipeline orchestrator
//!
//! Drives the staged crawl: competitions seed season discovery, seasons
//! discover matches, matches discover their detail pages. The orchestrator
//! owns every moving part (queue, identity pool, state machine, delay
//! estimator, fallback gate, outcome window) and is the only place they
//! interact. Stage logic contains failures per target; only a halted
//! session stops the pipeline.

use crate::config::Config;
use crate::crawler::fetcher::{build_identity_client, fetch_page, FetchOutcome};
use crate::crawler::parser::{DocumentParser, ParseOutcome};
use crate::identity::{BrowsingSession, IdentityPool};
use crate::queue::{
    CrawlTarget, QueueStore, RunStatus, SqliteQueue, TargetKind, TargetStatus,
};
use crate::throttle::{
    synthetic_targets, CrawlPhase, DelayEstimator, FallbackGate, GateDecision, OutcomeWindow,
    RateLimitStateMachine, RequestOutcome,
};
use crate::{Result, StatlineError};
use reqwest::Client;
use std::path::Path;
use std::time::{Duration, Instant};
use url::Url;

/// Targets claimed per queue round trip
const CLAIM_BATCH: usize = 20;

/// Release-and-retry attempts granted to a pushed-back fetch before the
/// target is marked as an error
const MAX_FETCH_RETRIES: u32 = 3;

/// Per-stage outcome counters
#[derive(Debug, Clone)]
pub struct StageReport {
    pub kind: TargetKind,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub no_data: usize,
    /// Targets returned to pending without a fetch attempt
    pub skipped: usize,
    /// Set when the stage itself aborted, as opposed to individual targets
    /// failing
    pub error: Option<String>,
}

impl StageReport {
    fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            no_data: 0,
            skipped: 0,
            error: None,
        }
    }
}

/// Queue totals per kind at the end of a run
#[derive(Debug, Clone, Copy)]
pub struct KindCompleteness {
    pub kind: TargetKind,
    pub done: u64,
    pub error: u64,
    pub no_data: u64,
    pub pending: u64,
}

/// Summary of a whole pipeline run
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: i64,
    pub stages: Vec<StageReport>,
    pub completeness: Vec<KindCompleteness>,
    /// True when the session halted before the pipeline finished
    pub halted: bool,
    /// Set when a mandatory stage aborted and ended the run early
    pub failed_stage: Option<TargetKind>,
}

/// The client, header session and pool slot currently in use
struct ActiveSession {
    identity_id: usize,
    browsing: BrowsingSession,
    client: Client,
}

/// Staged pipeline driver
pub struct Orchestrator<P: DocumentParser, Q: QueueStore = SqliteQueue> {
    config: Config,
    queue: Q,
    pool: IdentityPool,
    machine: RateLimitStateMachine,
    estimator: DelayEstimator,
    gate: FallbackGate,
    window: OutcomeWindow,
    parser: P,
    run_id: i64,
    session: Option<ActiveSession>,
}

impl<P: DocumentParser> Orchestrator<P> {
    /// Opens the queue, resumes or creates a run, and seeds discovery
    ///
    /// An interrupted run (status still running) is resumed; its claimed
    /// targets are returned to pending. Configured competition pages are
    /// enqueued idempotently, so repeated startups never duplicate work.
    pub fn new(config: Config, config_hash: &str, parser: P) -> Result<Self> {
        let queue = SqliteQueue::new(Path::new(&config.output.database_path))?;
        Self::with_store(config, config_hash, parser, queue)
    }
}

impl<P: DocumentParser, Q: QueueStore> Orchestrator<P, Q> {
    /// Builds an orchestrator over an already-open queue store
    pub fn with_store(config: Config, config_hash: &str, parser: P, mut queue: Q) -> Result<Self> {
        let run_id = match queue.get_latest_run()? {
            Some(run) if run.status == RunStatus::Running => {
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Resuming run {} under a different configuration than it started with",
                        run.id
                    );
                }
                tracing::info!("Resuming interrupted run {}", run.id);
                run.id
            }
            _ => queue.create_run(config_hash)?,
        };

        queue.reset_in_progress()?;

        for competition in &config.competitions {
            queue.enqueue(&competition.url, TargetKind::Competition, None, run_id)?;
        }

        let pool = IdentityPool::from_config(&config.proxies, config.identity.clone());
        let machine = RateLimitStateMachine::new(config.throttle.clone());
        let estimator = DelayEstimator::new(
            config.traffic.clone(),
            Duration::from_millis(config.throttle.min_delay_ms),
            Duration::from_millis(config.throttle.max_delay_ms),
        );
        let gate = FallbackGate::new(config.fallback.clone());

        Ok(Self {
            config,
            queue,
            pool,
            machine,
            estimator,
            gate,
            window: OutcomeWindow::new(),
            parser,
            run_id,
            session: None,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs every stage in pipeline order and reports what happened
    pub async fn run(&mut self) -> Result<PipelineReport> {
        tracing::info!("Starting crawl run {}", self.run_id);
        self.ensure_session()?;

        let base_url = self.config.source.base_url.clone();
        if let Some(session) = &self.session {
            self.gate.probe_connectivity(&session.client, &base_url).await;
        }

        let mut stages = Vec::new();
        let mut failed_stage = None;
        for kind in TargetKind::all() {
            if self.machine.is_halted() {
                break;
            }
            let report = match self.run_stage(kind).await {
                Ok(report) => report,
                Err(e) => {
                    // A stage abort never panics the pipeline; a mandatory
                    // stage ends the run, an optional one is skipped over
                    tracing::error!("Stage {} aborted: {}", kind, e);
                    let mut report = StageReport::new(kind);
                    report.error = Some(e.to_string());
                    stages.push(report);
                    if Self::stage_is_mandatory(kind) {
                        failed_stage = Some(kind);
                        break;
                    }
                    continue;
                }
            };
            tracing::info!(
                "Stage {}: {} attempted, {} succeeded, {} failed, {} no-data, {} skipped",
                report.kind,
                report.attempted,
                report.succeeded,
                report.failed,
                report.no_data,
                report.skipped
            );
            stages.push(report);
        }

        let halted = self.machine.is_halted();
        let completeness = self.completeness()?;
        for entry in &completeness {
            tracing::info!(
                "{}: {} done, {} error, {} no-data, {} pending",
                entry.kind,
                entry.done,
                entry.error,
                entry.no_data,
                entry.pending
            );
        }

        let pending = self.queue.count_by_status(TargetStatus::Pending)?;
        if halted {
            self.queue.fail_run(self.run_id)?;
            tracing::error!(
                "Run {} halted after {} identity changes; operator reset required",
                self.run_id,
                self.machine.state().identity_changes
            );
        } else if let Some(kind) = failed_stage {
            self.queue.fail_run(self.run_id)?;
            tracing::error!("Run {} ended by mandatory stage {}", self.run_id, kind);
        } else if pending == 0 {
            self.queue.complete_run(self.run_id)?;
            tracing::info!("Run {} complete", self.run_id);
        } else {
            tracing::info!(
                "Run {} left open with {} targets pending; rerun to resume",
                self.run_id,
                pending
            );
        }

        Ok(PipelineReport {
            run_id: self.run_id,
            stages,
            completeness,
            halted,
            failed_stage,
        })
    }

    /// Whether a stage failure must end the run
    ///
    /// The discovery stages feed everything below them, so the pipeline has
    /// nothing left to do when one aborts. The leaf stages are re-coverable
    /// on the next run from what is already queued.
    fn stage_is_mandatory(kind: TargetKind) -> bool {
        matches!(kind, TargetKind::Competition | TargetKind::SeasonLink)
    }

    /// Processes every claimable target of one kind
    ///
    /// The stage ends when the queue runs dry for this kind, the fallback
    /// gate suspends live access, the failure ceiling is hit, or the session
    /// halts. Claimed-but-unprocessed targets are always released.
    async fn run_stage(&mut self, kind: TargetKind) -> Result<StageReport> {
        let mut report = StageReport::new(kind);

        'stage: loop {
            if self.machine.is_halted() || !self.machine.should_continue() {
                break;
            }

            let batch = self.queue.claim_pending(kind, CLAIM_BATCH)?;
            if batch.is_empty() {
                break;
            }

            let mut idx = 0;
            while idx < batch.len() {
                if self.machine.is_halted() || !self.machine.should_continue() {
                    self.release_rest(&batch[idx..])?;
                    break 'stage;
                }

                let decision = self.gate.check(self.machine.state(), &self.window);
                if let GateDecision::Fallback(reason) = decision {
                    report.skipped += batch.len() - idx;
                    self.release_rest(&batch[idx..])?;
                    if kind == TargetKind::Competition {
                        self.enqueue_synthetic()?;
                    }
                    tracing::info!("Stage {} suspended by fallback gate ({:?})", kind, reason);
                    break 'stage;
                }

                self.pace(&batch[idx].url).await;
                self.process_target(&batch[idx], &mut report).await?;
                idx += 1;
            }
        }

        Ok(report)
    }

    /// Fetches one target and feeds the outcome everywhere it matters
    async fn process_target(
        &mut self,
        target: &CrawlTarget,
        report: &mut StageReport,
    ) -> Result<()> {
        if self.machine.should_rotate_identity() && !self.rotate_identity()? {
            // Halted or no identity available; the caller re-checks state
            self.queue.release(target.id)?;
            report.skipped += 1;
            return Ok(());
        }

        let session = match &self.session {
            Some(s) => s,
            None => return Err(StatlineError::IdentityPoolExhausted),
        };
        let identity_id = session.identity_id;
        let deadline = Duration::from_secs(self.config.fetch.hard_timeout_secs);

        let outcome = fetch_page(&session.client, &session.browsing, &target.url, deadline).await;
        report.attempted += 1;

        match outcome {
            FetchOutcome::Success {
                final_url,
                status_code,
                body,
                latency,
            } => {
                self.machine.record_success(latency);
                self.pool.record_result(identity_id, true, latency);
                self.record_outcome(&target.url, true, Some(status_code), latency);
                if let Some(session) = self.session.as_mut() {
                    session.browsing.record_navigation(&final_url);
                }

                let base = Url::parse(&final_url)?;
                match self.parser.parse(&body, target.kind, &base) {
                    ParseOutcome::Discovered(links) => {
                        for link in links {
                            self.queue
                                .enqueue(&link.url, link.kind, Some(target.id), self.run_id)?;
                        }
                        self.queue.mark(target.id, TargetStatus::Done, None)?;
                        report.succeeded += 1;
                    }
                    ParseOutcome::NoData => {
                        self.queue.mark(target.id, TargetStatus::NoData, None)?;
                        report.no_data += 1;
                    }
                }
            }

            FetchOutcome::RateLimited => {
                self.machine.record_429_error();
                self.pool.record_result(identity_id, false, Duration::ZERO);
                self.record_outcome(&target.url, false, Some(429), Duration::ZERO);
                self.retry_or_fail(target, "HTTP 429", report)?;
            }

            FetchOutcome::HttpError { status_code } => {
                // An ordinary HTTP error is not rate-limit pushback; the
                // target fails but the session state is untouched
                self.pool.record_result(identity_id, false, Duration::ZERO);
                self.record_outcome(&target.url, false, Some(status_code), Duration::ZERO);
                self.queue.mark(
                    target.id,
                    TargetStatus::Error,
                    Some(&format!("HTTP {}", status_code)),
                )?;
                report.failed += 1;
            }

            FetchOutcome::Transport { message } => {
                self.machine.record_connection_error();
                self.pool.record_result(identity_id, false, Duration::ZERO);
                self.record_outcome(&target.url, false, None, Duration::ZERO);
                self.retry_or_fail(target, &message, report)?;
            }

            FetchOutcome::DeadlineExceeded => {
                self.machine.record_connection_error();
                self.pool.record_result(identity_id, false, Duration::ZERO);
                self.record_outcome(&target.url, false, None, Duration::ZERO);
                self.retry_or_fail(target, "fetch deadline exceeded", report)?;
            }
        }

        Ok(())
    }

    /// Waits out the recommended delay before the next fetch
    ///
    /// While nominal the traffic-aware estimator paces requests (and may
    /// open a burst window); in any degraded phase the state machine's
    /// backoff takes over.
    async fn pace(&mut self, url: &str) {
        let wait = if self.machine.phase() == CrawlPhase::Nominal {
            self.estimator.should_use_burst_mode(&self.window);
            self.estimator.recommended_delay(url, &self.window)
        } else {
            self.machine.calculate_delay()
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let id = self.pool.next_identity()?;
        let identity = match self.pool.identity(id) {
            Some(i) => i,
            None => return Err(StatlineError::IdentityPoolExhausted),
        };
        let client = build_identity_client(identity, &self.config.fetch)?;
        let browsing = BrowsingSession::new(identity.profile);
        tracing::info!("Session established on identity {}", identity.describe());

        self.session = Some(ActiveSession {
            identity_id: id,
            browsing,
            client,
        });
        Ok(())
    }

    /// Swaps to a fresh identity while reconfiguring
    ///
    /// Returns false when no rotation happened: either the session just
    /// halted, or every identity is blocked or cooling, in which case a
    /// fallback window buys time instead.
    fn rotate_identity(&mut self) -> Result<bool> {
        match self.machine.record_identity_change() {
            Ok(()) => {}
            Err(StatlineError::HaltedSession { identity_changes }) => {
                tracing::error!("Session halted after {} identity changes", identity_changes);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let id = match self.pool.next_identity() {
            Ok(id) => id,
            Err(StatlineError::IdentityPoolExhausted) => {
                let cooldown = Duration::from_secs(self.config.identity.cooldown_secs.max(1));
                tracing::warn!(
                    "No identity available to rotate to; suspending live fetches for {:?}",
                    cooldown
                );
                self.gate.force_window(cooldown);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let identity = match self.pool.identity(id) {
            Some(i) => i,
            None => return Err(StatlineError::IdentityPoolExhausted),
        };
        let client = build_identity_client(identity, &self.config.fetch)?;
        let browsing = BrowsingSession::new(identity.profile);
        tracing::info!("Rotated to identity {}", identity.describe());

        self.session = Some(ActiveSession {
            identity_id: id,
            browsing,
            client,
        });
        Ok(true)
    }

    fn retry_or_fail(
        &mut self,
        target: &CrawlTarget,
        message: &str,
        report: &mut StageReport,
    ) -> Result<()> {
        if target.retry_count < MAX_FETCH_RETRIES {
            self.queue.increment_retry(target.id)?;
            self.queue.release(target.id)?;
            tracing::debug!(
                "Will retry {} (attempt {} of {}): {}",
                target.url,
                target.retry_count + 1,
                MAX_FETCH_RETRIES,
                message
            );
        } else {
            self.queue
                .mark(target.id, TargetStatus::Error, Some(message))?;
            report.failed += 1;
        }
        Ok(())
    }

    fn record_outcome(
        &mut self,
        url: &str,
        success: bool,
        http_status: Option<u16>,
        latency: Duration,
    ) {
        self.window.record(RequestOutcome {
            at: Instant::now(),
            url: url.to_string(),
            success,
            http_status,
            latency,
        });
    }

    fn release_rest(&mut self, targets: &[CrawlTarget]) -> Result<()> {
        for target in targets {
            self.queue.release(target.id)?;
        }
        Ok(())
    }

    /// Expands the competition mapping into season targets when live
    /// discovery is refused, so the pipeline keeps moving on known structure
    fn enqueue_synthetic(&mut self) -> Result<()> {
        let targets = synthetic_targets(&self.config.competitions);
        if targets.is_empty() {
            return Ok(());
        }
        tracing::info!(
            "Live discovery refused; enqueueing {} synthetic season targets",
            targets.len()
        );
        for (url, kind) in targets {
            self.queue.enqueue(&url, kind, None, self.run_id)?;
        }
        Ok(())
    }

    fn completeness(&self) -> Result<Vec<KindCompleteness>> {
        let mut entries = Vec::new();
        for kind in TargetKind::all() {
            entries.push(KindCompleteness {
                kind,
                done: self.queue.count_by_kind_and_status(kind, TargetStatus::Done)?,
                error: self
                    .queue
                    .count_by_kind_and_status(kind, TargetStatus::Error)?,
                no_data: self
                    .queue
                    .count_by_kind_and_status(kind, TargetStatus::NoData)?,
                pending: self
                    .queue
                    .count_by_kind_and_status(kind, TargetStatus::Pending)?,
            });
        }
        Ok(entries)
    }

    /// Read access to the queue, for reporting from the CLI
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Operator reset: clears every identity block before the run starts
    pub fn unblock_identities(&mut self) {
        self.pool.unblock_all();
    }
}
