//! Progressive tier coordination.
//!
//! Runs walkthroughs tier by tier through a strict lifecycle: idle until
//! activated, active while a tier executes, publishing while its results
//! are committed, complete when the plan is exhausted. Results become
//! visible only once their tier has been published, so consumers never
//! observe a half-finished tier. Variants execute in fixed-size windows
//! where every member runs to completion regardless of its neighbors'
//! failures.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CachedResult, ExecutionOptions, ResultCache};
use crate::config::GauntletConfig;
use crate::engine::{bind, CompletionCapability};
use crate::error::{CoordinatorError, Result};
use crate::executor::TrialExecutor;
use crate::report;
use crate::types::{Tier, VariantResult, Walkthrough, WalkthroughResult};

/// Cooperative stop handle threaded through an execution run. Stop is a
/// request, not preemption: in-flight trials finish, nothing new starts.
/// A pending request survives until a run observes it, then the context
/// is reset for the next run.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    token: Mutex<CancellationToken>,
}

impl ExecutionContext {
    pub fn request_stop(&self) {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_cancelled()
    }

    /// Arm a fresh token, clearing any consumed stop request.
    pub fn reset(&self) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
    }
}

/// Lifecycle phase reported through the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    TierStarted,
    VariantCompleted,
    Publishing,
    TierCompleted,
    Completed,
    Stopped,
}

/// A progress event. Consumers subscribe via
/// [`ProgressiveTierCoordinator::subscribe`]; the channel is lossy and a
/// slow consumer never blocks execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub tier: Option<Tier>,
    pub completed: usize,
    pub total: usize,
    pub context: String,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped,
}

/// Outcome of a progressive run. A stopped run still carries every tier
/// that finished publishing before the stop took effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: uuid::Uuid,
    pub status: RunStatus,
    pub completed_tiers: Vec<Tier>,
    pub results: HashMap<Tier, Vec<WalkthroughResult>>,
    pub execution_time_ms: u64,
}

/// Mutable coordination state. Everything here is read and written under
/// the coordinator's lock only.
#[derive(Debug, Default)]
struct CoordinationState {
    active: bool,
    current_tier: Option<Tier>,
    tier_plan: Vec<Tier>,
    completed: Vec<Tier>,
    snapshots: HashMap<Tier, Vec<VariantResult>>,
}

impl CoordinationState {
    /// Idempotent: publishing the same tier twice records it once.
    fn mark_completed(&mut self, tier: Tier) {
        if !self.completed.contains(&tier) {
            self.completed.push(tier);
        }
    }

    fn reset_to_idle(&mut self) {
        self.active = false;
        self.current_tier = None;
    }
}

/// Guard that clears the publish-in-progress flag on drop, so a panic or
/// early return during publication can never leave the coordinator
/// permanently blocked.
struct PublishGuard {
    flag: Arc<AtomicBool>,
}

impl PublishGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag: Arc::clone(flag) }
    }
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Coordinates progressive tier-by-tier evaluation of walkthroughs.
pub struct ProgressiveTierCoordinator {
    config: GauntletConfig,
    executor: TrialExecutor,
    cache: tokio::sync::Mutex<ResultCache>,
    state: Mutex<CoordinationState>,
    blocked: Arc<AtomicBool>,
    events: broadcast::Sender<ProgressEvent>,
    ctx: ExecutionContext,
}

impl ProgressiveTierCoordinator {
    pub fn new(config: GauntletConfig, executor: TrialExecutor) -> Self {
        let cache = tokio::sync::Mutex::new(ResultCache::new(&config.cache));
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            executor,
            cache,
            state: Mutex::new(CoordinationState::default()),
            blocked: Arc::new(AtomicBool::new(false)),
            events,
            ctx: ExecutionContext::default(),
        }
    }

    /// Subscribe to progress events. Events emitted while no subscriber
    /// exists are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Request a cooperative stop of the current run.
    pub fn stop(&self) {
        info!("Stop requested");
        self.ctx.request_stop();
    }

    /// Whether a tier publication is currently in progress.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Tiers whose results have been published, in completion order.
    pub fn completed_tiers(&self) -> Vec<Tier> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).completed.clone()
    }

    /// Published variant results for one tier. Unpublished tiers yield
    /// nothing, even mid-execution.
    pub fn visible_results(&self, tier: Tier) -> Vec<VariantResult> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.completed.contains(&tier) {
            state.snapshots.get(&tier).cloned().unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// Filter a keyed result map (`identity@TIER`) down to entries whose
    /// tier has been published. Keys without a parsable tier suffix pass
    /// through untouched.
    pub fn filter_visible(
        &self,
        keyed: &HashMap<String, VariantResult>,
    ) -> HashMap<String, VariantResult> {
        let completed = self.completed_tiers();
        keyed
            .iter()
            .filter(|(key, _)| match key.rsplit_once('@') {
                Some((_, suffix)) => match Tier::parse(suffix) {
                    Some(tier) => completed.contains(&tier),
                    None => true,
                },
                None => true,
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Run all walkthroughs through the tier plan. Engine and trial
    /// failures degrade to zero-score results; only activation errors
    /// (empty plan, concurrent run, unhealthy engine) are returned as
    /// errors.
    pub async fn run(
        &self,
        walkthroughs: &[Walkthrough],
        tier_plan: &[Tier],
        options: &ExecutionOptions,
        engine: Arc<dyn CompletionCapability>,
    ) -> Result<RunOutcome> {
        if tier_plan.is_empty() {
            return Err(CoordinatorError::EmptyTierPlan.into());
        }
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.active {
                return Err(CoordinatorError::AlreadyActive.into());
            }
            state.active = true;
            state.tier_plan = tier_plan.to_vec();
            state.completed.clear();
            state.snapshots.clear();
        }
        let engine = match bind(engine).await {
            Ok(engine) => engine,
            Err(e) => {
                self.state
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .reset_to_idle();
                return Err(e.into());
            }
        };

        let run_id = uuid::Uuid::new_v4();
        info!(%run_id, tiers = tier_plan.len(), walkthroughs = walkthroughs.len(), "Progressive run activated");

        let started = Instant::now();
        let total_variants: usize = walkthroughs
            .iter()
            .flat_map(|w| w.scenarios.iter())
            .map(|s| s.variants.len())
            .sum();
        let grand_total = total_variants * tier_plan.len();
        self.emit(Phase::Setup, None, 0, grand_total, "run activated");

        let mut results: HashMap<Tier, Vec<WalkthroughResult>> = HashMap::new();
        let mut done = 0usize;
        let mut stopped = false;

        'tiers: for &tier in tier_plan {
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.current_tier = Some(tier);
            }
            self.emit(Phase::TierStarted, Some(tier), done, grand_total, tier.label());

            let mut tier_walkthroughs = Vec::new();
            let mut tier_snapshot = Vec::new();
            for walkthrough in walkthroughs {
                let tier_started = Instant::now();
                let mut scenario_results = Vec::new();
                for scenario in &walkthrough.scenarios {
                    let window = self.config.runtime.concurrency_window.max(1);
                    let mut variant_results = Vec::new();
                    for chunk in scenario.variants.chunks(window) {
                        if self.ctx.is_stop_requested() {
                            stopped = true;
                            break 'tiers;
                        }
                        // Every window member runs to completion; a failed
                        // variant carries zero-score trials rather than
                        // aborting its neighbors.
                        let batch = join_all(chunk.iter().map(|variant| {
                            self.run_or_recall(walkthrough, scenario.step, variant, tier, options, &engine)
                        }))
                        .await;
                        for result in batch {
                            done += 1;
                            self.emit(
                                Phase::VariantCompleted,
                                Some(tier),
                                done,
                                grand_total,
                                &result.variant_id,
                            );
                            variant_results.push(result);
                        }
                        // A stop that lands while a window is in flight has
                        // already truncated variant runs inside the
                        // executor; the tier must not publish that data as
                        // completed.
                        if self.ctx.is_stop_requested() {
                            stopped = true;
                            break 'tiers;
                        }
                        if self.config.runtime.inter_window_pause_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(
                                self.config.runtime.inter_window_pause_ms,
                            ))
                            .await;
                        }
                    }
                    scenario_results.push(report::scenario_result(
                        scenario.step,
                        &scenario.context,
                        variant_results,
                    ));
                }
                tier_snapshot.extend(
                    scenario_results
                        .iter()
                        .flat_map(|s| s.variant_results.iter().cloned()),
                );
                tier_walkthroughs.push(report::assemble_walkthrough_result(
                    walkthrough,
                    tier,
                    scenario_results,
                    tier_started.elapsed().as_millis() as u64,
                ));
            }

            self.publish_tier(tier, tier_snapshot, done, grand_total);
            results.insert(tier, tier_walkthroughs);
        }

        let status = if stopped {
            self.emit(Phase::Stopped, None, done, grand_total, "stop honored");
            RunStatus::Stopped
        } else {
            self.emit(Phase::Completed, None, done, grand_total, "plan exhausted");
            RunStatus::Completed
        };

        let completed_tiers = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.reset_to_idle();
            state.completed.clone()
        };
        self.ctx.reset();

        Ok(RunOutcome {
            run_id,
            status,
            completed_tiers,
            results,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Execute one variant or recall it from cache.
    async fn run_or_recall(
        &self,
        walkthrough: &Walkthrough,
        step: usize,
        variant: &crate::types::Variant,
        tier: Tier,
        options: &ExecutionOptions,
        engine: &Arc<dyn CompletionCapability>,
    ) -> VariantResult {
        let identity = format!("{}::{}::{}", walkthrough.id, step, variant.id);
        let key = ResultCache::cache_key(&identity, variant.approach, tier, options);
        if let Some(CachedResult::Variant(cached)) = self.cache.lock().await.get(&key) {
            debug!(key, "Variant served from cache");
            return cached;
        }
        let trials = self
            .executor
            .run_variant(variant, tier, options, &self.ctx, engine)
            .await;
        let result = report::variant_result_from_trials(
            variant,
            tier,
            trials,
            self.config.analyzer.efficiency_token_baseline,
        );
        self.cache
            .lock()
            .await
            .set(key, CachedResult::Variant(result.clone()));
        result
    }

    /// Commit a tier's results. The blocked flag is held only for the
    /// duration of the commit and is guaranteed to clear via the guard.
    fn publish_tier(&self, tier: Tier, snapshot: Vec<VariantResult>, done: usize, total: usize) {
        let _guard = PublishGuard::acquire(&self.blocked);
        self.emit(Phase::Publishing, Some(tier), done, total, tier.label());
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.snapshots.insert(tier, snapshot);
            state.mark_completed(tier);
        }
        self.emit(Phase::TierCompleted, Some(tier), done, total, tier.label());
        info!(tier = %tier, "Tier published");
    }

    fn emit(&self, phase: Phase, tier: Option<Tier>, completed: usize, total: usize, context: &str) {
        let event = ProgressEvent {
            phase,
            tier,
            completed,
            total,
            context: context.to_string(),
        };
        // Best effort: no subscribers means the event is simply dropped.
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
