//! Scenario sweeps over one inference target.
//!
//! Each scenario moves through `Pending -> Sampling -> Aggregating` and ends
//! `Baselined`, `Compared` or `Failed`. Failures stay local to their
//! scenario; the sweep always continues and reports every outcome at the
//! end. Nothing is retried automatically.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    HarnessError,
    compare::{self, RegressionVerdict},
    config::{ComponentSweep, MissingBaselinePolicy, RunMode, RunnerConfig},
    record::{Baseline, MetricsRecord, ScenarioKey, unix_now},
    sample::{Sample, Sampler},
    stats::{self, ScenarioMetadata},
    store::BaselineStore,
    synthetic::generate_batch,
    target::{InferenceInput, InferenceTarget},
};

/// Cooperative cancellation, checked before each scenario starts. A sample
/// already in flight always runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum ScenarioState {
    Pending,
    Sampling,
    Aggregating,
    Baselined(MetricsRecord),
    Compared {
        record: MetricsRecord,
        verdicts: Vec<RegressionVerdict>,
    },
    Failed(HarnessError),
}

impl ScenarioState {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioState::Pending => "PENDING",
            ScenarioState::Sampling => "SAMPLING",
            ScenarioState::Aggregating => "AGGREGATING",
            ScenarioState::Baselined(_) => "BASELINED",
            ScenarioState::Compared { .. } => "COMPARED",
            ScenarioState::Failed(_) => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioState::Baselined(_) | ScenarioState::Compared { .. } | ScenarioState::Failed(_)
        )
    }

    fn allows(&self, next: &ScenarioState) -> bool {
        use ScenarioState::*;
        matches!(
            (self, next),
            (Pending, Sampling)
                | (Sampling, Aggregating)
                | (Sampling, Failed(_))
                | (Aggregating, Baselined(_))
                | (Aggregating, Compared { .. })
                | (Aggregating, Failed(_))
        )
    }
}

#[derive(Debug)]
pub struct ScenarioRun {
    pub key: ScenarioKey,
    pub state: ScenarioState,
}

impl ScenarioRun {
    fn new(key: ScenarioKey) -> Self {
        Self {
            key,
            state: ScenarioState::Pending,
        }
    }

    fn transition(&mut self, next: ScenarioState) {
        debug_assert!(
            self.state.allows(&next),
            "illegal transition {} -> {} for {}",
            self.state.name(),
            next.name(),
            self.key
        );
        debug!(scenario = %self.key, from = self.state.name(), to = next.name(), "state");
        self.state = next;
    }

    pub fn record(&self) -> Option<&MetricsRecord> {
        match &self.state {
            ScenarioState::Baselined(record) | ScenarioState::Compared { record, .. } => {
                Some(record)
            }
            _ => None,
        }
    }

    pub fn verdicts(&self) -> &[RegressionVerdict] {
        match &self.state {
            ScenarioState::Compared { verdicts, .. } => verdicts,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&HarnessError> {
        match &self.state {
            ScenarioState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Final status of a sweep across all of its scenarios.
#[derive(Debug)]
pub struct SweepReport {
    pub component: String,
    pub baseline_name: String,
    pub scenarios: Vec<ScenarioRun>,
    pub cancelled: bool,
    /// Whether this sweep wrote (or replaced) the named baseline.
    pub baseline_saved: bool,
    pub warnings: Vec<String>,
}

impl SweepReport {
    /// Every scenario finished, none failed and no verdict flagged a
    /// regression.
    pub fn passed(&self) -> bool {
        self.unfinished().next().is_none()
            && self.failed().next().is_none()
            && self.regressions().is_empty()
    }

    /// Scenarios that never reached a terminal state, e.g. after cancellation.
    pub fn unfinished(&self) -> impl Iterator<Item = &ScenarioRun> {
        self.scenarios.iter().filter(|run| !run.state.is_terminal())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScenarioRun> {
        self.scenarios
            .iter()
            .filter(|run| matches!(run.state, ScenarioState::Failed(_)))
    }

    pub fn regressions(&self) -> Vec<(&ScenarioKey, &RegressionVerdict)> {
        self.scenarios
            .iter()
            .flat_map(|run| {
                run.verdicts()
                    .iter()
                    .filter(|v| !v.passed())
                    .map(move |v| (&run.key, v))
            })
            .collect()
    }

    pub fn records(&self) -> Vec<&MetricsRecord> {
        self.scenarios.iter().filter_map(ScenarioRun::record).collect()
    }

    /// The run's records as a baseline document, e.g. for writing the
    /// current results next to the stored baseline.
    pub fn to_baseline<N: Into<String>>(&self, name: N) -> Baseline {
        Baseline::from_records(name, self.records().into_iter().cloned())
    }
}

pub struct BenchmarkRunner<T, S> {
    target: Arc<T>,
    store: S,
    sampler: Sampler,
    config: RunnerConfig,
    cancel: CancelToken,
    /// Helper thread of a timed-out call on a target that must not be
    /// called concurrently. No new call starts until it has finished.
    stalled: Mutex<Option<JoinHandle<()>>>,
}

impl<T, S> BenchmarkRunner<T, S>
where
    T: InferenceTarget + 'static,
    S: BaselineStore,
{
    pub fn new(target: T, store: S, config: RunnerConfig) -> Self {
        Self {
            target: Arc::new(target),
            store,
            sampler: Sampler::default(),
            config,
            cancel: CancelToken::new(),
            stalled: Mutex::new(None),
        }
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs every scenario of `sweep`. Only configuration and storage access
    /// problems surface as `Err`; everything scenario-specific is reported in
    /// the returned [`SweepReport`].
    pub fn run(&self, sweep: &ComponentSweep) -> Result<SweepReport, HarnessError> {
        self.config.validate()?;
        sweep.validate()?;
        let keys = self.scenario_keys(sweep)?;

        let mut warnings = Vec::new();
        let stored = match self.config.mode {
            RunMode::Baseline => None,
            RunMode::Compare => match self.store.load(&self.config.baseline_name) {
                Ok(baseline) => Some(baseline),
                Err(err) if err.is_baseline_not_found() => {
                    let msg = format!(
                        "baseline {} not found; no regression check possible",
                        self.config.baseline_name
                    );
                    warn!(baseline = %self.config.baseline_name, "{msg}");
                    warnings.push(msg);
                    None
                }
                Err(err) => return Err(err),
            },
        };

        let measured = self.execute_all(&keys);
        let cancelled = self.cancel.is_cancelled();

        let mut report = SweepReport {
            component: self.target.component().to_string(),
            baseline_name: self.config.baseline_name.clone(),
            scenarios: Vec::with_capacity(measured.len()),
            cancelled,
            baseline_saved: false,
            warnings,
        };

        let establish = match self.config.mode {
            RunMode::Baseline => true,
            RunMode::Compare => {
                stored.is_none() && self.config.missing_baseline == MissingBaselinePolicy::Establish
            }
        };

        if establish {
            self.finish_as_baseline(measured, &mut report);
        } else {
            for (mut run, record) in measured {
                if let Some(record) = record {
                    let verdicts = self.verdicts_for(stored.as_ref(), &record, &mut report.warnings);
                    match verdicts {
                        Ok(verdicts) => {
                            run.transition(ScenarioState::Compared { record, verdicts })
                        }
                        Err(err) => run.transition(ScenarioState::Failed(err)),
                    }
                }
                report.scenarios.push(run);
            }
        }

        info!(
            component = %report.component,
            scenarios = report.scenarios.len(),
            failed = report.failed().count(),
            regressions = report.regressions().len(),
            cancelled = report.cancelled,
            "sweep finished"
        );
        Ok(report)
    }

    fn scenario_keys(&self, sweep: &ComponentSweep) -> Result<Vec<ScenarioKey>, HarnessError> {
        let component = self.target.component();
        let mut keys = Vec::new();
        for &batch_size in &sweep.batch_sizes {
            for &bucket in &sweep.length_buckets {
                let key = ScenarioKey::new(component, batch_size, bucket);
                key.validate()?;
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn execute_all(&self, keys: &[ScenarioKey]) -> Vec<(ScenarioRun, Option<MetricsRecord>)> {
        if !(self.config.parallel_scenarios && self.target.concurrent_safe()) {
            if self.config.parallel_scenarios {
                warn!(
                    component = self.target.component(),
                    "target is not safe for concurrent calls; running scenarios sequentially"
                );
            }
            return keys.iter().map(|key| self.execute(key.clone())).collect();
        }
        thread::scope(|scope| {
            let handles: Vec<_> = keys
                .iter()
                .map(|key| (key, scope.spawn(move || self.execute(key.clone()))))
                .collect();
            handles
                .into_iter()
                .map(|(key, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        let mut run = ScenarioRun::new(key.clone());
                        run.state = ScenarioState::Failed(HarnessError::target(
                            "scenario thread panicked",
                        ));
                        (run, None)
                    })
                })
                .collect()
        })
    }

    /// Samples and aggregates one scenario. On success the run is left in
    /// `Aggregating` together with its record; the caller decides the
    /// terminal state.
    fn execute(&self, key: ScenarioKey) -> (ScenarioRun, Option<MetricsRecord>) {
        let mut run = ScenarioRun::new(key);
        if self.cancel.is_cancelled() {
            debug!(scenario = %run.key, "cancelled before start");
            return (run, None);
        }

        run.transition(ScenarioState::Sampling);
        info!(scenario = %run.key, iterations = self.config.iterations, "sampling");
        let batch: Arc<[InferenceInput]> = generate_batch(
            self.target.input_kind(),
            run.key.batch_size,
            run.key.length_bucket,
            self.config.seed,
        )
        .into();

        for _ in 0..self.config.warmup_iterations {
            if let Err(err) = self.measure(&batch) {
                debug!(scenario = %run.key, error = %err, "warm-up call failed");
            }
        }

        let baseline_memory_mb = self.sampler.memory_mb();
        let mut samples: Vec<Sample> = Vec::with_capacity(self.config.iterations);
        let mut failures = 0usize;
        let mut last_error = None;
        for iteration in 0..self.config.iterations {
            match self.measure(&batch) {
                Ok(sample) => samples.push(sample),
                Err(err) => {
                    warn!(scenario = %run.key, iteration, error = %err, "sample failed");
                    failures += 1;
                    last_error = Some(err);
                }
            }
        }

        if samples.is_empty() {
            let last_error = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no samples taken".to_string());
            let err = HarnessError::ScenarioExecution {
                scenario: run.key.to_string(),
                failures,
                last_error,
            };
            run.transition(ScenarioState::Failed(err));
            return (run, None);
        }

        run.transition(ScenarioState::Aggregating);
        let meta = ScenarioMetadata::new(run.key.clone(), baseline_memory_mb, unix_now())
            .with_failures(failures);
        match stats::aggregate(&samples, &meta) {
            Ok(record) => {
                info!(scenario = %run.key, "{}", record.summary());
                (run, Some(record))
            }
            Err(err) => {
                run.transition(ScenarioState::Failed(err));
                (run, None)
            }
        }
    }

    /// One measured inference call, bounded by the configured timeout.
    fn measure(&self, batch: &Arc<[InferenceInput]>) -> Result<Sample, HarnessError> {
        match self.config.sample_timeout {
            None => self.sampler.sample(batch.len(), || self.call(batch)),
            Some(timeout) => self
                .sampler
                .sample_reported(batch.len(), || self.call_with_deadline(batch, timeout)),
        }
    }

    fn call(&self, batch: &[InferenceInput]) -> Result<(), HarnessError> {
        let produced = self.target.infer(batch)?.len();
        check_output_count(produced, batch.len())
    }

    /// Runs the call on a helper thread and times it there, so spawning and
    /// the hand-back are not measured. A call that overruns is abandoned and
    /// reported as a failed sample. For targets that are not safe for
    /// concurrent calls the abandoned call blocks every further call until
    /// it returns; those calls fail without reaching the target.
    fn call_with_deadline(
        &self,
        batch: &Arc<[InferenceInput]>,
        timeout: Duration,
    ) -> Result<Duration, HarnessError> {
        let exclusive = !self.target.concurrent_safe();
        if exclusive {
            let mut stalled = self.stalled.lock();
            if let Some(handle) = stalled.take() {
                if !handle.is_finished() {
                    *stalled = Some(handle);
                    return Err(HarnessError::sample_failure(
                        "an earlier timed-out call is still running",
                    ));
                }
                let _ = handle.join();
            }
        }

        let (tx, rx) = mpsc::channel();
        let target = Arc::clone(&self.target);
        let inputs = Arc::clone(batch);
        let handle = thread::Builder::new()
            .name("inferbench-call".into())
            .spawn(move || {
                let start = Instant::now();
                let result = target.infer(&inputs).map(|outputs| outputs.len());
                let _ = tx.send(result.map(|produced| (start.elapsed(), produced)));
            })
            .map_err(|e| HarnessError::sample_failure(format!("spawn call thread: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => {
                let _ = handle.join();
                let (elapsed, produced) = result?;
                check_output_count(produced, batch.len())?;
                Ok(elapsed)
            }
            Err(RecvTimeoutError::Timeout) => {
                if exclusive {
                    *self.stalled.lock() = Some(handle);
                }
                Err(HarnessError::sample_failure(format!(
                    "inference call exceeded {}ms",
                    timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(HarnessError::sample_failure("inference call panicked"))
            }
        }
    }

    fn verdicts_for(
        &self,
        stored: Option<&Baseline>,
        record: &MetricsRecord,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<RegressionVerdict>, HarnessError> {
        let Some(baseline) = stored else {
            return Ok(Vec::new());
        };
        match baseline.get(&record.key()) {
            Some(base) => compare::compare(base, record, &self.config.tolerances),
            None => {
                let msg = format!(
                    "{} has no entry in baseline {}; skipped regression check",
                    record.key(),
                    baseline.name
                );
                warn!("{msg}");
                warnings.push(msg);
                Ok(Vec::new())
            }
        }
    }

    fn finish_as_baseline(
        &self,
        measured: Vec<(ScenarioRun, Option<MetricsRecord>)>,
        report: &mut SweepReport,
    ) {
        let records: Vec<MetricsRecord> = measured.iter().filter_map(|(_, r)| r.clone()).collect();
        let skipped = measured
            .iter()
            .filter(|(run, _)| matches!(run.state, ScenarioState::Pending))
            .count();
        let saved = if skipped > 0 {
            let msg = format!(
                "sweep cancelled with {skipped} scenarios not run; baseline {} left untouched",
                self.config.baseline_name
            );
            warn!("{msg}");
            report.warnings.push(msg);
            Ok(())
        } else if records.is_empty() {
            let msg = format!(
                "no successful scenarios; baseline {} left untouched",
                self.config.baseline_name
            );
            warn!("{msg}");
            report.warnings.push(msg);
            Ok(())
        } else {
            let baseline = Baseline::from_records(self.config.baseline_name.clone(), records);
            self.store.save(&baseline).map(|()| {
                info!(baseline = %baseline.name, records = baseline.len(), "baseline saved");
                report.baseline_saved = true;
            })
        };
        let save_error = saved.err().map(|e| e.to_string());

        for (mut run, record) in measured {
            if let Some(record) = record {
                match &save_error {
                    None => run.transition(ScenarioState::Baselined(record)),
                    Some(msg) => run.transition(ScenarioState::Failed(HarnessError::storage(
                        msg.clone(),
                    ))),
                }
            }
            report.scenarios.push(run);
        }
    }
}

fn check_output_count(produced: usize, expected: usize) -> Result<(), HarnessError> {
    if produced != expected {
        return Err(HarnessError::sample_failure(format!(
            "target returned {produced} outputs for a batch of {expected}"
        )));
    }
    Ok(())
}
