pub mod instrument;
pub mod scheduler;
pub mod vu;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::client::build_client;
use crate::error::Result;
use crate::models::dsl_model::DslConfig;
use crate::models::metrics::{Metrics, Summary};
use crate::models::threshold::{evaluate_thresholds, referenced_percentiles};
use crate::report;
use crate::utils::hardware::get_hardware_info;

use scheduler::Schedule;
use vu::{run_vu, VuContext, VuHandle};

/// Exit status of a run that completed but crossed a threshold.
pub const THRESHOLD_FAILED_EXIT: u8 = 99;

const SCHEDULER_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: Summary,
    pub passed: bool,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        if self.passed {
            0
        } else {
            THRESHOLD_FAILED_EXIT
        }
    }
}

/// Runs the whole stage schedule, then reports. The results file is written
/// whether or not the thresholds pass.
pub async fn run_load_test(config: DslConfig) -> Result<RunOutcome> {
    let thresholds = config.validate()?;
    let base = Arc::new(config.base()?);
    let client = Arc::new(build_client());
    let metrics = Arc::new(Metrics::new());
    let schedule = Schedule::new(config.stages.clone());
    let config = Arc::new(config);

    info!(
        name = %config.name,
        base_url = %base,
        stages = schedule.stages().len(),
        duration = ?schedule.total_duration(),
        max_vus = schedule.max_target(),
        "starting load test"
    );

    let started = Instant::now();
    let mut active: Vec<(JoinHandle<()>, Arc<VuHandle>)> = Vec::new();
    // stopped users finishing their last iteration; still part of the population
    let mut retiring: Vec<JoinHandle<()>> = Vec::new();
    let mut next_id = 1u64;
    let mut stages_logged = 0usize;

    let mut ticker = interval(SCHEDULER_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let elapsed = started.elapsed();

        let entered = schedule.stages_started(elapsed);
        for idx in stages_logged..entered {
            let s = &schedule.stages()[idx];
            info!(stage = idx + 1, target = s.target, duration = ?s.duration, "entering stage");
        }
        stages_logged = stages_logged.max(entered);
        if schedule.stage_index(elapsed).is_none() {
            break;
        }

        retiring.retain(|join| !join.is_finished());
        let target = schedule.target_at(elapsed) as usize;
        while active.len() + retiring.len() < target {
            let ctx = VuContext {
                id: next_id,
                client: Arc::clone(&client),
                metrics: Arc::clone(&metrics),
                config: Arc::clone(&config),
                base: Arc::clone(&base),
            };
            let handle = VuHandle::new();
            let join = tokio::spawn(run_vu(ctx, Arc::clone(&handle)));
            active.push((join, handle));
            next_id += 1;
        }
        while active.len() > target {
            if let Some((join, handle)) = active.pop() {
                handle.stop();
                retiring.push(join);
            }
        }
        metrics.observe_vus((active.len() + retiring.len()) as u64);
    }

    for (join, handle) in active.drain(..) {
        handle.stop();
        retiring.push(join);
    }

    let deadline = Instant::now() + config.graceful_stop;
    let mut aborted = 0usize;
    for mut join in retiring {
        if timeout_at(deadline, &mut join).await.is_err() {
            join.abort();
            // wait for the cancellation so no sample lands after summarizing
            let _ = join.await;
            aborted += 1;
        }
    }
    if aborted > 0 {
        warn!(
            aborted,
            graceful_stop = ?config.graceful_stop,
            "virtual users still busy after graceful stop were aborted"
        );
    }

    let elapsed = started.elapsed();
    let mut summary = metrics.summarize(
        elapsed,
        get_hardware_info(),
        &referenced_percentiles(&thresholds),
    );
    let passed = evaluate_thresholds(&thresholds, &mut summary);

    report::print_summary(&summary);
    report::write_results(&config.summary_path, &summary)?;
    info!(
        path = %config.summary_path.display(),
        passed,
        elapsed = ?elapsed,
        "load test finished"
    );

    Ok(RunOutcome { summary, passed })
}
