use std::time::Duration;

use crate::models::dsl_model::Stage;

/// Ordered stages, each ramping linearly from the previous target.
#[derive(Debug, Clone)]
pub struct Schedule {
    stages: Vec<Stage>,
}

impl Schedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Index of the stage running at `elapsed`, `None` once all have ended.
    pub fn stage_index(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(idx);
            }
        }
        None
    }

    /// Number of stages whose start time is at or before `elapsed`, so a
    /// stage shorter than the scheduler tick still counts as entered.
    pub fn stages_started(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut started = 0;
        for stage in &self.stages {
            if stage_start > elapsed {
                break;
            }
            started += 1;
            stage_start += stage.duration;
        }
        started
    }

    /// Population wanted at `elapsed`, rounded to the nearest user. After the
    /// last stage this is the last stage's target.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut active_time = Duration::ZERO;
        let mut prev_target = 0u64;
        for stage in &self.stages {
            if elapsed < active_time + stage.duration {
                let progress = (elapsed.as_secs_f64() - active_time.as_secs_f64())
                    / stage.duration.as_secs_f64();
                let diff = stage.target as f64 - prev_target as f64;
                return (prev_target as f64 + diff * progress).round() as u64;
            }
            active_time += stage.duration;
            prev_target = stage.target;
        }
        prev_target
    }
}
