//! Run profiles and virtual-user scheduling.
//!
//! Scheduling separates **rate generation** from **work execution**: a
//! governor task periodically publishes the number of VUs that should be
//! active, and one worker task per potential VU parks or iterates depending
//! on that target. The governor ticks every `tick` (default 100ms) and
//! linearly interpolates the target inside a ramping stage:
//!
//! ```text
//! t = elapsed_in_stage / stage_duration
//! active(t) = round(previous_target + (stage_target - previous_target) * t)
//! ```
//!
//! A zero-duration stage jumps to its target instantly, which makes spike
//! profiles expressible in the same API. Workers observe shutdown only
//! between iterations (and during think-time pauses), so a stop signal
//! never interrupts an in-flight request.

pub(crate) mod vu;

pub(crate) use vu::{governor_task, spawn_workers, ExecutionContext, ScenarioEnv};

use std::time::Duration;

use crate::error::HarnessError;

/// One segment of a ramping profile: move the active VU count to `target`
/// over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    /// Target number of concurrently active virtual users.
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// How many virtual users run, and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProfile {
    /// A constant number of VUs for a fixed duration.
    Fixed { vus: usize, duration: Duration },
    /// An ordered ramp starting from zero active VUs.
    Stages(Vec<Stage>),
}

impl RunProfile {
    /// Fail fast on profiles that cannot drive a run.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let invalid = |msg: &str| Err(HarnessError::InvalidConfiguration(msg.to_string()));
        match self {
            RunProfile::Fixed { vus: 0, .. } => invalid("run profile needs at least one virtual user"),
            RunProfile::Fixed { duration, .. } if duration.is_zero() => {
                invalid("run duration must be positive")
            }
            RunProfile::Fixed { .. } => Ok(()),
            RunProfile::Stages(stages) if stages.is_empty() => invalid("run profile has no stages"),
            RunProfile::Stages(_) if self.total_duration().is_zero() => {
                invalid("stage durations must add up to a positive duration")
            }
            RunProfile::Stages(_) if self.max_vus() == 0 => {
                invalid("at least one stage must target a virtual user")
            }
            RunProfile::Stages(_) => Ok(()),
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            RunProfile::Fixed { duration, .. } => *duration,
            RunProfile::Stages(stages) => stages.iter().map(|s| s.duration).sum(),
        }
    }

    /// Upper bound of concurrently active VUs; one worker task is spawned
    /// per slot.
    pub fn max_vus(&self) -> usize {
        match self {
            RunProfile::Fixed { vus, .. } => *vus,
            RunProfile::Stages(stages) => stages.iter().map(|s| s.target).max().unwrap_or(0),
        }
    }

    /// Active VU count at `elapsed`, linearly interpolated inside a stage.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        match self {
            RunProfile::Fixed { vus, duration } => {
                if elapsed < *duration {
                    *vus
                } else {
                    0
                }
            }
            RunProfile::Stages(stages) => {
                let mut from = 0.0_f64;
                let mut stage_start = Duration::ZERO;
                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end && !stage.duration.is_zero() {
                        let t = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        return (from + (stage.target as f64 - from) * t).round() as usize;
                    }
                    from = stage.target as f64;
                    stage_start = stage_end;
                }
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn rejects_unusable_profiles() {
        assert!(RunProfile::Fixed { vus: 0, duration: secs(10) }.validate().is_err());
        assert!(RunProfile::Fixed { vus: 5, duration: Duration::ZERO }.validate().is_err());
        assert!(RunProfile::Stages(vec![]).validate().is_err());
        assert!(RunProfile::Stages(vec![Stage::new(Duration::ZERO, 5)]).validate().is_err());
        assert!(RunProfile::Stages(vec![Stage::new(secs(10), 0)]).validate().is_err());
        assert!(RunProfile::Fixed { vus: 5, duration: secs(30) }.validate().is_ok());
        assert!(RunProfile::Stages(vec![Stage::new(secs(10), 5)]).validate().is_ok());
    }

    #[test]
    fn fixed_profile_holds_its_vu_count_for_the_duration() {
        let profile = RunProfile::Fixed { vus: 5, duration: secs(30) };
        assert_eq!(profile.target_at(Duration::ZERO), 5);
        assert_eq!(profile.target_at(secs(29)), 5);
        assert_eq!(profile.target_at(secs(30)), 0);
        assert_eq!(profile.max_vus(), 5);
    }

    #[test]
    fn staged_profile_interpolates_linearly() {
        let profile = RunProfile::Stages(vec![
            Stage::new(secs(60), 10),
            Stage::new(secs(180), 10),
            Stage::new(secs(60), 0),
        ]);
        assert_eq!(profile.total_duration(), secs(300));
        assert_eq!(profile.max_vus(), 10);
        assert_eq!(profile.target_at(Duration::ZERO), 0);
        assert_eq!(profile.target_at(secs(30)), 5);
        assert_eq!(profile.target_at(secs(60)), 10);
        assert_eq!(profile.target_at(secs(150)), 10);
        assert_eq!(profile.target_at(secs(270)), 5);
        assert_eq!(profile.target_at(secs(300)), 0);
    }

    #[test]
    fn zero_duration_stage_jumps_instantly() {
        let profile = RunProfile::Stages(vec![
            Stage::new(Duration::ZERO, 8),
            Stage::new(secs(10), 8),
        ]);
        assert_eq!(profile.target_at(Duration::ZERO), 8);
        assert_eq!(profile.target_at(secs(5)), 8);
    }
}
