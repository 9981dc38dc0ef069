/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// policy module
//
// public health measures (self isolation, lockdowns ...) cut the infection rate
// by a fraction from a given step onwards
//
////////////////////////////////////////////////////////////////////////////////////

use super::errors::ConfigError;
use serde::Serialize;

/// A measure that takes effect at `activation_step` and cuts the infection
/// probability by `reduction` (a fraction in `[0, 1)`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyBreakpoint {
    pub label: String,
    pub activation_step: u64,
    pub reduction: f64,
}

impl PolicyBreakpoint {
    pub fn new(label: impl Into<String>, activation_step: u64, reduction: f64) -> PolicyBreakpoint {
        PolicyBreakpoint {
            label: label.into(),
            activation_step,
            reduction,
        }
    }

    // activation expressed in days, rounded to the nearest step
    pub fn from_day(
        label: impl Into<String>,
        day: f64,
        reduction: f64,
        steps_per_day: f64,
    ) -> Result<PolicyBreakpoint, ConfigError> {
        let label = label.into();
        if !(day.is_finite() && day >= 0.0) {
            return Err(ConfigError::invalid(
                format!("policy '{}' day", label),
                format!("{} is not a non-negative day", day),
            ));
        }
        let activation_step = (day * steps_per_day).round() as u64;
        Ok(PolicyBreakpoint::new(label, activation_step, reduction))
    }
}

/// Ordered breakpoints.  Each one applies on `[activation_step, next activation)`;
/// before the first there is no reduction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicySchedule {
    breakpoints: Vec<PolicyBreakpoint>,
}

impl PolicySchedule {
    pub fn none() -> PolicySchedule {
        PolicySchedule::default()
    }

    /// Sorts by activation step.  Two breakpoints on the same step keep their
    /// configured order, so the later one wins.
    pub fn new(mut breakpoints: Vec<PolicyBreakpoint>) -> Result<PolicySchedule, ConfigError> {
        for bp in &breakpoints {
            if !(bp.reduction >= 0.0 && bp.reduction < 1.0) {
                return Err(ConfigError::invalid(
                    format!("policy '{}' reduction", bp.label),
                    format!("{} is outside [0, 1)", bp.reduction),
                ));
            }
        }
        breakpoints.sort_by_key(|bp| bp.activation_step);
        Ok(PolicySchedule { breakpoints })
    }

    pub fn breakpoints(&self) -> &[PolicyBreakpoint] {
        &self.breakpoints
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// The breakpoint in force at `step`, if any.
    pub fn active(&self, step: u64) -> Option<&PolicyBreakpoint> {
        let in_force = self
            .breakpoints
            .partition_point(|bp| bp.activation_step <= step);
        if in_force == 0 {
            None
        } else {
            Some(&self.breakpoints[in_force - 1])
        }
    }

    pub fn active_reduction(&self, step: u64) -> f64 {
        self.active(step).map_or(0.0, |bp| bp.reduction)
    }
}

/// One intensity in a quarantine comparison, e.g. "moderate" at 0.30.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyLevel {
    pub label: String,
    pub reduction: f64,
}

impl PolicyLevel {
    pub fn new(label: impl Into<String>, reduction: f64) -> PolicyLevel {
        PolicyLevel {
            label: label.into(),
            reduction,
        }
    }

    // a single measure starting at `start_step` for the whole run
    pub fn schedule(&self, start_step: u64) -> Result<PolicySchedule, ConfigError> {
        PolicySchedule::new(vec![PolicyBreakpoint::new(
            self.label.clone(),
            start_step,
            self.reduction,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn staged() -> PolicySchedule {
        PolicySchedule::new(vec![
            PolicyBreakpoint::new("full lockdown", 25, 0.40),
            PolicyBreakpoint::new("self isolation", 21, 0.10),
            PolicyBreakpoint::new("partial lockdown", 23, 0.15),
        ])
        .unwrap()
    }

    #[test]
    fn staged_measures_escalate() {
        let schedule = staged();
        assert_eq!(schedule.active_reduction(20), 0.0);
        assert_eq!(schedule.active_reduction(22), 0.10);
        assert_eq!(schedule.active_reduction(24), 0.15);
        assert_eq!(schedule.active_reduction(26), 0.40);
    }

    #[test]
    fn intervals_are_half_open() {
        let schedule = staged();
        assert_eq!(schedule.active_reduction(21), 0.10);
        assert_eq!(schedule.active_reduction(22), 0.10);
        assert_eq!(schedule.active_reduction(23), 0.15);
        assert_eq!(schedule.active(25).map(|bp| bp.label.as_str()), Some("full lockdown"));
    }

    #[test]
    fn empty_schedule_never_reduces() {
        let schedule = PolicySchedule::none();
        assert!(schedule.is_empty());
        assert_eq!(schedule.active_reduction(0), 0.0);
        assert_eq!(schedule.active_reduction(u64::MAX), 0.0);
    }

    #[test]
    fn later_entry_wins_on_same_step() {
        let schedule = PolicySchedule::new(vec![
            PolicyBreakpoint::new("first", 5, 0.2),
            PolicyBreakpoint::new("second", 5, 0.3),
        ])
        .unwrap();
        assert_eq!(schedule.active_reduction(5), 0.3);
    }

    #[test]
    fn rejects_reductions_outside_unit_interval() {
        assert!(PolicySchedule::new(vec![PolicyBreakpoint::new("all", 0, 1.0)]).is_err());
        assert!(PolicySchedule::new(vec![PolicyBreakpoint::new("neg", 0, -0.1)]).is_err());
        assert!(PolicySchedule::new(vec![PolicyBreakpoint::new("nan", 0, f64::NAN)]).is_err());
    }

    #[test]
    fn days_are_scaled_to_steps() {
        let bp = PolicyBreakpoint::from_day("isolation", 5.0, 0.15, 1440.0).unwrap();
        assert_eq!(bp.activation_step, 7200);
        assert!(PolicyBreakpoint::from_day("bad", -1.0, 0.15, 1440.0).is_err());

        let level = PolicyLevel::new("strict", 0.45).schedule(7200).unwrap();
        assert_eq!(level.active_reduction(7199), 0.0);
        assert_eq!(level.active_reduction(7200), 0.45);
    }

    proptest! {
        #[test]
        fn escalating_schedule_is_monotone(
            mut steps in proptest::collection::vec(0u64..10_000, 1..8),
            queries in proptest::collection::vec(0u64..12_000, 2..20),
        ) {
            steps.sort_unstable();
            let n = steps.len() as f64;
            let breakpoints = steps
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let reduction = (i as f64 + 1.0) / (n + 1.0);
                    PolicyBreakpoint::new(format!("stage {}", i), *s, reduction)
                })
                .collect();
            let schedule = PolicySchedule::new(breakpoints).unwrap();
            let mut queries = queries;
            queries.sort_unstable();
            for pair in queries.windows(2) {
                prop_assert!(
                    schedule.active_reduction(pair[0]) <= schedule.active_reduction(pair[1])
                );
            }
        }
    }
}
