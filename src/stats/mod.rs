/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// stats module
//
// runs ensembles of trials and calculates per step statistics across them
//
////////////////////////////////////////////////////////////////////////////////////

use super::errors::{ConfigError, SimError};
use super::policy::{PolicyLevel, PolicySchedule};
use super::utilities;
use super::world::{self, Compartment, CompartmentState, SimParms, TrialTrajectory};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

// Summaries ---------------------------------------------------------------------------------------

/// Arithmetic mean and population standard deviation of a sample.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub std_dev: f64,
}

impl Summary {
    pub fn upper(&self) -> f64 {
        self.mean + self.std_dev
    }
    pub fn lower(&self) -> f64 {
        self.mean - self.std_dev
    }
    pub fn standard_error(&self, samples: usize) -> f64 {
        self.std_dev / (samples as f64).sqrt()
    }
}

/// Single pass (Welford) mean and population standard deviation.
/// Returns `None` for an empty sample.
pub fn summarize<I: IntoIterator<Item = f64>>(values: I) -> Option<Summary> {
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for x in values {
        count += 1;
        let delta = x - mean;
        mean += delta / count as f64;
        m2 += delta * (x - mean);
    }
    if count == 0 {
        return None;
    }
    Some(Summary {
        mean,
        std_dev: (m2 / count as f64).sqrt(),
    })
}

// Measures ----------------------------------------------------------------------------------------

/// Quantities tracked across an ensemble: the three compartments plus
/// cumulative cases (`I + R`).
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum Measure {
    Susceptible,
    Infected,
    Recovered,
    Cases,
}

impl Measure {
    pub const ALL: [Measure; 4] = [
        Measure::Susceptible,
        Measure::Infected,
        Measure::Recovered,
        Measure::Cases,
    ];

    pub fn of(&self, state: &CompartmentState) -> u64 {
        match self {
            Measure::Susceptible => state.susceptible,
            Measure::Infected => state.infected,
            Measure::Recovered => state.recovered,
            Measure::Cases => state.cases(),
        }
    }

    fn index(&self) -> usize {
        match self {
            Measure::Susceptible => 0,
            Measure::Infected => 1,
            Measure::Recovered => 2,
            Measure::Cases => 3,
        }
    }
}

impl From<Compartment> for Measure {
    fn from(compartment: Compartment) -> Measure {
        match compartment {
            Compartment::Susceptible => Measure::Susceptible,
            Compartment::Infected => Measure::Infected,
            Compartment::Recovered => Measure::Recovered,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A point of a banded curve: the mean with one standard deviation either side.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct BandPoint {
    pub time: f64,
    pub mean: f64,
    pub upper: f64,
    pub lower: f64,
}

// Ensemble statistics -----------------------------------------------------------------------------

/// Per step summaries aligned by step index across all trials of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleStatistics {
    trial_count: usize,
    times: Vec<f64>,
    summaries: [Vec<Summary>; 4],
}

impl EnsembleStatistics {
    /// Reduces a set of equal-length trajectories.  The reduction is symmetric
    /// in the trials, so their order does not matter.
    pub fn from_trajectories(
        trajectories: &[TrialTrajectory],
    ) -> Result<EnsembleStatistics, SimError> {
        let first = trajectories.first().ok_or(SimError::EmptyEnsemble)?;
        let steps = first.len();
        for (trial, t) in trajectories.iter().enumerate() {
            if t.len() != steps {
                return Err(SimError::TrajectoryLengthMismatch {
                    trial,
                    expected: steps,
                    actual: t.len(),
                });
            }
        }

        let mut summaries: [Vec<Summary>; 4] = [
            Vec::with_capacity(steps),
            Vec::with_capacity(steps),
            Vec::with_capacity(steps),
            Vec::with_capacity(steps),
        ];
        for index in 0..steps {
            for measure in Measure::ALL.iter() {
                let column = trajectories
                    .iter()
                    .map(|t| measure.of(&t.states()[index]) as f64);
                // trajectories is non-empty so every column has a summary
                let summary = summarize(column).unwrap_or_default();
                summaries[measure.index()].push(summary);
            }
        }

        Ok(EnsembleStatistics {
            trial_count: trajectories.len(),
            times: first.times().collect(),
            summaries,
        })
    }

    pub fn trial_count(&self) -> usize {
        self.trial_count
    }
    pub fn len(&self) -> usize {
        self.times.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
    pub fn times(&self) -> &[f64] {
        &self.times
    }
    pub fn summaries(&self, measure: Measure) -> &[Summary] {
        &self.summaries[measure.index()]
    }
    pub fn at(&self, measure: Measure, index: usize) -> Option<Summary> {
        self.summaries(measure).get(index).copied()
    }

    pub fn standard_error(&self, measure: Measure, index: usize) -> Option<f64> {
        self.at(measure, index)
            .map(|s| s.standard_error(self.trial_count))
    }

    // (elapsed days, mean)
    pub fn series(&self, measure: Measure) -> Vec<(f64, f64)> {
        self.times
            .iter()
            .zip(self.summaries(measure))
            .map(|(t, s)| (*t, s.mean))
            .collect()
    }

    pub fn band(&self, measure: Measure) -> Vec<BandPoint> {
        self.times
            .iter()
            .zip(self.summaries(measure))
            .map(|(t, s)| BandPoint {
                time: *t,
                mean: s.mean,
                upper: s.upper(),
                lower: s.lower(),
            })
            .collect()
    }
}

// First passage -----------------------------------------------------------------------------------

/// First-passage times of an ensemble.  Trials that never reached the target
/// are counted in `unreached` and left out of every statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct FirstPassageSummary {
    pub target_cases: u64,
    pub reached: Vec<(usize, f64)>, // (trial, elapsed days)
    pub unreached: usize,
}

impl FirstPassageSummary {
    pub fn from_outcomes(target_cases: u64, outcomes: &[Option<f64>]) -> FirstPassageSummary {
        let reached: Vec<(usize, f64)> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(trial, o)| o.map(|days| (trial, days)))
            .collect();
        FirstPassageSummary {
            target_cases,
            unreached: outcomes.len() - reached.len(),
            reached,
        }
    }

    pub fn trial_count(&self) -> usize {
        self.reached.len() + self.unreached
    }

    pub fn summary(&self) -> Option<Summary> {
        summarize(self.reached.iter().map(|(_, days)| *days))
    }

    // reached trials per whole day
    pub fn histogram(&self) -> BTreeMap<u64, usize> {
        let mut bins = BTreeMap::new();
        for (_, days) in &self.reached {
            *bins.entry(days.floor() as u64).or_insert(0) += 1;
        }
        bins
    }
}

// Ensemble runner ---------------------------------------------------------------------------------

/// Runs `trial_count` independent trials in parallel.  Trial `n` draws from
/// stream `n` of the master seed.
#[derive(Debug, Copy, Clone)]
pub struct Ensemble<'a> {
    parms: &'a SimParms,
    seed: u64,
}

impl<'a> Ensemble<'a> {
    pub fn new(parms: &'a SimParms, seed: u64) -> Ensemble<'a> {
        Ensemble { parms, seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trajectories(
        &self,
        schedule: &PolicySchedule,
    ) -> Result<Vec<TrialTrajectory>, SimError> {
        let parms = self.parms;
        let seed = self.seed;
        (0..parms.trial_count())
            .into_par_iter()
            .map(|trial| -> Result<TrialTrajectory, SimError> {
                let mut rng = utilities::trial_rng(seed, trial);
                let trajectory =
                    world::run_trial(parms, schedule, &mut rng).map_err(|e| e.in_trial(trial))?;
                debug!(trial, "trial complete");
                Ok(trajectory)
            })
            .collect()
    }

    pub fn run(&self, schedule: &PolicySchedule) -> Result<EnsembleStatistics, SimError> {
        info!(
            "Running {} trials of {} steps (seed {})",
            self.parms.trial_count(),
            self.parms.step_count(),
            self.seed
        );
        let trajectories = self.trajectories(schedule)?;
        EnsembleStatistics::from_trajectories(&trajectories)
    }

    pub fn first_passage(
        &self,
        schedule: &PolicySchedule,
        target_cases: u64,
    ) -> Result<FirstPassageSummary, SimError> {
        let parms = self.parms;
        let seed = self.seed;
        info!(
            "Timing {} trials to {} cases (seed {})",
            parms.trial_count(),
            target_cases,
            seed
        );
        let outcomes = (0..parms.trial_count())
            .into_par_iter()
            .map(|trial| {
                let mut rng = utilities::trial_rng(seed, trial);
                world::first_passage(parms, schedule, target_cases, &mut rng)
                    .map_err(|e| e.in_trial(trial))
            })
            .collect::<Result<Vec<Option<f64>>, SimError>>()?;

        let summary = FirstPassageSummary::from_outcomes(target_cases, &outcomes);
        if summary.unreached > 0 {
            warn!(
                "{} of {} trials never reached {} cases; excluded from the statistics",
                summary.unreached,
                summary.trial_count(),
                target_cases
            );
        }
        Ok(summary)
    }

    /// One ensemble per policy level, each with a single measure from
    /// `start_step`.  Level `n` runs on a seed derived from the master seed
    /// and `n`.  Labels must be unique.
    pub fn compare(
        &self,
        levels: &[PolicyLevel],
        start_step: u64,
    ) -> Result<PolicyComparison, SimError> {
        let mut seen = HashSet::new();
        if let Some(level) = levels.iter().find(|&l| !seen.insert(l.label.as_str())) {
            return Err(ConfigError::invalid(
                "levels",
                format!("duplicate label '{}'", level.label),
            )
            .into());
        }
        let mut entries = Vec::with_capacity(levels.len());
        for (index, level) in levels.iter().enumerate() {
            let schedule = level.schedule(start_step)?;
            let ensemble = Ensemble::new(self.parms, utilities::derived_seed(self.seed, index));
            info!(
                "Policy level '{}' ({:.0}% reduction)",
                level.label,
                level.reduction * 100.0
            );
            let statistics = ensemble.run(&schedule)?;
            entries.push((level.clone(), statistics));
        }
        Ok(PolicyComparison { entries })
    }
}

/// Ensembles keyed by policy label, in the configured order.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyComparison {
    entries: Vec<(PolicyLevel, EnsembleStatistics)>,
}

impl PolicyComparison {
    pub fn get(&self, label: &str) -> Option<&EnsembleStatistics> {
        self.entries
            .iter()
            .find(|(level, _)| level.label == label)
            .map(|(_, stats)| stats)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(level, _)| level.label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PolicyLevel, &EnsembleStatistics)> {
        self.entries.iter().map(|(level, stats)| (level, stats))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
