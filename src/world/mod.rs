/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// world module
//
// the world is a single well-mixed population split into three compartments
// (susceptible, infected, recovered)
//
// In each step at most one person changes compartment: one infection, one
// recovery or nothing.  Steps are short enough that two events per step are
// negligible.
//
////////////////////////////////////////////////////////////////////////////////////

use super::errors::{ConfigError, SimError};
use super::policy::PolicySchedule;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::Serialize;
use std::fmt;

// Compartments ------------------------------------------------------------------------------------
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum Compartment {
    Susceptible,
    Infected,
    Recovered,
}
impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Head counts of the three compartments.  `S + I + R` is the population and
/// never changes during a trial.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub struct CompartmentState {
    pub susceptible: u64,
    pub infected: u64,
    pub recovered: u64,
}

impl CompartmentState {
    pub fn initial(population: u64, initial_infected: u64) -> CompartmentState {
        CompartmentState {
            susceptible: population - initial_infected,
            infected: initial_infected,
            recovered: 0,
        }
    }

    pub fn population(&self) -> u64 {
        self.susceptible + self.infected + self.recovered
    }

    // everyone who has ever been infected
    pub fn cases(&self) -> u64 {
        self.infected + self.recovered
    }

    pub fn count(&self, compartment: Compartment) -> u64 {
        match compartment {
            Compartment::Susceptible => self.susceptible,
            Compartment::Infected => self.infected,
            Compartment::Recovered => self.recovered,
        }
    }

    /// Applies one transition.  A count that would drop below zero is an
    /// invariant violation; the state is left untouched in that case.
    pub fn apply(&mut self, transition: Transition, step: usize) -> Result<(), SimError> {
        match transition {
            Transition::Infection => {
                self.susceptible = self.susceptible.checked_sub(1).ok_or(
                    SimError::NegativeCompartment {
                        step,
                        compartment: Compartment::Susceptible,
                    },
                )?;
                self.infected += 1;
            }
            Transition::Recovery => {
                self.infected =
                    self.infected
                        .checked_sub(1)
                        .ok_or(SimError::NegativeCompartment {
                            step,
                            compartment: Compartment::Infected,
                        })?;
                self.recovered += 1;
            }
            Transition::NoChange => (),
        }
        Ok(())
    }
}

#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum Transition {
    Infection,
    Recovery,
    NoChange,
}
impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// Parameters --------------------------------------------------------------------------------------

/// Immutable simulation parameters shared by every trial of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimParms {
    population: u64,
    initial_infected: u64,
    steps_per_day: f64,
    recovery_days: f64,
    r0: f64,
    step_count: usize,
    trial_count: usize,
}

impl SimParms {
    pub fn new(
        population: u64,       // N
        initial_infected: u64, // I0
        steps_per_day: f64,    // t0
        recovery_days: f64,    // mean infectious period
        r0: f64,               // basic reproduction number
        step_count: usize,     // steps per trial
        trial_count: usize,    // trials per ensemble
    ) -> Result<SimParms, ConfigError> {
        if population == 0 {
            return Err(ConfigError::invalid("population", "must be positive"));
        }
        if initial_infected > population {
            return Err(ConfigError::invalid(
                "initial_infected",
                format!("{} exceeds population {}", initial_infected, population),
            ));
        }
        if !(steps_per_day.is_finite() && steps_per_day > 0.0) {
            return Err(ConfigError::invalid("steps_per_day", "must be positive"));
        }
        if !(recovery_days.is_finite() && recovery_days > 0.0) {
            return Err(ConfigError::invalid("recovery_days", "must be positive"));
        }
        if !(r0.is_finite() && r0 >= 0.0) {
            return Err(ConfigError::invalid("r0", "must be zero or positive"));
        }
        if trial_count == 0 {
            return Err(ConfigError::invalid("trial_count", "must be at least 1"));
        }
        Ok(SimParms {
            population,
            initial_infected,
            steps_per_day,
            recovery_days,
            r0,
            step_count,
            trial_count,
        })
    }

    pub fn population(&self) -> u64 {
        self.population
    }
    pub fn initial_infected(&self) -> u64 {
        self.initial_infected
    }
    pub fn steps_per_day(&self) -> f64 {
        self.steps_per_day
    }
    pub fn recovery_days(&self) -> f64 {
        self.recovery_days
    }
    pub fn r0(&self) -> f64 {
        self.r0
    }
    pub fn step_count(&self) -> usize {
        self.step_count
    }
    pub fn trial_count(&self) -> usize {
        self.trial_count
    }

    pub fn recovery_period_steps(&self) -> f64 {
        self.recovery_days * self.steps_per_day
    }
    pub fn recovery_rate(&self) -> f64 {
        1.0 / self.recovery_period_steps()
    }
    pub fn infection_rate(&self) -> f64 {
        self.r0 * self.recovery_rate()
    }

    pub fn initial_state(&self) -> CompartmentState {
        CompartmentState::initial(self.population, self.initial_infected)
    }

    // fractional days elapsed after `step` steps
    pub fn elapsed_days(&self, step: usize) -> f64 {
        step as f64 / self.steps_per_day
    }

    pub fn with_trial_count(&self, trial_count: usize) -> Result<SimParms, ConfigError> {
        SimParms::new(
            self.population,
            self.initial_infected,
            self.steps_per_day,
            self.recovery_days,
            self.r0,
            self.step_count,
            trial_count,
        )
    }

    /// Largest `infection + recovery` step probability any state with
    /// `S + I <= N` can produce when no policy reduction is in force.
    ///
    /// The total is `I * (k * (N - I) / N + gamma)` at its worst (no one
    /// recovered yet), a downward parabola in `I`.
    pub fn worst_case_step_probability(&self) -> f64 {
        let rates = RateModel::from_parms(self);
        let n = self.population as f64;
        let k = rates.infection_rate;
        let gamma = rates.recovery_rate;
        let total = |infected: f64| infected * (k * (n - infected) / n + gamma);
        if k <= 0.0 {
            return total(n);
        }
        let peak = (n * (k + gamma) / (2.0 * k)).min(n);
        total(peak.floor()).max(total(peak.ceil().min(n)))
    }
}

// Rates -------------------------------------------------------------------------------------------

/// Per-step transition probabilities for one state.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct StepProbabilities {
    pub infection: f64,
    pub recovery: f64,
}

impl StepProbabilities {
    pub fn total(&self) -> f64 {
        self.infection + self.recovery
    }

    // the step granularity must keep the two events mutually exclusive
    pub fn check(&self, step: usize) -> Result<(), SimError> {
        if self.total() > 1.0 {
            return Err(SimError::ProbabilityOverflow {
                step,
                infection: self.infection,
                recovery: self.recovery,
            });
        }
        Ok(())
    }

    /// Maps a uniform draw in `[0, 1)` to a transition.  The unit interval is
    /// cut into `(0, p_inf]` for infection, `(p_inf, p_inf + p_rec]` for
    /// recovery, and everything else is a no-op.
    ///
    /// A draw of exactly `0.0` is a no-op even though a plain `u <= p_inf`
    /// test would count it as an infection.
    pub fn select(&self, draw: f64) -> Transition {
        if draw > 0.0 && draw <= self.infection {
            Transition::Infection
        } else if draw > self.infection && draw <= self.total() {
            Transition::Recovery
        } else {
            Transition::NoChange
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RateModel {
    infection_rate: f64,
    recovery_rate: f64,
    population: u64,
}

impl RateModel {
    pub fn new(infection_rate: f64, recovery_rate: f64, population: u64) -> RateModel {
        RateModel {
            infection_rate,
            recovery_rate,
            population,
        }
    }

    pub fn from_parms(parms: &SimParms) -> RateModel {
        RateModel::new(
            parms.infection_rate(),
            parms.recovery_rate(),
            parms.population(),
        )
    }

    pub fn infection_rate(&self) -> f64 {
        self.infection_rate
    }
    pub fn recovery_rate(&self) -> f64 {
        self.recovery_rate
    }

    /// `p_inf = k * S * I / N * (1 - reduction)` and `p_rec = gamma * I`.
    pub fn step_probabilities(
        &self,
        state: &CompartmentState,
        reduction: f64,
    ) -> StepProbabilities {
        let s = state.susceptible as f64;
        let i = state.infected as f64;
        let n = self.population as f64;
        StepProbabilities {
            infection: self.infection_rate * s * i / n * (1.0 - reduction),
            recovery: self.recovery_rate * i,
        }
    }
}

// Trials ------------------------------------------------------------------------------------------

/// One trial's states, initial state included, so `len() == step_count + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialTrajectory {
    steps_per_day: f64,
    states: Vec<CompartmentState>,
    probabilities: Option<Vec<StepProbabilities>>,
}

impl TrialTrajectory {
    pub fn states(&self) -> &[CompartmentState] {
        &self.states
    }
    pub fn len(&self) -> usize {
        self.states.len()
    }
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
    pub fn final_state(&self) -> Option<&CompartmentState> {
        self.states.last()
    }
    pub fn elapsed_days(&self, index: usize) -> f64 {
        index as f64 / self.steps_per_day
    }
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.states.len()).map(move |i| self.elapsed_days(i))
    }
    // step probabilities evaluated before each transition, when requested
    pub fn probabilities(&self) -> Option<&[StepProbabilities]> {
        self.probabilities.as_deref()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct TrialOptions {
    pub record_probabilities: bool,
}

// a single stochastic step: policy lookup, rates, draw, transition
fn advance<R: Rng>(
    state: &mut CompartmentState,
    step: usize,
    rates: &RateModel,
    schedule: &PolicySchedule,
    unit: &Uniform<f64>,
    rng: &mut R,
) -> Result<StepProbabilities, SimError> {
    let reduction = schedule.active_reduction(step as u64);
    let probs = rates.step_probabilities(state, reduction);
    probs.check(step)?;
    let draw = unit.sample(rng);
    state.apply(probs.select(draw), step)?;
    Ok(probs)
}

fn check_population(state: &CompartmentState, expected: u64, step: usize) -> Result<(), SimError> {
    let actual = state.population();
    if actual != expected {
        return Err(SimError::PopulationDrift {
            step,
            expected,
            actual,
        });
    }
    Ok(())
}

pub fn run_trial<R: Rng>(
    parms: &SimParms,
    schedule: &PolicySchedule,
    rng: &mut R,
) -> Result<TrialTrajectory, SimError> {
    run_trial_with(parms, schedule, TrialOptions::default(), rng)
}

/// Runs exactly `step_count` steps from `(N - I0, I0, 0)`.
pub fn run_trial_with<R: Rng>(
    parms: &SimParms,
    schedule: &PolicySchedule,
    options: TrialOptions,
    rng: &mut R,
) -> Result<TrialTrajectory, SimError> {
    let rates = RateModel::from_parms(parms);
    let unit = Uniform::new(0.0, 1.0);
    let mut state = parms.initial_state();
    let mut states = Vec::with_capacity(parms.step_count() + 1);
    let mut probabilities = if options.record_probabilities {
        Some(Vec::with_capacity(parms.step_count()))
    } else {
        None
    };
    states.push(state);

    for step in 0..parms.step_count() {
        let probs = advance(&mut state, step, &rates, schedule, &unit, rng)?;
        check_population(&state, parms.population(), step)?;
        if let Some(recorded) = probabilities.as_mut() {
            recorded.push(probs);
        }
        states.push(state);
    }

    Ok(TrialTrajectory {
        steps_per_day: parms.steps_per_day(),
        states,
        probabilities,
    })
}

/// Elapsed days until `I + R` first reaches `target_cases`, or `None` when the
/// step budget runs out first.  The time reported for a hit on loop step `t`
/// is `t / steps_per_day`.
pub fn first_passage<R: Rng>(
    parms: &SimParms,
    schedule: &PolicySchedule,
    target_cases: u64,
    rng: &mut R,
) -> Result<Option<f64>, SimError> {
    let rates = RateModel::from_parms(parms);
    let unit = Uniform::new(0.0, 1.0);
    let mut state = parms.initial_state();
    if state.cases() >= target_cases {
        return Ok(Some(0.0));
    }

    for step in 0..parms.step_count() {
        advance(&mut state, step, &rates, schedule, &unit, rng)?;
        check_population(&state, parms.population(), step)?;
        if state.cases() >= target_cases {
            return Ok(Some(parms.elapsed_days(step)));
        }
    }
    Ok(None)
}
