/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// Stochastic discrete time SIR simulations of COVID-19 spread under staged
// quarantine policies, plus growth rate extraction from case data.
//
////////////////////////////////////////////////////////////////////////////////////

pub mod data_management;
pub mod errors;
pub mod policy;
pub mod reference;
pub mod regression;
pub mod stats;
pub mod utilities;
pub mod world;

pub use errors::{ConfigError, DataError, SimError};
pub use policy::{PolicyBreakpoint, PolicyLevel, PolicySchedule};
pub use stats::{
    Ensemble, EnsembleStatistics, FirstPassageSummary, Measure, PolicyComparison, Summary,
};
pub use world::{
    CompartmentState, RateModel, SimParms, StepProbabilities, Transition, TrialTrajectory,
};
