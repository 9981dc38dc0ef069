/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// errors module
//
// configuration, simulation and data errors
//
////////////////////////////////////////////////////////////////////////////////////

use super::world::Compartment;
use thiserror::Error;

/// Parameter or parameter-file problems detected before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid parameter {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Missing or mistyped parameter '{0}'")]
    MissingKey(String),

    #[error("Could not parse parameter file: {0}")]
    Yaml(String),
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failures raised while trials run or while their results are reduced.
#[derive(Debug, Error)]
pub enum SimError {
    /// The step granularity is too coarse for the rates: more than one
    /// transition per step would be needed.
    #[error(
        "step {step}: infection ({infection:.6}) and recovery ({recovery:.6}) \
         probabilities sum above 1"
    )]
    ProbabilityOverflow {
        step: usize,
        infection: f64,
        recovery: f64,
    },

    #[error("step {step}: {compartment} count would go negative")]
    NegativeCompartment { step: usize, compartment: Compartment },

    #[error("step {step}: compartments sum to {actual}, expected population {expected}")]
    PopulationDrift {
        step: usize,
        expected: u64,
        actual: u64,
    },

    #[error("trial {trial} failed: {source}")]
    TrialFailed {
        trial: usize,
        #[source]
        source: Box<SimError>,
    },

    #[error("trial {trial} has {actual} states, expected {expected}")]
    TrajectoryLengthMismatch {
        trial: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cannot summarize an ensemble with no trials")]
    EmptyEnsemble,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SimError {
    pub fn in_trial(self, trial: usize) -> Self {
        Self::TrialFailed {
            trial,
            source: Box::new(self),
        }
    }
}

/// File system, CSV and reference data failures, plus anything bubbling up
/// from configuration and simulation.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("Malformed reference record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("No reference records for {0}")]
    NoRecords(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Fit(#[from] super::regression::FitError),
}

impl DataError {
    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }
}
