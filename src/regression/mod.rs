/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// regression module
//
// least squares line fitting, used to read the epidemic growth rate (and so
// R0) off the early exponential phase of the case data
//
////////////////////////////////////////////////////////////////////////////////////

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("Need at least {needed} points to fit, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("x values do not vary; slope is undefined")]
    Degenerate,

    #[error("Case count at day {day} is {cases}; log fit needs positive counts")]
    NonPositiveCases { day: f64, cases: f64 },
}

/// `y = intercept + slope * x` with the standard errors of both coefficients.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub sigma_intercept: f64,
    pub sigma_slope: f64,
    pub sigma_y: f64, // residual standard deviation, n - 2 degrees of freedom
    pub points: usize,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares over `(x, y)` pairs.  Three points are the minimum
/// since the residual spread uses `n - 2` degrees of freedom.
pub fn fit_line(points: &[(f64, f64)]) -> Result<LinearFit, FitError> {
    let n = points.len();
    if n < 3 {
        return Err(FitError::TooFewPoints { needed: 3, got: n });
    }

    let (mut sum_x, mut sum_xx, mut sum_y, mut sum_xy) = (0.0, 0.0, 0.0, 0.0);
    for (x, y) in points {
        sum_x += x;
        sum_xx += x * x;
        sum_y += y;
        sum_xy += x * y;
    }
    let nf = n as f64;
    let delta = nf * sum_xx - sum_x * sum_x;
    if delta.abs() <= f64::EPSILON * nf * sum_xx.abs().max(1.0) {
        return Err(FitError::Degenerate);
    }

    let intercept = (sum_xx * sum_y - sum_x * sum_xy) / delta;
    let slope = (nf * sum_xy - sum_x * sum_y) / delta;

    let residuals: f64 = points
        .iter()
        .map(|(x, y)| (y - intercept - slope * x).powi(2))
        .sum();
    let sigma_y = (residuals / (nf - 2.0)).sqrt();

    Ok(LinearFit {
        intercept,
        slope,
        sigma_intercept: sigma_y * (sum_xx / delta).sqrt(),
        sigma_slope: sigma_y * (nf / delta).sqrt(),
        sigma_y,
        points: n,
    })
}

/// Fit of `ln(cases) = A + B * day` over the exponential phase.  `B` is the
/// daily growth rate.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct GrowthFit {
    pub line: LinearFit,
}

impl GrowthFit {
    pub fn growth_rate(&self) -> f64 {
        self.line.slope
    }

    // growth per serial interval, the crude R0 estimate used for the NZ runs
    pub fn reproduction_number(&self, serial_interval_days: f64) -> f64 {
        self.line.slope * serial_interval_days
    }

    pub fn doubling_time(&self) -> f64 {
        std::f64::consts::LN_2 / self.line.slope
    }
}

pub fn fit_exponential_growth(points: &[(f64, f64)]) -> Result<GrowthFit, FitError> {
    let mut logged = Vec::with_capacity(points.len());
    for (day, cases) in points {
        if *cases <= 0.0 {
            return Err(FitError::NonPositiveCases {
                day: *day,
                cases: *cases,
            });
        }
        logged.push((*day, cases.ln()));
    }
    Ok(GrowthFit {
        line: fit_line(&logged)?,
    })
}
