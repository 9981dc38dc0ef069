/////////////////////////////////////////////////////////////////////////////////////
//
// Markov SIR model
//
// data_managment module
//
// functions to read and write from file system
//
////////////////////////////////////////////////////////////////////////////////////

use super::errors::{ConfigError, DataError};
use super::policy::{PolicyBreakpoint, PolicyLevel, PolicySchedule};
use super::regression::GrowthFit;
use super::stats::{EnsembleStatistics, FirstPassageSummary, Measure, PolicyComparison};
use super::world::SimParms;
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use yaml_rust::{yaml, Yaml};

// -------------------------------- File paths -----------------------------------------------------
pub struct ModelDataStore {
    model_root: PathBuf,
    parameter_file: PathBuf,
    scenario_dir: PathBuf,
}

impl ModelDataStore {
    // parameters live in <model_root>/parms.yaml
    // outputs go to <model_root>/Scenarios which is recreated on every run
    pub fn new(model_root: &Path) -> Result<ModelDataStore, DataError> {
        info!("model root dir: {}", model_root.display());
        let parameter_file = model_root.join("parms.yaml");
        let scenario_dir = model_root.join("Scenarios");

        if scenario_dir.exists() {
            fs::remove_dir_all(&scenario_dir)
                .map_err(|e| DataError::io(scenario_dir.display(), e))?;
        }
        fs::create_dir_all(&scenario_dir).map_err(|e| DataError::io(scenario_dir.display(), e))?;

        Ok(ModelDataStore {
            model_root: model_root.to_path_buf(),
            parameter_file,
            scenario_dir,
        })
    }

    pub fn scenario_dir(&self) -> &Path {
        &self.scenario_dir
    }

    // reference files are named relative to the model root
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.model_root.join(relative)
    }

    pub fn get_model_parms(&self) -> Result<ModelParameters, DataError> {
        let parm_string = fs::read_to_string(&self.parameter_file)
            .map_err(|e| DataError::io(self.parameter_file.display(), e))?;
        Ok(ModelParameters::from_yaml_str(&parm_string)?)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.scenario_dir.join(file_name)
    }
}

// ----------------------------- Model parameters --------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonParms {
    pub start_day: f64,
    pub levels: Vec<PolicyLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceParms {
    pub file: String,
    pub country: String,
    pub start_date: NaiveDate,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub model_name: String,
    pub model_description: String,
    pub seed: Option<u64>,
    pub sim_parms: SimParms,
    pub schedule: PolicySchedule,
    pub comparison: Option<ComparisonParms>,
    pub target_cases: Option<u64>,
    pub output_stride: usize,
    pub reference: Option<ReferenceParms>,
}

// yaml-rust helpers: every lookup reports the full key path when it fails
fn require_str(doc: &Yaml, key: &str) -> Result<String, ConfigError> {
    lookup(doc, key)
        .as_str()
        .map(String::from)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

fn require_f64(doc: &Yaml, key: &str) -> Result<f64, ConfigError> {
    let value = lookup(doc, key);
    // integers are fine where reals are expected
    value
        .as_f64()
        .or_else(|| value.as_i64().map(|v| v as f64))
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

fn require_u64(doc: &Yaml, key: &str) -> Result<u64, ConfigError> {
    let value = lookup(doc, key)
        .as_i64()
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    if value < 0 {
        return Err(ConfigError::invalid(key, format!("{} is negative", value)));
    }
    Ok(value as u64)
}

fn optional_u64(doc: &Yaml, key: &str) -> Result<Option<u64>, ConfigError> {
    if lookup(doc, key).is_badvalue() {
        return Ok(None);
    }
    require_u64(doc, key).map(Some)
}

fn lookup<'a>(doc: &'a Yaml, key: &str) -> &'a Yaml {
    key.split('.').fold(doc, |node, part| &node[part])
}

impl ModelParameters {
    pub fn from_yaml_str(text: &str) -> Result<ModelParameters, ConfigError> {
        // the loader creates an array of yaml documents; only the first one interests us
        let docs = yaml::YamlLoader::load_from_str(text)
            .map_err(|e| ConfigError::Yaml(e.to_string()))?;
        let doc = docs
            .first()
            .ok_or_else(|| ConfigError::Yaml("empty parameter file".to_string()))?;

        let model_name = require_str(doc, "model_name")?;
        let model_description = require_str(doc, "model_description")
            .unwrap_or_default();
        let seed = optional_u64(doc, "seed")?;

        // parse - simulation parms ----------------------------------------------
        let sim_parms = SimParms::new(
            require_u64(doc, "simulation.population")?,
            require_u64(doc, "simulation.initial_infected")?,
            require_f64(doc, "simulation.steps_per_day")?,
            require_f64(doc, "simulation.recovery_days")?,
            require_f64(doc, "simulation.r0")?,
            require_u64(doc, "simulation.step_count")? as usize,
            require_u64(doc, "simulation.trial_count")? as usize,
        )?;
        let steps_per_day = sim_parms.steps_per_day();

        // parse - staged policy ------------------------------------------------
        let mut breakpoints = Vec::new();
        if let Some(entries) = doc["policy"].as_vec() {
            for (i, entry) in entries.iter().enumerate() {
                let label =
                    require_str(entry, "label").unwrap_or_else(|_| format!("policy {}", i + 1));
                let day = require_f64(entry, "day")
                    .map_err(|_| ConfigError::MissingKey(format!("policy[{}].day", i)))?;
                let reduction = require_f64(entry, "reduction")
                    .map_err(|_| ConfigError::MissingKey(format!("policy[{}].reduction", i)))?;
                breakpoints.push(PolicyBreakpoint::from_day(label, day, reduction, steps_per_day)?);
            }
        }
        let schedule = PolicySchedule::new(breakpoints)?;

        // parse - quarantine comparison ----------------------------------------
        let comparison = if doc["comparison"].is_badvalue() {
            None
        } else {
            let start_day = require_f64(doc, "comparison.start_day")?;
            if !(start_day.is_finite() && start_day >= 0.0) {
                return Err(ConfigError::invalid(
                    "comparison.start_day",
                    "must be a non-negative day",
                ));
            }
            let entries = doc["comparison"]["levels"]
                .as_vec()
                .ok_or_else(|| ConfigError::MissingKey("comparison.levels".to_string()))?;
            let mut levels = Vec::with_capacity(entries.len());
            let mut seen = HashSet::new();
            for (i, entry) in entries.iter().enumerate() {
                let key = format!("comparison.levels[{}]", i);
                let label = require_str(entry, "label")
                    .map_err(|_| ConfigError::MissingKey(format!("{}.label", key)))?;
                let reduction = require_f64(entry, "reduction")
                    .map_err(|_| ConfigError::MissingKey(format!("{}.reduction", key)))?;
                // results are looked up by label
                if !seen.insert(label.clone()) {
                    return Err(ConfigError::invalid(
                        format!("{}.label", key),
                        format!("duplicate label '{}'", label),
                    ));
                }
                let level = PolicyLevel::new(label, reduction);
                // reject bad reductions now rather than mid run
                level.schedule(0)?;
                levels.push(level);
            }
            Some(ComparisonParms { start_day, levels })
        };

        let target_cases = optional_u64(doc, "first_passage.target_cases")?;

        let output_stride = optional_u64(doc, "output.stride")?.unwrap_or(1) as usize;
        if output_stride == 0 {
            return Err(ConfigError::invalid("output.stride", "must be at least 1"));
        }

        // parse - reference data -----------------------------------------------
        let reference = if doc["reference"].is_badvalue() {
            None
        } else {
            let date_text = require_str(doc, "reference.start_date")?;
            let start_date = super::reference::parse_case_date(&date_text).ok_or_else(|| {
                ConfigError::invalid(
                    "reference.start_date",
                    format!("'{}' is not a date like 'Mar 7, 2020'", date_text),
                )
            })?;
            Some(ReferenceParms {
                file: require_str(doc, "reference.file")?,
                country: require_str(doc, "reference.country")?,
                start_date,
                days: require_u64(doc, "reference.days")? as usize,
            })
        };

        Ok(ModelParameters {
            model_name,
            model_description,
            seed,
            sim_parms,
            schedule,
            comparison,
            target_cases,
            output_stride,
            reference,
        })
    }

    pub fn comparison_start_step(&self) -> Option<u64> {
        self.comparison
            .as_ref()
            .map(|c| (c.start_day * self.sim_parms.steps_per_day()).round() as u64)
    }

    pub fn to_string(&self) -> String {
        let p = &self.sim_parms;
        format!(
            "Model name {}\nModel description {}\n\
             Population {} ({} initially infected), R0 {}, recovery {} days\n\
             {} trials of {} steps at {} steps per day, {} policy stages",
            self.model_name,
            self.model_description,
            p.population(),
            p.initial_infected(),
            p.r0(),
            p.recovery_days(),
            p.trial_count(),
            p.step_count(),
            p.steps_per_day(),
            self.schedule.breakpoints().len()
        )
    }
}

// ----------------------------- Output model results ----------------------------------------------

#[derive(Debug, Serialize)]
struct EnsembleRow {
    day: f64,
    s_mean: f64,
    s_sd: f64,
    i_mean: f64,
    i_sd: f64,
    r_mean: f64,
    r_sd: f64,
    cases_mean: f64,
    cases_sd: f64,
}

#[derive(Debug, Serialize)]
struct ComparisonRow<'a> {
    day: f64,
    label: &'a str,
    cases_mean: f64,
    cases_sd: f64,
}

#[derive(Debug, Serialize)]
struct FirstPassageRow {
    trial: usize,
    day: f64,
}

#[derive(Debug, Serialize)]
struct GrowthRow {
    intercept: f64,
    slope: f64,
    sigma_intercept: f64,
    sigma_slope: f64,
    points: usize,
    doubling_days: f64,
    serial_interval_days: f64,
    estimated_r0: f64,
}

fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>, DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::io(path.display(), e))?;
    Ok(WriterBuilder::new().has_headers(true).from_writer(file))
}

// every `stride`-th step, always including the last one
fn thinned(len: usize, stride: usize) -> impl Iterator<Item = usize> {
    let last = len.checked_sub(1);
    (0..len).filter(move |i| i % stride == 0 || Some(*i) == last)
}

/// Mean and standard deviation of every measure per step.
pub fn write_ensemble(
    path: &Path,
    stats: &EnsembleStatistics,
    stride: usize,
) -> Result<(), DataError> {
    let mut wtr = csv_writer(path)?;
    let s = stats.summaries(Measure::Susceptible);
    let i = stats.summaries(Measure::Infected);
    let r = stats.summaries(Measure::Recovered);
    let c = stats.summaries(Measure::Cases);
    for index in thinned(stats.len(), stride) {
        wtr.serialize(EnsembleRow {
            day: stats.times()[index],
            s_mean: s[index].mean,
            s_sd: s[index].std_dev,
            i_mean: i[index].mean,
            i_sd: i[index].std_dev,
            r_mean: r[index].mean,
            r_sd: r[index].std_dev,
            cases_mean: c[index].mean,
            cases_sd: c[index].std_dev,
        })?;
    }
    wtr.flush().map_err(|e| DataError::io(path.display(), e))?;
    Ok(())
}

/// Cumulative cases per policy level, long format.
pub fn write_comparison(
    path: &Path,
    comparison: &PolicyComparison,
    stride: usize,
) -> Result<(), DataError> {
    let mut wtr = csv_writer(path)?;
    for (level, stats) in comparison.iter() {
        let cases = stats.summaries(Measure::Cases);
        for index in thinned(stats.len(), stride) {
            wtr.serialize(ComparisonRow {
                day: stats.times()[index],
                label: &level.label,
                cases_mean: cases[index].mean,
                cases_sd: cases[index].std_dev,
            })?;
        }
    }
    wtr.flush().map_err(|e| DataError::io(path.display(), e))?;
    Ok(())
}

pub fn write_first_passage(path: &Path, summary: &FirstPassageSummary) -> Result<(), DataError> {
    let mut wtr = csv_writer(path)?;
    for (trial, day) in &summary.reached {
        wtr.serialize(FirstPassageRow {
            trial: *trial,
            day: *day,
        })?;
    }
    wtr.flush().map_err(|e| DataError::io(path.display(), e))?;
    Ok(())
}

pub fn write_growth_fit(
    path: &Path,
    fit: &GrowthFit,
    serial_interval_days: f64,
) -> Result<(), DataError> {
    let mut wtr = csv_writer(path)?;
    wtr.serialize(GrowthRow {
        intercept: fit.line.intercept,
        slope: fit.line.slope,
        sigma_intercept: fit.line.sigma_intercept,
        sigma_slope: fit.line.sigma_slope,
        points: fit.line.points,
        doubling_days: fit.doubling_time(),
        serial_interval_days,
        estimated_r0: fit.reproduction_number(serial_interval_days),
    })?;
    wtr.flush().map_err(|e| DataError::io(path.display(), e))?;
    Ok(())
}
