use clap::{Parser, Subcommand};
use markov_sir::data_management::{self, ModelDataStore, ModelParameters};
use markov_sir::errors::{ConfigError, DataError};
use markov_sir::regression;
use markov_sir::stats::{Ensemble, Measure};
use markov_sir::{reference, utilities};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "markov-sir")]
#[command(about = "Stochastic SIR ensembles under staged quarantine policies", long_about = None)]
struct Args {
    /// Model root directory holding parms.yaml
    model_root: PathBuf,

    /// Master seed (overrides the parameter file; random when neither is set)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
enum Command {
    /// Mean and spread of S, I, R under the configured policy stages
    Ensemble,
    /// Cumulative cases under each quarantine level
    Compare,
    /// Time for cumulative cases to reach the target
    FirstPassage,
    /// Growth rate and R0 from the reference case data
    FitR0,
    /// Everything the parameter file configures
    All,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if let Err(e) = run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), DataError> {
    // The model data store handles all model inputs and outputs
    let model_data_store = ModelDataStore::new(&args.model_root)?;
    let model_parms = model_data_store.get_model_parms()?;
    info!("--------------------Markov SIR Model-----------------------");
    for line in model_parms.to_string().lines() {
        info!("{}", line);
    }

    let worst = model_parms.sim_parms.worst_case_step_probability();
    if worst > 1.0 {
        warn!(
            "step probabilities can reach {:.3} at {} steps per day; trials abort if they pass 1",
            worst,
            model_parms.sim_parms.steps_per_day()
        );
    }

    let seed = args
        .seed
        .or(model_parms.seed)
        .unwrap_or_else(utilities::fresh_seed);
    info!("master seed {}", seed);

    let command = args.command.unwrap_or(Command::All);
    let everything = command == Command::All;

    if everything || command == Command::Ensemble {
        run_ensemble(&model_data_store, &model_parms, seed)?;
    }
    if command == Command::Compare || (everything && model_parms.comparison.is_some()) {
        run_comparison(&model_data_store, &model_parms, seed)?;
    }
    if command == Command::FirstPassage || (everything && model_parms.target_cases.is_some()) {
        run_first_passage(&model_data_store, &model_parms, seed)?;
    }
    if command == Command::FitR0 || (everything && model_parms.reference.is_some()) {
        run_growth_fit(&model_data_store, &model_parms)?;
    }
    Ok(())
}

fn run_ensemble(
    store: &ModelDataStore,
    parms: &ModelParameters,
    seed: u64,
) -> Result<(), DataError> {
    let stats = Ensemble::new(&parms.sim_parms, seed).run(&parms.schedule)?;
    if let Some(last) = stats.len().checked_sub(1) {
        for measure in Measure::ALL.iter() {
            if let Some(s) = stats.at(*measure, last) {
                info!(
                    "day {:.1}: {} {:.1} ± {:.1}",
                    stats.times()[last],
                    measure,
                    s.mean,
                    s.std_dev
                );
            }
        }
    }
    let path = store.output_path("ensemble.csv");
    data_management::write_ensemble(&path, &stats, parms.output_stride)?;
    info!("wrote {}", path.display());
    Ok(())
}

fn run_comparison(
    store: &ModelDataStore,
    parms: &ModelParameters,
    seed: u64,
) -> Result<(), DataError> {
    let comparison = parms
        .comparison
        .as_ref()
        .ok_or_else(|| ConfigError::MissingKey("comparison".to_string()))?;
    let start_step = parms.comparison_start_step().unwrap_or(0);
    let results = Ensemble::new(&parms.sim_parms, seed).compare(&comparison.levels, start_step)?;
    for (level, stats) in results.iter() {
        if let Some(s) = stats.summaries(Measure::Cases).last() {
            info!(
                "{}: {:.1} ± {:.1} cases at end of run",
                level.label, s.mean, s.std_dev
            );
        }
    }
    let path = store.output_path("comparison.csv");
    data_management::write_comparison(&path, &results, parms.output_stride)?;
    info!("wrote {}", path.display());
    Ok(())
}

fn run_first_passage(
    store: &ModelDataStore,
    parms: &ModelParameters,
    seed: u64,
) -> Result<(), DataError> {
    let target = parms
        .target_cases
        .ok_or_else(|| ConfigError::MissingKey("first_passage.target_cases".to_string()))?;
    let summary = Ensemble::new(&parms.sim_parms, seed).first_passage(&parms.schedule, target)?;
    match summary.summary() {
        Some(s) => info!(
            "{} cases reached after {:.2} ± {:.2} days ({} of {} trials)",
            target,
            s.mean,
            s.std_dev,
            summary.reached.len(),
            summary.trial_count()
        ),
        None => warn!("no trial reached {} cases", target),
    }
    for (day, count) in summary.histogram() {
        info!("  day {:>4}: {}", day, count);
    }
    let path = store.output_path("first_passage.csv");
    data_management::write_first_passage(&path, &summary)?;
    info!("wrote {}", path.display());
    Ok(())
}

fn run_growth_fit(store: &ModelDataStore, parms: &ModelParameters) -> Result<(), DataError> {
    let reference_parms = parms
        .reference
        .as_ref()
        .ok_or_else(|| ConfigError::MissingKey("reference".to_string()))?;
    let series = reference::load_case_series(
        &store.resolve(&reference_parms.file),
        &reference_parms.country,
    )?;
    let window = series.window(reference_parms.start_date, reference_parms.days);
    info!(
        "fitting {} records from {} ({} requested)",
        window.len(),
        reference_parms.start_date,
        reference_parms.days
    );
    let fit = regression::fit_exponential_growth(&reference::CaseSeries::pairs(&window))?;
    let serial_interval = parms.sim_parms.recovery_days();
    info!("A = {:.5} ± {:.5}", fit.line.intercept, fit.line.sigma_intercept);
    info!("B = {:.5} ± {:.5}", fit.line.slope, fit.line.sigma_slope);
    info!(
        "R0 ≈ {:.3} for a {} day serial interval",
        fit.reproduction_number(serial_interval),
        serial_interval
    );
    let path = store.output_path("r0_fit.csv");
    data_management::write_growth_fit(&path, &fit, serial_interval)?;
    info!("wrote {}", path.display());
    Ok(())
}
