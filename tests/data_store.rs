use markov_sir::data_management::{self, ModelDataStore};
use markov_sir::regression;
use markov_sir::reference;
use markov_sir::stats::Ensemble;
use std::fs;

const PARMS: &str = "
model_name: store test
model_description: small run written to disk
seed: 5
simulation:
  population: 300
  initial_infected: 3
  steps_per_day: 400
  recovery_days: 4
  r0: 2.0
  step_count: 1200
  trial_count: 3
comparison:
  start_day: 1
  levels:
    - { label: None, reduction: 0.0 }
    - { label: Strict, reduction: 0.45 }
output:
  stride: 100
reference:
  file: cases.csv
  country: New Zealand
  start_date: \"Mar 2, 2020\"
  days: 4
";

const CASES: &str = "\
Entity,Code,Date,Total confirmed cases of COVID-19 (cases)
New Zealand,NZL,\"Mar 1, 2020\",1
New Zealand,NZL,\"Mar 2, 2020\",2
New Zealand,NZL,\"Mar 3, 2020\",4
New Zealand,NZL,\"Mar 4, 2020\",8
New Zealand,NZL,\"Mar 5, 2020\",16
New Zealand,NZL,\"Mar 6, 2020\",20
";

#[test]
fn scenario_directory_is_recreated() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("parms.yaml"), PARMS).unwrap();
    let stale = root.path().join("Scenarios").join("old.csv");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "leftover").unwrap();

    let store = ModelDataStore::new(root.path()).unwrap();
    assert!(store.scenario_dir().exists());
    assert!(!stale.exists());
}

#[test]
fn ensemble_and_comparison_csv_output() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("parms.yaml"), PARMS).unwrap();
    let store = ModelDataStore::new(root.path()).unwrap();
    let parms = store.get_model_parms().unwrap();
    let seed = parms.seed.unwrap();

    let stats = Ensemble::new(&parms.sim_parms, seed).run(&parms.schedule).unwrap();
    let path = store.output_path("ensemble.csv");
    data_management::write_ensemble(&path, &stats, parms.output_stride).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("day,s_mean,s_sd,i_mean,i_sd,r_mean,r_sd,cases_mean,cases_sd")
    );
    // steps 0, 100, ..., 1200
    assert_eq!(lines.count(), 13);
    assert!(text.lines().nth(1).unwrap().starts_with("0.0,297.0,0.0,3.0,0.0,0.0,0.0,3.0,0.0"));

    let comparison = parms.comparison.as_ref().unwrap();
    let results = Ensemble::new(&parms.sim_parms, seed)
        .compare(&comparison.levels, parms.comparison_start_step().unwrap())
        .unwrap();
    let path = store.output_path("comparison.csv");
    data_management::write_comparison(&path, &results, parms.output_stride).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1 + 2 * 13);
    assert!(text.contains(",Strict,"));
}

#[test]
fn growth_fit_from_reference_file() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("parms.yaml"), PARMS).unwrap();
    fs::write(root.path().join("cases.csv"), CASES).unwrap();
    let store = ModelDataStore::new(root.path()).unwrap();
    let parms = store.get_model_parms().unwrap();
    let reference_parms = parms.reference.as_ref().unwrap();

    let path = store.resolve(&reference_parms.file);
    let series = reference::load_case_series(&path, &reference_parms.country).unwrap();
    let window = series.window(reference_parms.start_date, reference_parms.days);
    assert_eq!(window.len(), 4);
    assert_eq!(window[0].day_index, 1);
    // 2, 4, 8, 16: doubling every day
    let fit = regression::fit_exponential_growth(&reference::CaseSeries::pairs(&window)).unwrap();
    approx::assert_relative_eq!(fit.growth_rate(), std::f64::consts::LN_2, epsilon = 1e-9);
    approx::assert_relative_eq!(fit.doubling_time(), 1.0, epsilon = 1e-9);

    let path = store.output_path("r0_fit.csv");
    data_management::write_growth_fit(&path, &fit, 4.0).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(
        "intercept,slope,sigma_intercept,sigma_slope,points,\
         doubling_days,serial_interval_days,estimated_r0"
    ));
}
