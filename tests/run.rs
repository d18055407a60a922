//! Integration tests for the `run` command.
use elci::cli::{RunOpts, handle_run_command};
use elci::output::jsonld::read_package;
use elci::process::ProcessKind;
use elci::settings::Settings;
use float_cmp::assert_approx_eq;
use itertools::Itertools;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Get the path to the example model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/simple")
}

fn opts(output_dir: &Path) -> RunOpts {
    RunOpts {
        output_dir: Some(output_dir.to_path_buf()),
        ..RunOpts::default()
    }
}

/// Read the consumption mix CSV file as (region, fuel) -> fraction
fn read_consumption_mix(output_dir: &Path) -> HashMap<(String, String), f64> {
    csv::Reader::from_path(output_dir.join("consumption_mix.csv"))
        .unwrap()
        .into_deserialize::<(String, String, f64, f64)>()
        .map(|row| {
            let (region, fuel, fraction, _) = row.unwrap();
            ((region, fuel), fraction)
        })
        .collect()
}

/// An integration test for the `run` command.
#[test]
fn test_handle_run_command() {
    unsafe { std::env::set_var("ELCI_LOG_LEVEL", "off") };

    // Save results to non-existent directory to check that directory creation works
    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path().join("results");
    let report =
        handle_run_command(&get_model_dir(), &opts(&output_dir), Some(Settings::default()))
            .unwrap();

    for file_name in [
        "simple.zip",
        "generation_mix.csv",
        "consumption_mix.csv",
        "warnings.csv",
        "metadata.toml",
    ] {
        assert!(output_dir.join(file_name).is_file(), "{file_name} missing");
    }

    // F4 has no energy value for one of its co-products, but the run still completes
    assert!(report.mentions("F4"));
    assert!(report.mentions("Mercury"));
    assert!(report.mentions("C1"));
    assert!(report.mentions("F8"));
    assert!(report.mentions("F9"));
    assert!(report.mentions("BIOMASS"));
    assert!(report.mentions("R2/BIOMASS"));
    assert!(!report.mentions("WIND"));
    let warnings = fs::read_to_string(output_dir.join("warnings.csv")).unwrap();
    assert_eq!(warnings.lines().count(), report.len() + 1);

    // C1 imports everything from R1 (25% coal, 75% gas) and loses 5%
    let mix = read_consumption_mix(&output_dir);
    let fraction = |region: &str, fuel: &str| mix[&(region.to_string(), fuel.to_string())];
    assert_approx_eq!(f64, fraction("C1", "COAL"), 0.2625, epsilon = 1e-9);
    assert_approx_eq!(f64, fraction("C1", "GAS"), 0.7875, epsilon = 1e-9);
    assert_approx_eq!(f64, fraction("R1", "COAL"), 0.26, epsilon = 1e-9);

    let graph = read_package(&output_dir.join("simple.zip")).unwrap();
    let count = |kind| graph.values().filter(|p| p.kind == kind).count();
    assert_eq!(count(ProcessKind::Upstream), 2);
    // F4 is R2's only biomass plant and its allocation failed, so biomass has no process
    assert_eq!(count(ProcessKind::Generation), 5);
    assert_eq!(count(ProcessKind::GenerationMix), 2);
    assert_eq!(count(ProcessKind::ConsumptionMix), 3);

    // F7 lies in R1 and R2 and is assigned to R2, which is first in the priority list
    let generation = graph
        .values()
        .filter(|p| p.kind == ProcessKind::Generation)
        .map(|p| p.name.as_str())
        .sorted()
        .collect_vec();
    assert!(generation.contains(&"Electricity from SOLAR - R2"));
    assert!(!generation.contains(&"Electricity from SOLAR - R1"));
}

/// Two runs of the same model give byte-identical packages
#[test]
fn test_run_is_deterministic() {
    unsafe { std::env::set_var("ELCI_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let packages = ["a", "b"].map(|name| {
        let output_dir = tempdir.path().join(name);
        handle_run_command(&get_model_dir(), &opts(&output_dir), Some(Settings::default()))
            .unwrap();
        fs::read(output_dir.join("simple.zip")).unwrap()
    });
    assert!(packages[0] == packages[1]);
}

/// Existing output is only replaced if overwriting is allowed
#[test]
fn test_run_overwrite() {
    unsafe { std::env::set_var("ELCI_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    fs::write(tempdir.path().join("old.txt"), "").unwrap();

    let mut opts = opts(tempdir.path());
    let err = handle_run_command(&get_model_dir(), &opts, Some(Settings::default())).unwrap_err();
    assert!(err.to_string().starts_with("Failed to create output directory"));
    assert!(!tempdir.path().join("simple.zip").exists());

    opts.overwrite = true;
    handle_run_command(&get_model_dir(), &opts, Some(Settings::default())).unwrap();
    assert!(tempdir.path().join("simple.zip").is_file());
}
