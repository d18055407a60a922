//! The module responsible for writing output data to disk.
use crate::distribution::ConsumptionMix;
use crate::error::{RunReport, Stage};
use crate::facility::FuelCategory;
use crate::region::RegionID;
use crate::regionalisation::GenerationMix;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod jsonld;
pub mod metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "elci_results";

/// The output file name for generation mixes
pub const GENERATION_MIX_FILE_NAME: &str = "generation_mix.csv";

/// The output file name for consumption mixes
pub const CONSUMPTION_MIX_FILE_NAME: &str = "consumption_mix.csv";

/// The output file name for the warnings raised during the run
pub const WARNINGS_FILE_NAME: &str = "warnings.csv";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let model_dir = model_dir
        .canonicalize()
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model specified at `model_dir`.
///
/// An existing, non-empty directory is only reused if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether existing output will be overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    if output_dir.is_dir() {
        let is_empty = fs::read_dir(output_dir)?.next().is_none();
        if is_empty {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. \
            Please re-run with the --overwrite option."
        );
        return Ok(true);
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(false)
}

/// Represents a row in the generation mix CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct GenerationMixRow {
    region_id: RegionID,
    fuel_category: FuelCategory,
    fraction: f64,
    total_generation: f64,
}

/// Represents a row in the consumption mix CSV file.
///
/// Fractions include distribution losses, so for each region they sum to `1 + loss_factor`.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ConsumptionMixRow {
    region_id: RegionID,
    fuel_category: FuelCategory,
    fraction: f64,
    loss_factor: f64,
}

/// Represents a row in the warnings CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct WarningRow {
    stage: Stage,
    subject: String,
    message: String,
}

fn new_writer(output_path: &Path, file_name: &str) -> Result<csv::Writer<File>> {
    let file_path = output_path.join(file_name);
    csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))
}

/// Write the generation mix of each region to a CSV file
pub fn write_generation_mixes(
    output_path: &Path,
    mixes: &IndexMap<RegionID, GenerationMix>,
) -> Result<()> {
    let mut writer = new_writer(output_path, GENERATION_MIX_FILE_NAME)?;
    for mix in mixes.values() {
        for (fuel_category, fraction) in &mix.fractions {
            writer.serialize(GenerationMixRow {
                region_id: mix.region.clone(),
                fuel_category: fuel_category.clone(),
                fraction: *fraction,
                total_generation: mix.total.0,
            })?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Write the fuel make-up of each consumption mix to a CSV file
pub fn write_consumption_mixes(
    output_path: &Path,
    consumption: &IndexMap<RegionID, ConsumptionMix>,
    generation: &IndexMap<RegionID, GenerationMix>,
) -> Result<()> {
    let mut writer = new_writer(output_path, CONSUMPTION_MIX_FILE_NAME)?;
    for mix in consumption.values() {
        for (fuel_category, fraction) in mix.fuel_fractions(generation) {
            writer.serialize(ConsumptionMixRow {
                region_id: mix.region.clone(),
                fuel_category,
                fraction,
                loss_factor: mix.loss_factor,
            })?;
        }
    }
    writer.flush()?;

    Ok(())
}

/// Write the warnings raised during the run to a CSV file.
///
/// The file is written, with just a header, even if there were no warnings.
pub fn write_warnings(output_path: &Path, report: &RunReport) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(output_path.join(WARNINGS_FILE_NAME))?;
    writer.write_record(["stage", "subject", "message"])?;
    for warning in report.iter() {
        writer.serialize(WarningRow {
            stage: warning.stage(),
            subject: warning.subject().to_string(),
            message: warning.message().to_string(),
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Move files written to `staging` into `output_path`, one at a time in the order given
pub fn publish_files(staging: &Path, output_path: &Path, file_names: &[&str]) -> Result<()> {
    for file_name in file_names {
        let dest = output_path.join(file_name);
        fs::rename(staging.join(file_name), &dest)
            .with_context(|| format!("Could not write {}", dest.display()))?;
    }

    Ok(())
}
