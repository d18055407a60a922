//! Drives a model through every stage, from source ingestion to the exported package.
use crate::aggregation::aggregate;
use crate::allocation::allocate_facilities;
use crate::distribution::{ConsumptionMix, build_consumption_mixes, consumption_mix_process};
use crate::error::{RunReport, Stage};
use crate::model::Model;
use crate::output::jsonld::{PackageInfo, write_package};
use crate::output::metadata::{METADATA_FILE_NAME, write_metadata};
use crate::output::{
    CONSUMPTION_MIX_FILE_NAME, GENERATION_MIX_FILE_NAME, WARNINGS_FILE_NAME, publish_files,
    write_consumption_mixes, write_generation_mixes, write_warnings,
};
use crate::process::{ProcessGraph, validate_graph};
use crate::region::RegionID;
use crate::regionalisation::{GenerationMix, regionalise};
use crate::source::{SourceCache, ingest};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::info;
use std::path::{Path, PathBuf};

/// The inventory built from a model, ready for export
#[derive(Debug, PartialEq)]
pub struct LifeCycleInventory {
    /// Every process, with providers before the processes consuming from them
    pub graph: ProcessGraph,
    /// Generation mix for each region at the aggregation level
    pub generation_mixes: IndexMap<RegionID, GenerationMix>,
    /// Consumption mix for each region which has one
    pub consumption_mixes: IndexMap<RegionID, ConsumptionMix>,
    /// Warnings raised while building the inventory
    pub report: RunReport,
}

/// The file name of the package exported for the given model
pub fn package_file_name(model: &Model) -> String {
    format!("{}.zip", model.config.name)
}

/// Build the process graph for a model.
///
/// Sources are read through `cache`. Problems with individual facilities and regions are recorded
/// in the report; only failure to read a source aborts the build.
pub fn build(model: &Model, cache: &SourceCache) -> Result<LifeCycleInventory> {
    let config = &model.config;
    let mut report = RunReport::default();

    info!("Ingesting sources");
    let sources = ingest(model, cache, &mut report)
        .with_context(|| Stage::Ingestion.failure_message())?;

    info!("Assigning facilities to {} regions", config.region_agg);
    let regionalisation = regionalise(model, &sources.facilities, &mut report);

    info!("Allocating flows by {}", config.allocation_basis);
    let allocated = allocate_facilities(
        &sources.facilities,
        &model.facility_outputs,
        config.allocation_basis,
        &config.electricity_exclusive_flows,
        &mut report,
    );
    let upstream = config.include_upstream.then_some(&sources.upstream);
    let aggregation = aggregate(
        &regionalisation.assignment,
        &allocated,
        &regionalisation.mixes,
        upstream,
        &mut report,
    );
    let mut graph = aggregation.graph;

    info!("Building consumption mixes");
    let consumption_mixes = build_consumption_mixes(
        model,
        &regionalisation.regions,
        &regionalisation.mixes,
        &mut report,
    );
    for mix in consumption_mixes.values() {
        let process = consumption_mix_process(mix, &aggregation.generation_mixes);
        graph.insert(process.id.clone(), process);
    }
    info!("Built {} processes", graph.len());

    Ok(LifeCycleInventory {
        graph,
        generation_mixes: regionalisation.mixes,
        consumption_mixes,
        report,
    })
}

/// Validate an inventory and write it to the output folder.
///
/// Nothing is written unless the process graph passes validation. Files are first written to a
/// staging folder inside `output_path` and then moved into place, with the package moved last, so
/// a package is only present if every other output was written.
pub fn export(model: &Model, inventory: &LifeCycleInventory, output_path: &Path) -> Result<PathBuf> {
    validate_graph(&inventory.graph)?;

    let staging = tempfile::Builder::new()
        .prefix(".elci-staging")
        .tempdir_in(output_path)
        .context("Could not create staging folder")?;
    let staging_path = staging.path();
    write_generation_mixes(staging_path, &inventory.generation_mixes)?;
    write_consumption_mixes(
        staging_path,
        &inventory.consumption_mixes,
        &inventory.generation_mixes,
    )?;
    write_warnings(staging_path, &inventory.report)?;
    write_metadata(
        staging_path,
        &model.model_path,
        &model.config,
        inventory.report.len(),
    )?;
    let package_name = package_file_name(model);
    write_package(
        &inventory.graph,
        &PackageInfo::new(&model.config),
        &staging_path.join(&package_name),
    )?;

    publish_files(
        staging_path,
        output_path,
        &[
            GENERATION_MIX_FILE_NAME,
            CONSUMPTION_MIX_FILE_NAME,
            WARNINGS_FILE_NAME,
            METADATA_FILE_NAME,
            &package_name,
        ],
    )?;

    Ok(output_path.join(package_name))
}

/// Run the model, writing the package and supporting files to `output_path`.
///
/// # Returns
///
/// The warnings raised during the run
pub fn run(model: &Model, cache: &SourceCache, output_path: &Path) -> Result<RunReport> {
    let inventory = build(model, cache)?;
    let file_path = export(model, &inventory, output_path)
        .with_context(|| Stage::Export.failure_message())?;
    info!("Package written to {}", file_path.display());

    Ok(inventory.report)
}
