//! Ingestion of the external datasets the inventory is built from.
//!
//! Each dataset is a versioned source, identified by an ID and a release tag. Sources are read
//! through a [`SourceCache`], normalised against the flow list and combined into an
//! [`Inventory`] of immutable facility records.
use crate::error::{RunReport, Stage};
use crate::facility::FacilityMap;
use crate::model::Model;
use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::info;
use serde::Deserialize;
use std::rc::Rc;

pub mod cache;
pub use cache::SourceCache;
pub mod flow_list;
use flow_list::FlowList;
pub mod generation;
use generation::ingest_generation;
pub mod releases;
use releases::{merge_releases, read_releases};
pub mod upstream;
use upstream::{UpstreamMap, read_upstream};

/// Raw flows (name, compartment, unit) which the flow list has no mapping for
pub type UnmappedFlows = IndexSet<(String, String, String)>;

/// A versioned external dataset
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    /// Identifier for the source (e.g. "egrid")
    pub id: String,
    /// The release of the dataset (e.g. "2016")
    pub release: String,
    /// Where the dataset is found: a path relative to the model folder, an absolute path or a URL
    pub location: String,
}

impl SourceSpec {
    /// The URL the source is downloaded from, if it is not a local file
    pub fn url(&self) -> Option<&str> {
        cache::is_url(&self.location).then_some(self.location.as_str())
    }

    /// The release as a year, if it is one (e.g. "2016")
    pub fn release_year(&self) -> Option<u32> {
        self.release.parse().ok()
    }
}

/// Everything read from the sources
#[derive(Debug, PartialEq)]
pub struct Inventory {
    /// Facilities which passed the filters, with their releases, sorted by ID
    pub facilities: FacilityMap,
    /// Upstream fuel supply inventories (empty unless upstream is included)
    pub upstream: UpstreamMap,
}

/// Fetch a source and describe it in any error raised while reading it
fn fetch(spec: &SourceSpec, model: &Model, cache: &SourceCache, report: &mut RunReport) -> Result<std::path::PathBuf> {
    info!("Reading {} (release {})", spec.id, spec.release);
    cache.fetch(spec, &model.model_path, report)
}

/// Read and normalise all the sources for a model
pub fn ingest(model: &Model, cache: &SourceCache, report: &mut RunReport) -> Result<Inventory> {
    let config = &model.config;

    let path = fetch(&config.flow_list, model, cache, report)?;
    let flow_list = FlowList::from_path(&path)
        .with_context(|| format!("Error reading flow list {}", config.flow_list.id))?;

    let path = fetch(&config.generation, model, cache, report)?;
    let mut facilities = ingest_generation(&path, config, report)?;
    info!("{} facilities passed the filters", facilities.len());

    let mut unmapped = UnmappedFlows::new();
    let mut inventories = Vec::with_capacity(config.inventories.len());
    for spec in &config.inventories {
        let path = fetch(spec, model, cache, report)?;
        let releases = read_releases(
            &path,
            &spec.id,
            config.target_year,
            &flow_list,
            |id| facilities.contains_key(id),
            &mut unmapped,
        )
        .with_context(|| format!("Error reading inventory {}", spec.id))?;
        inventories.push(releases);
    }
    for (facility_id, releases) in merge_releases(inventories) {
        if let Some(facility) = facilities.get_mut(&facility_id) {
            facility.releases = releases;
        }
    }

    let upstream = match (&config.upstream, config.include_upstream) {
        (Some(spec), true) => {
            let path = fetch(spec, model, cache, report)?;
            read_upstream(&path, &flow_list, &mut unmapped)
                .with_context(|| format!("Error reading upstream inventory {}", spec.id))?
        }
        _ => UpstreamMap::new(),
    };

    for (name, compartment, unit) in unmapped {
        report.coverage(
            Stage::Ingestion,
            &name,
            format!("No flow list mapping for {name} ({compartment}, {unit}); flow dropped"),
        );
    }

    Ok(Inventory {
        facilities: facilities
            .into_iter()
            .map(|(id, facility)| (id, Rc::new(facility)))
            .collect(),
        upstream,
    })
}
