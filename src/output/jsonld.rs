//! Reading and writing process graphs as openLCA JSON-LD packages.
//!
//! A package is a zip archive holding one JSON document per entity, at
//! `<folder>/<uuid>.json`. Entries are written in sorted order with a fixed timestamp so that
//! identical graphs give byte-identical packages.
//!
//! Besides processes and flows, a package holds the flow properties and unit groups its flows are
//! measured in, the locations of its processes and the sources they cite, so every reference in
//! a package resolves to a document within it.
use crate::facility::FuelCategory;
use crate::flow::{Flow, FlowID, FlowType};
use crate::id::deterministic_uuid;
use crate::model::ModelConfig;
use crate::process::{Process, ProcessFlow, ProcessGraph, ProcessKind, ProviderInput};
use crate::quantity::{Quantity, Unit, find_unit};
use crate::region::RegionID;
use crate::source::SourceSpec;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const CONTEXT: &str = "http://greendelta.github.io/olca-schema/context.jsonld";
const PROCESSES_FOLDER: &str = "processes";
const FLOWS_FOLDER: &str = "flows";
const FLOW_PROPERTIES_FOLDER: &str = "flow_properties";
const UNIT_GROUPS_FOLDER: &str = "unit_groups";
const LOCATIONS_FOLDER: &str = "locations";
const SOURCES_FOLDER: &str = "sources";

/// A reference to another entity in the package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Ref {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
}

impl Ref {
    fn new(kind: &str, id: String, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id,
            name: name.into(),
        }
    }
}

fn location_ref(region_id: &RegionID) -> Ref {
    Ref::new(
        "Location",
        deterministic_uuid(&["location", region_id.as_ref()]),
        region_id.to_string(),
    )
}

fn flow_ref(flow: &Flow) -> Ref {
    Ref::new("Flow", flow.id.to_string(), flow.name.clone())
}

fn unit_ref(unit: &Unit) -> Ref {
    Ref::new("Unit", deterministic_uuid(&["unit", unit.name]), unit.name)
}

fn flow_property_ref(quantity: Quantity) -> Ref {
    let name = quantity.to_string();
    Ref::new(
        "FlowProperty",
        deterministic_uuid(&["flow_property", name.as_str()]),
        name,
    )
}

fn unit_group_ref(quantity: Quantity) -> Ref {
    let name = quantity.unit_group_name();
    Ref::new("UnitGroup", deterministic_uuid(&["unit_group", name]), name)
}

fn source_ref(spec: &SourceSpec) -> Ref {
    Ref::new(
        "Source",
        deterministic_uuid(&["source", spec.id.as_str(), spec.release.as_str()]),
        format!("{} {}", spec.id, spec.release),
    )
}

/// The unit a flow is measured in
fn flow_unit(flow: &Flow) -> Result<&'static Unit> {
    find_unit(&flow.unit)
        .with_context(|| format!("Flow {} has unknown unit {}", flow.id, flow.unit))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ExchangeDoc {
    #[serde(rename = "@type")]
    kind: String,
    internal_id: usize,
    amount: f64,
    is_input: bool,
    is_quantitative_reference: bool,
    flow: Ref,
    flow_property: Ref,
    unit: Ref,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_provider: Option<Ref>,
}

impl ExchangeDoc {
    fn new(internal_id: usize, flow: &Flow, amount: f64, is_input: bool) -> Result<Self> {
        let unit = flow_unit(flow)?;
        Ok(Self {
            kind: "Exchange".into(),
            internal_id,
            amount,
            is_input,
            is_quantitative_reference: false,
            flow: flow_ref(flow),
            flow_property: flow_property_ref(unit.quantity),
            unit: unit_ref(unit),
            default_provider: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ProcessDocumentationDoc {
    valid_from: String,
    valid_until: String,
    time_description: String,
    sources: Vec<Ref>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ProcessDoc {
    #[serde(rename = "@context")]
    context: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
    category: String,
    process_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<Ref>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    process_documentation: Option<ProcessDocumentationDoc>,
    exchanges: Vec<ExchangeDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FlowPropertyFactorDoc {
    #[serde(rename = "@type")]
    kind: String,
    is_ref_flow_property: bool,
    conversion_factor: f64,
    flow_property: Ref,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FlowDoc {
    #[serde(rename = "@context")]
    context: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
    category: String,
    flow_type: FlowType,
    flow_properties: Vec<FlowPropertyFactorDoc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FlowPropertyDoc {
    #[serde(rename = "@context")]
    context: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
    flow_property_type: String,
    unit_group: Ref,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct UnitDoc {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
    conversion_factor: f64,
    is_ref_unit: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct UnitGroupDoc {
    #[serde(rename = "@context")]
    context: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
    default_flow_property: Ref,
    units: Vec<UnitDoc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct SourceDoc {
    #[serde(rename = "@context")]
    context: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
    description: String,
    text_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct LocationDoc {
    #[serde(rename = "@context")]
    context: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@id")]
    id: String,
    name: String,
}

/// The time period and sources documented on every process of a package
#[derive(Debug, Clone)]
pub struct PackageInfo<'a> {
    year: u32,
    fuel_sources: Vec<&'a SourceSpec>,
    generation_sources: Vec<&'a SourceSpec>,
}

impl<'a> PackageInfo<'a> {
    /// Describe the package built from a model's configuration.
    ///
    /// Upstream processes cite the upstream inventory and the flow list. All other processes cite
    /// the generation data, the flow list and the release inventories.
    pub fn new(config: &'a ModelConfig) -> Self {
        Self {
            year: config.target_year,
            fuel_sources: config
                .upstream
                .iter()
                .chain([&config.flow_list])
                .collect(),
            generation_sources: [&config.generation, &config.flow_list]
                .into_iter()
                .chain(&config.inventories)
                .collect(),
        }
    }

    fn sources(&self, kind: ProcessKind) -> &[&'a SourceSpec] {
        match kind {
            ProcessKind::Upstream => &self.fuel_sources,
            _ => &self.generation_sources,
        }
    }

    fn documentation(&self, kind: ProcessKind) -> ProcessDocumentationDoc {
        ProcessDocumentationDoc {
            valid_from: format!("{}-01-01", self.year),
            valid_until: format!("{}-12-31", self.year),
            time_description: format!("Annual data for {}", self.year),
            sources: self.sources(kind).iter().map(|spec| source_ref(spec)).collect(),
        }
    }
}

fn kind_from_category(category: &str) -> Option<ProcessKind> {
    [
        ProcessKind::Upstream,
        ProcessKind::Generation,
        ProcessKind::GenerationMix,
        ProcessKind::ConsumptionMix,
    ]
    .into_iter()
    .find(|kind| kind.category() == category)
}

impl ProcessDoc {
    fn new(process: &Process, graph: &ProcessGraph, info: &PackageInfo) -> Result<Self> {
        let mut exchanges = Vec::with_capacity(process.flows.len() + process.inputs.len());
        for flow in &process.flows {
            let mut exchange =
                ExchangeDoc::new(exchanges.len() + 1, &flow.flow, flow.amount, flow.is_input)?;
            exchange.is_quantitative_reference = flow.is_reference;
            exchanges.push(exchange);
        }
        for input in &process.inputs {
            let provider = graph
                .get(&input.provider)
                .with_context(|| format!("Unknown provider {}", input.provider))?;
            let product = provider
                .reference()
                .with_context(|| format!("Provider {} has no reference product", provider.id))?;
            let mut exchange =
                ExchangeDoc::new(exchanges.len() + 1, &product.flow, input.amount, true)?;
            exchange.default_provider = Some(Ref::new(
                "Process",
                provider.id.to_string(),
                provider.name.clone(),
            ));
            exchanges.push(exchange);
        }

        Ok(Self {
            context: CONTEXT.into(),
            kind: "Process".into(),
            id: process.id.to_string(),
            name: process.name.clone(),
            category: process.kind.category().into(),
            process_type: "UNIT_PROCESS".into(),
            location: process.location.as_ref().map(location_ref),
            tags: process.fuel_category.iter().map(ToString::to_string).collect(),
            process_documentation: Some(info.documentation(process.kind)),
            exchanges,
        })
    }

    fn into_process(self, flows: &HashMap<FlowID, Rc<Flow>>) -> Result<Process> {
        let kind = kind_from_category(&self.category)
            .with_context(|| format!("Unknown process category {}", self.category))?;

        let mut process = Process {
            id: self.id.into(),
            name: self.name,
            kind,
            location: self.location.map(|location| location.name.into()),
            fuel_category: self.tags.first().map(|tag| FuelCategory::from(tag.as_str())),
            flows: Vec::new(),
            inputs: Vec::new(),
        };
        for exchange in self.exchanges {
            if let Some(provider) = exchange.default_provider {
                process.inputs.push(ProviderInput {
                    provider: provider.id.into(),
                    amount: exchange.amount,
                });
                continue;
            }

            let flow = flows
                .get(exchange.flow.id.as_str())
                .with_context(|| format!("Unknown flow {}", exchange.flow.id))?;
            process.flows.push(ProcessFlow {
                flow: Rc::clone(flow),
                amount: exchange.amount,
                is_input: exchange.is_input,
                is_reference: exchange.is_quantitative_reference,
            });
        }

        Ok(process)
    }
}

impl FlowDoc {
    fn new(flow: &Flow) -> Result<Self> {
        let unit = flow_unit(flow)?;
        Ok(Self {
            context: CONTEXT.into(),
            kind: "Flow".into(),
            id: flow.id.to_string(),
            name: flow.name.clone(),
            category: flow.context.clone(),
            flow_type: flow.kind,
            flow_properties: vec![FlowPropertyFactorDoc {
                kind: "FlowPropertyFactor".into(),
                is_ref_flow_property: true,
                conversion_factor: 1.0,
                flow_property: flow_property_ref(unit.quantity),
            }],
        })
    }

    /// Convert back into a flow measured in `unit`
    fn into_flow(self, unit: &str) -> Flow {
        Flow {
            id: self.id.into(),
            name: self.name,
            context: self.category,
            unit: unit.into(),
            kind: self.flow_type,
        }
    }
}

impl FlowPropertyDoc {
    fn new(quantity: Quantity) -> Self {
        let Ref { id, name, .. } = flow_property_ref(quantity);
        Self {
            context: CONTEXT.into(),
            kind: "FlowProperty".into(),
            id,
            name,
            flow_property_type: "PHYSICAL_QUANTITY".into(),
            unit_group: unit_group_ref(quantity),
        }
    }
}

impl UnitGroupDoc {
    fn new(quantity: Quantity) -> Self {
        let reference = quantity.reference_unit();
        let units = quantity
            .units()
            .map(|unit| UnitDoc {
                kind: "Unit".into(),
                id: unit_ref(unit).id,
                name: unit.name.into(),
                conversion_factor: unit.conversion_factor,
                is_ref_unit: unit == reference,
            })
            .collect();

        let Ref { id, name, .. } = unit_group_ref(quantity);
        Self {
            context: CONTEXT.into(),
            kind: "UnitGroup".into(),
            id,
            name,
            default_flow_property: flow_property_ref(quantity),
            units,
        }
    }
}

impl SourceDoc {
    fn new(spec: &SourceSpec) -> Self {
        let Ref { id, name, .. } = source_ref(spec);
        Self {
            context: CONTEXT.into(),
            kind: "Source".into(),
            id,
            name,
            description: format!("Release {} of the {} dataset", spec.release, spec.id),
            text_reference: format!("{}, release {}", spec.id, spec.release),
            url: spec.url().map(String::from),
            year: spec.release_year(),
        }
    }
}

impl LocationDoc {
    fn new(location: &Ref) -> Self {
        Self {
            context: CONTEXT.into(),
            kind: "Location".into(),
            id: location.id.clone(),
            name: location.name.clone(),
        }
    }
}

/// Serialised documents keyed by their path within the package
#[derive(Default)]
struct PackageEntries(BTreeMap<String, Vec<u8>>);

impl PackageEntries {
    /// Add a document, unless one with the same ID is already in the folder
    fn insert<T: Serialize>(&mut self, folder: &str, id: &str, doc: &T) -> Result<()> {
        if let Entry::Vacant(entry) = self.0.entry(format!("{folder}/{id}.json")) {
            entry.insert(serde_json::to_vec_pretty(doc)?);
        }

        Ok(())
    }
}

/// Serialise every entity the graph refers to
fn package_entries(graph: &ProcessGraph, info: &PackageInfo) -> Result<PackageEntries> {
    let mut entries = PackageEntries::default();
    let mut quantities = BTreeSet::new();
    for process in graph.values() {
        let doc = ProcessDoc::new(process, graph, info)
            .with_context(|| format!("Could not export process {}", process.id))?;
        entries.insert(PROCESSES_FOLDER, &doc.id, &doc)?;

        for flow in process.flows.iter().map(|f| &f.flow) {
            quantities.insert(flow_unit(flow)?.quantity);
            entries.insert(FLOWS_FOLDER, flow.id.as_ref(), &FlowDoc::new(flow)?)?;
        }
        if let Some(location) = &doc.location {
            entries.insert(LOCATIONS_FOLDER, &location.id, &LocationDoc::new(location))?;
        }
        for spec in info.sources(process.kind) {
            let doc = SourceDoc::new(spec);
            entries.insert(SOURCES_FOLDER, &doc.id, &doc)?;
        }
    }

    for quantity in quantities {
        let property = FlowPropertyDoc::new(quantity);
        entries.insert(FLOW_PROPERTIES_FOLDER, &property.id, &property)?;
        let group = UnitGroupDoc::new(quantity);
        entries.insert(UNIT_GROUPS_FOLDER, &group.id, &group)?;
    }

    Ok(entries)
}

/// Write a process graph to a JSON-LD package.
///
/// The package is assembled in a temporary file alongside `file_path` and only moved into place
/// once it is complete, so a failed export never leaves a partial package behind.
pub fn write_package(graph: &ProcessGraph, info: &PackageInfo, file_path: &Path) -> Result<()> {
    let entries = package_entries(graph, info)?;

    let dir = file_path
        .parent()
        .context("Package path has no parent directory")?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        for (name, contents) in entries.0 {
            zip.start_file(name, options)?;
            zip.write_all(&contents)?;
        }
        zip.finish()?;
    }
    tmp.persist(file_path)
        .with_context(|| format!("Could not save package to {}", file_path.display()))?;

    Ok(())
}

/// Read a process graph back from a JSON-LD package.
///
/// Processes are returned in the order in which they appear in the package. Each flow is given
/// the unit its exchanges are measured in.
pub fn read_package(file_path: &Path) -> Result<ProcessGraph> {
    let file = File::open(file_path)
        .with_context(|| format!("Could not open package {}", file_path.display()))?;
    let mut archive = ZipArchive::new(file)?;

    let mut flow_docs = Vec::new();
    let mut process_docs = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;

        match name.split_once('/') {
            Some((FLOWS_FOLDER, _)) => flow_docs.push(
                serde_json::from_str::<FlowDoc>(&contents)
                    .with_context(|| format!("Invalid flow document {name}"))?,
            ),
            Some((PROCESSES_FOLDER, _)) => process_docs.push(
                serde_json::from_str::<ProcessDoc>(&contents)
                    .with_context(|| format!("Invalid process document {name}"))?,
            ),
            Some((
                FLOW_PROPERTIES_FOLDER | UNIT_GROUPS_FOLDER | LOCATIONS_FOLDER | SOURCES_FOLDER,
                _,
            )) => {}
            _ => bail!("Unexpected entry {name} in package"),
        }
    }

    let units: HashMap<&str, &str> = process_docs
        .iter()
        .flat_map(|doc| &doc.exchanges)
        .map(|exchange| (exchange.flow.id.as_str(), exchange.unit.name.as_str()))
        .collect();
    let flows: HashMap<FlowID, Rc<Flow>> = flow_docs
        .into_iter()
        .map(|doc| {
            let unit = *units
                .get(doc.id.as_str())
                .with_context(|| format!("Flow {} is not used by any process", doc.id))?;
            let flow = doc.into_flow(unit);
            Ok((flow.id.clone(), Rc::new(flow)))
        })
        .collect::<Result<_>>()?;

    process_docs
        .into_iter()
        .map(|doc| {
            let process = doc.into_process(&flows)?;
            Ok((process.id.clone(), process))
        })
        .collect()
}
