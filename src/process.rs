//! Processes are the life cycle unit processes which make up the exported inventory. This module
//! also contains the checks which the process graph must pass before it can be exported.
use crate::error::RunError;
use crate::facility::FuelCategory;
use crate::flow::{Flow, FlowID, FlowType};
use crate::id::{define_id_type, deterministic_uuid};
use crate::quantity::find_unit;
use crate::region::RegionID;
use anyhow::Result;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::collections::HashMap;
use std::rc::Rc;

define_id_type! {ProcessID}

/// The process graph, keyed by process ID.
///
/// Processes are stored in the order in which they were built, which places providers before
/// the processes that consume from them.
pub type ProcessGraph = IndexMap<ProcessID, Process>;

/// The role a process plays in the supply chain
#[derive(
    PartialEq, Eq, Debug, Clone, Copy, Hash, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
pub enum ProcessKind {
    /// Fuel extraction, processing and transport, per unit of fuel
    #[string = "upstream"]
    Upstream,
    /// Generation from one fuel category in one region
    #[string = "generation"]
    Generation,
    /// The mix of generation within a region
    #[string = "generation_mix"]
    GenerationMix,
    /// Electricity as consumed in a region, after trade and losses
    #[string = "consumption_mix"]
    ConsumptionMix,
}

impl ProcessKind {
    /// The category under which processes of this kind are filed
    pub fn category(self) -> &'static str {
        match self {
            Self::Upstream => "Electricity/Upstream fuel supply",
            Self::Generation => "Electricity/Generation",
            Self::GenerationMix => "Electricity/Generation mix",
            Self::ConsumptionMix => "Electricity/Consumption mix",
        }
    }
}

/// A quantity of a single flow entering or leaving a process
#[derive(PartialEq, Debug, Clone)]
pub struct ProcessFlow {
    /// The flow
    pub flow: Rc<Flow>,
    /// Quantity in the flow's reference unit
    pub amount: f64,
    /// Whether the flow enters the process
    pub is_input: bool,
    /// Whether this is the process's reference product
    pub is_reference: bool,
}

/// A product consumed from another process in the graph.
///
/// Upstream and mix processes are referenced rather than inlined, so that a process shared by
/// several consumers is only counted once.
#[derive(PartialEq, Debug, Clone)]
pub struct ProviderInput {
    /// The providing process
    pub provider: ProcessID,
    /// Quantity of the provider's reference product consumed
    pub amount: f64,
}

/// A life cycle unit process
#[derive(PartialEq, Debug, Clone)]
pub struct Process {
    /// A unique identifier (a UUID derived from the kind, location and name)
    pub id: ProcessID,
    /// Human-readable name (e.g. "Electricity from COAL - AZPS")
    pub name: String,
    /// What the process represents
    pub kind: ProcessKind,
    /// The region where the process takes place, if any
    pub location: Option<RegionID>,
    /// The fuel category, for upstream and generation processes
    pub fuel_category: Option<FuelCategory>,
    /// Flows in the order in which they were added; the reference product comes first
    pub flows: Vec<ProcessFlow>,
    /// Products consumed from other processes
    pub inputs: Vec<ProviderInput>,
}

impl Process {
    /// Create a new process with the given reference product and amount
    pub fn new(
        kind: ProcessKind,
        name: String,
        location: Option<RegionID>,
        fuel_category: Option<FuelCategory>,
        reference: Rc<Flow>,
        reference_amount: f64,
    ) -> Self {
        let location_name = location.as_ref().map_or("", |l| l.as_ref());
        let id = deterministic_uuid(&["process", kind.category(), location_name, name.as_str()]).into();
        Self {
            id,
            name,
            kind,
            location,
            fuel_category,
            flows: vec![ProcessFlow {
                flow: reference,
                amount: reference_amount,
                is_input: false,
                is_reference: true,
            }],
            inputs: Vec::new(),
        }
    }

    /// The reference product flow, if there is exactly one
    pub fn reference(&self) -> Option<&ProcessFlow> {
        let mut iter = self.flows.iter().filter(|f| f.is_reference);
        let reference = iter.next()?;
        iter.next().is_none().then_some(reference)
    }

    /// Iterate over the flows which are not the reference product
    pub fn iter_non_reference_flows(&self) -> impl Iterator<Item = &ProcessFlow> {
        self.flows.iter().filter(|f| !f.is_reference)
    }
}

/// Create an export schema error for the given process
fn schema_error(process_id: &ProcessID, message: impl Into<String>) -> anyhow::Error {
    RunError::ExportSchema {
        process_id: process_id.to_string(),
        message: message.into(),
    }
    .into()
}

/// Check that a single process is well formed
fn validate_process(process: &Process, graph: &ProcessGraph) -> Result<()> {
    let Some(reference) = process.reference() else {
        return Err(schema_error(
            &process.id,
            "Process must have exactly one quantitative reference",
        ));
    };
    if reference.is_input || reference.flow.kind != FlowType::Product {
        return Err(schema_error(
            &process.id,
            "Quantitative reference must be an output product flow",
        ));
    }
    if !(reference.amount.is_finite() && reference.amount > 0.0) {
        return Err(schema_error(
            &process.id,
            format!("Invalid reference amount {}", reference.amount),
        ));
    }

    if let Some(flow) = process.flows.iter().find(|f| find_unit(&f.flow.unit).is_none()) {
        return Err(schema_error(
            &process.id,
            format!("Flow {} has unknown unit {}", flow.flow.name, flow.flow.unit),
        ));
    }

    if let Some(flow) = process.flows.iter().find(|f| !f.amount.is_finite()) {
        return Err(schema_error(
            &process.id,
            format!("Flow {} has a non-finite amount", flow.flow.name),
        ));
    }

    for input in &process.inputs {
        if !graph.contains_key(&input.provider) {
            return Err(schema_error(
                &process.id,
                format!("Unknown provider {}", input.provider),
            ));
        }
        if !input.amount.is_finite() {
            return Err(schema_error(
                &process.id,
                format!("Input from provider {} has a non-finite amount", input.provider),
            ));
        }
    }

    Ok(())
}

/// Check that each flow ID refers to the same flow everywhere it is used
fn validate_flow_consistency(graph: &ProcessGraph) -> Result<()> {
    let mut seen: HashMap<&FlowID, (&ProcessID, &Flow)> = HashMap::new();
    for process in graph.values() {
        for flow in process.flows.iter().map(|f| f.flow.as_ref()) {
            let (first_process, first) = *seen.entry(&flow.id).or_insert((&process.id, flow));
            if first != flow {
                return Err(schema_error(
                    &process.id,
                    format!(
                        "Flow {} is defined differently here and in process {first_process}",
                        flow.id
                    ),
                ));
            }
        }
    }

    Ok(())
}

/// Check that no process is, directly or indirectly, its own provider
fn validate_acyclic(graph: &ProcessGraph) -> Result<()> {
    let mut digraph = DiGraph::<&ProcessID, ()>::new();
    let nodes: HashMap<&ProcessID, NodeIndex> = graph
        .keys()
        .map(|id| (id, digraph.add_node(id)))
        .collect();
    for process in graph.values() {
        for input in &process.inputs {
            digraph.add_edge(nodes[&input.provider], nodes[&process.id], ());
        }
    }

    toposort(&digraph, None).map_err(|cycle| {
        let process_id = digraph[cycle.node_id()];
        schema_error(process_id, "Process is part of a provider cycle")
    })?;

    Ok(())
}

/// Check that the process graph conforms to the export schema.
///
/// Returns an [`RunError::ExportSchema`] naming the first offending process.
pub fn validate_graph(graph: &ProcessGraph) -> Result<()> {
    for process in graph.values() {
        validate_process(process, graph)?;
    }
    validate_flow_consistency(graph)?;
    validate_acyclic(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, process};
    use rstest::rstest;

    fn add(graph: &mut ProcessGraph, process: Process) {
        graph.insert(process.id.clone(), process);
    }

    #[rstest]
    fn test_validate_graph_ok(process: Process) {
        let mut consumer = Process::new(
            ProcessKind::GenerationMix,
            "mix".into(),
            None,
            None,
            Flow::electricity("mix"),
            1.0,
        );
        consumer.inputs.push(ProviderInput {
            provider: process.id.clone(),
            amount: 1.0,
        });

        let mut graph = ProcessGraph::new();
        add(&mut graph, process);
        add(&mut graph, consumer);
        assert!(validate_graph(&graph).is_ok());
    }

    #[rstest]
    fn test_validate_graph_unknown_provider(mut process: Process) {
        process.inputs.push(ProviderInput {
            provider: "nowhere".into(),
            amount: 1.0,
        });
        let id = process.id.clone();
        let mut graph = ProcessGraph::new();
        add(&mut graph, process);
        assert_error!(
            validate_graph(&graph),
            format!("Process {id} failed export validation: Unknown provider nowhere")
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    fn test_validate_graph_bad_reference_amount(mut process: Process, #[case] amount: f64) {
        process.flows[0].amount = amount;
        let mut graph = ProcessGraph::new();
        add(&mut graph, process);
        assert!(validate_graph(&graph).is_err());
    }

    #[rstest]
    fn test_validate_graph_two_references(mut process: Process) {
        let mut extra = process.flows[0].clone();
        extra.flow = Flow::electricity("other");
        process.flows.push(extra);
        let mut graph = ProcessGraph::new();
        add(&mut graph, process);
        assert!(validate_graph(&graph).is_err());
    }

    #[rstest]
    fn test_validate_graph_unknown_unit(mut process: Process) {
        let mut flow = (*process.flows[1].flow).clone();
        flow.unit = "furlong".into();
        process.flows[1].flow = Rc::new(flow);
        let id = process.id.clone();
        let mut graph = ProcessGraph::new();
        add(&mut graph, process);
        assert_error!(
            validate_graph(&graph),
            format!(
                "Process {id} failed export validation: Flow Sulfur dioxide has unknown unit furlong"
            )
        );
    }

    #[rstest]
    fn test_validate_graph_cycle(process: Process) {
        let mut a = process;
        let mut b = Process::new(
            ProcessKind::GenerationMix,
            "b".into(),
            None,
            None,
            Flow::electricity("b"),
            1.0,
        );
        a.inputs.push(ProviderInput {
            provider: b.id.clone(),
            amount: 1.0,
        });
        b.inputs.push(ProviderInput {
            provider: a.id.clone(),
            amount: 1.0,
        });
        let mut graph = ProcessGraph::new();
        add(&mut graph, a);
        add(&mut graph, b);

        let err = validate_graph(&graph).unwrap_err();
        assert!(err.to_string().contains("provider cycle"));
    }

    #[rstest]
    fn test_validate_graph_inconsistent_flow(process: Process) {
        let mut other = process.clone();
        other.id = "other".into();
        let mut flow = (*other.flows[1].flow).clone();
        flow.unit = "lb".into();
        other.flows[1].flow = Rc::new(flow);

        let mut graph = ProcessGraph::new();
        add(&mut graph, process);
        add(&mut graph, other);
        assert!(validate_graph(&graph).is_err());
    }

    #[test]
    fn test_process_ids_are_deterministic() {
        let make = || {
            Process::new(
                ProcessKind::Generation,
                "Electricity from COAL - R1".into(),
                Some("R1".into()),
                Some("COAL".into()),
                Flow::electricity("from COAL; at plant - R1"),
                100.0,
            )
        };
        assert_eq!(make().id, make().id);
    }
}
