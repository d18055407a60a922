//! Aggregation of allocated facility flows into unit processes: one upstream process per fuel,
//! one generation process per (region, fuel category) and one generation-mix process per region.
use crate::allocation::AllocatedFacility;
use crate::error::{RunReport, Stage};
use crate::facility::{FacilityID, FuelCategory};
use crate::flow::{Flow, FlowID};
use crate::process::{Process, ProcessFlow, ProcessGraph, ProcessID, ProcessKind, ProviderInput};
use crate::region::RegionID;
use crate::regionalisation::{FacilityAssignment, GenerationMix};
use crate::source::upstream::{FUEL_UNIT, UpstreamInventory, UpstreamMap};
use crate::units::{Energy, HeatInput};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::debug;
use std::rc::Rc;

/// The category of the product flows representing fuel delivered to power plants
const FUEL_CONTEXT: &str = "Fuels";

/// A (region, fuel category) pair identifying a generation process
pub type GenerationKey = (RegionID, FuelCategory);

/// Whether a flow enters a process from the environment rather than leaving it
fn is_input_flow(flow: &Flow) -> bool {
    flow.context.to_lowercase().starts_with("resource")
}

/// Sums amounts of the same flow, keeping flows in the order in which they are first seen
#[derive(Default)]
struct FlowTotals(IndexMap<FlowID, (Rc<Flow>, f64)>);

impl FlowTotals {
    fn add(&mut self, flow: &Rc<Flow>, amount: f64) {
        self.0
            .entry(flow.id.clone())
            .and_modify(|(_, total)| *total += amount)
            .or_insert_with(|| (Rc::clone(flow), amount));
    }

    fn into_process_flows(self) -> impl Iterator<Item = ProcessFlow> {
        self.0.into_values().map(|(flow, amount)| ProcessFlow {
            is_input: is_input_flow(&flow),
            flow,
            amount,
            is_reference: false,
        })
    }
}

/// Build the upstream process supplying one MMBtu of a fuel
pub fn upstream_process(upstream: &UpstreamInventory) -> Process {
    let fuel = &upstream.fuel_category;
    let reference = Flow::product(&format!("{fuel} fuel, at power plant"), FUEL_CONTEXT, FUEL_UNIT);
    let mut process = Process::new(
        ProcessKind::Upstream,
        format!("{} ({fuel})", upstream.name),
        None,
        Some(fuel.clone()),
        reference,
        1.0,
    );

    let mut totals = FlowTotals::default();
    for (flow, amount) in upstream.flows.values() {
        totals.add(flow, *amount);
    }
    process.flows.extend(totals.into_process_flows());

    process
}

/// Build the generation process for one (region, fuel category) group.
///
/// Only facilities whose allocation succeeded contribute to the reference output, so the
/// process's flows and output describe the same plants. Returns `None` if that output is not
/// positive.
fn generation_process(
    (region_id, fuel): &GenerationKey,
    members: &[&AllocatedFacility],
    upstream: Option<&Process>,
) -> Option<Process> {
    let members = members
        .iter()
        .filter(|m| m.factor.is_some())
        .collect_vec();
    let total: Energy = members.iter().map(|m| m.facility.net_generation).sum();
    if total.value() <= 0.0 {
        return None;
    }

    let mut process = Process::new(
        ProcessKind::Generation,
        format!("Electricity from {fuel} - {region_id}"),
        Some(region_id.clone()),
        Some(fuel.clone()),
        Flow::electricity(&format!("from {fuel}; at plant - {region_id}")),
        total.value(),
    );

    let mut totals = FlowTotals::default();
    for release in members.iter().flat_map(|m| &m.flows) {
        totals.add(&release.flow, release.amount);
    }
    process.flows.extend(totals.into_process_flows());

    if let Some(upstream) = upstream {
        let fuel_input: HeatInput = members
            .iter()
            .filter_map(|m| m.allocated_heat_input())
            .sum();
        if fuel_input.value() > 0.0 {
            process.inputs.push(ProviderInput {
                provider: upstream.id.clone(),
                amount: fuel_input.value(),
            });
        }
    }

    Some(process)
}

/// Build the generation-mix process for a region.
///
/// The process produces 1 MWh from each fuel's generation process in proportion to the mix.
/// Fuels without a generation process are left out and the remaining shares scaled up to 1.
pub fn generation_mix_process(
    mix: &GenerationMix,
    generation: &IndexMap<GenerationKey, ProcessID>,
    report: &mut RunReport,
) -> Option<Process> {
    let region_id = &mix.region;
    let mut process = Process::new(
        ProcessKind::GenerationMix,
        format!("Electricity generation mix - {region_id}"),
        Some(region_id.clone()),
        None,
        Flow::electricity(&format!("at grid; generation mix - {region_id}")),
        1.0,
    );

    let mut covered = 0.0;
    for (fuel, fraction) in &mix.fractions {
        let key = (region_id.clone(), fuel.clone());
        match generation.get(&key) {
            Some(provider) => {
                covered += fraction;
                process.inputs.push(ProviderInput {
                    provider: provider.clone(),
                    amount: *fraction,
                });
            }
            None if *fraction > 0.0 => report.coverage(
                Stage::Allocation,
                format!("{region_id}/{fuel}"),
                "No generation process, so this fuel is left out of the generation-mix process",
            ),
            None => {}
        }
    }

    if covered <= 0.0 {
        report.coverage(
            Stage::Allocation,
            region_id,
            "No fuel in the mix has a generation process, so no generation-mix process was built",
        );
        return None;
    }
    for input in &mut process.inputs {
        input.amount /= covered;
    }

    Some(process)
}

/// The processes built from the facility data
#[derive(Debug, Default, PartialEq)]
pub struct Aggregation {
    /// Upstream, generation and generation-mix processes, with providers before consumers
    pub graph: ProcessGraph,
    /// The generation process for each (region, fuel category) group
    pub generation: IndexMap<GenerationKey, ProcessID>,
    /// The generation-mix process for each region with a non-empty mix
    pub generation_mixes: IndexMap<RegionID, ProcessID>,
}

impl Aggregation {
    fn add(&mut self, process: Process) -> ProcessID {
        let id = process.id.clone();
        debug!("Adding process {} ({id})", process.name);
        self.graph.insert(id.clone(), process);
        id
    }
}

/// Aggregate allocated facilities into processes.
///
/// Facilities are grouped by assigned region and fuel category and summed in facility ID order.
/// Groups with no positive generation get no process and a warning. Upstream processes are only
/// built if `upstream` is given, and each appears once however many processes use it.
pub fn aggregate(
    assignment: &FacilityAssignment,
    allocated: &IndexMap<FacilityID, AllocatedFacility>,
    mixes: &IndexMap<RegionID, GenerationMix>,
    upstream: Option<&UpstreamMap>,
    report: &mut RunReport,
) -> Aggregation {
    let mut aggregation = Aggregation::default();

    let groups = assignment
        .iter()
        .filter_map(|(facility_id, region_id)| {
            let member = allocated.get(facility_id)?;
            Some(((region_id.clone(), member.facility.fuel_category.clone()), member))
        })
        .into_group_map_by(|(key, _)| key.clone());
    let groups = groups.into_iter().sorted_by(|(a, _), (b, _)| a.cmp(b));

    let mut upstream_processes: IndexMap<&FuelCategory, ProcessID> = IndexMap::new();
    let mut missing_upstream = IndexSet::new();
    if let Some(upstream) = upstream {
        for (fuel, inventory) in upstream {
            let id = aggregation.add(upstream_process(inventory));
            upstream_processes.insert(fuel, id);
        }
    }

    for (key, members) in groups {
        let members = members.into_iter().map(|(_, m)| m).collect_vec();
        let (region_id, fuel) = &key;

        let upstream_provider = match upstream {
            Some(_) => {
                let found = upstream_processes
                    .get(fuel)
                    .map(|id| &aggregation.graph[id]);
                // Only fuels which are burnt need upstream data
                let burns_fuel = members
                    .iter()
                    .any(|m| m.facility.heat_input.is_some_and(|h| h.value() > 0.0));
                if found.is_none() && burns_fuel && missing_upstream.insert(fuel.clone()) {
                    report.coverage(
                        Stage::Allocation,
                        fuel,
                        "No upstream data for this fuel category",
                    );
                }
                found
            }
            None => None,
        };

        match generation_process(&key, &members, upstream_provider) {
            Some(process) => {
                let id = aggregation.add(process);
                aggregation.generation.insert(key, id);
            }
            None => report.coverage(
                Stage::Allocation,
                format!("{region_id}/{fuel}"),
                "Total generation is not positive, so no generation process was built",
            ),
        }
    }

    for (region_id, mix) in mixes {
        if mix.is_empty() {
            continue;
        }
        if let Some(process) = generation_mix_process(mix, &aggregation.generation, report) {
            let id = aggregation.add(process);
            aggregation.generation_mixes.insert(region_id.clone(), id);
        }
    }

    aggregation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::{FacilityRecord, ReleaseFlow};
    use crate::fixture::{facility, so2_flow};
    use crate::units::Dimensionless;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    fn member(
        template: &FacilityRecord,
        id: &str,
        fuel: &str,
        generation: f64,
        factor: Option<f64>,
        flows: Vec<ReleaseFlow>,
    ) -> AllocatedFacility {
        AllocatedFacility {
            facility: Rc::new(FacilityRecord {
                id: id.into(),
                fuel_category: fuel.into(),
                net_generation: Energy(generation),
                name: template.name.clone(),
                state: template.state.clone(),
                releases: Vec::new(),
                ..*template
            }),
            factor: factor.map(Dimensionless),
            flows,
        }
    }

    #[fixture]
    fn allocated(facility: FacilityRecord, so2_flow: Rc<Flow>) -> IndexMap<FacilityID, AllocatedFacility> {
        let so2 = |amount| {
            vec![ReleaseFlow {
                flow: Rc::clone(&so2_flow),
                amount,
                inventory: "egrid".into(),
            }]
        };
        [
            member(&facility, "F1", "COAL", 60.0, Some(1.0), so2(1.0)),
            member(&facility, "F2", "COAL", 40.0, Some(0.5), so2(2.0)),
            member(&facility, "F3", "GAS", 300.0, Some(1.0), Vec::new()),
            // Allocation failed: counts towards the mix only
            member(&facility, "F4", "COAL", 20.0, None, Vec::new()),
            member(&facility, "F5", "OIL", 0.0, Some(1.0), so2(1.0)),
        ]
        .into_iter()
        .map(|m| (m.facility.id.clone(), m))
        .collect()
    }

    fn key(region_id: &str, fuel: &str) -> GenerationKey {
        (region_id.into(), fuel.into())
    }

    fn assignment(allocated: &IndexMap<FacilityID, AllocatedFacility>) -> FacilityAssignment {
        allocated
            .keys()
            .map(|id| (id.clone(), "R1".into()))
            .collect()
    }

    fn mixes() -> IndexMap<RegionID, GenerationMix> {
        let mix = GenerationMix {
            region: "R1".into(),
            total: Energy(420.0),
            fractions: [("COAL".into(), 120.0 / 420.0), ("GAS".into(), 300.0 / 420.0)]
                .into_iter()
                .collect(),
        };
        [("R1".into(), mix)].into_iter().collect()
    }

    fn upstream_map(so2_flow: &Rc<Flow>) -> UpstreamMap {
        let coal = UpstreamInventory {
            id: "u-coal".into(),
            name: "Coal mining".into(),
            fuel_category: "COAL".into(),
            flows: [(so2_flow.id.clone(), (Rc::clone(so2_flow), 0.01))]
                .into_iter()
                .collect(),
        };
        [("COAL".into(), coal)].into_iter().collect()
    }

    #[rstest]
    fn test_aggregate(allocated: IndexMap<FacilityID, AllocatedFacility>) {
        let mut report = RunReport::default();
        let aggregation = aggregate(&assignment(&allocated), &allocated, &mixes(), None, &mut report);

        // COAL and GAS; OIL has no generation
        assert_eq!(aggregation.generation.len(), 2);
        assert!(report.mentions("R1/OIL"));

        let coal_id = &aggregation.generation[&key("R1", "COAL")];
        let coal = &aggregation.graph[coal_id];
        assert_eq!(coal.reference().unwrap().amount, 100.0);
        let flows = coal.iter_non_reference_flows().collect_vec();
        assert_eq!(flows.len(), 1);
        assert_approx_eq!(f64, flows[0].amount, 3.0);
        assert!(!flows[0].is_input);
        assert!(coal.inputs.is_empty());

        let gas_id = &aggregation.generation[&key("R1", "GAS")];
        assert_eq!(aggregation.graph[gas_id].flows.len(), 1);

        let mix = &aggregation.graph[&aggregation.generation_mixes["R1"]];
        assert_eq!(mix.reference().unwrap().amount, 1.0);
        let total: f64 = mix.inputs.iter().map(|i| i.amount).sum();
        assert_approx_eq!(f64, total, 1.0, epsilon = 1e-6);
        assert_eq!(mix.inputs[0].provider, *coal_id);
    }

    #[rstest]
    fn test_aggregate_with_upstream(
        allocated: IndexMap<FacilityID, AllocatedFacility>,
        so2_flow: Rc<Flow>,
    ) {
        let upstream = upstream_map(&so2_flow);
        let mut report = RunReport::default();
        let aggregation = aggregate(
            &assignment(&allocated),
            &allocated,
            &mixes(),
            Some(&upstream),
            &mut report,
        );

        // One shared upstream process, listed before its consumers
        let upstream_processes = aggregation
            .graph
            .values()
            .filter(|p| p.kind == ProcessKind::Upstream)
            .collect_vec();
        assert_eq!(upstream_processes.len(), 1);
        assert_eq!(
            aggregation.graph.first().unwrap().1.kind,
            ProcessKind::Upstream
        );

        // Heat input of 1000 MMBtu per facility, scaled by allocation; F4 failed allocation
        let coal = &aggregation.graph[&aggregation.generation[&key("R1", "COAL")]];
        assert_eq!(coal.inputs.len(), 1);
        assert_eq!(coal.inputs[0].provider, upstream_processes[0].id);
        assert_approx_eq!(f64, coal.inputs[0].amount, 1500.0);

        // Gas has no upstream data
        assert!(report.mentions("GAS"));
        let gas = &aggregation.graph[&aggregation.generation[&key("R1", "GAS")]];
        assert!(gas.inputs.is_empty());
    }

    #[rstest]
    fn test_generation_process_excludes_failed_allocation(
        facility: FacilityRecord,
        so2_flow: Rc<Flow>,
    ) {
        let allocated = member(
            &facility,
            "F1",
            "COAL",
            100.0,
            Some(1.0),
            vec![ReleaseFlow {
                flow: Rc::clone(&so2_flow),
                amount: 10.0,
                inventory: "egrid".into(),
            }],
        );
        let failed = member(&facility, "F2", "COAL", 100.0, None, Vec::new());

        let process =
            generation_process(&key("R1", "COAL"), &[&allocated, &failed], None).unwrap();
        let output = process.reference().unwrap().amount;
        assert_eq!(output, 100.0);
        let so2 = process.iter_non_reference_flows().next().unwrap().amount;
        assert_approx_eq!(f64, so2 / output, 0.1);

        // A group in which every allocation failed gets no process
        assert!(generation_process(&key("R1", "COAL"), &[&failed], None).is_none());
    }

    #[test]
    fn test_generation_mix_process_skips_fuel_without_process() {
        let mut report = RunReport::default();
        let generation: IndexMap<GenerationKey, ProcessID> = [(key("R1", "GAS"), "gas".into())]
            .into_iter()
            .collect();
        let mix = &mixes()["R1"];
        let process = generation_mix_process(mix, &generation, &mut report).unwrap();
        assert_eq!(process.inputs.len(), 1);
        assert_approx_eq!(f64, process.inputs[0].amount, 1.0);
        assert!(report.mentions("R1/COAL"));

        // Nothing to draw on at all
        let mut report = RunReport::default();
        assert!(generation_mix_process(mix, &IndexMap::new(), &mut report).is_none());
        assert!(report.mentions("R1"));
    }

    #[test]
    fn test_is_input_flow() {
        let mut flow = (*Flow::product("x", "resource/ground", "kg")).clone();
        assert!(is_input_flow(&flow));
        flow.context = "emission/air".into();
        assert!(!is_input_flow(&flow));
    }
}
