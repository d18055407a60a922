//! Fixtures for tests

use crate::allocation::AllocationBasis;
use crate::facility::{FacilityRecord, ReleaseFlow};
use crate::flow::{Flow, FlowType};
use crate::model::ModelConfig;
use crate::process::{Process, ProcessFlow, ProcessKind};
use crate::region::{Region, RegionLevel, RegionMap};
use crate::source::SourceSpec;
use crate::source::flow_list::FlowList;
use crate::units::{Dimensionless, Energy, HeatInput};
use indexmap::indexmap;
use rstest::fixture;
use std::rc::Rc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn so2_flow() -> Rc<Flow> {
    Rc::new(Flow {
        id: "so2".into(),
        name: "Sulfur dioxide".into(),
        context: "emission/air".into(),
        unit: "kg".into(),
        kind: FlowType::Elementary,
    })
}

#[fixture]
pub fn facility(so2_flow: Rc<Flow>) -> FacilityRecord {
    FacilityRecord {
        id: "F1".into(),
        name: "Plant 1".into(),
        state: "AZ".into(),
        fuel_category: "COAL".into(),
        net_generation: Energy(100.0),
        heat_input: Some(HeatInput(1000.0)),
        primary_fuel_share: Some(Dimensionless(1.0)),
        year: 2016,
        releases: vec![ReleaseFlow {
            flow: so2_flow,
            amount: 2.0,
            inventory: "egrid".into(),
        }],
    }
}

#[fixture]
pub fn process(so2_flow: Rc<Flow>) -> Process {
    let mut process = Process::new(
        ProcessKind::Generation,
        "Electricity from COAL - R1".into(),
        Some("R1".into()),
        Some("COAL".into()),
        Flow::electricity("from COAL; at plant - R1"),
        100.0,
    );
    process.flows.push(ProcessFlow {
        flow: so2_flow,
        amount: 2.0,
        is_input: false,
        is_reference: false,
    });

    process
}

fn region(id: &str, level: RegionLevel, parent: Option<&str>) -> Region {
    Region {
        id: id.into(),
        description: format!("Region {id}"),
        level,
        parent: parent.map(Into::into),
    }
}

#[fixture]
pub fn regions() -> RegionMap {
    indexmap! {
        "FERC1".into() => region("FERC1", RegionLevel::FercRegion, None),
        "R1".into() => region("R1", RegionLevel::BalancingAuthority, Some("FERC1")),
        "R2".into() => region("R2", RegionLevel::BalancingAuthority, Some("FERC1")),
        "R3".into() => region("R3", RegionLevel::BalancingAuthority, None),
        "NORTH".into() => region("NORTH", RegionLevel::Custom, None),
    }
}

fn source_spec(id: &str, location: &str) -> SourceSpec {
    SourceSpec {
        id: id.into(),
        release: "2016".into(),
        location: location.into(),
    }
}

#[fixture]
pub fn model_config() -> ModelConfig {
    ModelConfig {
        name: "test".into(),
        target_year: 2016,
        region_agg: RegionLevel::BalancingAuthority,
        allocation_basis: AllocationBasis::Energy,
        include_upstream: false,
        region_priority: Vec::new(),
        default_loss_factor: 0.0,
        include_only_positive_generation: true,
        min_primary_fuel_share: 0.0,
        efficiency_filter: None,
        electricity_exclusive_flows: Vec::new(),
        generation: source_spec("eia923", "generation.csv"),
        flow_list: source_spec("fedelemflowlist", "flow_list.csv"),
        inventories: vec![source_spec("egrid", "releases.csv")],
        upstream: None,
    }
}

/// A flow list mapping "SO2" (in lb or kg) and "Sulfur dioxide" (in kg) to the SO2 flow
#[fixture]
pub fn flow_list(so2_flow: Rc<Flow>) -> FlowList {
    let mut list = FlowList::default();
    for (name, unit, factor) in [
        ("SO2", "kg", 1.0),
        ("SO2", "lb", 0.453_592),
        ("Sulfur dioxide", "kg", 1.0),
    ] {
        list.add_mapping(name, "air", unit, (*so2_flow).clone(), factor)
            .unwrap();
    }

    list
}
