//! Upstream fuel supply inventories: the flows from extracting, processing and transporting each
//! fuel, per unit of fuel heat input at the power plant.
use super::UnmappedFlows;
use super::flow_list::FlowList;
use crate::facility::FuelCategory;
use crate::flow::{Flow, FlowID};
use crate::input::read_csv;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::rc::Rc;
use unicase::UniCase;

/// The unit of fuel input to which upstream flows are normalised
pub const FUEL_UNIT: &str = "MMBtu";

#[derive(Debug, Deserialize, PartialEq)]
struct UpstreamRaw {
    upstream_id: String,
    upstream_name: String,
    fuel_category: String,
    fuel_unit: String,
    flow_name: String,
    compartment: String,
    amount: f64,
    unit: String,
}

/// The upstream inventory for one fuel category
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamInventory {
    /// Identifier used by the upstream data provider
    pub id: String,
    /// Human-readable name (e.g. "Coal mining and transport")
    pub name: String,
    /// The fuel category supplied
    pub fuel_category: FuelCategory,
    /// Flows per MMBtu of fuel, summed by canonical flow
    pub flows: IndexMap<FlowID, (Rc<Flow>, f64)>,
}

/// Upstream inventories keyed by fuel category, sorted by fuel
pub type UpstreamMap = IndexMap<FuelCategory, UpstreamInventory>;

/// Read upstream inventories from a CSV file.
///
/// Raw flows which the flow list cannot map are dropped and added to `unmapped`.
pub fn read_upstream(file_path: &Path, flow_list: &FlowList, unmapped: &mut UnmappedFlows) -> Result<UpstreamMap> {
    read_upstream_from_iter(read_csv(file_path)?, flow_list, unmapped)
}

fn read_upstream_from_iter<I>(iter: I, flow_list: &FlowList, unmapped: &mut UnmappedFlows) -> Result<UpstreamMap>
where
    I: Iterator<Item = UpstreamRaw>,
{
    let mut map = UpstreamMap::new();
    for raw in iter {
        ensure!(
            UniCase::new(raw.fuel_unit.as_str()) == UniCase::new(FUEL_UNIT),
            "Upstream inventory {} must be given per {FUEL_UNIT} of fuel, not per {}",
            raw.upstream_id,
            raw.fuel_unit
        );
        ensure!(
            raw.amount.is_finite(),
            "Amount of {} for upstream inventory {} must be a finite number",
            raw.flow_name,
            raw.upstream_id
        );

        let fuel_category = FuelCategory::normalise(&raw.fuel_category);
        let upstream = map
            .entry(fuel_category.clone())
            .or_insert_with(|| UpstreamInventory {
                id: raw.upstream_id.clone(),
                name: raw.upstream_name.clone(),
                fuel_category: fuel_category.clone(),
                flows: IndexMap::new(),
            });
        ensure!(
            upstream.id == raw.upstream_id,
            "Fuel category {fuel_category} has more than one upstream inventory ({} and {})",
            upstream.id,
            raw.upstream_id
        );

        let Some((flow, amount)) =
            flow_list.convert(&raw.flow_name, &raw.compartment, &raw.unit, raw.amount)
        else {
            unmapped.insert((raw.flow_name, raw.compartment, raw.unit));
            continue;
        };
        upstream
            .flows
            .entry(flow.id.clone())
            .and_modify(|(_, total)| *total += amount)
            .or_insert((flow, amount));
    }
    map.sort_keys();

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, flow_list};
    use rstest::rstest;

    fn raw(upstream_id: &str, fuel: &str, flow_name: &str, amount: f64) -> UpstreamRaw {
        UpstreamRaw {
            upstream_id: upstream_id.into(),
            upstream_name: format!("{fuel} supply"),
            fuel_category: fuel.into(),
            fuel_unit: "mmbtu".into(),
            flow_name: flow_name.into(),
            compartment: "air".into(),
            amount,
            unit: "kg".into(),
        }
    }

    #[rstest]
    fn test_read_upstream(flow_list: FlowList) {
        let mut unmapped = UnmappedFlows::new();
        let map = read_upstream_from_iter(
            [
                raw("u-gas", "gas", "SO2", 0.5),
                raw("u-coal", "Coal", "SO2", 1.0),
                raw("u-coal", "COAL", "Sulfur dioxide", 2.0),
                raw("u-coal", "COAL", "Methane", 2.0),
            ]
            .into_iter(),
            &flow_list,
            &mut unmapped,
        )
        .unwrap();

        let fuels: Vec<_> = map.keys().map(|f| f.to_string()).collect();
        assert_eq!(fuels, ["COAL", "GAS"]);
        let coal = &map["COAL"];
        assert_eq!(coal.flows.len(), 1);
        assert_eq!(coal.flows["so2"].1, 3.0);
        assert_eq!(unmapped.len(), 1);
    }

    #[rstest]
    fn test_read_upstream_errors(flow_list: FlowList) {
        let mut unmapped = UnmappedFlows::new();
        assert_error!(
            read_upstream_from_iter(
                [raw("u-coal", "COAL", "SO2", 1.0), raw("u-coal2", "COAL", "SO2", 1.0)].into_iter(),
                &flow_list,
                &mut unmapped
            ),
            "Fuel category COAL has more than one upstream inventory (u-coal and u-coal2)"
        );

        let mut per_ton = raw("u-coal", "COAL", "SO2", 1.0);
        per_ton.fuel_unit = "ton".into();
        assert_error!(
            read_upstream_from_iter([per_ton].into_iter(), &flow_list, &mut unmapped),
            "Upstream inventory u-coal must be given per MMBtu of fuel, not per ton"
        );
    }
}
