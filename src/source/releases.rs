//! Facility release inventories (e.g. eGRID, NEI, TRI), normalised to canonical flows.
use super::UnmappedFlows;
use super::flow_list::FlowList;
use crate::facility::{FacilityID, ReleaseFlow};
use crate::flow::FlowID;
use crate::input::read_csv;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, PartialEq)]
struct ReleaseRaw {
    facility_id: FacilityID,
    flow_name: String,
    compartment: String,
    amount: f64,
    unit: String,
    year: u32,
}

/// The releases reported by one inventory, summed by facility and canonical flow
pub type InventoryReleases = IndexMap<FacilityID, IndexMap<FlowID, ReleaseFlow>>;

/// Read the releases in one inventory for the target year.
///
/// Releases for facilities not in `is_known_facility` are ignored. Raw flows which the flow list
/// cannot map are dropped and added to `unmapped`.
pub fn read_releases<F>(
    file_path: &Path,
    inventory: &str,
    target_year: u32,
    flow_list: &FlowList,
    is_known_facility: F,
    unmapped: &mut UnmappedFlows,
) -> Result<InventoryReleases>
where
    F: Fn(&FacilityID) -> bool,
{
    read_releases_from_iter(
        read_csv(file_path)?,
        inventory,
        target_year,
        flow_list,
        is_known_facility,
        unmapped,
    )
}

fn read_releases_from_iter<I, F>(
    iter: I,
    inventory: &str,
    target_year: u32,
    flow_list: &FlowList,
    is_known_facility: F,
    unmapped: &mut UnmappedFlows,
) -> Result<InventoryReleases>
where
    I: Iterator<Item = ReleaseRaw>,
    F: Fn(&FacilityID) -> bool,
{
    let mut releases = InventoryReleases::new();
    for raw in iter.filter(|raw| raw.year == target_year) {
        ensure!(
            raw.amount.is_finite(),
            "Release of {} by facility {} must be a finite number",
            raw.flow_name,
            raw.facility_id
        );
        if !is_known_facility(&raw.facility_id) {
            debug!(
                "Ignoring {} release by facility {}, which has no generation data",
                inventory, raw.facility_id
            );
            continue;
        }

        let Some((flow, amount)) =
            flow_list.convert(&raw.flow_name, &raw.compartment, &raw.unit, raw.amount)
        else {
            unmapped.insert((raw.flow_name, raw.compartment, raw.unit));
            continue;
        };

        releases
            .entry(raw.facility_id)
            .or_default()
            .entry(flow.id.clone())
            .and_modify(|release| release.amount += amount)
            .or_insert_with(|| ReleaseFlow {
                flow,
                amount,
                inventory: inventory.to_string(),
            });
    }

    Ok(releases)
}

/// Combine the releases from several inventories.
///
/// Inventories are given in order of preference: where more than one reports the same flow for
/// a facility, the amount from the first is used.
pub fn merge_releases(inventories: Vec<InventoryReleases>) -> IndexMap<FacilityID, Vec<ReleaseFlow>> {
    let mut merged: IndexMap<FacilityID, IndexMap<FlowID, ReleaseFlow>> = IndexMap::new();
    for inventory in inventories {
        for (facility_id, flows) in inventory {
            let facility_flows = merged.entry(facility_id).or_default();
            for (flow_id, release) in flows {
                facility_flows.entry(flow_id).or_insert(release);
            }
        }
    }

    merged
        .into_iter()
        .map(|(facility_id, flows)| (facility_id, flows.into_values().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, flow_list};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn raw(facility_id: &str, flow_name: &str, amount: f64) -> ReleaseRaw {
        ReleaseRaw {
            facility_id: facility_id.into(),
            flow_name: flow_name.into(),
            compartment: "air".into(),
            amount,
            unit: "kg".into(),
            year: 2016,
        }
    }

    fn read(records: Vec<ReleaseRaw>, flow_list: &FlowList, unmapped: &mut UnmappedFlows) -> Result<InventoryReleases> {
        read_releases_from_iter(
            records.into_iter(),
            "egrid",
            2016,
            flow_list,
            |id| id.as_ref() != "F9",
            unmapped,
        )
    }

    #[rstest]
    fn test_read_releases(flow_list: FlowList) {
        let mut unmapped = UnmappedFlows::new();
        let mut old = raw("F1", "SO2", 100.0);
        old.year = 2015;
        let releases = read(
            vec![
                raw("F1", "SO2", 1.0),
                raw("F1", "Sulfur dioxide", 2.0),
                raw("F1", "Mercury", 3.0),
                raw("F9", "SO2", 4.0),
                old,
            ],
            &flow_list,
            &mut unmapped,
        )
        .unwrap();

        assert_eq!(releases.len(), 1);
        let so2 = &releases["F1"]["so2"];
        assert_approx_eq!(f64, so2.amount, 3.0);
        assert_eq!(so2.inventory, "egrid");
        assert_eq!(unmapped.len(), 1);
        assert_eq!(unmapped[0].0, "Mercury");
    }

    #[rstest]
    fn test_read_releases_non_finite(flow_list: FlowList) {
        let mut unmapped = UnmappedFlows::new();
        assert_error!(
            read(vec![raw("F1", "SO2", f64::INFINITY)], &flow_list, &mut unmapped),
            "Release of SO2 by facility F1 must be a finite number"
        );
    }

    #[rstest]
    fn test_merge_releases_first_inventory_wins(flow_list: FlowList) {
        let mut unmapped = UnmappedFlows::new();
        let mut read_one = |name: &str, amount: f64| {
            read_releases_from_iter(
                [raw("F1", "SO2", amount)].into_iter(),
                name,
                2016,
                &flow_list,
                |_| true,
                &mut unmapped,
            )
            .unwrap()
        };
        let egrid = read_one("egrid", 1.0);
        let nei = read_one("nei", 5.0);

        let merged = merge_releases(vec![egrid, nei]);
        assert_eq!(merged["F1"].len(), 1);
        assert_eq!(merged["F1"][0].inventory, "egrid");
        assert_eq!(merged["F1"][0].amount, 1.0);
    }
}
