//! Code for reading region definitions and facility-to-region candidates from CSV files.
use super::*;
use crate::facility::FacilityID;
use crate::region::{CandidateRegionMap, Region, RegionID, RegionLevel, RegionMap};
use serde::Deserialize;

const REGIONS_FILE_NAME: &str = "regions.csv";
const FACILITY_REGIONS_FILE_NAME: &str = "facility_regions.csv";

#[derive(Debug, Deserialize, PartialEq)]
struct FacilityRegionRaw {
    facility_id: FacilityID,
    region_id: String,
}

/// Reads regions from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A [`RegionMap`] with the parsed regions data or a configuration error
pub fn read_regions(model_dir: &Path) -> Result<RegionMap> {
    let file_path = model_dir.join(REGIONS_FILE_NAME);
    read_csv(&file_path)
        .and_then(read_regions_from_iter)
        .map_err(|err| configuration_error(&file_path, &err))
}

fn read_regions_from_iter<I>(iter: I) -> Result<RegionMap>
where
    I: Iterator<Item = Region>,
{
    let mut regions = RegionMap::new();
    for region in iter {
        ensure!(
            region.level != RegionLevel::Us,
            "Region {} cannot have level us; the US region is created automatically",
            region.id
        );
        ensure!(
            region.parent.is_none() || region.level == RegionLevel::BalancingAuthority,
            "Region {} has a parent but only balancing authorities can have one",
            region.id
        );

        let id = region.id.clone();
        ensure!(
            regions.insert(id.clone(), region).is_none(),
            "Duplicate region ID {id}"
        );
    }

    // Parents must be FERC regions
    for region in regions.values() {
        if let Some(parent) = &region.parent {
            let parent_level = regions
                .get(parent)
                .with_context(|| format!("Unknown parent region {parent} for {}", region.id))?
                .level;
            ensure!(
                parent_level == RegionLevel::FercRegion,
                "Parent region {parent} of {} must be a FERC region",
                region.id
            );
        }
    }

    Ok(regions)
}

/// Reads candidate base regions for each facility from a CSV file.
///
/// A facility may be listed more than once if it lies on the boundary of several regions.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All known regions
pub fn read_facility_regions(model_dir: &Path, regions: &RegionMap) -> Result<CandidateRegionMap> {
    let file_path = model_dir.join(FACILITY_REGIONS_FILE_NAME);
    read_csv(&file_path)
        .and_then(|iter| read_facility_regions_from_iter(iter, regions))
        .map_err(|err| configuration_error(&file_path, &err))
}

fn read_facility_regions_from_iter<I>(iter: I, regions: &RegionMap) -> Result<CandidateRegionMap>
where
    I: Iterator<Item = FacilityRegionRaw>,
{
    let mut map = CandidateRegionMap::new();
    for record in iter {
        let (region_id, region) = regions
            .get_key_value(record.region_id.as_str())
            .with_context(|| format!("Unknown region {}", record.region_id))?;
        ensure!(
            matches!(
                region.level,
                RegionLevel::BalancingAuthority | RegionLevel::Custom
            ),
            "Facility {} is assigned to {region_id}, which is neither a balancing authority nor a \
            custom region",
            record.facility_id
        );

        let candidates: &mut Vec<RegionID> = map.entry(record.facility_id.clone()).or_default();
        ensure!(
            !candidates.contains(region_id),
            "Facility {} is assigned to region {region_id} more than once",
            record.facility_id
        );
        candidates.push(region_id.clone());
    }

    Ok(map)
}
