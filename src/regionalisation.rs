//! Assignment of facilities to regions at the configured level of aggregation, and calculation of
//! the generation mix of each region.
use crate::error::{RunReport, Stage};
use crate::facility::{FacilityID, FacilityMap, FuelCategory};
use crate::model::Model;
use crate::region::{CandidateRegionMap, Region, RegionID, RegionLevel, RegionMap};
use crate::units::Energy;
use indexmap::IndexMap;
use log::info;

/// The region to which each facility is assigned
pub type FacilityAssignment = IndexMap<FacilityID, RegionID>;

/// The share of a region's net generation coming from each fuel category
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationMix {
    /// The region
    pub region: RegionID,
    /// Total net generation in the region
    pub total: Energy,
    /// Fraction of total generation by fuel category, sorted by fuel. Empty if the total is not
    /// positive.
    pub fractions: IndexMap<FuelCategory, f64>,
}

impl GenerationMix {
    /// Whether the mix has no fuel fractions
    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }
}

/// The outcome of regionalisation
#[derive(Debug, Clone, PartialEq)]
pub struct Regionalisation {
    /// Regions at the aggregation level, sorted by ID
    pub regions: RegionMap,
    /// The region each mappable facility is assigned to
    pub assignment: FacilityAssignment,
    /// Generation mix for each region, sorted by region ID
    pub mixes: IndexMap<RegionID, GenerationMix>,
}

/// The regions facilities can be aggregated into at the given level
fn regions_at_level(regions: &RegionMap, level: RegionLevel) -> RegionMap {
    let mut out: RegionMap = if level == RegionLevel::Us {
        let us = Region::us();
        [(us.id.clone(), us)].into_iter().collect()
    } else {
        regions
            .values()
            .filter(|region| region.level == level)
            .map(|region| (region.id.clone(), region.clone()))
            .collect()
    };
    out.sort_keys();

    out
}

/// The level of the base regions which facilities are mapped to before lifting
fn base_level(level: RegionLevel) -> RegionLevel {
    match level {
        RegionLevel::Custom => RegionLevel::Custom,
        _ => RegionLevel::BalancingAuthority,
    }
}

/// Choose one of a facility's candidate base regions.
///
/// The first candidate appearing in `priority` wins. Failing that, the alphabetically first
/// candidate is chosen.
pub fn choose_base_region<'a>(
    facility_id: &FacilityID,
    candidates: &[&'a RegionID],
    priority: &[RegionID],
) -> Option<&'a RegionID> {
    match candidates {
        [] => None,
        [only] => Some(*only),
        _ => {
            if let Some(chosen) = priority
                .iter()
                .find_map(|id| candidates.iter().find(|c| **c == id))
            {
                return Some(*chosen);
            }

            let chosen = candidates.iter().min()?;
            info!(
                "Facility {facility_id} lies in several regions ({}); no priority is configured for \
                them, so {chosen} was chosen",
                candidates.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
            );
            Some(*chosen)
        }
    }
}

/// Find the region a facility belongs to at the given aggregation level
fn assign_region(
    facility_id: &FacilityID,
    candidates: &CandidateRegionMap,
    regions: &RegionMap,
    level: RegionLevel,
    priority: &[RegionID],
) -> Result<RegionID, String> {
    if level == RegionLevel::Us {
        return Ok(Region::us().id);
    }

    let base_level = base_level(level);
    let base_candidates: Vec<&RegionID> = candidates
        .get(facility_id)
        .into_iter()
        .flatten()
        .filter(|id| regions.get(*id).is_some_and(|r| r.level == base_level))
        .collect();
    let base = choose_base_region(facility_id, &base_candidates, priority)
        .ok_or_else(|| format!("No {base_level} region found for facility"))?;

    if level != RegionLevel::FercRegion {
        return Ok(base.clone());
    }

    regions[base]
        .parent
        .clone()
        .ok_or_else(|| format!("Balancing authority {base} has no FERC region"))
}

/// Assign each facility to exactly one region.
///
/// Facilities which cannot be mapped are left out of the assignment with a warning.
pub fn assign_facilities(
    model: &Model,
    facilities: &FacilityMap,
    report: &mut RunReport,
) -> FacilityAssignment {
    let level = model.config.region_agg;
    let mut assignment = FacilityAssignment::new();
    for facility_id in facilities.keys() {
        match assign_region(
            facility_id,
            &model.facility_regions,
            &model.regions,
            level,
            &model.config.region_priority,
        ) {
            Ok(region_id) => {
                assignment.insert(facility_id.clone(), region_id);
            }
            Err(message) => report.coverage(
                Stage::Regionalisation,
                facility_id,
                format!("{message}; facility excluded"),
            ),
        }
    }

    assignment
}

/// Calculate the generation mix of every region.
///
/// Regions with no positive generation get an empty mix and a warning.
pub fn generation_mixes(
    regions: &RegionMap,
    facilities: &FacilityMap,
    assignment: &FacilityAssignment,
    report: &mut RunReport,
) -> IndexMap<RegionID, GenerationMix> {
    let mut by_region: IndexMap<&RegionID, IndexMap<&FuelCategory, Energy>> = regions
        .keys()
        .map(|id| (id, IndexMap::new()))
        .collect();
    for (facility_id, region_id) in assignment {
        let facility = &facilities[facility_id];
        let Some(by_fuel) = by_region.get_mut(region_id) else {
            continue;
        };
        *by_fuel.entry(&facility.fuel_category).or_default() += facility.net_generation;
    }

    by_region
        .into_iter()
        .map(|(region_id, mut by_fuel)| {
            by_fuel.sort_keys();
            let total: Energy = by_fuel.values().copied().sum();
            let fractions = if total.value() > 0.0 {
                by_fuel
                    .into_iter()
                    .map(|(fuel, generation)| (fuel.clone(), (generation / total).value()))
                    .collect()
            } else {
                report.coverage(
                    Stage::Regionalisation,
                    region_id,
                    format!("Total generation is {total} MWh, so the generation mix is empty"),
                );
                IndexMap::new()
            };

            let mix = GenerationMix {
                region: region_id.clone(),
                total,
                fractions,
            };
            (region_id.clone(), mix)
        })
        .collect()
}

/// Assign facilities to regions and calculate generation mixes
pub fn regionalise(model: &Model, facilities: &FacilityMap, report: &mut RunReport) -> Regionalisation {
    let regions = regions_at_level(&model.regions, model.config.region_agg);
    let assignment = assign_facilities(model, facilities, report);
    let mixes = generation_mixes(&regions, facilities, &assignment, report);

    Regionalisation {
        regions,
        assignment,
        mixes,
    }
}
