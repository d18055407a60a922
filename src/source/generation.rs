//! Facility generation data, and the filters which decide which facilities are included.
use crate::error::{RunReport, Stage};
use crate::facility::{FacilityID, FacilityRecord, FuelCategory};
use crate::input::{deserialise_optional_proportion, read_csv};
use crate::model::ModelConfig;
use crate::units::{Dimensionless, Energy, HeatInput};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, PartialEq)]
struct GenerationRaw {
    facility_id: FacilityID,
    facility_name: String,
    state: String,
    fuel_category: String,
    net_generation: f64,
    heat_input: Option<f64>,
    #[serde(default, deserialize_with = "deserialise_optional_proportion")]
    primary_fuel_share: Option<f64>,
    year: u32,
}

/// Read generation records for the target year from a CSV file.
///
/// The returned facilities have no releases attached and are sorted by ID.
pub fn read_generation(file_path: &Path, target_year: u32) -> Result<IndexMap<FacilityID, FacilityRecord>> {
    read_generation_from_iter(read_csv(file_path)?, target_year)
}

fn read_generation_from_iter<I>(iter: I, target_year: u32) -> Result<IndexMap<FacilityID, FacilityRecord>>
where
    I: Iterator<Item = GenerationRaw>,
{
    let mut facilities = IndexMap::new();
    for raw in iter.filter(|raw| raw.year == target_year) {
        ensure!(
            raw.net_generation.is_finite(),
            "Net generation for facility {} must be a finite number",
            raw.facility_id
        );
        ensure!(
            raw.heat_input.is_none_or(|h| h.is_finite() && h >= 0.0),
            "Heat input for facility {} must be a finite number no less than zero",
            raw.facility_id
        );

        let facility = FacilityRecord {
            id: raw.facility_id.clone(),
            name: raw.facility_name,
            state: raw.state,
            fuel_category: FuelCategory::normalise(&raw.fuel_category),
            net_generation: Energy(raw.net_generation),
            heat_input: raw.heat_input.map(HeatInput),
            primary_fuel_share: raw.primary_fuel_share.map(Dimensionless),
            year: raw.year,
            releases: Vec::new(),
        };
        ensure!(
            facilities.insert(raw.facility_id.clone(), facility).is_none(),
            "Duplicate generation data for facility {}",
            raw.facility_id
        );
    }
    ensure!(
        !facilities.is_empty(),
        "No generation data for target year {target_year}"
    );
    facilities.sort_keys();

    Ok(facilities)
}

/// The reason a facility fails the configured filters, if it does
fn exclusion_reason(facility: &FacilityRecord, config: &ModelConfig) -> Option<String> {
    if config.include_only_positive_generation && facility.net_generation.value() <= 0.0 {
        return Some(format!(
            "Net generation of {} MWh is not positive",
            facility.net_generation
        ));
    }

    if let Some(share) = facility.primary_fuel_share {
        if share.value() < config.min_primary_fuel_share {
            return Some(format!(
                "Primary fuel share of {share} is below the minimum of {}",
                config.min_primary_fuel_share
            ));
        }
    }

    let filter = config.efficiency_filter.as_ref()?;
    let efficiency = facility.efficiency()?;
    (!filter.accepts(efficiency)).then(|| {
        format!(
            "Efficiency of {efficiency:.1}% is outside the range {}-{}%",
            filter.lower, filter.upper
        )
    })
}

/// Remove facilities which fail the configured filters, recording a warning for each
pub fn filter_facilities(
    facilities: IndexMap<FacilityID, FacilityRecord>,
    config: &ModelConfig,
    report: &mut RunReport,
) -> IndexMap<FacilityID, FacilityRecord> {
    facilities
        .into_iter()
        .filter(|(id, facility)| match exclusion_reason(facility, config) {
            Some(reason) => {
                report.coverage(Stage::Ingestion, id, format!("{reason}; facility excluded"));
                false
            }
            None => true,
        })
        .collect()
}

/// Read generation data and apply the configured filters
pub fn ingest_generation(
    file_path: &Path,
    config: &ModelConfig,
    report: &mut RunReport,
) -> Result<IndexMap<FacilityID, FacilityRecord>> {
    let facilities = read_generation(file_path, config.target_year)
        .with_context(|| format!("Error reading generation source {}", config.generation.id))?;

    Ok(filter_facilities(facilities, config, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, facility, model_config};
    use crate::model::config::EfficiencyFilter;
    use rstest::rstest;

    fn raw(id: &str, net_generation: f64, year: u32) -> GenerationRaw {
        GenerationRaw {
            facility_id: id.into(),
            facility_name: format!("Plant {id}"),
            state: "AZ".into(),
            fuel_category: " Coal".into(),
            net_generation,
            heat_input: Some(1000.0),
            primary_fuel_share: Some(1.0),
            year,
        }
    }

    #[test]
    fn test_read_generation_selects_year() {
        let facilities = read_generation_from_iter(
            [raw("F2", 10.0, 2016), raw("F1", 20.0, 2016), raw("F1", 30.0, 2015)].into_iter(),
            2016,
        )
        .unwrap();
        let ids: Vec<_> = facilities.keys().map(|id| id.to_string()).collect();
        assert_eq!(ids, ["F1", "F2"]);
        assert_eq!(facilities["F1"].net_generation, Energy(20.0));
        assert_eq!(facilities["F1"].fuel_category, "COAL".into());
    }

    #[test]
    fn test_read_generation_errors() {
        assert_error!(
            read_generation_from_iter([raw("F1", 10.0, 2015)].into_iter(), 2016),
            "No generation data for target year 2016"
        );
        assert_error!(
            read_generation_from_iter(
                [raw("F1", 10.0, 2016), raw("F1", 20.0, 2016)].into_iter(),
                2016
            ),
            "Duplicate generation data for facility F1"
        );
        assert_error!(
            read_generation_from_iter([raw("F1", f64::NAN, 2016)].into_iter(), 2016),
            "Net generation for facility F1 must be a finite number"
        );
    }

    #[rstest]
    #[case(100.0, Some(1000.0), Some(1.0), true)]
    #[case(0.0, Some(1000.0), Some(1.0), false)]
    #[case(-5.0, Some(1000.0), Some(1.0), false)]
    #[case(100.0, Some(1000.0), Some(0.5), false)]
    #[case(100.0, Some(1000.0), None, true)]
    #[case(100.0, Some(10_000.0), Some(1.0), false)]
    #[case(100.0, Some(100.0), Some(1.0), false)]
    #[case(100.0, None, Some(1.0), true)]
    fn test_exclusion_reason(
        mut model_config: ModelConfig,
        facility: FacilityRecord,
        #[case] net_generation: f64,
        #[case] heat_input: Option<f64>,
        #[case] share: Option<f64>,
        #[case] expected_included: bool,
    ) {
        model_config.min_primary_fuel_share = 0.9;
        model_config.efficiency_filter = Some(EfficiencyFilter {
            lower: 10.0,
            upper: 100.0,
        });
        let facility = FacilityRecord {
            net_generation: Energy(net_generation),
            heat_input: heat_input.map(HeatInput),
            primary_fuel_share: share.map(Dimensionless),
            ..facility
        };
        assert_eq!(
            exclusion_reason(&facility, &model_config).is_none(),
            expected_included
        );
    }

    #[rstest]
    fn test_filter_facilities_reports_exclusions(model_config: ModelConfig, facility: FacilityRecord) {
        let excluded = FacilityRecord {
            id: "F2".into(),
            net_generation: Energy(0.0),
            releases: Vec::new(),
            name: facility.name.clone(),
            state: facility.state.clone(),
            fuel_category: facility.fuel_category.clone(),
            ..facility
        };
        let facilities: IndexMap<FacilityID, FacilityRecord> =
            [(facility.id.clone(), facility), (excluded.id.clone(), excluded)]
                .into_iter()
                .collect();

        let mut report = RunReport::default();
        let kept = filter_facilities(facilities, &model_config, &mut report);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("F1"));
        assert!(report.mentions("F2"));
    }
}
