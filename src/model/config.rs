//! Defines the `ModelConfig` struct, which represents the contents of `model.toml`.
use crate::allocation::AllocationBasis;
use crate::flow::FlowID;
use crate::input::{configuration_error, deserialise_proportion, read_toml};
use crate::region::{RegionID, RegionLevel, RegionMap};
use crate::source::SourceSpec;
use anyhow::{Result, ensure};
use itertools::Itertools;
use log::warn;
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::Path;

/// The range of years for which inventories can be built
const VALID_TARGET_YEARS: RangeInclusive<u32> = 1990..=2100;

fn default_include_only_positive_generation() -> bool {
    true
}

/// Bounds on facility thermal efficiency, in percent.
///
/// Facilities whose efficiency lies outside the bounds are assumed to have misreported their
/// generation or heat input and are excluded.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EfficiencyFilter {
    /// The lowest acceptable efficiency
    pub lower: f64,
    /// The highest acceptable efficiency
    pub upper: f64,
}

impl EfficiencyFilter {
    /// Whether the given efficiency passes the filter
    pub fn accepts(&self, efficiency: f64) -> bool {
        (self.lower..=self.upper).contains(&efficiency)
    }
}

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Name of the model, used for naming the exported package
    pub name: String,
    /// The year for which the inventory is built
    pub target_year: u32,
    /// The level of regional aggregation
    pub region_agg: RegionLevel,
    /// The quantity used to apportion flows among the co-products of a facility
    #[serde(default)]
    pub allocation_basis: AllocationBasis,
    /// Whether to attach upstream fuel supply processes to generation processes
    #[serde(default)]
    pub include_upstream: bool,
    /// Priority order for facilities with more than one candidate region
    #[serde(default)]
    pub region_priority: Vec<RegionID>,
    /// Distribution loss factor for consuming regions without a specific value
    #[serde(default)]
    pub default_loss_factor: f64,
    /// Whether to exclude facilities reporting zero or negative net generation
    #[serde(default = "default_include_only_positive_generation")]
    pub include_only_positive_generation: bool,
    /// Facilities with a smaller share of generation from their primary fuel are excluded
    #[serde(default, deserialize_with = "deserialise_proportion")]
    pub min_primary_fuel_share: f64,
    /// Optional bounds on facility efficiency
    #[serde(default)]
    pub efficiency_filter: Option<EfficiencyFilter>,
    /// Flows attributed wholly to electricity, which are not scaled by the allocation factor
    #[serde(default)]
    pub electricity_exclusive_flows: Vec<FlowID>,
    /// Facility generation data
    pub generation: SourceSpec,
    /// Mapping from raw flow names to canonical flows
    pub flow_list: SourceSpec,
    /// Release inventories, in order of preference
    #[serde(default)]
    pub inventories: Vec<SourceSpec>,
    /// Upstream fuel supply inventory
    pub upstream: Option<SourceSpec>,
}

/// Check that the `target_year` parameter is valid
fn check_target_year(year: u32) -> Result<()> {
    ensure!(
        VALID_TARGET_YEARS.contains(&year),
        "target_year must be between {} and {}",
        VALID_TARGET_YEARS.start(),
        VALID_TARGET_YEARS.end()
    );

    Ok(())
}

/// Check that the `default_loss_factor` parameter is valid
fn check_loss_factor(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "default_loss_factor must be a finite number no less than zero"
    );

    Ok(())
}

/// Check that the `efficiency_filter` parameter is valid
fn check_efficiency_filter(filter: &EfficiencyFilter) -> Result<()> {
    ensure!(
        0.0 <= filter.lower && filter.lower < filter.upper && filter.upper <= 100.0,
        "efficiency_filter bounds must satisfy 0 <= lower < upper <= 100"
    );

    Ok(())
}

/// Check that source IDs are non-empty and unique
fn check_sources<'a, I>(sources: I) -> Result<()>
where
    I: IntoIterator<Item = &'a SourceSpec>,
{
    let sources = sources.into_iter().collect_vec();
    for source in &sources {
        ensure!(!source.id.trim().is_empty(), "Source IDs cannot be empty");
        ensure!(
            !source.location.trim().is_empty(),
            "No location given for source {}",
            source.id
        );
    }

    let duplicates = sources.iter().map(|s| &s.id).duplicates().join(", ");
    ensure!(duplicates.is_empty(), "Duplicate source IDs: {duplicates}");

    Ok(())
}

impl ModelConfig {
    /// The name of the model configuration file
    pub const FILE_NAME: &'static str = "model.toml";

    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelConfig`] struct or a configuration error if the file is
    /// invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelConfig> {
        let file_path = model_dir.as_ref().join(Self::FILE_NAME);
        let config: ModelConfig =
            read_toml(&file_path).map_err(|err| configuration_error(&file_path, &err))?;

        config
            .validate()
            .map_err(|err| configuration_error(&file_path, &err))?;

        Ok(config)
    }

    /// Iterate over every source the model reads from
    pub fn iter_sources(&self) -> impl Iterator<Item = &SourceSpec> {
        [&self.generation, &self.flow_list]
            .into_iter()
            .chain(self.inventories.iter())
            .chain(self.upstream.iter())
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        ensure!(!self.name.trim().is_empty(), "name cannot be empty");
        ensure!(
            !self.name.contains(['/', '\\']),
            "name cannot contain path separators"
        );

        check_target_year(self.target_year)?;
        check_loss_factor(self.default_loss_factor)?;

        if let Some(filter) = &self.efficiency_filter {
            check_efficiency_filter(filter)?;
        }

        // min_primary_fuel_share already validated with deserialise_proportion

        check_sources(self.iter_sources())?;

        ensure!(
            !self.include_upstream || self.upstream.is_some(),
            "include_upstream is true but no upstream source is given"
        );
        if !self.include_upstream && self.upstream.is_some() {
            warn!("An upstream source is given but include_upstream is false, so it will be ignored");
        }

        Ok(())
    }

    /// Check that every region in `region_priority` is defined
    pub fn validate_region_priority(&self, regions: &RegionMap) -> Result<()> {
        for region_id in &self.region_priority {
            ensure!(
                regions.contains_key(region_id),
                "Unknown region {region_id} in region_priority"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const MINIMAL_CONFIG: &str = r#"
name = "test"
target_year = 2016
region_agg = "balancing_authority"

[generation]
id = "eia923"
release = "2016"
location = "generation.csv"

[flow_list]
id = "fedelemflowlist"
release = "1.0"
location = "flow_list.csv"
"#;

    fn write_config(dir: &Path, contents: &str) {
        let mut file = File::create(dir.join(ModelConfig::FILE_NAME)).unwrap();
        write!(file, "{contents}").unwrap();
    }

    fn load(contents: &str) -> Result<ModelConfig> {
        let dir = tempdir().unwrap();
        write_config(dir.path(), contents);
        ModelConfig::from_path(dir.path())
    }

    #[test]
    fn test_config_from_path_defaults() {
        let config = load(MINIMAL_CONFIG).unwrap();
        assert_eq!(config.target_year, 2016);
        assert_eq!(config.region_agg, RegionLevel::BalancingAuthority);
        assert_eq!(config.allocation_basis, AllocationBasis::Energy);
        assert!(!config.include_upstream);
        assert!(config.include_only_positive_generation);
        assert_eq!(config.min_primary_fuel_share, 0.0);
        assert!(config.inventories.is_empty());
        assert_eq!(config.iter_sources().count(), 2);
    }

    #[test]
    fn test_config_unknown_key_lists_options() {
        let err = load(&format!("colour = \"blue\"\n{MINIMAL_CONFIG}")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunError>(),
            Some(RunError::Configuration { .. })
        ));
        let msg = err.to_string();
        assert!(msg.contains("unknown field `colour`"), "{msg}");
        assert!(msg.contains("region_agg"), "{msg}");
        assert!(msg.contains("allocation_basis"), "{msg}");
    }

    #[test]
    fn test_config_unknown_region_agg_lists_options() {
        let err = load(&MINIMAL_CONFIG.replace("balancing_authority", "county")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ferc_region"), "{msg}");
        assert!(msg.contains("custom"), "{msg}");
    }

    #[test]
    fn test_config_upstream_required() {
        let err = load(&format!("include_upstream = true\n{MINIMAL_CONFIG}")).unwrap_err();
        assert!(
            err.to_string()
                .contains("include_upstream is true but no upstream source is given")
        );
    }

    #[test]
    fn test_config_duplicate_sources() {
        let contents = format!(
            "{MINIMAL_CONFIG}
[[inventories]]
id = \"eia923\"
release = \"2016\"
location = \"egrid.csv\"
"
        );
        assert!(
            load(&contents)
                .unwrap_err()
                .to_string()
                .contains("Duplicate source IDs: eia923")
        );
    }

    #[rstest]
    #[case(1990, true)]
    #[case(2016, true)]
    #[case(2100, true)]
    #[case(1989, false)]
    #[case(2101, false)]
    fn test_check_target_year(#[case] year: u32, #[case] expected_valid: bool) {
        assert_eq!(check_target_year(year).is_ok(), expected_valid);
    }

    #[rstest]
    #[case(0.0, true)]
    #[case(0.05, true)]
    #[case(-0.01, false)]
    #[case(f64::INFINITY, false)]
    #[case(f64::NAN, false)]
    fn test_check_loss_factor(#[case] value: f64, #[case] expected_valid: bool) {
        assert_eq!(check_loss_factor(value).is_ok(), expected_valid);
    }

    #[rstest]
    #[case(10.0, 100.0, true)]
    #[case(0.0, 0.5, true)]
    #[case(50.0, 50.0, false)]
    #[case(60.0, 50.0, false)]
    #[case(-1.0, 50.0, false)]
    #[case(10.0, 101.0, false)]
    fn test_check_efficiency_filter(
        #[case] lower: f64,
        #[case] upper: f64,
        #[case] expected_valid: bool,
    ) {
        let filter = EfficiencyFilter { lower, upper };
        assert_eq!(check_efficiency_filter(&filter).is_ok(), expected_valid);
    }

    #[test]
    fn test_efficiency_filter_accepts() {
        let filter = EfficiencyFilter {
            lower: 10.0,
            upper: 100.0,
        };
        assert!(filter.accepts(10.0));
        assert!(filter.accepts(35.0));
        assert!(!filter.accepts(9.9));
        assert!(!filter.accepts(120.0));
    }
}
