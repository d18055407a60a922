//! Facilities are the power plants whose generation and releases make up the inventory.
use crate::flow::Flow;
use crate::id::define_id_type;
use crate::units::{Dimensionless, Energy, HeatInput};
use indexmap::IndexMap;
use std::rc::Rc;

define_id_type! {FacilityID}
define_id_type! {FuelCategory}

/// A map of [`FacilityRecord`]s, keyed by facility ID
pub type FacilityMap = IndexMap<FacilityID, Rc<FacilityRecord>>;

impl FuelCategory {
    /// Normalise a fuel category name as reported by a source (e.g. "Coal " -> "COAL")
    pub fn normalise(name: &str) -> Self {
        name.trim().to_uppercase().into()
    }
}

/// The generation and releases reported for a single facility in the target year.
///
/// Records are immutable once ingested.
#[derive(PartialEq, Debug)]
pub struct FacilityRecord {
    /// Facility identifier used by the generation data provider
    pub id: FacilityID,
    /// Facility name
    pub name: String,
    /// Two-letter code of the state in which the facility is located
    pub state: String,
    /// The facility's primary fuel category
    pub fuel_category: FuelCategory,
    /// Net electricity generation
    pub net_generation: Energy,
    /// Fuel heat input, if reported (not reported for non-combustion plants)
    pub heat_input: Option<HeatInput>,
    /// Proportion of generation from the primary fuel category, if reported
    pub primary_fuel_share: Option<Dimensionless>,
    /// The reporting year
    pub year: u32,
    /// Normalised releases reported for this facility
    pub releases: Vec<ReleaseFlow>,
}

impl FacilityRecord {
    /// Thermal efficiency as a percentage, if heat input is reported and positive
    pub fn efficiency(&self) -> Option<f64> {
        let heat_input = self.heat_input.filter(|h| h.value() > 0.0)?;
        Some(100.0 * (self.net_generation.to_heat() / heat_input).value())
    }
}

/// A release (emission or resource use) reported for a facility, in canonical units
#[derive(PartialEq, Debug, Clone)]
pub struct ReleaseFlow {
    /// The canonical flow
    pub flow: Rc<Flow>,
    /// The amount released, in the flow's reference unit
    pub amount: f64,
    /// The inventory which reported this release
    pub inventory: String,
}
