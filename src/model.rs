//! The model represents the static input data provided by the user.
use crate::allocation::FacilityOutputsMap;
use crate::distribution::TradeMap;
use crate::region::{CandidateRegionMap, RegionID, RegionMap};
use std::collections::HashMap;
use std::path::PathBuf;

pub mod config;
pub use config::ModelConfig;

/// Model definition
#[derive(Debug, PartialEq)]
pub struct Model {
    /// Path to model folder
    pub model_path: PathBuf,
    /// Configuration from the model TOML file
    pub config: ModelConfig,
    /// All regions known to the model, at every aggregation level
    pub regions: RegionMap,
    /// Candidate base regions for each facility
    pub facility_regions: CandidateRegionMap,
    /// Trade fractions for consuming regions which do not supply themselves entirely
    pub trade: TradeMap,
    /// Distribution loss factors by consuming region
    pub losses: HashMap<RegionID, f64>,
    /// Co-product data for multi-output facilities
    pub facility_outputs: FacilityOutputsMap,
}

impl Model {
    /// The distribution loss factor for a consuming region, falling back on the model default
    pub fn loss_factor(&self, region_id: &RegionID) -> f64 {
        self.losses
            .get(region_id)
            .copied()
            .unwrap_or(self.config.default_loss_factor)
    }
}
