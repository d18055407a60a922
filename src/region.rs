//! Regions are the aggregation units to which facilities are assigned (balancing authorities, FERC
//! regions or user-defined groupings).
use crate::facility::FacilityID;
use crate::id::define_id_type;
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {RegionID}

/// A map of [`Region`]s, keyed by region ID
pub type RegionMap = IndexMap<RegionID, Region>;

/// The candidate base regions (balancing authorities or custom regions) for each facility
pub type CandidateRegionMap = IndexMap<FacilityID, Vec<RegionID>>;

/// The ID of the single region used when aggregating to the whole US
pub const US_REGION_ID: &str = "US";

/// The level of regional aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegionLevel {
    /// Balancing authority areas
    BalancingAuthority,
    /// FERC regions, each of which contains a number of balancing authorities
    FercRegion,
    /// User-defined regions
    Custom,
    /// The whole of the US as a single region
    Us,
}

/// Represents a region with an ID and a longer description.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Region {
    /// A unique identifier for a region (e.g. "AZPS").
    pub id: RegionID,
    /// A text description of the region (e.g. "Arizona Public Service Company").
    pub description: String,
    /// The aggregation level this region belongs to
    pub level: RegionLevel,
    /// The enclosing region, if any (the FERC region of a balancing authority)
    pub parent: Option<RegionID>,
}

impl Region {
    /// The synthetic region covering the whole US
    pub fn us() -> Self {
        Self {
            id: US_REGION_ID.into(),
            description: "United States".into(),
            level: RegionLevel::Us,
            parent: None,
        }
    }
}
