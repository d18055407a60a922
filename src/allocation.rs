//! Allocation of the releases of multi-output facilities between electricity and their other
//! co-products.
use crate::error::RunReport;
use crate::facility::{FacilityID, FacilityMap, FacilityRecord, ReleaseFlow};
use crate::flow::FlowID;
use crate::units::{Dimensionless, HeatInput};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::rc::Rc;
use unicase::UniCase;

/// The name of the electricity co-product in `facility_outputs.csv`
pub const ELECTRICITY_PRODUCT: &str = "electricity";

/// The quantity used to apportion flows among co-products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AllocationBasis {
    /// Energy content of each product
    #[default]
    Energy,
    /// Mass of each product
    Mass,
    /// Market value of each product
    MarketValue,
}

/// One of the products of a multi-output facility, with its quantity on each basis
#[derive(Debug, Clone, PartialEq)]
pub struct CoProduct {
    /// Product name (e.g. "electricity" or "steam")
    pub product: String,
    /// Energy content of the product
    pub energy: Option<f64>,
    /// Mass of the product
    pub mass: Option<f64>,
    /// Market value of the product
    pub market_value: Option<f64>,
}

impl CoProduct {
    /// The product's quantity on the given basis, if known
    pub fn basis_value(&self, basis: AllocationBasis) -> Option<f64> {
        match basis {
            AllocationBasis::Energy => self.energy,
            AllocationBasis::Mass => self.mass,
            AllocationBasis::MarketValue => self.market_value,
        }
    }

    fn is_electricity(&self) -> bool {
        UniCase::new(self.product.as_str()) == UniCase::new(ELECTRICITY_PRODUCT)
    }
}

/// Co-products of each multi-output facility
pub type FacilityOutputsMap = IndexMap<FacilityID, Vec<CoProduct>>;

/// Calculate the allocation factor for each of a facility's co-products.
///
/// The factors are in the same order as the products and sum to one.
pub fn allocation_factors(products: &[CoProduct], basis: AllocationBasis) -> Result<Vec<Dimensionless>> {
    let values = products
        .iter()
        .map(|product| {
            product.basis_value(basis).with_context(|| {
                format!("No {basis} value for co-product {}", product.product)
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total: f64 = values.iter().sum();
    ensure!(
        total.is_finite() && total > 0.0,
        "Total {basis} across co-products must be positive"
    );

    Ok(values
        .into_iter()
        .map(|value| Dimensionless(value / total))
        .collect())
}

/// The share of a facility's flows attributed to electricity.
///
/// Facilities without co-product data produce only electricity and have a factor of one.
pub fn electricity_allocation_factor(
    facility_id: &FacilityID,
    outputs: &FacilityOutputsMap,
    basis: AllocationBasis,
) -> Result<Dimensionless> {
    let Some(products) = outputs.get(facility_id) else {
        return Ok(Dimensionless(1.0));
    };

    let index = products
        .iter()
        .position(CoProduct::is_electricity)
        .context("No electricity co-product")?;
    let factors = allocation_factors(products, basis)?;

    Ok(factors[index])
}

/// A facility's contribution to its generation process after allocation
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedFacility {
    /// The facility
    pub facility: Rc<FacilityRecord>,
    /// The electricity allocation factor, or `None` if allocation failed
    pub factor: Option<Dimensionless>,
    /// Releases attributed to electricity (empty if allocation failed)
    pub flows: Vec<ReleaseFlow>,
}

impl AllocatedFacility {
    /// Fuel heat input attributed to electricity, if allocation succeeded
    pub fn allocated_heat_input(&self) -> Option<HeatInput> {
        let factor = self.factor?;
        Some(self.facility.heat_input? * factor)
    }
}

/// Scale a facility's releases by its allocation factor.
///
/// Flows listed in `exclusive_flows` are attributed wholly to electricity and left unscaled.
pub fn allocate_releases(
    facility: &FacilityRecord,
    factor: Dimensionless,
    exclusive_flows: &HashSet<&FlowID>,
) -> Vec<ReleaseFlow> {
    facility
        .releases
        .iter()
        .map(|release| {
            let amount = if exclusive_flows.contains(&release.flow.id) {
                release.amount
            } else {
                release.amount * factor.value()
            };
            ReleaseFlow {
                amount,
                ..release.clone()
            }
        })
        .collect()
}

/// Allocate every facility's releases to electricity.
///
/// A facility whose allocation fails keeps its generation but contributes no flows; the failure
/// is recorded in the report.
pub fn allocate_facilities(
    facilities: &FacilityMap,
    outputs: &FacilityOutputsMap,
    basis: AllocationBasis,
    exclusive_flows: &[FlowID],
    report: &mut RunReport,
) -> IndexMap<FacilityID, AllocatedFacility> {
    let exclusive_flows: HashSet<&FlowID> = exclusive_flows.iter().collect();

    facilities
        .iter()
        .map(|(id, facility)| {
            let allocated = match electricity_allocation_factor(id, outputs, basis) {
                Ok(factor) => {
                    debug!("Allocation factor for facility {id}: {factor}");
                    AllocatedFacility {
                        facility: Rc::clone(facility),
                        factor: Some(factor),
                        flows: allocate_releases(facility, factor, &exclusive_flows),
                    }
                }
                Err(err) => {
                    report.allocation(id, format!("{err:#}; its flows are excluded"));
                    AllocatedFacility {
                        facility: Rc::clone(facility),
                        factor: None,
                        flows: Vec::new(),
                    }
                }
            };
            (id.clone(), allocated)
        })
        .collect()
}
