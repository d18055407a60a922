//! Code for reading co-product data for multi-output facilities from a CSV file.
use super::*;
use crate::allocation::{CoProduct, FacilityOutputsMap};
use crate::facility::FacilityID;
use serde::Deserialize;
use unicase::UniCase;

const FACILITY_OUTPUTS_FILE_NAME: &str = "facility_outputs.csv";

#[derive(Debug, Deserialize, PartialEq)]
struct CoProductRaw {
    facility_id: FacilityID,
    product: String,
    energy: Option<f64>,
    mass: Option<f64>,
    market_value: Option<f64>,
}

/// Read co-product basis quantities from a CSV file.
///
/// The file is optional; facilities which are not listed are treated as producing only
/// electricity. Missing basis values are allowed here and are reported during allocation.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
pub fn read_facility_outputs(model_dir: &Path) -> Result<FacilityOutputsMap> {
    let file_path = model_dir.join(FACILITY_OUTPUTS_FILE_NAME);
    read_csv_optional(&file_path)
        .and_then(read_facility_outputs_from_iter)
        .map_err(|err| configuration_error(&file_path, &err))
}

fn read_facility_outputs_from_iter<I>(iter: I) -> Result<FacilityOutputsMap>
where
    I: Iterator<Item = CoProductRaw>,
{
    let mut map = FacilityOutputsMap::new();
    for raw in iter {
        ensure!(
            !raw.product.is_empty(),
            "Empty product name for facility {}",
            raw.facility_id
        );
        for (basis, value) in [
            ("energy", raw.energy),
            ("mass", raw.mass),
            ("market_value", raw.market_value),
        ] {
            ensure!(
                value.is_none_or(|value| value.is_finite() && value >= 0.0),
                "Invalid {basis} value for product {} of facility {}",
                raw.product,
                raw.facility_id
            );
        }

        let products = map.entry(raw.facility_id.clone()).or_default();
        ensure!(
            !products
                .iter()
                .any(|p| UniCase::new(&p.product) == UniCase::new(&raw.product)),
            "Product {} is given more than once for facility {}",
            raw.product,
            raw.facility_id
        );
        products.push(CoProduct {
            product: raw.product,
            energy: raw.energy,
            mass: raw.mass,
            market_value: raw.market_value,
        });
    }

    Ok(map)
}
