//! Code for reading inter-regional trade fractions and distribution losses from CSV files.
use super::*;
use crate::distribution::TradeMap;
use crate::region::{RegionID, RegionMap, US_REGION_ID};
use serde::Deserialize;
use std::collections::HashMap;

const TRADE_FILE_NAME: &str = "trade.csv";
const LOSSES_FILE_NAME: &str = "losses.csv";

#[derive(Debug, Deserialize, PartialEq)]
struct TradeRaw {
    consuming_region: String,
    supplying_region: String,
    fraction: f64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct LossRaw {
    region_id: String,
    loss_factor: f64,
}

/// Look up a region ID, accepting the synthetic US region as well as the defined ones
fn get_region_id(regions: &RegionMap, id: &str) -> Result<RegionID> {
    if id == US_REGION_ID {
        return Ok(US_REGION_ID.into());
    }

    let (region_id, _) = regions
        .get_key_value(id)
        .with_context(|| format!("Unknown region {id}"))?;
    Ok(region_id.clone())
}

/// Read trade fractions from a CSV file.
///
/// The file is optional; consuming regions without trade data supply themselves.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All known regions
pub fn read_trade(model_dir: &Path, regions: &RegionMap) -> Result<TradeMap> {
    let file_path = model_dir.join(TRADE_FILE_NAME);
    read_csv_optional(&file_path)
        .and_then(|iter| read_trade_from_iter(iter, regions))
        .map_err(|err| configuration_error(&file_path, &err))
}

fn read_trade_from_iter<I>(iter: I, regions: &RegionMap) -> Result<TradeMap>
where
    I: Iterator<Item = TradeRaw>,
{
    let mut trade = TradeMap::new();
    for raw in iter {
        let consumer = get_region_id(regions, &raw.consuming_region)?;
        let supplier = get_region_id(regions, &raw.supplying_region)?;
        ensure!(
            raw.fraction.is_finite() && raw.fraction > 0.0,
            "Trade fraction from {supplier} to {consumer} must be a positive number"
        );

        let suppliers = trade.entry(consumer.clone()).or_default();
        ensure!(
            !suppliers.iter().any(|(id, _)| *id == supplier),
            "Trade from {supplier} to {consumer} is given more than once"
        );
        suppliers.push((supplier, raw.fraction));
    }

    Ok(trade)
}

/// Read distribution loss factors from a CSV file.
///
/// The file is optional; regions without a loss factor use the model default.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All known regions
pub fn read_losses(model_dir: &Path, regions: &RegionMap) -> Result<HashMap<RegionID, f64>> {
    let file_path = model_dir.join(LOSSES_FILE_NAME);
    read_csv_optional(&file_path)
        .and_then(|iter| read_losses_from_iter(iter, regions))
        .map_err(|err| configuration_error(&file_path, &err))
}

fn read_losses_from_iter<I>(iter: I, regions: &RegionMap) -> Result<HashMap<RegionID, f64>>
where
    I: Iterator<Item = LossRaw>,
{
    let mut losses = HashMap::new();
    for raw in iter {
        let region_id = get_region_id(regions, &raw.region_id)?;
        ensure!(
            raw.loss_factor.is_finite() && raw.loss_factor >= 0.0,
            "Loss factor for {region_id} must be a finite number no less than zero"
        );
        ensure!(
            losses.insert(region_id.clone(), raw.loss_factor).is_none(),
            "Loss factor for {region_id} is given more than once"
        );
    }

    Ok(losses)
}
