//! Consumption mixes: the electricity consumed in each region, drawn from the generation mixes of
//! the regions supplying it and grossed up for distribution losses.
use crate::error::{RunReport, Stage};
use crate::facility::FuelCategory;
use crate::flow::Flow;
use crate::model::Model;
use crate::process::{Process, ProcessID, ProcessKind, ProviderInput};
use crate::region::{RegionID, RegionMap};
use crate::regionalisation::GenerationMix;
use float_cmp::approx_eq;
use indexmap::IndexMap;
use log::debug;

/// Raw trade fractions for each consuming region, as (supplying region, fraction) pairs
pub type TradeMap = IndexMap<RegionID, Vec<(RegionID, f64)>>;

/// Tolerance on the sum of a consumer's trade fractions
const TRADE_SUM_TOLERANCE: f64 = 1e-6;

/// Electricity as consumed in one region
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionMix {
    /// The consuming region
    pub region: RegionID,
    /// Share of consumption from each supplying region, summing to one
    pub contributions: IndexMap<RegionID, f64>,
    /// Proportion of electricity lost in transmission and distribution
    pub loss_factor: f64,
}

impl ConsumptionMix {
    /// Generation needed per unit of electricity consumed
    pub fn scale(&self) -> f64 {
        1.0 + self.loss_factor
    }

    /// Generation by fuel category per unit of electricity consumed, sorted by fuel.
    ///
    /// The fractions sum to `1 + loss_factor`.
    pub fn fuel_fractions(&self, mixes: &IndexMap<RegionID, GenerationMix>) -> IndexMap<FuelCategory, f64> {
        let mut fractions: IndexMap<FuelCategory, f64> = IndexMap::new();
        for (supplier, share) in &self.contributions {
            let Some(mix) = mixes.get(supplier) else {
                continue;
            };
            for (fuel, fraction) in &mix.fractions {
                *fractions.entry(fuel.clone()).or_default() += share * fraction * self.scale();
            }
        }
        fractions.sort_keys();

        fractions
    }
}

/// Build the consumption mix for one region.
///
/// Trade fractions are normalised, with a warning if they did not sum to one. Suppliers without
/// a generation mix are dropped and the remaining shares renormalised. Returns `None` if no
/// supplier is left.
pub fn consumption_mix(
    consumer: &RegionID,
    trade: Option<&[(RegionID, f64)]>,
    mixes: &IndexMap<RegionID, GenerationMix>,
    loss_factor: f64,
    report: &mut RunReport,
) -> Option<ConsumptionMix> {
    let self_supply = [(consumer.clone(), 1.0)];
    let raw = trade.unwrap_or(&self_supply);

    let raw_total: f64 = raw.iter().map(|(_, fraction)| fraction).sum();
    if !approx_eq!(f64, raw_total, 1.0, epsilon = TRADE_SUM_TOLERANCE) {
        report.coverage(
            Stage::Distribution,
            consumer,
            format!("Trade fractions sum to {raw_total}, not 1; they have been normalised"),
        );
    }

    let mut contributions = IndexMap::new();
    for (supplier, fraction) in raw {
        if mixes.get(supplier).is_some_and(|mix| !mix.is_empty()) {
            contributions.insert(supplier.clone(), *fraction);
        } else {
            report.coverage(
                Stage::Distribution,
                consumer,
                format!("Supplying region {supplier} has no generation mix and is left out"),
            );
        }
    }

    let total: f64 = contributions.values().sum();
    if contributions.is_empty() || total <= 0.0 {
        report.coverage(
            Stage::Distribution,
            consumer,
            "No supplying region has a generation mix, so there is no consumption mix",
        );
        return None;
    }
    contributions.values_mut().for_each(|share| *share /= total);

    Some(ConsumptionMix {
        region: consumer.clone(),
        contributions,
        loss_factor,
    })
}

/// Build the consumption mix of every region at the aggregation level.
///
/// Regions without trade data supply themselves.
pub fn build_consumption_mixes(
    model: &Model,
    regions: &RegionMap,
    mixes: &IndexMap<RegionID, GenerationMix>,
    report: &mut RunReport,
) -> IndexMap<RegionID, ConsumptionMix> {
    for consumer in model.trade.keys() {
        if !regions.contains_key(consumer) {
            report.coverage(
                Stage::Distribution,
                consumer,
                "Trade data given for a region outside the aggregation level are ignored",
            );
        }
    }

    regions
        .keys()
        .filter_map(|consumer| {
            let trade = model.trade.get(consumer).map(Vec::as_slice);
            let mix = consumption_mix(consumer, trade, mixes, model.loss_factor(consumer), report)?;
            debug!("Consumption mix for {consumer}: {:?}", mix.contributions);
            Some((consumer.clone(), mix))
        })
        .collect()
}

/// Build the consumption-mix process for a region.
///
/// The process delivers 1 MWh to consumers, drawing `share * (1 + loss_factor)` MWh from each
/// supplying region's generation mix.
pub fn consumption_mix_process(
    mix: &ConsumptionMix,
    generation_mixes: &IndexMap<RegionID, ProcessID>,
) -> Process {
    let region_id = &mix.region;
    let mut process = Process::new(
        ProcessKind::ConsumptionMix,
        format!("Electricity consumption mix - {region_id}"),
        Some(region_id.clone()),
        None,
        Flow::electricity(&format!("at user; consumption mix - {region_id}")),
        1.0,
    );

    for (supplier, share) in &mix.contributions {
        if let Some(provider) = generation_mixes.get(supplier) {
            process.inputs.push(ProviderInput {
                provider: provider.clone(),
                amount: share * mix.scale(),
            });
        }
    }

    process
}
