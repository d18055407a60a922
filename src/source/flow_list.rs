//! The flow list maps flows as named by each source onto canonical flows.
use crate::flow::{Flow, FlowID, FlowType};
use crate::input::read_csv;
use crate::quantity::find_unit;
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use unicase::UniCase;

#[derive(Debug, Deserialize, PartialEq)]
struct FlowMappingRaw {
    source_name: String,
    source_context: String,
    source_unit: String,
    flow_id: String,
    flow_name: String,
    context: String,
    unit: String,
    conversion_factor: f64,
}

/// A raw flow as reported by a source: name, compartment and unit, compared case-insensitively
type RawFlowKey = (UniCase<String>, UniCase<String>, UniCase<String>);

fn raw_key(name: &str, context: &str, unit: &str) -> RawFlowKey {
    (
        UniCase::new(name.trim().to_string()),
        UniCase::new(context.trim().to_string()),
        UniCase::new(unit.trim().to_string()),
    )
}

#[derive(Debug, PartialEq)]
struct FlowMapping {
    flow: Rc<Flow>,
    conversion_factor: f64,
}

/// Canonical flows, and the mapping to them from source flows
#[derive(Debug, Default, PartialEq)]
pub struct FlowList {
    mappings: HashMap<RawFlowKey, FlowMapping>,
    flows: HashMap<FlowID, Rc<Flow>>,
}

impl FlowList {
    /// Read a flow list from a CSV file
    pub fn from_path(file_path: &Path) -> Result<Self> {
        Self::from_records(read_csv(file_path)?)
    }

    fn from_records<I>(iter: I) -> Result<Self>
    where
        I: Iterator<Item = FlowMappingRaw>,
    {
        let mut list = FlowList::default();
        for raw in iter {
            let flow = Flow {
                id: raw.flow_id.into(),
                name: raw.flow_name,
                context: raw.context,
                unit: raw.unit,
                kind: FlowType::Elementary,
            };
            list.add_mapping(
                &raw.source_name,
                &raw.source_context,
                &raw.source_unit,
                flow,
                raw.conversion_factor,
            )?;
        }

        Ok(list)
    }

    /// Add a mapping from a source flow to a canonical flow.
    ///
    /// A canonical flow may be the target of several mappings but must be defined identically in
    /// each.
    pub fn add_mapping(
        &mut self,
        source_name: &str,
        source_context: &str,
        source_unit: &str,
        flow: Flow,
        conversion_factor: f64,
    ) -> Result<()> {
        ensure!(
            conversion_factor.is_finite() && conversion_factor > 0.0,
            "Conversion factor for {source_name} must be a positive number"
        );

        ensure!(
            find_unit(&flow.unit).is_some(),
            "Flow {} has unknown unit {}",
            flow.id,
            flow.unit
        );

        let flow = match self.flows.get(&flow.id) {
            Some(existing) => {
                ensure!(
                    **existing == flow,
                    "Flow {} is defined inconsistently in the flow list",
                    flow.id
                );
                Rc::clone(existing)
            }
            None => {
                let flow = Rc::new(flow);
                self.flows.insert(flow.id.clone(), Rc::clone(&flow));
                flow
            }
        };

        let mapping = FlowMapping {
            flow,
            conversion_factor,
        };
        ensure!(
            self.mappings
                .insert(raw_key(source_name, source_context, source_unit), mapping)
                .is_none(),
            "Source flow {source_name} ({source_context}, {source_unit}) is mapped more than once"
        );

        Ok(())
    }

    /// Convert a raw flow and amount into a canonical flow and amount.
    ///
    /// Returns `None` if the flow list has no mapping for the raw flow.
    pub fn convert(&self, name: &str, context: &str, unit: &str, amount: f64) -> Option<(Rc<Flow>, f64)> {
        let mapping = self.mappings.get(&raw_key(name, context, unit))?;
        Some((Rc::clone(&mapping.flow), amount * mapping.conversion_factor))
    }

    /// Look up a canonical flow by ID
    pub fn get(&self, id: &str) -> Option<&Rc<Flow>> {
        self.flows.get(id)
    }
}
