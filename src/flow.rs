//! Canonical flows, as defined by the flow list.
//!
//! Every quantity attached to a process refers to one of these. Elementary flows (emissions and
//! resources) come from the flow list; product flows (electricity, fuels) are created by the
//! pipeline itself.
use crate::id::{define_id_type, deterministic_uuid};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::rc::Rc;

define_id_type! {FlowID}

/// The unit in which electricity product flows are measured
pub const ELECTRICITY_UNIT: &str = "MWh";

/// Whether a flow crosses the boundary with the environment
#[derive(
    PartialEq, Eq, Debug, Clone, Copy, Hash, SerializeLabeledStringEnum, DeserializeLabeledStringEnum,
)]
pub enum FlowType {
    /// An emission to or resource from the environment
    #[string = "ELEMENTARY_FLOW"]
    Elementary,
    /// A product exchanged between processes
    #[string = "PRODUCT_FLOW"]
    Product,
}

/// A canonical flow
#[derive(PartialEq, Debug, Clone)]
pub struct Flow {
    /// The flow's UUID
    pub id: FlowID,
    /// Flow name (e.g. "Sulfur dioxide")
    pub name: String,
    /// Compartment path (e.g. "emission/air")
    pub context: String,
    /// Reference unit (e.g. "kg")
    pub unit: String,
    /// Elementary or product flow
    pub kind: FlowType,
}

impl Flow {
    /// Create a product flow, deriving its ID from its name and unit
    pub fn product(name: &str, context: &str, unit: &str) -> Rc<Self> {
        Rc::new(Self {
            id: deterministic_uuid(&["flow", name, context, unit]).into(),
            name: name.to_string(),
            context: context.to_string(),
            unit: unit.to_string(),
            kind: FlowType::Product,
        })
    }

    /// The electricity product flow for the given stage of the supply chain.
    ///
    /// Electricity from different stages is kept distinct so that each process has a unique
    /// reference product.
    pub fn electricity(description: &str) -> Rc<Self> {
        Self::product(
            &format!("Electricity; {description}"),
            "Utilities/Electric Power Generation, Transmission and Distribution",
            ELECTRICITY_UNIT,
        )
    }
}
