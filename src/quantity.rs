//! Physical quantities and the units that measure them.
//!
//! Every flow is measured in one of the units listed here. The units of a quantity form a unit
//! group in the exported package, with conversion factors relative to the group's reference unit.
use strum::Display;

/// A physical quantity, exported as an openLCA flow property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Quantity {
    /// Energy, in MJ
    Energy,
    /// Mass, in kg
    Mass,
    /// Volume, in m3
    Volume,
    /// Radioactivity, in kBq
    Radioactivity,
    /// Number of items
    #[strum(to_string = "Number of items")]
    Items,
}

impl Quantity {
    /// The name of the unit group holding this quantity's units
    pub fn unit_group_name(self) -> &'static str {
        match self {
            Self::Energy => "Units of energy",
            Self::Mass => "Units of mass",
            Self::Volume => "Units of volume",
            Self::Radioactivity => "Units of radioactivity",
            Self::Items => "Units of items",
        }
    }

    /// The unit in which the other units of the group are expressed
    pub fn reference_unit(self) -> &'static Unit {
        match self {
            Self::Energy => &UNITS[0],
            Self::Mass => &UNITS[7],
            Self::Volume => &UNITS[13],
            Self::Radioactivity => &UNITS[16],
            Self::Items => &UNITS[18],
        }
    }

    /// All known units of this quantity
    pub fn units(self) -> impl Iterator<Item = &'static Unit> {
        UNITS.iter().filter(move |unit| unit.quantity == self)
    }
}

/// A unit of measurement
#[derive(Debug, PartialEq)]
pub struct Unit {
    /// The unit's symbol, as used in flow lists (e.g. "kg")
    pub name: &'static str,
    /// What the unit measures
    pub quantity: Quantity,
    /// How many reference units one of this unit is
    pub conversion_factor: f64,
}

const fn unit(name: &'static str, quantity: Quantity, conversion_factor: f64) -> Unit {
    Unit {
        name,
        quantity,
        conversion_factor,
    }
}

static UNITS: [Unit; 19] = [
    unit("MJ", Quantity::Energy, 1.0),
    unit("kJ", Quantity::Energy, 0.001),
    unit("GJ", Quantity::Energy, 1000.0),
    unit("kWh", Quantity::Energy, 3.6),
    unit("MWh", Quantity::Energy, 3600.0),
    unit("GWh", Quantity::Energy, 3.6e6),
    unit("MMBtu", Quantity::Energy, 1055.056),
    unit("kg", Quantity::Mass, 1.0),
    unit("g", Quantity::Mass, 0.001),
    unit("mg", Quantity::Mass, 1e-6),
    unit("t", Quantity::Mass, 1000.0),
    unit("lb", Quantity::Mass, 0.453_592_37),
    unit("sh tn", Quantity::Mass, 907.184_74),
    unit("m3", Quantity::Volume, 1.0),
    unit("l", Quantity::Volume, 0.001),
    unit("gal", Quantity::Volume, 0.003_785_411_784),
    unit("kBq", Quantity::Radioactivity, 1.0),
    unit("Bq", Quantity::Radioactivity, 0.001),
    unit("Item(s)", Quantity::Items, 1.0),
];

/// Look up a unit by its symbol.
///
/// Symbols are case sensitive ("mg" and "Mg" are different units).
pub fn find_unit(name: &str) -> Option<&'static Unit> {
    UNITS.iter().find(|unit| unit.name == name)
}
