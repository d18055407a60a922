//! This module defines the unit types used for quantities reported by facilities.
//!
//! Release flows carry arbitrary units (taken from the flow list), so they are plain `f64`s. The
//! quantities the pipeline reasons about directly get their own types so they can't be mixed up.
use serde::{Deserialize, Serialize};
use std::iter::Sum;

/// Conversion factor from MWh of electricity to MMBtu
pub const MMBTU_PER_MWH: f64 = 3.412_142;

macro_rules! unit_struct {
    ($name:ident, $unit:literal) => {
        #[doc = concat!("A quantity measured in ", $unit, ".")]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Default,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::Display,
        )]
        #[serde(transparent)]
        pub struct $name(pub f64);

        impl $name {
            /// Create a new quantity from an `f64`
            pub fn new(value: f64) -> Self {
                Self(value)
            }

            /// The raw value of the quantity
            pub fn value(self) -> f64 {
                self.0
            }

            /// Whether the quantity is finite
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div for $name {
            type Output = Dimensionless;
            fn div(self, rhs: $name) -> Dimensionless {
                Dimensionless(self.0 / rhs.0)
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                $name(iter.map(|x| x.0).sum())
            }
        }
    };
}

unit_struct!(Dimensionless, "dimensionless units");
unit_struct!(Energy, "MWh");
unit_struct!(HeatInput, "MMBtu");

impl Energy {
    /// The heat equivalent of this amount of electricity
    pub fn to_heat(self) -> HeatInput {
        HeatInput(self.0 * MMBTU_PER_MWH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_energy_ratio_is_dimensionless() {
        let ratio = Energy(100.0) / Energy(400.0);
        assert_eq!(ratio, Dimensionless(0.25));
        assert_eq!(Energy(400.0) * ratio, Energy(100.0));
    }

    #[test]
    fn test_sum() {
        let total: Energy = [Energy(1.0), Energy(2.5)].into_iter().sum();
        assert_eq!(total, Energy(3.5));
    }

    #[test]
    fn test_to_heat() {
        assert_approx_eq!(f64, Energy(1.0).to_heat().value(), MMBTU_PER_MWH);
    }
}
