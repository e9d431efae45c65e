// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Overflow-aware addition for `google.type.Money`-shaped values.
//!
//! Not wired into the in-scope `MetricValue` variant set (that one sticks to
//! bool/int64/double/distribution/string), but kept as a standalone helper
//! for callers that track cost metrics as money.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

const NANOS_PER_UNIT: i64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency_code: String,
    pub units: i64,
    pub nanos: i32,
}

impl Money {
    pub fn new(currency_code: impl Into<String>, units: i64, nanos: i32) -> Result<Self> {
        let m = Self {
            currency_code: currency_code.into(),
            units,
            nanos,
        };
        m.check_valid()?;
        Ok(m)
    }

    /// `nanos` must be in `[-999_999_999, 999_999_999]` and share a sign
    /// with `units` (or be zero).
    pub fn check_valid(&self) -> Result<()> {
        if self.nanos.abs() > 999_999_999 {
            return Err(ControlError::Validation(format!(
                "nanos out of range: {}",
                self.nanos
            )));
        }
        if (self.units > 0 && self.nanos < 0) || (self.units < 0 && self.nanos > 0) {
            return Err(ControlError::Validation(
                "units and nanos must have the same sign".to_string(),
            ));
        }
        Ok(())
    }

    /// Adds `other` to `self`. `allow_overflow` saturates at `i64::MAX`/
    /// `i64::MIN` instead of erroring when the unit sum overflows.
    pub fn add(&self, other: &Money, allow_overflow: bool) -> Result<Money> {
        self.check_valid()?;
        other.check_valid()?;
        if self.currency_code != other.currency_code {
            return Err(ControlError::IncompatibleMerge(format!(
                "cannot add money of different currencies: {} vs {}",
                self.currency_code, other.currency_code
            )));
        }

        let nanos_sum = self.nanos as i64 + other.nanos as i64;
        let (carry, nanos) = if nanos_sum >= NANOS_PER_UNIT {
            (1, nanos_sum - NANOS_PER_UNIT)
        } else if nanos_sum <= -NANOS_PER_UNIT {
            (-1, nanos_sum + NANOS_PER_UNIT)
        } else {
            (0, nanos_sum)
        };

        let units = match self.units.checked_add(other.units).and_then(|u| u.checked_add(carry)) {
            Some(units) => units,
            None if allow_overflow => {
                if other.units > 0 {
                    i64::MAX
                } else {
                    i64::MIN
                }
            }
            None => {
                return Err(ControlError::Overflow(format!(
                    "money addition overflowed: {} + {}",
                    self.units, other.units
                )))
            }
        };

        // Keep units/nanos sign-consistent after the carry.
        let (units, nanos) = if units > 0 && nanos < 0 {
            (units - 1, nanos + NANOS_PER_UNIT)
        } else if units < 0 && nanos > 0 {
            (units + 1, nanos - NANOS_PER_UNIT)
        } else {
            (units, nanos)
        };

        Ok(Money {
            currency_code: self.currency_code.clone(),
            units,
            nanos: nanos as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_combines_units_and_nanos() {
        let a = Money::new("USD", 1, 500_000_000).unwrap();
        let b = Money::new("USD", 2, 600_000_000).unwrap();
        let sum = a.add(&b, false).unwrap();
        assert_eq!(sum.units, 4);
        assert_eq!(sum.nanos, 100_000_000);
    }

    #[test]
    fn add_rejects_mismatched_currency() {
        let a = Money::new("USD", 1, 0).unwrap();
        let b = Money::new("EUR", 1, 0).unwrap();
        assert!(a.add(&b, false).is_err());
    }

    #[test]
    fn add_errors_on_overflow_without_allow_overflow() {
        let a = Money::new("USD", i64::MAX, 0).unwrap();
        let b = Money::new("USD", 1, 0).unwrap();
        assert!(a.add(&b, false).is_err());
    }

    #[test]
    fn add_saturates_on_overflow_with_allow_overflow() {
        let a = Money::new("USD", i64::MAX, 0).unwrap();
        let b = Money::new("USD", 1, 0).unwrap();
        let sum = a.add(&b, true).unwrap();
        assert_eq!(sum.units, i64::MAX);
    }

    #[test]
    fn check_valid_rejects_mismatched_signs() {
        let m = Money {
            currency_code: "USD".to_string(),
            units: 1,
            nanos: -500_000_000,
        };
        assert!(m.check_valid().is_err());
    }
}
