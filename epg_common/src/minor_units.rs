use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY: &str = "usd";

/// The largest amount a single charge, capture or payout may carry: eight digits of minor units.
pub const MAX_AMOUNT: MinorUnits = MinorUnits(99_999_999);

//--------------------------------------     MinorUnits       --------------------------------------------------------
/// A monetary amount, expressed in the smallest unit of its currency (e.g. cents).
///
/// All fee and ledger arithmetic happens on this type. There is no floating point anywhere in the money path.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, AddAssign, add_assign);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for MinorUnits {
    type Error = MinorUnitsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MinorUnitsConversionError(format!("{value} is too large to convert to MinorUnits")))
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// `ceil(self * bps / 10_000)`, for non-negative amounts. Used for every percentage-based fee and tax.
    ///
    /// Saturates at `i64::MAX`. Amounts up to [`MAX_AMOUNT`] never get there.
    pub fn ceil_basis_points(&self, bps: u32) -> Self {
        let numerator = i128::from(self.0) * i128::from(bps);
        let quotient = numerator.div_euclid(10_000) + i128::from(numerator.rem_euclid(10_000) > 0);
        let saturated = if quotient.is_negative() { i64::MIN } else { i64::MAX };
        Self(i64::try_from(quotient).unwrap_or(saturated))
    }
}
