//! Fixed-point currency and commission rates.
//!
//! Amounts are stored as signed minor units (cents) so that settlement
//! arithmetic never touches floating point. Commission rates are basis
//! points (1 bp = 0.01%).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Money amount in cents (to avoid floating point issues)
///
/// Signed, because intermediate settlement figures such as net earnings can
/// legitimately dip below zero when refunds exceed delivered sales.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Money(i64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a new money amount from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new money amount from whole currency units
    #[must_use]
    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    /// Returns the value in cents
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checks if this amount is strictly positive
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checks if this amount is negative
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// Saturates at the `i64` bounds. Checkout validates line totals with
    /// [`Money::checked_times`], so stored items never reach them.
    #[must_use]
    #[allow(clippy::cast_lossless)] // `i64::from` is not const
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as i64))
    }

    /// `self × quantity`, or `None` on overflow
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn checked_times(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as i64) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// `self + rhs`, or `None` on overflow
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// `self - rhs`, or `None` on overflow
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Clamps negative amounts to zero
    #[must_use]
    pub const fn clamp_non_negative(self) -> Self {
        if self.0 < 0 { Self(0) } else { self }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Commission rate in basis points (10_000 bp = 100%).
///
/// The rate is snapshotted onto each order item at checkout; later changes to
/// a vendor's rate never touch historical items.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// 100% expressed in basis points
    pub const MAX_BASIS_POINTS: u32 = 10_000;

    /// Creates a rate from basis points
    #[must_use]
    pub const fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    /// Creates a rate from whole percent (10 → 10%)
    #[must_use]
    pub const fn from_percent(percent: u32) -> Self {
        Self(percent * 100)
    }

    /// Returns the rate in basis points
    #[must_use]
    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Whether the rate is within 0–100%
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 <= Self::MAX_BASIS_POINTS
    }

    /// Commission owed on a gross amount, rounded half away from zero to the
    /// nearest cent.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // bounded by |gross| since rate <= 100%
    pub const fn commission_on(self, gross: Money) -> Money {
        let scaled = gross.cents() as i128 * self.0 as i128;
        let denom = Self::MAX_BASIS_POINTS as i128;
        let half = denom / 2;
        let rounded = if scaled >= 0 {
            (scaled + half) / denom
        } else {
            (scaled - half) / denom
        };
        Money::from_cents(rounded as i64)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
