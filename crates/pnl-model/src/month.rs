//! Calendar months and the twelve-month value rows every node carries

use chrono::{Datelike, NaiveDate};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ModelError;

/// A calendar month, rendered as `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Returns `None` unless `month` is in 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    fn index(self) -> usize {
        (self.month - 1) as usize
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;

        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !all_digits(year) || !all_digits(month) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Month::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// The twelve months of `year`, January first
pub fn months_of(year: i32) -> impl Iterator<Item = Month> {
    (1..=12).map(move |month| Month { year, month })
}

/// `numerator / denominator * 100`, or 0 when the ratio is undefined
pub fn percent_of(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    finite_or_zero(numerator / denominator * 100.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

// =============================================================================
// Month Values
// =============================================================================

/// One amount per month of a single year, always fully populated.
///
/// Amounts are stored in a fixed array so a row can never be sparse or carry
/// a month from another year. Non-finite inputs are stored as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthValues {
    year: i32,
    amounts: [f64; 12],
}

impl MonthValues {
    pub fn zeroed(year: i32) -> Self {
        Self {
            year,
            amounts: [0.0; 12],
        }
    }

    pub fn from_fn(year: i32, mut f: impl FnMut(Month) -> f64) -> Self {
        let mut values = Self::zeroed(year);
        for month in months_of(year) {
            values.amounts[month.index()] = finite_or_zero(f(month));
        }
        values
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Amount for `month`; months outside the year read as zero
    pub fn get(&self, month: Month) -> f64 {
        if month.year != self.year {
            return 0.0;
        }
        self.amounts[month.index()]
    }

    /// Adds `amount` to `month`. Returns false (and changes nothing) when the
    /// month belongs to another year.
    pub fn accumulate(&mut self, month: Month, amount: f64) -> bool {
        if month.year != self.year {
            return false;
        }
        let slot = &mut self.amounts[month.index()];
        *slot = finite_or_zero(*slot + finite_or_zero(amount));
        true
    }

    pub fn set(&mut self, month: Month, amount: f64) -> bool {
        if month.year != self.year {
            return false;
        }
        self.amounts[month.index()] = finite_or_zero(amount);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (Month, f64)> + '_ {
        months_of(self.year).map(|month| (month, self.amounts[month.index()]))
    }

    pub fn total(&self) -> f64 {
        self.amounts.iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.amounts.iter().all(|amount| *amount == 0.0)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::from_fn(self.year, |month| f(self.get(month)))
    }

    /// Month-by-month combination; `other` is read in this row's year
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        debug_assert_eq!(self.year, other.year, "combining rows of different years");
        Self::from_fn(self.year, |month| f(self.get(month), other.get(month)))
    }

    /// Per-month `self / denominator * 100`, zero where undefined
    pub fn percent_of(&self, denominator: &Self) -> Self {
        self.zip_with(denominator, percent_of)
    }
}

impl Add for MonthValues {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a + b)
    }
}

impl Sub for MonthValues {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.zip_with(&rhs, |a, b| a - b)
    }
}

impl AddAssign for MonthValues {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for MonthValues {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f64> for MonthValues {
    type Output = Self;

    fn mul(self, factor: f64) -> Self {
        self.map(|amount| amount * factor)
    }
}

impl Neg for MonthValues {
    type Output = Self;

    fn neg(self) -> Self {
        self.map(|amount| -amount)
    }
}

impl Serialize for MonthValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(12))?;
        for (month, amount) in self.iter() {
            map.serialize_entry(&month, &amount)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MonthValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<Month, f64>::deserialize(deserializer)?;
        let year = entries
            .keys()
            .next()
            .map(|month| month.year)
            .ok_or_else(|| de::Error::custom("month values must cover at least one month"))?;

        let mut values = MonthValues::zeroed(year);
        for (month, amount) in entries {
            if !values.set(month, amount) {
                return Err(de::Error::custom(format!(
                    "month {} does not belong to {}",
                    month, year
                )));
            }
        }
        Ok(values)
    }
}
