use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const SCALE: u16 = 100;
const MAX_HUNDREDTHS: u16 = 100 * SCALE;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PercentError {
    #[error("percentage must be between 0 and 100, got {0}")]
    OutOfRange(f64),

    #[error("percentage must be a finite number")]
    NotFinite,
}

/// A percentage in `[0, 100]` with two decimal places.
///
/// Stored as hundredths of a percent so comparisons and recalculation are exact:
/// `Percent::from_hundredths(6667)` is `66.67`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percent(u16);

impl Percent {
    pub const ZERO: Percent = Percent(0);
    pub const HUNDRED: Percent = Percent(MAX_HUNDREDTHS);

    /// Builds a percentage from hundredths of a percent.
    ///
    /// # Errors
    ///
    /// Returns `PercentError::OutOfRange` when the value exceeds `10000`.
    pub fn from_hundredths(hundredths: u16) -> Result<Self, PercentError> {
        if hundredths > MAX_HUNDREDTHS {
            return Err(PercentError::OutOfRange(f64::from(hundredths) / f64::from(SCALE)));
        }
        Ok(Self(hundredths))
    }

    /// Builds a percentage from a whole number, e.g. a threshold of `50`.
    ///
    /// # Errors
    ///
    /// Returns `PercentError::OutOfRange` when the value exceeds `100`.
    pub fn whole(value: u8) -> Result<Self, PercentError> {
        Self::from_hundredths(u16::from(value) * SCALE)
    }

    /// Parses a user-supplied percentage, rounding half-up to two decimals.
    ///
    /// # Errors
    ///
    /// Returns `PercentError` for non-finite input or values outside `[0, 100]`.
    pub fn from_f64(value: f64) -> Result<Self, PercentError> {
        if !value.is_finite() {
            return Err(PercentError::NotFinite);
        }
        if !(0.0..=100.0).contains(&value) {
            return Err(PercentError::OutOfRange(value));
        }
        let scaled = (value * f64::from(SCALE)).round();
        // `scaled` is within 0..=10000 after the range check above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hundredths = scaled as u16;
        Self::from_hundredths(hundredths)
    }

    /// `part / whole` expressed as a percentage, rounded half-up to two decimals.
    ///
    /// A zero `whole` yields `0.00`; results above `100` are clamped.
    #[must_use]
    pub fn ratio(part: u64, whole: u64) -> Self {
        if whole == 0 {
            return Self::ZERO;
        }
        let numerator = u128::from(part) * u128::from(MAX_HUNDREDTHS) * 2 + u128::from(whole);
        let hundredths = numerator / (u128::from(whole) * 2);
        let clamped = hundredths.min(u128::from(MAX_HUNDREDTHS));
        // clamped <= 10000
        #[allow(clippy::cast_possible_truncation)]
        Self(clamped as u16)
    }

    #[must_use]
    pub fn hundredths(self) -> u16 {
        self.0
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / f64::from(SCALE)
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self.0 == MAX_HUNDREDTHS
    }
}

impl fmt::Debug for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Percent({self})")
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / SCALE, self.0 % SCALE)
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Percent::from_f64(value).map_err(serde::de::Error::custom)
    }
}
