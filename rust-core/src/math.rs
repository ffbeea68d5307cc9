// Currency arithmetic shared by the give and donate scripts.
// Fees are computed exactly in wide integers and never round down.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fractional digits a fee rate keeps (the host UI allows e.g. `2.5`).
pub const FEE_RATE_SCALE: i64 = 10_000;

/// Fee rate in percent, stored as ten-thousandths of a percent so that a
/// decimal rate from the settings file is exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeeRate(i64);

impl FeeRate {
    pub const fn from_percent(percent: i64) -> Self {
        Self(percent.saturating_mul(FEE_RATE_SCALE))
    }

    /// Rounds to four fractional digits. None for NaN, infinities and values
    /// outside the representable range.
    pub fn from_f64(percent: f64) -> Option<Self> {
        if !percent.is_finite() {
            return None;
        }
        let scaled = (percent * FEE_RATE_SCALE as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(scaled as i64))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / FEE_RATE_SCALE as f64
    }

    /// ceil(amount * rate / 100), zero for a non-positive rate or amount.
    /// Saturates at `i64::MAX` instead of wrapping.
    pub fn fee_on(self, amount: i64) -> i64 {
        if self.0 <= 0 || amount <= 0 {
            return 0;
        }
        let scaled = i128::from(amount) * i128::from(self.0);
        let denom = 100 * i128::from(FEE_RATE_SCALE);
        let fee = (scaled + denom - 1) / denom;
        i64::try_from(fee).unwrap_or(i64::MAX)
    }
}

impl Serialize for FeeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % FEE_RATE_SCALE == 0 {
            serializer.serialize_i64(self.0 / FEE_RATE_SCALE)
        } else {
            serializer.serialize_f64(self.as_f64())
        }
    }
}

impl<'de> Deserialize<'de> for FeeRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        let rate = match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Some(FeeRate::from_percent(n)),
            Raw::Float(f) => FeeRate::from_f64(f),
            Raw::Text(s) => s.trim().parse::<f64>().ok().and_then(FeeRate::from_f64),
        };
        rate.ok_or_else(|| D::Error::custom("fee rate must be a finite number of percent"))
    }
}

/// Transfer fee for a whole-percent rate: ceil(amount * rate / 100).
/// Zero for a non-positive rate or amount.
pub fn calculate_fee(amount: i64, fee_rate_percent: i64) -> i64 {
    FeeRate::from_percent(fee_rate_percent).fee_on(amount)
}

/// Goal progress: floor(value / goal * 100), clamped to 0..=100.
/// A non-positive goal has no meaningful progress and reports 0.
pub fn progress_percent(value: i64, goal: i64) -> u8 {
    if goal <= 0 || value <= 0 {
        return 0;
    }
    let pct = (i128::from(value) * 100) / i128::from(goal);
    pct.min(100) as u8
}
