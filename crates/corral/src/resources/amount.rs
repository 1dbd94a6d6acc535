use derive_more::{Add, AddAssign, Sum};
use serde::{Deserialize, Serialize};

pub type ResourceUnits = u64;
pub type ResourceFractions = u32;

pub const FRACTIONS_PER_UNIT: ResourceFractions = 1_000;
pub const FRACTIONS_MAX_DIGITS: usize = 3; // = log10(FRACTIONS_PER_UNIT)

/// Fixed-point scalar quantity with millis precision.
///
/// Ledger arithmetic never touches floating point; JSON numbers are
/// converted at the boundary and round to the nearest millis.
/// There is intentionally no `Sub` impl, subtraction goes through
/// `checked_sub` so an underflow is always an explicit condition.
#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Default,
    Add,
    AddAssign,
    Sum,
)]
#[serde(transparent)]
pub struct ResourceAmount(u64);

impl ResourceAmount {
    pub const ZERO: ResourceAmount = ResourceAmount(0);

    pub fn new(units: ResourceUnits, fractions: ResourceFractions) -> Self {
        assert!(fractions < FRACTIONS_PER_UNIT);
        ResourceAmount(units * FRACTIONS_PER_UNIT as u64 + fractions as u64)
    }

    pub fn new_units(units: ResourceUnits) -> Self {
        ResourceAmount(units * FRACTIONS_PER_UNIT as u64)
    }

    /// Converts a JSON scalar. Negative and non-finite values are rejected.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let fractions = (value * FRACTIONS_PER_UNIT as f64).round();
        if fractions > u64::MAX as f64 {
            return None;
        }
        Some(ResourceAmount(fractions as u64))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / FRACTIONS_PER_UNIT as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn units(&self) -> ResourceUnits {
        self.0 / FRACTIONS_PER_UNIT as u64
    }

    pub fn fractions(&self) -> ResourceFractions {
        (self.0 % FRACTIONS_PER_UNIT as u64) as ResourceFractions
    }

    pub fn checked_sub(&self, other: ResourceAmount) -> Option<ResourceAmount> {
        self.0.checked_sub(other.0).map(ResourceAmount)
    }
}

impl std::fmt::Display for ResourceAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let fractions = self.fractions();
        write!(f, "{}", self.units())?;
        if fractions != 0 {
            let num = format!("{:01$}", fractions, FRACTIONS_MAX_DIGITS);
            write!(f, ".{}", num.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ResourceAmount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || format!("invalid resource amount: {s:?}");
        let (units, fractions) = match s.split_once('.') {
            Some((units, frac)) => {
                if frac.is_empty() || frac.len() > FRACTIONS_MAX_DIGITS {
                    return Err(err());
                }
                let scale = 10u32.pow((FRACTIONS_MAX_DIGITS - frac.len()) as u32);
                let frac: ResourceFractions = frac.parse().map_err(|_| err())?;
                (units, frac * scale)
            }
            None => (s, 0),
        };
        let units: ResourceUnits = units.parse().map_err(|_| err())?;
        Ok(ResourceAmount::new(units, fractions))
    }
}
