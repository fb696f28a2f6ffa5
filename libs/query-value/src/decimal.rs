use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

/// Wraps `bigdecimal::BigDecimal` so `query-value` controls the `Display`
/// and (de)serialization surface instead of leaking the dependency's own.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn new(inner: BigDecimal) -> Self {
        Decimal(inner)
    }

    pub fn to_f64(&self) -> f64 {
        use bigdecimal::ToPrimitive;
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    pub fn inner(&self) -> &BigDecimal {
        &self.0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Decimal {
    type Err = bigdecimal::ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Decimal(BigDecimal::from_str(s)?))
    }
}

impl From<BigDecimal> for Decimal {
    fn from(d: BigDecimal) -> Self {
        Decimal(d)
    }
}
