use {
    super::error::ReconcileError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Amount in minor currency units (öre, cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub const ZERO: MoneyAmount = MoneyAmount(0);

    pub fn new(cents: i64) -> Result<Self, ReconcileError> {
        if cents < 0 {
            return Err(ReconcileError::Validation(format!(
                "MoneyAmount cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }

    /// Like `checked_sub` but floors at zero.
    pub fn saturating_sub(self, other: MoneyAmount) -> MoneyAmount {
        self.checked_sub(other).unwrap_or(Self::ZERO)
    }
}

impl TryFrom<i64> for MoneyAmount {
    type Error = ReconcileError;

    fn try_from(cents: i64) -> Result<Self, Self::Error> {
        Self::new(cents)
    }
}

impl From<MoneyAmount> for i64 {
    fn from(amount: MoneyAmount) -> i64 {
        amount.0
    }
}

/// Major units with two decimals: `79600` renders as `796.00`.
impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
