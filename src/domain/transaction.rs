use {
    super::money::MoneyAmount,
    super::problem::Problem,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Transaction type as reported by the provider.
///
/// Unrecognised types are kept as `Other` so the projector can reject them
/// explicitly instead of failing at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionType {
    Verification,
    Authorization,
    Capture,
    Sale,
    Cancellation,
    Reversal,
    Other(String),
}

impl TransactionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Verification => "Verification",
            Self::Authorization => "Authorization",
            Self::Capture => "Capture",
            Self::Sale => "Sale",
            Self::Cancellation => "Cancellation",
            Self::Reversal => "Reversal",
            Self::Other(other) => other,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for TransactionType {
    fn from(s: &str) -> Self {
        match s {
            "Verification" => Self::Verification,
            "Authorization" => Self::Authorization,
            "Capture" => Self::Capture,
            "Sale" => Self::Sale,
            "Cancellation" => Self::Cancellation,
            "Reversal" => Self::Reversal,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TransactionType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<TransactionType> for String {
    fn from(t: TransactionType) -> String {
        t.as_str().to_string()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Initialized,
    AwaitingActivity,
    Pending,
    Completed,
    Failed,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::AwaitingActivity => "AwaitingActivity",
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for TransactionState {
    type Error = super::error::ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "Initialized" => Ok(Self::Initialized),
            "AwaitingActivity" => Ok(Self::AwaitingActivity),
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(super::error::ReconcileError::Validation(format!(
                "unknown transaction state: {other}"
            ))),
        }
    }
}

/// One provider transaction, parsed once at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub state: TransactionState,
    pub number: u64,
    #[serde(default)]
    pub amount: MoneyAmount,
    #[serde(default)]
    pub vat_amount: MoneyAmount,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payee_reference: Option<String>,
    #[serde(default)]
    pub problem: Option<Problem>,
    // Legacy failure fields, superseded by `problem`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_error_description: Option<String>,
}

impl Transaction {
    pub fn is_initialized(&self) -> bool {
        self.state == TransactionState::Initialized
    }

    pub fn is_awaiting_activity(&self) -> bool {
        self.state == TransactionState::AwaitingActivity
    }

    pub fn is_pending(&self) -> bool {
        self.state == TransactionState::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.state == TransactionState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == TransactionState::Failed
    }

    /// Human-readable failure reason for order notes.
    pub fn failed_details(&self) -> String {
        if let Some(problem) = &self.problem {
            return problem.to_string();
        }

        if let Some(reason) = self.failed_reason.as_deref().filter(|r| !r.is_empty()) {
            return [
                reason,
                self.failed_error_code.as_deref().unwrap_or_default(),
                self.failed_error_description.as_deref().unwrap_or_default(),
            ]
            .join("; ");
        }

        "Transaction has been failed, no details".to_string()
    }
}
