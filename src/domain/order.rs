use {
    super::error::ReconcileError,
    super::id::{OrderId, PaymentId, PaymentOrderId},
    super::money::MoneyAmount,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Authorized,
    Captured,
    Cancelled,
    Refunded,
    Failed,
    Unknown,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether moving from `self` to `next` follows the order lifecycle.
    ///
    /// Re-asserting the current status is always allowed (the store turns it
    /// into a note). `Unknown` accepts anything because the store could not
    /// map its own status. A failed order may still recover when the shopper
    /// retries and a later authorization or sale completes.
    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        use OrderStatus::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Unknown, _)
                | (Pending, Authorized | Captured | Cancelled | Refunded | Failed)
                | (Authorized, Captured | Cancelled | Refunded | Failed)
                | (Captured, Refunded)
                | (Failed, Authorized | Captured)
        )
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Captured | Self::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "authorized" => Ok(Self::Authorized),
            "captured" => Ok(Self::Captured),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(ReconcileError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Checkout,
    CreditCard,
    Invoice,
    Swish,
    MobilePay,
    Vipps,
    Trustly,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::CreditCard => "cc",
            Self::Invoice => "invoice",
            Self::Swish => "swish",
            Self::MobilePay => "mobilepay",
            Self::Vipps => "vipps",
            Self::Trustly => "trustly",
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = ReconcileError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "checkout" => Ok(Self::Checkout),
            "cc" => Ok(Self::CreditCard),
            "invoice" => Ok(Self::Invoice),
            "swish" => Ok(Self::Swish),
            "mobilepay" => Ok(Self::MobilePay),
            "vipps" => Ok(Self::Vipps),
            "trustly" => Ok(Self::Trustly),
            other => Err(ReconcileError::Validation(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// Snapshot of a store order, as returned by the order store.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<PaymentId>,
    pub payment_order_id: Option<PaymentOrderId>,
    pub amount: MoneyAmount,
    pub vat_amount: MoneyAmount,
    pub customer_id: Option<String>,
    pub needs_save_token: bool,
}

impl Order {
    pub fn is_checkout(&self) -> bool {
        self.payment_method == PaymentMethod::Checkout
    }

    pub fn require_payment_id(&self) -> Result<&PaymentId, ReconcileError> {
        self.payment_id
            .as_ref()
            .ok_or_else(|| ReconcileError::MissingCorrelationId {
                order_id: self.order_id.to_string(),
                field: "payment id",
            })
    }

    pub fn require_payment_order_id(&self) -> Result<&PaymentOrderId, ReconcileError> {
        self.payment_order_id
            .as_ref()
            .ok_or_else(|| ReconcileError::MissingCorrelationId {
                order_id: self.order_id.to_string(),
                field: "payment order id",
            })
    }

    /// Resource whose payment info answers capture/cancel/refund questions:
    /// the payment order for Checkout, the payment otherwise.
    pub fn info_resource(&self) -> Result<&str, ReconcileError> {
        if self.is_checkout() {
            Ok(self.require_payment_order_id()?.as_str())
        } else {
            Ok(self.require_payment_id()?.as_str())
        }
    }
}
