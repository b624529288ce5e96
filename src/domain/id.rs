use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::ReconcileError;

/// Store-side order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Result<Self, ReconcileError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ReconcileError::Validation("OrderId must not be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Payment resource path (`/psp/creditcard/payments/<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Result<Self, ReconcileError> {
        let id = id.into();
        if !id.starts_with("/psp/") || id.starts_with("/psp/paymentorders/") {
            return Err(ReconcileError::Validation(format!(
                "PaymentId must be a /psp/ payment resource, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Payment order resource path (`/psp/paymentorders/<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentOrderId(String);

impl PaymentOrderId {
    pub fn new(id: impl Into<String>) -> Result<Self, ReconcileError> {
        let id = id.into();
        if !id.starts_with("/psp/paymentorders/") {
            return Err(ReconcileError::Validation(format!(
                "PaymentOrderId must start with /psp/paymentorders/, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
