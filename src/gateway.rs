//! Payment gateway contract and a deterministic sandbox implementation.

use crate::error::{GatewayError, ValidationError};
use crate::models::{PaymentMethod, PaymentStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Method-specific payment fields as submitted by the patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    Card {
        holder: String,
        number: String,
        expiry_month: u32,
        expiry_year: u32,
        cvv: String,
    },
    Wallet {
        account: String,
    },
    Cash,
    BankTransfer {
        reference: String,
    },
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentDetails::Card { .. } => PaymentMethod::Card,
            PaymentDetails::Wallet { .. } => PaymentMethod::Wallet,
            PaymentDetails::Cash => PaymentMethod::Cash,
            PaymentDetails::BankTransfer { .. } => PaymentMethod::BankTransfer,
        }
    }

    /// Check the fields each method requires.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            PaymentDetails::Card {
                holder,
                number,
                expiry_month,
                expiry_year: _,
                cvv,
            } => {
                if holder.trim().is_empty() {
                    return Err(ValidationError::new("Card holder cannot be empty"));
                }
                let compact: String = number.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
                let digits: Option<Vec<u32>> = compact.chars().map(|c| c.to_digit(10)).collect();
                let digits = digits.ok_or_else(|| ValidationError::new("Card number must be numeric"))?;
                if !(12..=19).contains(&digits.len()) {
                    return Err(ValidationError::new("Card number must have 12 to 19 digits"));
                }
                if !luhn_valid(&digits) {
                    return Err(ValidationError::new("Card number failed checksum"));
                }
                if !(1..=12).contains(expiry_month) {
                    return Err(ValidationError::new("Card expiry month must be 1-12"));
                }
                if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ValidationError::new("Card CVV must be 3 or 4 digits"));
                }
                Ok(())
            }
            PaymentDetails::Wallet { account } => {
                if account.trim().is_empty() {
                    return Err(ValidationError::new("Wallet account cannot be empty"));
                }
                Ok(())
            }
            PaymentDetails::Cash => Ok(()),
            PaymentDetails::BankTransfer { reference } => {
                if reference.trim().is_empty() {
                    return Err(ValidationError::new("Bank transfer reference cannot be empty"));
                }
                Ok(())
            }
        }
    }
}

/// Outcome of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub status: PaymentStatus,
    pub transaction_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize and capture `amount` (minor units).
    async fn authorize(
        &self,
        amount: i64,
        method: PaymentMethod,
        details: &PaymentDetails,
    ) -> Result<Authorization, GatewayError>;

    /// Release a previous authorization.
    async fn void(&self, transaction_id: &str) -> Result<(), GatewayError>;
}

/// Gateway that settles card and wallet payments immediately and leaves
/// offline methods pending. Never declines.
#[derive(Debug, Default)]
pub struct SandboxGateway {
    voided: Mutex<Vec<String>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voided(&self) -> Vec<String> {
        self.voided.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn authorize(
        &self,
        amount: i64,
        method: PaymentMethod,
        _details: &PaymentDetails,
    ) -> Result<Authorization, GatewayError> {
        let status = if method.settles_synchronously() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        };
        let transaction_id = format!("sbx_{}", Uuid::new_v4().simple());
        info!(amount, method = method.name(), %transaction_id, "Sandbox authorization");
        Ok(Authorization { status, transaction_id })
    }

    async fn void(&self, transaction_id: &str) -> Result<(), GatewayError> {
        self.voided
            .lock()
            .map_err(|_| GatewayError::Unavailable("sandbox ledger poisoned".to_string()))?
            .push(transaction_id.to_string());
        Ok(())
    }
}
