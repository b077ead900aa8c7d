//! Error types for the booking core.
//!
//! Every failure a booking can hit is a typed outcome. Callers branch on
//! `BookingError::kind()`; `PartialFailure` in particular must never be folded
//! into a generic message because money has moved without a session.

use crate::models::{PaymentStatus, SessionStatus};
use thiserror::Error;
use uuid::Uuid;

/// Malformed input. Never touches a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError(message.into())
    }
}

/// A status change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Session(SessionStatus, SessionStatus),
    Payment(PaymentStatus, PaymentStatus),
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Session(from, to) => write!(f, "session {} -> {}", from.name(), to.name()),
            Transition::Payment(from, to) => write!(f, "payment {} -> {}", from.name(), to.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Interval overlaps an existing scheduled session")]
    Conflict,

    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(Transition),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment gateway timed out")]
    Timeout,

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Discriminant of `BookingError`, for presentation code that only needs to
/// pick a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingErrorKind {
    Validation,
    SlotConflict,
    PaymentAuthorization,
    BookingPersistence,
    PartialFailure,
    Store,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Slot conflict: {0}")]
    SlotConflict(String),

    #[error("Payment authorization failed: {0}")]
    PaymentAuthorization(#[source] GatewayError),

    /// Payment was voided after the session write failed.
    #[error("Booking could not be persisted: {0}")]
    BookingPersistence(#[source] StoreError),

    /// A charge may be held at the gateway with no session behind it and
    /// the void failed. Needs manual reconciliation.
    #[error("Payment {payment_id} needs manual reconciliation: {cause}")]
    PartialFailure {
        payment_id: Uuid,
        transaction_id: String,
        cause: String,
    },

    /// Read failure before any payment was attempted.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl BookingError {
    pub fn kind(&self) -> BookingErrorKind {
        match self {
            BookingError::Validation(_) => BookingErrorKind::Validation,
            BookingError::SlotConflict(_) => BookingErrorKind::SlotConflict,
            BookingError::PaymentAuthorization(_) => BookingErrorKind::PaymentAuthorization,
            BookingError::BookingPersistence(_) => BookingErrorKind::BookingPersistence,
            BookingError::PartialFailure { .. } => BookingErrorKind::PartialFailure,
            BookingError::Store(_) => BookingErrorKind::Store,
        }
    }

    /// Whether the caller may resubmit the whole booking (possibly after
    /// correcting input or picking another slot).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BookingError::PartialFailure { .. })
    }
}
