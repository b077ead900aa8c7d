//! Booking transaction coordination.
//!
//! `BookingCoordinator::book_slot` pairs the payment charge with the session
//! write so the caller sees one outcome: either both happened, or the charge
//! was voided, or (the one case needing a human) the void itself failed and a
//! `PartialFailure` carries the payment id out.
//!
//! Once the charge starts it runs on its own task. Dropping the `book_slot`
//! future after that point stops the caller from waiting, not the booking.

use crate::config::BookingConfig;
use crate::error::{BookingError, GatewayError, StoreError, ValidationError};
use crate::gateway::{PaymentDetails, PaymentGateway};
use crate::models::{
    at, parse_wall_clock, Payment, PaymentMethod, PaymentStatus, Session, SessionStatus,
};
use crate::pricing::{PricingPolicy, Quote};
use crate::reconcile::first_conflict;
use crate::store::SessionStore;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A patient's request to book one interval with a practitioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    /// Wall-clock `HH:MM[:SS]` as sent by the client.
    pub start_time: String,
    pub duration_minutes: i64,
    pub payment: PaymentDetails,
}

/// What a successful booking hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub session: Session,
    pub payment: Payment,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    start_time: NaiveTime,
    end_time: NaiveTime,
}

/// Gateway answer accepted for persistence. Offline methods whose
/// authorization timed out carry no transaction id.
#[derive(Debug, Clone)]
struct Charged {
    status: PaymentStatus,
    transaction_id: Option<String>,
}

pub struct BookingCoordinator {
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingPolicy,
    config: BookingConfig,
    // Entries nobody holds or waits on are pruned on the next acquire.
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl BookingCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingPolicy,
        config: BookingConfig,
    ) -> Self {
        BookingCoordinator {
            sessions,
            gateway,
            pricing,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Book a slot: validate, re-check, charge, persist.
    ///
    /// The re-check against freshly fetched sessions rejects most races
    /// early; the store's own overlap guard on insert is what actually
    /// prevents double booking.
    pub async fn book_slot(&self, request: BookingRequest) -> Result<BookingReceipt, BookingError> {
        let interval = self.validate(&request)?;
        let practitioner_id = request.practitioner_id;
        let start = at(request.date, interval.start_time);
        let end = at(request.date, interval.end_time);

        debug!(
            %practitioner_id,
            patient_id = %request.patient_id,
            start = %start.format("%Y-%m-%d %H:%M"),
            end = %end.format("%H:%M"),
            "Booking requested"
        );

        let guard = if self.config.practitioner_locks {
            Some(self.practitioner_lock(practitioner_id).await)
        } else {
            None
        };

        let current = self
            .sessions
            .sessions_between(practitioner_id, request.date, request.date)
            .await
            .map_err(BookingError::Store)?;
        if let Some(existing) = first_conflict(practitioner_id, start, end, &current) {
            warn!(%practitioner_id, conflicting_session = %existing.id, "Requested slot is already booked");
            return Err(BookingError::SlotConflict(format!(
                "{} - {} overlaps session {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%H:%M"),
                existing.id
            )));
        }

        let quote = self.pricing.quote(practitioner_id, request.duration_minutes)?;
        let session = Session::new(
            practitioner_id,
            request.patient_id,
            request.date,
            interval.start_time,
            interval.end_time,
        )?;

        let transaction = Transaction {
            sessions: Arc::clone(&self.sessions),
            gateway: Arc::clone(&self.gateway),
            gateway_timeout: self.config.gateway_timeout,
        };
        let task = tokio::spawn(transaction.run(session, quote, request.payment, start, guard));
        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(%practitioner_id, error = %join_error, "Booking task did not finish");
                Err(BookingError::Store(StoreError::Unavailable(format!(
                    "booking task did not finish: {}",
                    join_error
                ))))
            }
        }
    }

    /// Step 1: everything that can be rejected without touching a store.
    fn validate(&self, request: &BookingRequest) -> Result<Interval, ValidationError> {
        if request.duration_minutes < 1 {
            return Err(ValidationError::new("Duration must be at least 1 minute"));
        }
        if request.duration_minutes > self.config.max_session_minutes {
            return Err(ValidationError::new(format!(
                "Duration cannot exceed {} minutes",
                self.config.max_session_minutes
            )));
        }

        let start_time = parse_wall_clock(&request.start_time)?;
        let (end_time, wrapped) =
            start_time.overflowing_add_signed(Duration::minutes(request.duration_minutes));
        if wrapped != 0 {
            return Err(ValidationError::new("Session must end on the day it starts"));
        }

        request.payment.validate()?;
        Ok(Interval { start_time, end_time })
    }

    async fn practitioner_lock(&self, practitioner_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(practitioner_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Explicit cancellation by patient or practitioner.
    pub async fn cancel_session(&self, session_id: Uuid) -> Result<Session, BookingError> {
        let session = self
            .sessions
            .set_session_status(session_id, SessionStatus::Cancelled)
            .await
            .map_err(BookingError::Store)?;
        info!(%session_id, "Session cancelled");
        Ok(session)
    }

    /// Mark a session as held; driven by the external post-appointment sweep.
    pub async fn complete_session(&self, session_id: Uuid) -> Result<Session, BookingError> {
        let session = self
            .sessions
            .set_session_status(session_id, SessionStatus::Completed)
            .await
            .map_err(BookingError::Store)?;
        info!(%session_id, "Session completed");
        Ok(session)
    }

    /// Record the gateway's final word on a deferred payment.
    pub async fn settle_payment(&self, payment_id: Uuid, succeeded: bool) -> Result<Payment, BookingError> {
        let status = if succeeded {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        let payment = self
            .sessions
            .set_payment_status(payment_id, status)
            .await
            .map_err(BookingError::Store)?;
        info!(%payment_id, status = status.name(), "Payment settled");
        Ok(payment)
    }
}

/// Steps 4 and 5, owned so they can run detached from the caller.
struct Transaction {
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: std::time::Duration,
}

impl Transaction {
    async fn run(
        self,
        mut session: Session,
        quote: Quote,
        details: PaymentDetails,
        start: NaiveDateTime,
        _guard: Option<OwnedMutexGuard<()>>,
    ) -> Result<BookingReceipt, BookingError> {
        let method = details.method();
        let charged = self.authorize(quote.total_amount, method, &details).await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            session_id: Some(session.id),
            amount: quote.amount,
            tax_amount: quote.tax_amount,
            total_amount: quote.total_amount,
            method,
            status: charged.status,
            transaction_id: charged.transaction_id,
            created_at: Utc::now(),
        };
        session.payment_id = Some(payment.id);

        match self.sessions.insert_booking(session.clone(), payment.clone()).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    payment_id = %payment.id,
                    payment_status = payment.status.name(),
                    total = payment.total_amount,
                    "Session booked at {}",
                    start.format("%Y-%m-%d %H:%M")
                );
                Ok(BookingReceipt { session, payment })
            }
            Err(cause) => Err(self.roll_back(&payment, cause).await),
        }
    }

    /// Step 4: charge under a bounded timeout.
    ///
    /// Card and wallet must come back completed. Cash and bank transfer may
    /// stay pending, including when the gateway does not answer in time;
    /// they settle offline.
    async fn authorize(
        &self,
        amount: i64,
        method: PaymentMethod,
        details: &PaymentDetails,
    ) -> Result<Charged, BookingError> {
        let outcome = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.authorize(amount, method, details),
        )
        .await;

        let authorization = match outcome {
            Err(_) if !method.settles_synchronously() => {
                warn!(method = method.name(), amount, "Payment gateway timed out; recording pending payment");
                return Ok(Charged {
                    status: PaymentStatus::Pending,
                    transaction_id: None,
                });
            }
            Err(_) => {
                warn!(method = method.name(), amount, "Payment gateway timed out");
                return Err(BookingError::PaymentAuthorization(GatewayError::Timeout));
            }
            Ok(Err(e)) => {
                warn!(method = method.name(), amount, error = %e, "Payment authorization failed");
                return Err(BookingError::PaymentAuthorization(e));
            }
            Ok(Ok(authorization)) => authorization,
        };

        match authorization.status {
            PaymentStatus::Completed => Ok(Charged {
                status: PaymentStatus::Completed,
                transaction_id: Some(authorization.transaction_id),
            }),
            PaymentStatus::Pending if !method.settles_synchronously() => Ok(Charged {
                status: PaymentStatus::Pending,
                transaction_id: Some(authorization.transaction_id),
            }),
            PaymentStatus::Pending => {
                let transaction_id = authorization.transaction_id;
                warn!(method = method.name(), %transaction_id, "Payment did not complete synchronously");
                match self.void(&transaction_id).await {
                    Ok(()) => Err(BookingError::PaymentAuthorization(GatewayError::Declined(format!(
                        "{} payment did not complete",
                        method.name()
                    )))),
                    Err(void_error) => {
                        // No payment row exists; the id only tags the incident.
                        let payment_id = Uuid::new_v4();
                        error!(
                            %payment_id,
                            %transaction_id,
                            amount,
                            void_error = %void_error,
                            "Unsettled authorization could not be voided; manual reconciliation required"
                        );
                        Err(BookingError::PartialFailure {
                            payment_id,
                            transaction_id,
                            cause: format!("{} payment did not complete; void failed: {}", method.name(), void_error),
                        })
                    }
                }
            }
            PaymentStatus::Failed => {
                warn!(method = method.name(), transaction_id = %authorization.transaction_id, "Payment failed");
                Err(BookingError::PaymentAuthorization(GatewayError::Declined(
                    "gateway reported failure".to_string(),
                )))
            }
        }
    }

    async fn void(&self, transaction_id: &str) -> Result<(), GatewayError> {
        match tokio::time::timeout(self.gateway_timeout, self.gateway.void(transaction_id)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    /// Step 5 failed after the charge: void it and classify the outcome.
    async fn roll_back(&self, payment: &Payment, cause: StoreError) -> BookingError {
        let voided = match payment.transaction_id.as_deref() {
            Some(transaction_id) => self.void(transaction_id).await,
            // Nothing reached the gateway's books.
            None => Ok(()),
        };

        match voided {
            Ok(()) => match cause {
                StoreError::Conflict => {
                    warn!(payment_id = %payment.id, "Slot taken concurrently; payment voided");
                    BookingError::SlotConflict("slot was booked by a concurrent request".to_string())
                }
                other => {
                    warn!(payment_id = %payment.id, error = %other, "Booking not persisted; payment voided");
                    BookingError::BookingPersistence(other)
                }
            },
            Err(void_error) => {
                let transaction_id = payment.transaction_id.clone().unwrap_or_default();
                error!(
                    payment_id = %payment.id,
                    %transaction_id,
                    amount = payment.total_amount,
                    store_error = %cause,
                    void_error = %void_error,
                    "Payment captured without a session; manual reconciliation required"
                );
                BookingError::PartialFailure {
                    payment_id: payment.id,
                    transaction_id,
                    cause: format!("{}; void failed: {}", cause, void_error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookingErrorKind;
    use crate::gateway::SandboxGateway;
    use crate::store::InMemorySessionStore;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn coordinator(store: Arc<InMemorySessionStore>) -> BookingCoordinator {
        BookingCoordinator::new(
            store,
            Arc::new(SandboxGateway::new()),
            PricingPolicy::default(),
            BookingConfig::default(),
        )
    }

    fn request(practitioner_id: Uuid, start: &str, minutes: i64, payment: PaymentDetails) -> BookingRequest {
        BookingRequest {
            practitioner_id,
            patient_id: Uuid::new_v4(),
            date: monday(),
            start_time: start.to_string(),
            duration_minutes: minutes,
            payment,
        }
    }

    #[tokio::test]
    async fn cash_booking_stays_pending() {
        let store = Arc::new(InMemorySessionStore::new());
        let coordinator = coordinator(store.clone());
        let practitioner = Uuid::new_v4();

        let receipt = coordinator
            .book_slot(request(practitioner, "08:00", 60, PaymentDetails::Cash))
            .await
            .unwrap();

        assert_eq!(receipt.session.status, SessionStatus::Scheduled);
        assert_eq!(receipt.payment.status, PaymentStatus::Pending);
        assert_eq!(receipt.session.payment_id, Some(receipt.payment.id));
        assert_eq!(receipt.payment.session_id, Some(receipt.session.id));
        assert_eq!(receipt.payment.total_amount, 5_500);
        assert_eq!(store.payment(receipt.payment.id).await.unwrap(), receipt.payment);
    }

    #[tokio::test]
    async fn overlapping_request_is_rejected_before_payment() {
        let store = Arc::new(InMemorySessionStore::new());
        let coordinator = coordinator(store.clone());
        let practitioner = Uuid::new_v4();
        coordinator
            .book_slot(request(practitioner, "08:00", 60, PaymentDetails::Cash))
            .await
            .unwrap();

        let err = coordinator
            .book_slot(request(practitioner, "08:30", 15, PaymentDetails::Cash))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), BookingErrorKind::SlotConflict);
        assert_eq!(store.all_payments().unwrap().len(), 1);

        // Touching the end of the first session is fine.
        coordinator
            .book_slot(request(practitioner, "09:00", 60, PaymentDetails::Cash))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_requests_never_touch_the_store() {
        let store = Arc::new(InMemorySessionStore::new());
        let coordinator = coordinator(store.clone());
        let practitioner = Uuid::new_v4();

        for bad in [
            request(practitioner, "8 o'clock", 60, PaymentDetails::Cash),
            request(practitioner, "08:00", 0, PaymentDetails::Cash),
            request(practitioner, "08:00", 600, PaymentDetails::Cash),
            request(practitioner, "23:30", 60, PaymentDetails::Cash),
            request(practitioner, "08:00", 60, PaymentDetails::Wallet { account: String::new() }),
        ] {
            let err = coordinator.book_slot(bad).await.unwrap_err();
            assert_eq!(err.kind(), BookingErrorKind::Validation);
        }
        assert!(store.all_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn idle_practitioner_locks_are_pruned() {
        let store = Arc::new(InMemorySessionStore::new());
        let coordinator = coordinator(store);

        for _ in 0..5 {
            coordinator
                .book_slot(request(Uuid::new_v4(), "08:00", 60, PaymentDetails::Cash))
                .await
                .unwrap();
            assert_eq!(coordinator.locks.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let store = Arc::new(InMemorySessionStore::new());
        let coordinator = coordinator(store.clone());
        let receipt = coordinator
            .book_slot(request(Uuid::new_v4(), "10:00:00", 45, PaymentDetails::Cash))
            .await
            .unwrap();

        let settled = coordinator.settle_payment(receipt.payment.id, true).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
        assert!(coordinator.settle_payment(receipt.payment.id, false).await.is_err());

        let cancelled = coordinator.cancel_session(receipt.session.id).await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        let err = coordinator.complete_session(receipt.session.id).await.unwrap_err();
        assert_eq!(err.kind(), BookingErrorKind::Store);
    }
}
