//! Store contracts consumed by the booking core, with in-memory backends.
//!
//! The authoritative double-booking guard lives in `SessionStore::insert_booking`:
//! an implementation must refuse a scheduled session that overlaps another
//! scheduled session of the same practitioner, atomically with the write.

use crate::error::{StoreError, Transition};
use crate::models::{AvailabilityRule, Payment, PaymentStatus, Session, SessionStatus};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Read side of the availability CRUD API.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn rules_for(&self, practitioner_id: Uuid) -> Result<Vec<AvailabilityRule>, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Sessions of a practitioner dated within `[from, to]`, any status.
    async fn sessions_between(
        &self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Session>, StoreError>;

    /// Persist a session and its payment as one unit.
    ///
    /// Fails with `StoreError::Conflict` when the session overlaps a
    /// scheduled session of the same practitioner; nothing is written then.
    async fn insert_booking(&self, session: Session, payment: Payment) -> Result<(), StoreError>;

    async fn session(&self, id: Uuid) -> Result<Session, StoreError>;

    async fn payment(&self, id: Uuid) -> Result<Payment, StoreError>;

    async fn set_session_status(&self, id: Uuid, status: SessionStatus) -> Result<Session, StoreError>;

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

/// Availability rules held in memory, with the practitioner-facing CRUD.
#[derive(Debug, Default)]
pub struct InMemoryAvailabilityStore {
    rules: Mutex<HashMap<Uuid, AvailabilityRule>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, StoreError> {
        lock(&self.rules)?.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// Replace a stored rule with an edited copy (see `AvailabilityRule::with_window`).
    pub fn update_rule(&self, updated: AvailabilityRule) -> Result<AvailabilityRule, StoreError> {
        let mut rules = lock(&self.rules)?;
        let existing = rules.get_mut(&updated.id).ok_or(StoreError::NotFound(updated.id))?;
        *existing = updated;
        Ok(existing.clone())
    }

    /// Soft enable or disable a rule.
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<AvailabilityRule, StoreError> {
        let mut rules = lock(&self.rules)?;
        let rule = rules.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        rule.active = active;
        Ok(rule.clone())
    }

    pub fn remove_rule(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(lock(&self.rules)?.remove(&id).is_some())
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn rules_for(&self, practitioner_id: Uuid) -> Result<Vec<AvailabilityRule>, StoreError> {
        let mut rules: Vec<AvailabilityRule> = lock(&self.rules)?
            .values()
            .filter(|rule| rule.practitioner_id == practitioner_id)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| (rule.day_of_week, rule.start_time, rule.id));
        Ok(rules)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    sessions: HashMap<Uuid, Session>,
    payments: HashMap<Uuid, Payment>,
}

/// Sessions and payments held in memory behind a single lock, so the
/// overlap check and the write in `insert_booking` are one critical section.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    ledger: Mutex<Ledger>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session ever written, sorted by start.
    pub fn all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = lock(&self.ledger)?.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| (s.start(), s.id));
        Ok(sessions)
    }

    pub fn all_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<Payment> = lock(&self.ledger)?.payments.values().cloned().collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn sessions_between(
        &self,
        practitioner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = lock(&self.ledger)?
            .sessions
            .values()
            .filter(|s| s.practitioner_id == practitioner_id && s.date >= from && s.date <= to)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.start(), s.id));
        Ok(sessions)
    }

    async fn insert_booking(&self, session: Session, payment: Payment) -> Result<(), StoreError> {
        let mut ledger = lock(&self.ledger)?;

        if session.is_scheduled()
            && ledger
                .sessions
                .values()
                .any(|existing| existing.blocks(session.practitioner_id, session.start(), session.end()))
        {
            return Err(StoreError::Conflict);
        }

        debug!(session_id = %session.id, payment_id = %payment.id, "Persisting booking");
        ledger.payments.insert(payment.id, payment);
        ledger.sessions.insert(session.id, session);
        Ok(())
    }

    async fn session(&self, id: Uuid) -> Result<Session, StoreError> {
        lock(&self.ledger)?
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn payment(&self, id: Uuid) -> Result<Payment, StoreError> {
        lock(&self.ledger)?
            .payments
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn set_session_status(&self, id: Uuid, status: SessionStatus) -> Result<Session, StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let session = ledger.sessions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !session.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition(Transition::Session(session.status, status)));
        }
        session.status = status;
        Ok(session.clone())
    }

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError> {
        let mut ledger = lock(&self.ledger)?;
        let payment = ledger.payments.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !payment.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition(Transition::Payment(payment.status, status)));
        }
        payment.status = status;
        Ok(payment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayOfWeek, PaymentMethod};
    use chrono::{NaiveTime, Utc};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn booking(practitioner: Uuid, start: NaiveTime, end: NaiveTime) -> (Session, Payment) {
        let mut session = Session::new(practitioner, Uuid::new_v4(), monday(), start, end).unwrap();
        let payment = Payment {
            id: Uuid::new_v4(),
            session_id: Some(session.id),
            amount: 5000,
            tax_amount: 500,
            total_amount: 5500,
            method: PaymentMethod::Cash,
            status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: Utc::now(),
        };
        session.payment_id = Some(payment.id);
        (session, payment)
    }

    #[tokio::test]
    async fn overlapping_insert_is_rejected_atomically() {
        let store = InMemorySessionStore::new();
        let practitioner = Uuid::new_v4();
        let (first, first_payment) = booking(practitioner, time(8, 0), time(9, 0));
        store.insert_booking(first, first_payment).await.unwrap();

        let (clash, clash_payment) = booking(practitioner, time(8, 30), time(9, 30));
        let clash_payment_id = clash_payment.id;
        assert_eq!(store.insert_booking(clash, clash_payment).await, Err(StoreError::Conflict));
        assert_eq!(store.payment(clash_payment_id).await, Err(StoreError::NotFound(clash_payment_id)));

        let (adjacent, adjacent_payment) = booking(practitioner, time(9, 0), time(10, 0));
        store.insert_booking(adjacent, adjacent_payment).await.unwrap();
        assert_eq!(store.all_sessions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_sessions_free_their_interval() {
        let store = InMemorySessionStore::new();
        let practitioner = Uuid::new_v4();
        let (first, first_payment) = booking(practitioner, time(8, 0), time(9, 0));
        let first_id = first.id;
        store.insert_booking(first, first_payment).await.unwrap();

        store.set_session_status(first_id, SessionStatus::Cancelled).await.unwrap();
        let (again, again_payment) = booking(practitioner, time(8, 0), time(9, 0));
        store.insert_booking(again, again_payment).await.unwrap();

        // Cancelled sessions stay on record.
        let all = store.sessions_between(practitioner, monday(), monday()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn status_changes_follow_lifecycle() {
        let store = InMemorySessionStore::new();
        let (session, payment) = booking(Uuid::new_v4(), time(8, 0), time(9, 0));
        let (session_id, payment_id) = (session.id, payment.id);
        store.insert_booking(session, payment).await.unwrap();

        store.set_session_status(session_id, SessionStatus::Completed).await.unwrap();
        let err = store.set_session_status(session_id, SessionStatus::Cancelled).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));

        store.set_payment_status(payment_id, PaymentStatus::Completed).await.unwrap();
        assert!(store.set_payment_status(payment_id, PaymentStatus::Failed).await.is_err());

        let missing = Uuid::new_v4();
        assert_eq!(store.session(missing).await, Err(StoreError::NotFound(missing)));
    }

    #[tokio::test]
    async fn availability_crud_round_trip() {
        let store = InMemoryAvailabilityStore::new();
        let practitioner = Uuid::new_v4();
        let rule = store
            .add_rule(AvailabilityRule::new(practitioner, DayOfWeek::Monday, time(8, 0), time(9, 0)).unwrap())
            .unwrap();
        store
            .add_rule(AvailabilityRule::new(Uuid::new_v4(), DayOfWeek::Monday, time(8, 0), time(9, 0)).unwrap())
            .unwrap();

        assert_eq!(store.rules_for(practitioner).await.unwrap().len(), 1);

        let updated = store
            .update_rule(rule.with_window(DayOfWeek::Tuesday, time(10, 0), time(12, 0)).unwrap())
            .unwrap();
        assert_eq!(updated.id, rule.id);
        assert_eq!(updated.day_of_week, DayOfWeek::Tuesday);
        assert!(rule.with_window(DayOfWeek::Tuesday, time(12, 0), time(10, 0)).is_err());

        assert!(!store.set_active(rule.id, false).unwrap().active);
        assert!(store.remove_rule(rule.id).unwrap());
        assert!(store.rules_for(practitioner).await.unwrap().is_empty());
    }
}
