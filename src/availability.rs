//! Read-side façade for calendar views and the exact-time picker.

use crate::calendar::{expand, hourly_slots};
use crate::error::StoreError;
use crate::models::HourSlot;
use crate::reconcile::{free_hourly, reconcile, SlotPartition};
use crate::store::{AvailabilityStore, SessionStore};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct AvailabilityService {
    rules: Arc<dyn AvailabilityStore>,
    sessions: Arc<dyn SessionStore>,
    horizon_days: u32,
}

impl AvailabilityService {
    pub fn new(
        rules: Arc<dyn AvailabilityStore>,
        sessions: Arc<dyn SessionStore>,
        horizon_days: u32,
    ) -> Self {
        AvailabilityService {
            rules,
            sessions,
            horizon_days,
        }
    }

    /// Free and occupied slots over the horizon starting at `today`.
    ///
    /// Rules and sessions are fetched on every call.
    pub async fn calendar(&self, practitioner_id: Uuid, today: NaiveDate) -> Result<SlotPartition, StoreError> {
        let rules = self.rules.rules_for(practitioner_id).await?;
        let candidates = expand(&rules, today, self.horizon_days);
        if candidates.is_empty() {
            return Ok(SlotPartition::default());
        }

        let last_day = today + Duration::days(self.horizon_days.saturating_sub(1) as i64);
        let sessions = self
            .sessions
            .sessions_between(practitioner_id, today, last_day)
            .await?;

        let partition = reconcile(&candidates, &sessions);
        debug!(
            %practitioner_id,
            free = partition.free.len(),
            occupied = partition.occupied.len(),
            "Calendar resolved"
        );
        Ok(partition)
    }

    /// Bookable one-hour start times on `date`.
    pub async fn time_picker(&self, practitioner_id: Uuid, date: NaiveDate) -> Result<Vec<HourSlot>, StoreError> {
        let rules = self.rules.rules_for(practitioner_id).await?;
        let slots = hourly_slots(&rules, date);
        if slots.is_empty() {
            return Ok(slots);
        }

        let sessions = self.sessions.sessions_between(practitioner_id, date, date).await?;
        Ok(free_hourly(&slots, &sessions, date))
    }
}
