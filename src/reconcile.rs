//! Conflict reconciliation between candidate slots and booked sessions.

use crate::models::{CandidateSlot, HourSlot, Session};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

/// Candidates split by whether a scheduled session overlaps them.
///
/// Every candidate lands in exactly one of the two lists, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotPartition {
    pub free: Vec<CandidateSlot>,
    pub occupied: Vec<CandidateSlot>,
}

impl SlotPartition {
    pub fn len(&self) -> usize {
        self.free.len() + self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First scheduled session of `practitioner_id` overlapping `[start, end)`.
pub fn first_conflict(
    practitioner_id: Uuid,
    start: NaiveDateTime,
    end: NaiveDateTime,
    sessions: &[Session],
) -> Option<&Session> {
    sessions
        .iter()
        .find(|session| session.blocks(practitioner_id, start, end))
}

pub fn is_interval_free(
    practitioner_id: Uuid,
    start: NaiveDateTime,
    end: NaiveDateTime,
    sessions: &[Session],
) -> bool {
    first_conflict(practitioner_id, start, end, sessions).is_none()
}

/// Partition candidates into free and occupied.
///
/// A candidate is occupied iff a scheduled session of the same practitioner
/// overlaps it (half-open test, so touching endpoints stay free). Neither
/// input is modified. The result is advisory: a booking re-checks against a
/// fresh session list.
pub fn reconcile(candidates: &[CandidateSlot], sessions: &[Session]) -> SlotPartition {
    let mut partition = SlotPartition::default();

    for candidate in candidates {
        if is_interval_free(candidate.practitioner_id, candidate.start, candidate.end, sessions) {
            partition.free.push(candidate.clone());
        } else {
            partition.occupied.push(candidate.clone());
        }
    }

    partition
}

/// Hour granules on `date` that no scheduled session touches.
///
/// Sessions are narrowed to the same calendar date before the overlap test.
pub fn free_hourly(slots: &[HourSlot], sessions: &[Session], date: NaiveDate) -> Vec<HourSlot> {
    let same_day: Vec<&Session> = sessions.iter().filter(|s| s.date == date).collect();

    slots
        .iter()
        .filter(|slot| slot.date() == date)
        .filter(|slot| {
            !same_day
                .iter()
                .any(|session| session.blocks(slot.practitioner_id, slot.start, slot.end))
        })
        .cloned()
        .collect()
}
