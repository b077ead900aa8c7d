//! Data models for the booking core.
//!
//! This module defines the core data structures used throughout the system:
//! - DayOfWeek: the only day representation inside the core
//! - AvailabilityRule: a practitioner's recurring weekly window
//! - Session: a concrete booked appointment
//! - CandidateSlot: a derived, never persisted bookable interval
//! - Payment: money attached to a session

use crate::error::ValidationError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days of the week, Sunday first as exchanged with the availability API.
///
/// Localised labels are mapped onto this enum at the boundary by
/// `from_label`; the core never compares day strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    pub fn from_chrono(weekday: Weekday) -> Self {
        DayOfWeek::ALL[weekday.num_days_from_sunday() as usize]
    }

    pub fn to_chrono(self) -> Weekday {
        match self {
            DayOfWeek::Sunday => Weekday::Sun,
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
        }
    }

    /// Day of week of a calendar date.
    pub fn of(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::from_chrono(date.weekday())
    }

    /// Convert a day label to a DayOfWeek.
    ///
    /// Accepts English names and abbreviations and Spanish names in any
    /// case, with or without accents ("MIÉRCOLES" and "MIERCOLES" are the
    /// same day).
    pub fn from_label(value: &str) -> Result<Self, ValidationError> {
        let folded: String = value
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'á' | 'à' => 'a',
                'é' | 'è' => 'e',
                'í' => 'i',
                'ó' => 'o',
                'ú' | 'ü' => 'u',
                other => other,
            })
            .collect();

        match folded.as_str() {
            "sunday" | "sun" | "domingo" => Ok(DayOfWeek::Sunday),
            "monday" | "mon" | "lunes" => Ok(DayOfWeek::Monday),
            "tuesday" | "tue" | "martes" => Ok(DayOfWeek::Tuesday),
            "wednesday" | "wed" | "miercoles" => Ok(DayOfWeek::Wednesday),
            "thursday" | "thu" | "jueves" => Ok(DayOfWeek::Thursday),
            "friday" | "fri" | "viernes" => Ok(DayOfWeek::Friday),
            "saturday" | "sat" | "sabado" => Ok(DayOfWeek::Saturday),
            _ => Err(ValidationError::new(format!("Invalid day of week: '{}'", value))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }

    pub fn label_es(&self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "DOMINGO",
            DayOfWeek::Monday => "LUNES",
            DayOfWeek::Tuesday => "MARTES",
            DayOfWeek::Wednesday => "MIÉRCOLES",
            DayOfWeek::Thursday => "JUEVES",
            DayOfWeek::Friday => "VIERNES",
            DayOfWeek::Saturday => "SÁBADO",
        }
    }
}

/// Parse a boundary wall-clock string (`HH:MM` or `HH:MM:SS`).
///
/// Seconds are accepted and dropped; the core works at minute precision.
pub fn parse_wall_clock(value: &str) -> Result<NaiveTime, ValidationError> {
    let value = value.trim();
    let parsed = NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ValidationError::new(format!("Invalid time '{}', expected HH:MM[:SS]", value)))?;
    Ok(truncate_to_minute(parsed))
}

pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Combine a calendar date with a wall-clock time.
pub fn at(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// Half-open interval overlap; touching endpoints do not overlap.
pub fn intervals_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// A practitioner's recurring weekly availability window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub active: bool,
}

impl AvailabilityRule {
    /// Create a new active rule with validation.
    pub fn new(
        practitioner_id: Uuid,
        day_of_week: DayOfWeek,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, ValidationError> {
        let start_time = truncate_to_minute(start_time);
        let end_time = truncate_to_minute(end_time);
        if start_time >= end_time {
            return Err(ValidationError::new("Rule start time must be before end time"));
        }

        Ok(AvailabilityRule {
            id: Uuid::new_v4(),
            practitioner_id,
            day_of_week,
            start_time,
            end_time,
            active: true,
        })
    }

    /// Build a rule from boundary values: a day label and `HH:MM` strings.
    pub fn from_labels(
        practitioner_id: Uuid,
        day: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<Self, ValidationError> {
        let day_of_week = DayOfWeek::from_label(day)?;
        let start = parse_wall_clock(start_time)?;
        let end = parse_wall_clock(end_time)?;
        Self::new(practitioner_id, day_of_week, start, end)
    }

    /// Edited copy with a new day and window; id, owner and active flag carry over.
    pub fn with_window(
        &self,
        day_of_week: DayOfWeek,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, ValidationError> {
        let fresh = Self::new(self.practitioner_id, day_of_week, start_time, end_time)?;
        Ok(AvailabilityRule {
            id: self.id,
            active: self.active,
            ..fresh
        })
    }

    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.active && self.day_of_week == DayOfWeek::of(date)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// `scheduled -> {completed, cancelled}`; both targets are terminal.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Scheduled, SessionStatus::Completed)
                | (SessionStatus::Scheduled, SessionStatus::Cancelled)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// A booked appointment between a practitioner and a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SessionStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a scheduled session with validation.
    pub fn new(
        practitioner_id: Uuid,
        patient_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, ValidationError> {
        if start_time >= end_time {
            return Err(ValidationError::new("Session start time must be before end time"));
        }

        Ok(Session {
            id: Uuid::new_v4(),
            practitioner_id,
            patient_id,
            date,
            start_time,
            end_time,
            status: SessionStatus::Scheduled,
            payment_id: None,
            created_at: Utc::now(),
        })
    }

    pub fn start(&self) -> NaiveDateTime {
        at(self.date, self.start_time)
    }

    pub fn end(&self) -> NaiveDateTime {
        at(self.date, self.end_time)
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == SessionStatus::Scheduled
    }

    /// Whether this session blocks `[start, end)` for its practitioner.
    pub fn blocks(&self, practitioner_id: Uuid, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.is_scheduled()
            && self.practitioner_id == practitioner_id
            && intervals_overlap(start, end, self.start(), self.end())
    }
}

/// A concrete bookable interval derived from a rule on a given date.
///
/// Produced fresh on every expansion and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub practitioner_id: Uuid,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub source_rule_id: Uuid,
}

impl CandidateSlot {
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        intervals_overlap(self.start, self.end, start, end)
    }
}

/// One-hour granule offered by the exact-time picker.
pub type HourSlot = CandidateSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Wallet,
    Cash,
    BankTransfer,
}

impl PaymentMethod {
    /// Card and wallet payments must complete before a session is created.
    /// Cash and bank transfers settle later and do not block booking.
    pub fn settles_synchronously(&self) -> bool {
        matches!(self, PaymentMethod::Card | PaymentMethod::Wallet)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// `pending -> {completed, failed}`; both targets are terminal.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Money attached to a session. Amounts are integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub session_id: Option<Uuid>,
    pub amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_labels_fold_case_and_accents() {
        assert_eq!(DayOfWeek::from_label("MIÉRCOLES").unwrap(), DayOfWeek::Wednesday);
        assert_eq!(DayOfWeek::from_label("miercoles").unwrap(), DayOfWeek::Wednesday);
        assert_eq!(DayOfWeek::from_label(" Sábado ").unwrap(), DayOfWeek::Saturday);
        assert_eq!(DayOfWeek::from_label("mon").unwrap(), DayOfWeek::Monday);
        assert!(DayOfWeek::from_label("someday").is_err());
    }

    #[test]
    fn day_of_date_is_sunday_based() {
        // 2024-01-01 was a Monday.
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(DayOfWeek::of(date), DayOfWeek::Monday);
        for day in DayOfWeek::ALL {
            assert_eq!(DayOfWeek::from_chrono(day.to_chrono()), day);
        }
    }

    #[test]
    fn wall_clock_accepts_seconds_and_truncates() {
        assert_eq!(parse_wall_clock("08:30").unwrap(), time(8, 30));
        assert_eq!(parse_wall_clock("08:30:45").unwrap(), time(8, 30));
        assert!(parse_wall_clock("8h30").is_err());
        assert!(parse_wall_clock("25:00").is_err());
    }

    #[test]
    fn rule_requires_start_before_end() {
        let practitioner = Uuid::new_v4();
        assert!(AvailabilityRule::new(practitioner, DayOfWeek::Monday, time(9, 0), time(9, 0)).is_err());
        assert!(AvailabilityRule::new(practitioner, DayOfWeek::Monday, time(10, 0), time(9, 0)).is_err());

        let rule = AvailabilityRule::from_labels(practitioner, "LUNES", "08:00", "09:30").unwrap();
        assert_eq!(rule.day_of_week, DayOfWeek::Monday);
        assert_eq!(rule.duration_minutes(), 90);
        assert!(rule.active);
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!intervals_overlap(
            at(date, time(8, 0)),
            at(date, time(9, 0)),
            at(date, time(9, 0)),
            at(date, time(10, 0)),
        ));
        assert!(intervals_overlap(
            at(date, time(8, 0)),
            at(date, time(9, 0)),
            at(date, time(8, 30)),
            at(date, time(8, 45)),
        ));
    }

    #[test]
    fn status_machines_only_leave_initial_state() {
        assert!(SessionStatus::Scheduled.can_transition_to(SessionStatus::Cancelled));
        assert!(SessionStatus::Scheduled.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Cancelled.can_transition_to(SessionStatus::Scheduled));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Cancelled));

        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Completed));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn cancelled_session_does_not_block() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let practitioner = Uuid::new_v4();
        let mut session = Session::new(practitioner, Uuid::new_v4(), date, time(8, 0), time(9, 0)).unwrap();
        assert!(session.blocks(practitioner, at(date, time(8, 30)), at(date, time(9, 30))));
        assert!(!session.blocks(Uuid::new_v4(), at(date, time(8, 30)), at(date, time(9, 30))));
        session.status = SessionStatus::Cancelled;
        assert!(!session.blocks(practitioner, at(date, time(8, 30)), at(date, time(9, 30))));
    }
}
