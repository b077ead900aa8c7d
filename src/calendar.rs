//! Slot expansion for practitioner calendars.
//!
//! Turns recurring weekly rules into concrete candidate slots. Two shapes are
//! produced: one coarse slot per rule per day for the calendar overlay, and
//! fixed one-hour granules for the exact-time picker. Everything here is pure
//! and recomputed on every call.

use crate::models::{at, AvailabilityRule, CandidateSlot, HourSlot};
use chrono::{Duration, NaiveDate};
use tracing::debug;

/// Default forward window, in days, used for calendar display.
pub const DEFAULT_HORIZON_DAYS: u32 = 28;

/// Length of a time-picker granule.
pub const HOUR_SLOT_MINUTES: i64 = 60;

fn sort_slots(slots: &mut [CandidateSlot]) {
    slots.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.source_rule_id.cmp(&b.source_rule_id))
    });
}

/// Coarse slots for a single day: the whole rule window becomes one slot.
pub fn daily_slots(rules: &[AvailabilityRule], date: NaiveDate) -> Vec<CandidateSlot> {
    let mut slots: Vec<CandidateSlot> = rules
        .iter()
        .filter(|rule| rule.applies_on(date))
        .map(|rule| CandidateSlot {
            practitioner_id: rule.practitioner_id,
            start: at(date, rule.start_time),
            end: at(date, rule.end_time),
            source_rule_id: rule.id,
        })
        .collect();
    sort_slots(&mut slots);
    slots
}

/// Expand rules over `[horizon_start, horizon_start + horizon_days)`.
///
/// Output is sorted by start time, then by rule id, so identical inputs
/// always produce identical output.
pub fn expand(
    rules: &[AvailabilityRule],
    horizon_start: NaiveDate,
    horizon_days: u32,
) -> Vec<CandidateSlot> {
    let mut all_slots = Vec::new();
    let mut current_date = horizon_start;

    for _ in 0..horizon_days {
        all_slots.extend(daily_slots(rules, current_date));
        current_date = match current_date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    sort_slots(&mut all_slots);
    debug!(
        rules = rules.len(),
        horizon_days,
        slots = all_slots.len(),
        "Expanded availability rules"
    );
    all_slots
}

/// Expand over the default horizon starting at `today`.
pub fn expand_from(rules: &[AvailabilityRule], today: NaiveDate) -> Vec<CandidateSlot> {
    expand(rules, today, DEFAULT_HORIZON_DAYS)
}

/// Hourly granules for the exact-time picker on `date`.
///
/// Each matching rule is walked from its start time in one-hour steps; a
/// trailing partial hour is dropped. Identical granules coming from
/// overlapping rules are reported once, attributed to the lowest rule id.
pub fn hourly_slots(rules: &[AvailabilityRule], date: NaiveDate) -> Vec<HourSlot> {
    let step = Duration::minutes(HOUR_SLOT_MINUTES);
    let mut slots = Vec::new();

    for rule in rules.iter().filter(|rule| rule.applies_on(date)) {
        let end = at(date, rule.end_time);
        let mut current = at(date, rule.start_time);

        while current + step <= end {
            let slot_end = current + step;
            slots.push(HourSlot {
                practitioner_id: rule.practitioner_id,
                start: current,
                end: slot_end,
                source_rule_id: rule.id,
            });
            current = slot_end;
        }
    }

    sort_slots(&mut slots);
    slots.dedup_by(|later, earlier| later.start == earlier.start && later.end == earlier.end);
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayOfWeek;
    use chrono::{NaiveTime, Timelike};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2024-01-01 was a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn rule(practitioner: Uuid, day: DayOfWeek, start: NaiveTime, end: NaiveTime) -> AvailabilityRule {
        AvailabilityRule::new(practitioner, day, start, end).unwrap()
    }

    #[test]
    fn one_monday_rule_yields_one_slot_per_week() {
        let practitioner = Uuid::new_v4();
        let rules = vec![rule(practitioner, DayOfWeek::Monday, time(8, 0), time(9, 0))];

        let slots = expand(&rules, monday(), 7);

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start, at(monday(), time(8, 0)));
        assert_eq!(slots[0].end, at(monday(), time(9, 0)));
        assert_eq!(slots[0].source_rule_id, rules[0].id);
    }

    #[test]
    fn default_horizon_covers_four_weeks() {
        let practitioner = Uuid::new_v4();
        let rules = vec![
            rule(practitioner, DayOfWeek::Monday, time(8, 0), time(12, 0)),
            rule(practitioner, DayOfWeek::Thursday, time(14, 0), time(18, 0)),
        ];

        let slots = expand_from(&rules, monday());

        assert_eq!(slots.len(), 8);
        assert!(slots.windows(2).all(|w| w[0].start <= w[1].start));
        let last_day = monday() + Duration::days(DEFAULT_HORIZON_DAYS as i64);
        assert!(slots.iter().all(|s| s.date() < last_day));
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let practitioner = Uuid::new_v4();
        let mut disabled = rule(practitioner, DayOfWeek::Monday, time(8, 0), time(9, 0));
        disabled.active = false;

        assert!(expand(&[disabled.clone()], monday(), 14).is_empty());
        assert!(hourly_slots(&[disabled], monday()).is_empty());
    }

    #[test]
    fn same_start_ties_break_on_rule_id() {
        let practitioner = Uuid::new_v4();
        let a = rule(practitioner, DayOfWeek::Monday, time(8, 0), time(9, 0));
        let b = rule(practitioner, DayOfWeek::Monday, time(8, 0), time(10, 0));

        let forward = expand(&[a.clone(), b.clone()], monday(), 1);
        let backward = expand(&[b, a], monday(), 1);

        assert_eq!(forward, backward);
        assert!(forward[0].source_rule_id < forward[1].source_rule_id);
    }

    #[test]
    fn hourly_granules_drop_partial_last_hour() {
        let practitioner = Uuid::new_v4();
        let rules = vec![rule(practitioner, DayOfWeek::Monday, time(8, 0), time(10, 30))];

        let slots = hourly_slots(&rules, monday());

        let starts: Vec<u32> = slots.iter().map(|s| s.start.hour()).collect();
        assert_eq!(starts, vec![8, 9]);
        assert!(slots.iter().all(|s| s.duration() == Duration::hours(1)));
        assert!(hourly_slots(&rules, monday() + Duration::days(1)).is_empty());
    }

    #[test]
    fn hourly_granules_follow_odd_rule_start() {
        let practitioner = Uuid::new_v4();
        let rules = vec![rule(practitioner, DayOfWeek::Monday, time(8, 30), time(10, 45))];

        let slots = hourly_slots(&rules, monday());

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start, at(monday(), time(8, 30)));
        assert_eq!(slots[1].end, at(monday(), time(10, 30)));
    }

    #[test]
    fn overlapping_rules_do_not_duplicate_granules() {
        let practitioner = Uuid::new_v4();
        let rules = vec![
            rule(practitioner, DayOfWeek::Monday, time(8, 0), time(10, 0)),
            rule(practitioner, DayOfWeek::Monday, time(9, 0), time(11, 0)),
        ];

        let slots = hourly_slots(&rules, monday());

        let starts: Vec<u32> = slots.iter().map(|s| s.start.hour()).collect();
        assert_eq!(starts, vec![8, 9, 10]);
    }

    fn arb_rule(practitioner: Uuid) -> impl Strategy<Value = AvailabilityRule> {
        (0usize..7, 0u32..22, 1u32..3, any::<bool>()).prop_map(move |(day, start, len, active)| {
            let mut rule = AvailabilityRule::new(
                practitioner,
                DayOfWeek::ALL[day],
                time(start, 0),
                time(start + len, 0),
            )
            .unwrap();
            rule.active = active;
            rule
        })
    }

    proptest! {
        #[test]
        fn expansion_is_deterministic(
            rules in proptest::collection::vec(arb_rule(Uuid::from_u128(7)), 0..12),
            offset in 0i64..365,
            days in 0u32..60,
        ) {
            let start = monday() + Duration::days(offset);
            let first = expand(&rules, start, days);
            let second = expand(&rules, start, days);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.windows(2).all(|w| (w[0].start, w[0].source_rule_id) <= (w[1].start, w[1].source_rule_id)));
            prop_assert!(first.iter().all(|slot| rules.iter().any(|r| r.id == slot.source_rule_id && r.active)));
        }
    }
}
