use std::collections::HashSet;

use serde::Serialize;

use crate::constants::{SLOT_DAY_END, SLOT_DAY_START, SLOT_INTERVAL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub time: String,
    pub booked: bool,
}

/// Every bookable label in a day, `09:00` through `21:00` inclusive.
pub fn day_labels() -> impl Iterator<Item = String> {
    (SLOT_DAY_START..=SLOT_DAY_END)
        .step_by(SLOT_INTERVAL as usize)
        .map(|m| format!("{:02}:{:02}", m / 60, m % 60))
}

/// Flags each label by membership in `booked`. Staff are not considered: a label is booked
/// if any appointment on the day holds it.
pub fn mark_booked(booked: &[String]) -> Vec<Slot> {
    let booked = booked.iter().map(String::as_str).collect::<HashSet<_>>();
    day_labels()
        .map(|time| Slot {
            booked: booked.contains(time.as_str()),
            time,
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_day_grid() {
        let labels = day_labels().collect::<Vec<_>>();
        assert_eq!(labels.len(), 25);
        assert_eq!(labels.first().map(String::as_str), Some("09:00"));
        assert_eq!(labels[1], "09:30");
        assert_eq!(labels.last().map(String::as_str), Some("21:00"));
    }

    #[test]
    fn test_mark_booked() {
        let slots = mark_booked(&["14:00".to_string(), "07:00".to_string()]);
        assert_eq!(slots.len(), 25);
        assert_eq!(slots.iter().filter(|s| s.booked).count(), 1);
        assert!(slots.iter().any(|s| s.time == "14:00" && s.booked));
    }
}
