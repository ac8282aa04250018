use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the three user-editable duration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeField {
    Hours,
    Minutes,
    Seconds,
}

impl TimeField {
    /// Number of distinct values before the field wraps.
    pub fn modulus(self) -> i64 {
        match self {
            TimeField::Hours => 24,
            TimeField::Minutes | TimeField::Seconds => 60,
        }
    }
}

impl FromStr for TimeField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "hour" | "hours" => Ok(TimeField::Hours),
            "m" | "min" | "minute" | "minutes" => Ok(TimeField::Minutes),
            "s" | "sec" | "second" | "seconds" => Ok(TimeField::Seconds),
            other => Err(format!("unknown time field: {other}")),
        }
    }
}

/// The hours/minutes/seconds the user has dialed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dial {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Dial {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    /// Split a duration into fields. Hours are not capped.
    pub fn from_secs(total: u64) -> Self {
        Self {
            hours: u32::try_from(total / 3600).unwrap_or(u32::MAX),
            minutes: ((total % 3600) / 60) as u32,
            seconds: (total % 60) as u32,
        }
    }

    pub fn total_secs(&self) -> u64 {
        u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }

    pub fn get(&self, field: TimeField) -> u32 {
        match field {
            TimeField::Hours => self.hours,
            TimeField::Minutes => self.minutes,
            TimeField::Seconds => self.seconds,
        }
    }

    /// Step one field by `delta`, wrapping in both directions. The other
    /// fields are untouched.
    pub fn adjusted(mut self, field: TimeField, delta: i32) -> Self {
        let current = i64::from(self.get(field));
        let wrapped = (current + i64::from(delta)).rem_euclid(field.modulus()) as u32;
        match field {
            TimeField::Hours => self.hours = wrapped,
            TimeField::Minutes => self.minutes = wrapped,
            TimeField::Seconds => self.seconds = wrapped,
        }
        self
    }
}

impl fmt::Display for Dial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// `HH:MM:SS` for a remaining time, rounding partial seconds up so the label
/// only reads `00:00:00` once the time is really over.
pub fn format_remaining(remaining_secs: f64) -> String {
    let whole = remaining_secs.max(0.0).ceil() as u64;
    Dial::from_secs(whole).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hours_wrap_forward() {
        let dial = Dial::new(23, 0, 0).adjusted(TimeField::Hours, 1);
        assert_eq!(dial.hours, 0);
    }

    #[test]
    fn minutes_and_seconds_wrap_backward() {
        let dial = Dial::new(0, 0, 0)
            .adjusted(TimeField::Minutes, -1)
            .adjusted(TimeField::Seconds, -1);
        assert_eq!(dial, Dial::new(0, 59, 59));
    }

    #[test]
    fn from_secs_splits_fields() {
        assert_eq!(Dial::from_secs(3725), Dial::new(1, 2, 5));
        assert_eq!(Dial::from_secs(90_000).hours, 25);
    }

    #[test]
    fn field_names_parse() {
        assert_eq!("h".parse::<TimeField>(), Ok(TimeField::Hours));
        assert_eq!("Minutes".parse::<TimeField>(), Ok(TimeField::Minutes));
        assert_eq!("sec".parse::<TimeField>(), Ok(TimeField::Seconds));
        assert!("day".parse::<TimeField>().is_err());
    }

    #[test]
    fn remaining_label_rounds_up() {
        assert_eq!(format_remaining(1500.0), "00:25:00");
        assert_eq!(format_remaining(0.2), "00:00:01");
        assert_eq!(format_remaining(-3.0), "00:00:00");
        assert_eq!(format_remaining(3661.5), "01:01:02");
    }

    proptest! {
        #[test]
        fn adjust_stays_in_range(h in 0u32..24, m in 0u32..60, s in 0u32..60, delta in -500i32..500) {
            let dial = Dial::new(h, m, s);
            for field in [TimeField::Hours, TimeField::Minutes, TimeField::Seconds] {
                let next = dial.adjusted(field, delta);
                prop_assert!(i64::from(next.get(field)) < field.modulus());
                let expected = (i64::from(dial.get(field)) + i64::from(delta)).rem_euclid(field.modulus());
                prop_assert_eq!(i64::from(next.get(field)), expected);
            }
        }

        #[test]
        fn adjust_up_then_down_is_identity(h in 0u32..24, m in 0u32..60, s in 0u32..60, delta in -100i32..100) {
            let dial = Dial::new(h, m, s);
            for field in [TimeField::Hours, TimeField::Minutes, TimeField::Seconds] {
                prop_assert_eq!(dial.adjusted(field, delta).adjusted(field, -delta), dial);
            }
        }
    }
}
