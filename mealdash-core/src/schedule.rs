//! Delivery schedule and subscription day switching

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::ValidationError;

const DAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
const FULL_DAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Set of weekdays, Monday = bit 0. Stored as a SMALLINT bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeliveryDays(u8);

impl DeliveryDays {
    pub const EMPTY: DeliveryDays = DeliveryDays(0);
    pub const ALL: DeliveryDays = DeliveryDays(0x7f);

    pub fn from_weekdays(days: &[Weekday]) -> Self {
        Self(days.iter().fold(0u8, |acc, d| acc | (1 << d.num_days_from_monday())))
    }

    /// Rebuild from the stored bitmask; bits above Sunday are dropped.
    pub fn from_bits(bits: i16) -> Self {
        Self((bits & 0x7f) as u8)
    }

    pub fn bits(&self) -> i16 {
        self.0 as i16
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when every day in `self` is also in `other`.
    pub fn is_subset_of(&self, other: DeliveryDays) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        (0..7u8)
            .filter(move |i| self.0 & (1 << i) != 0)
            .filter_map(|i| Weekday::try_from(i).ok())
    }

    /// Dates from `start` (inclusive) over `weeks` weeks falling on these days.
    pub fn upcoming(&self, start: NaiveDate, weeks: u32) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take(weeks as usize * 7)
            .filter(|d| self.contains(d.weekday()))
            .collect()
    }
}

impl FromStr for DeliveryDays {
    type Err = ValidationError;

    /// Parse `"mon,wed,fri"` or full day names. Whitespace and case are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = 0u8;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let lower = part.to_lowercase();
            let idx = DAY_NAMES
                .iter()
                .position(|name| lower == *name)
                .or_else(|| FULL_DAY_NAMES.iter().position(|name| lower == *name))
                .ok_or_else(|| ValidationError::InvalidVariant {
                    field: "delivery day",
                    value: part.to_owned(),
                })?;
            bits |= 1 << idx;
        }
        if bits == 0 {
            return Err(ValidationError::Empty {
                field: "delivery days",
            });
        }
        Ok(Self(bits))
    }
}

impl fmt::Display for DeliveryDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = (0..7)
            .filter(|i| self.0 & (1 << i) != 0)
            .map(|i| DAY_NAMES[i])
            .collect();
        f.write_str(&names.join(","))
    }
}

impl TryFrom<String> for DeliveryDays {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeliveryDays> for String {
    fn from(d: DeliveryDays) -> String {
        d.to_string()
    }
}

/// Latest instant changes to a delivery on `date` are accepted:
/// `cutoff_hours` before local midnight of `date`.
pub fn cutoff_for(date: NaiveDate, cutoff_hours: u32, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let local_midnight = match tz.from_local_datetime(&midnight) {
        chrono::LocalResult::Single(t) => t.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(early, _) => early.with_timezone(&Utc),
        // Midnight skipped by a DST jump; fall back to treating it as UTC
        chrono::LocalResult::None => Utc.from_utc_datetime(&midnight),
    };
    local_midnight - Duration::hours(cutoff_hours as i64)
}

/// A delivery already on a subscription's calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDelivery {
    pub date: NaiveDate,
    /// The kitchen or a driver already has it
    pub locked: bool,
}

/// Rules a day switch is checked against
#[derive(Debug, Clone, Copy)]
pub struct SwitchPolicy {
    pub allowed_days: DeliveryDays,
    pub cutoff_hours: u32,
    pub tz: Tz,
}

/// Accepted move of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaySwitch {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Why a day switch was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchRejection {
    #[error("delivery is already on that day")]
    SameDay,

    #[error("no delivery is scheduled on {date}")]
    NotScheduled { date: NaiveDate },

    #[error("the delivery on {date} is already being prepared or dispatched")]
    AlreadyDispatched { date: NaiveDate },

    #[error("deliveries are not offered on {day}")]
    DayNotOffered { day: Weekday },

    #[error("deliveries can only move within the same week")]
    DifferentWeek,

    #[error("a delivery is already scheduled on {date}")]
    AlreadyScheduled { date: NaiveDate },

    #[error("changes closed at {cutoff}")]
    PastCutoff { cutoff: DateTime<Utc> },
}

impl SwitchRejection {
    /// Stable machine-readable reason
    pub fn code(&self) -> &'static str {
        match self {
            Self::SameDay => "same_day",
            Self::NotScheduled { .. } => "not_scheduled",
            Self::AlreadyDispatched { .. } => "already_dispatched",
            Self::DayNotOffered { .. } => "day_not_offered",
            Self::DifferentWeek => "different_week",
            Self::AlreadyScheduled { .. } => "already_scheduled",
            Self::PastCutoff { .. } => "past_cutoff",
        }
    }
}

/// Decide whether the delivery on `from` may move to `to`.
pub fn plan_switch(
    from: NaiveDate,
    to: NaiveDate,
    scheduled: &[ScheduledDelivery],
    policy: &SwitchPolicy,
    now: DateTime<Utc>,
) -> Result<DaySwitch, SwitchRejection> {
    if from == to {
        return Err(SwitchRejection::SameDay);
    }
    let source = scheduled
        .iter()
        .find(|d| d.date == from)
        .ok_or(SwitchRejection::NotScheduled { date: from })?;
    if source.locked {
        return Err(SwitchRejection::AlreadyDispatched { date: from });
    }
    if !policy.allowed_days.contains(to.weekday()) {
        return Err(SwitchRejection::DayNotOffered { day: to.weekday() });
    }
    if from.iso_week() != to.iso_week() {
        return Err(SwitchRejection::DifferentWeek);
    }
    if scheduled.iter().any(|d| d.date == to) {
        return Err(SwitchRejection::AlreadyScheduled { date: to });
    }
    let cutoff = cutoff_for(from.min(to), policy.cutoff_hours, policy.tz);
    if now >= cutoff {
        return Err(SwitchRejection::PastCutoff { cutoff });
    }
    Ok(DaySwitch { from, to })
}
