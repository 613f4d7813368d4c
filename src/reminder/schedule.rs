//! Reminder schedules: daily or weekly at a wall-clock time, in the shop's
//! local business time. Matching is edge-triggered against the window
//! between two scheduler ticks, so tick cadence never changes what fires.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid reminder rule: {0}")]
    InvalidRule(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Daily,
    Weekly,
}

/// `{ "type": "daily", "time": "09:00" }` or
/// `{ "type": "weekly", "time": "09:00", "days": [1, 4] }` with days
/// numbered 1 (Monday) through 7 (Sunday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSchedule {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    pub time: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub days: BTreeSet<u8>,
}

impl ReminderSchedule {
    pub fn daily(time: &str) -> Self {
        Self {
            schedule_type: ScheduleType::Daily,
            time: time.to_string(),
            days: BTreeSet::new(),
        }
    }

    pub fn weekly(time: &str, days: impl IntoIterator<Item = u8>) -> Self {
        Self {
            schedule_type: ScheduleType::Weekly,
            time: time.to_string(),
            days: days.into_iter().collect(),
        }
    }

    pub fn parse_time(&self) -> Result<NaiveTime, ScheduleError> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").map_err(|_| {
            ScheduleError::InvalidRule(format!("time '{}' is not HH:MM", self.time))
        })
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.parse_time()?;
        if self.schedule_type == ScheduleType::Weekly {
            if self.days.is_empty() {
                return Err(ScheduleError::InvalidRule(
                    "weekly schedule needs at least one day".into(),
                ));
            }
            if let Some(bad) = self.days.iter().find(|d| !(1..=7).contains(*d)) {
                return Err(ScheduleError::InvalidRule(format!(
                    "weekly day {bad} is out of range 1..=7"
                )));
            }
        }
        Ok(())
    }

    fn day_enabled(&self, weekday: Weekday) -> bool {
        match self.schedule_type {
            ScheduleType::Daily => true,
            ScheduleType::Weekly => {
                let day = weekday.number_from_monday() as u8;
                self.days.contains(&day)
            }
        }
    }

    /// True when a scheduled instant falls in `(last, now]`. A schedule
    /// that fails to parse never fires; validation catches it at save time.
    pub fn fires_between(&self, last: NaiveDateTime, now: NaiveDateTime) -> bool {
        let Ok(time) = self.parse_time() else {
            return false;
        };
        let mut day = last.date();
        while day <= now.date() {
            if self.day_enabled(day.weekday()) {
                let instant = day.and_time(time);
                if instant > last && instant <= now {
                    return true;
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        false
    }
}
