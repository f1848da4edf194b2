//! Day-parting and flight-window criteria.
//!
//! Evaluation time is the context's request time shifted by a fixed UTC
//! offset. Hour windows are half-open `[start, end)` and wrap past
//! midnight when `start > end`.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use targeting_core::{Criteria, CriteriaBase, TargetingContext, TargetingError, TargetingResult, ValidationResult};

use crate::evaluation::{ContextPredicate, Evaluation};
use crate::{check_decodable, CriteriaType};

const DAYS_OF_WEEK: &str = "days_of_week";
const START_HOUR: &str = "start_hour";
const END_HOUR: &str = "end_hour";
const UTC_OFFSET_MINUTES: &str = "utc_offset_minutes";
const START_DATE: &str = "start_date";
const END_DATE: &str = "end_date";

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaBase", into = "CriteriaBase")]
pub struct TimeTargeting {
    base: CriteriaBase,
}

rule_backed_criteria!(TimeTargeting, CriteriaType::Time);

fn parse_days(days: &[String]) -> Option<Vec<Weekday>> {
    days.iter().map(|d| d.trim().parse::<Weekday>().ok()).collect()
}

impl TimeTargeting {
    /// Configured days; unparseable names make the whole list unreadable.
    pub fn days_of_week(&self) -> Option<Vec<Weekday>> {
        let names: Vec<String> = self.base.get_rule_value(DAYS_OF_WEEK)?;
        parse_days(&names)
    }

    pub fn set_days_of_week(&mut self, days: &[Weekday]) -> TargetingResult<()> {
        let names: Vec<String> = days.iter().map(|d| d.to_string()).collect();
        self.base.set_rule(DAYS_OF_WEEK, &names)
    }

    pub fn hour_window(&self) -> Option<(u32, u32)> {
        Some((
            self.base.get_rule_value(START_HOUR)?,
            self.base.get_rule_value(END_HOUR)?,
        ))
    }

    pub fn set_hour_window(&mut self, start_hour: u32, end_hour: u32) -> TargetingResult<()> {
        if start_hour > 23 || end_hour > 24 {
            return Err(TargetingError::invalid(
                "hour_window",
                format!("hours must be within 0..=23 (end may be 24), got {start_hour}..{end_hour}"),
            ));
        }
        if start_hour == end_hour {
            return Err(TargetingError::invalid("hour_window", "start and end hour must differ"));
        }
        self.base.set_rule(START_HOUR, &start_hour)?;
        self.base.set_rule(END_HOUR, &end_hour)
    }

    pub fn utc_offset_minutes(&self) -> i32 {
        self.base.get_rule_value_or(UTC_OFFSET_MINUTES, 0)
    }

    pub fn set_utc_offset_minutes(&mut self, offset: i32) -> TargetingResult<()> {
        if offset.abs() > MAX_OFFSET_MINUTES {
            return Err(TargetingError::invalid(
                UTC_OFFSET_MINUTES,
                format!("offset must be within ±{MAX_OFFSET_MINUTES} minutes, got {offset}"),
            ));
        }
        self.base.set_rule(UTC_OFFSET_MINUTES, &offset)
    }

    pub fn date_window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.base.get_rule_value(START_DATE), self.base.get_rule_value(END_DATE))
    }

    pub fn set_date_window(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> TargetingResult<()> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(TargetingError::invalid("date_window", "start_date must precede end_date"));
            }
        }
        for (rule, value) in [(START_DATE, start), (END_DATE, end)] {
            match value {
                Some(v) => self.base.set_rule(rule, &v)?,
                None => {
                    self.base.remove_rule(rule);
                }
            }
        }
        Ok(())
    }

    /// Evaluate against an explicit instant.
    pub fn evaluate_at(&self, now: DateTime<Utc>) -> Evaluation {
        let local = now + Duration::minutes(i64::from(self.utc_offset_minutes()));
        let mut evaluation = Evaluation::new();

        let (start, end) = self.date_window();
        if start.is_some() || end.is_some() {
            let in_window = start.map_or(true, |s| now >= s) && end.map_or(true, |e| now < e);
            evaluation.record("date_window", in_window);
        }
        if self.base.has_rule(DAYS_OF_WEEK) {
            let today = local.weekday();
            let ok = self.days_of_week().is_some_and(|days| days.contains(&today));
            evaluation.record("day_of_week", ok);
        }
        if let Some((start_hour, end_hour)) = self.hour_window() {
            let hour = local.hour();
            let ok = if start_hour < end_hour {
                hour >= start_hour && hour < end_hour
            } else {
                hour >= start_hour || hour < end_hour
            };
            evaluation.record("hour", ok);
        }
        evaluation.finish()
    }
}

impl Criteria for TimeTargeting {
    fn base(&self) -> &CriteriaBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CriteriaBase {
        &mut self.base
    }

    fn validate_specific_rules(&self, result: &mut ValidationResult) {
        let configured = [DAYS_OF_WEEK, START_HOUR, END_HOUR, START_DATE, END_DATE]
            .iter()
            .any(|rule| self.base.has_rule(rule));
        if !configured {
            result.add_error(
                "no_dimensions",
                "at least one of days, hours or dates must be configured",
                None,
                None,
            );
        }
        if self.base.has_rule(DAYS_OF_WEEK) && self.days_of_week().is_none() {
            result.add_error(
                "invalid_day",
                "days_of_week contains an unknown day name",
                Some(DAYS_OF_WEEK),
                self.base.get_rule(DAYS_OF_WEEK).map(|r| r.value.clone()),
            );
        }
        check_decodable::<u32>(&self.base, START_HOUR, result);
        check_decodable::<u32>(&self.base, END_HOUR, result);
        check_decodable::<DateTime<Utc>>(&self.base, START_DATE, result);
        check_decodable::<DateTime<Utc>>(&self.base, END_DATE, result);
        check_decodable::<i32>(&self.base, UTC_OFFSET_MINUTES, result);

        if self.base.has_rule(START_HOUR) != self.base.has_rule(END_HOUR) {
            result.add_error(
                "hour_window_incomplete",
                "start_hour and end_hour must be set together",
                Some(START_HOUR),
                None,
            );
        }
        if let Some((start, end)) = self.hour_window() {
            if start > 23 || end > 24 || start == end {
                result.add_error(
                    "hour_window_invalid",
                    "hour window must use hours 0..=24 with start != end",
                    Some(START_HOUR),
                    Some(format!("{start}..{end}")),
                );
            }
        }
        if let (Some(s), Some(e)) = self.date_window() {
            if s >= e {
                result.add_error("date_window_inverted", "start_date must precede end_date", Some(START_DATE), None);
            }
        }
        if self.utc_offset_minutes().abs() > MAX_OFFSET_MINUTES {
            result.add_error(
                "offset_out_of_range",
                format!("utc offset must be within ±{MAX_OFFSET_MINUTES} minutes"),
                Some(UTC_OFFSET_MINUTES),
                Some(self.utc_offset_minutes().to_string()),
            );
        }
    }
}

impl ContextPredicate for TimeTargeting {
    fn evaluate(&self, context: &TargetingContext) -> Evaluation {
        self.evaluate_at(context.request_time())
    }
}
