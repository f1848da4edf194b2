//! Deterministic A/B traffic allocation.
//!
//! Group assignment is a pure function of the experiment configuration and
//! the subject id: the same subject always lands in the same group.

use crate::error::{TargetingError, TargetingResult};
use crate::validation::ValidationResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

const BUCKET_COUNT: u64 = 100;
const TRAFFIC_RESOLUTION: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentGroup {
    pub group_id: String,
    pub name: String,
    /// Relative share; weights need not sum to any particular total.
    pub weight: f64,
    #[serde(default)]
    pub is_control: bool,
}

impl ExperimentGroup {
    pub fn new(group_id: impl Into<String>, weight: f64) -> Self {
        let group_id = group_id.into();
        Self {
            name: group_id.clone(),
            group_id,
            weight,
            is_control: false,
        }
    }

    pub fn control(mut self) -> Self {
        self.is_control = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ABTestConfig {
    pub experiment_id: String,
    pub name: String,
    pub groups: Vec<ExperimentGroup>,
    /// Share of subjects entering the experiment at all, in [0, 1].
    #[serde(default = "default_traffic_allocation")]
    pub traffic_allocation: f64,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

fn default_traffic_allocation() -> f64 {
    1.0
}
fn default_enabled() -> bool {
    true
}

/// Result of placing a subject into an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub group_id: String,
    pub group_name: String,
    pub is_control: bool,
}

impl ABTestConfig {
    pub fn new(
        experiment_id: impl Into<String>,
        name: impl Into<String>,
        groups: Vec<ExperimentGroup>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            groups,
            traffic_allocation: 1.0,
            is_enabled: true,
            start_time: None,
            end_time: None,
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.groups.iter().map(|g| g.weight.max(0.0)).sum()
    }

    /// Whether `now` falls inside the configured window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled
            && self.start_time.map_or(true, |start| now >= start)
            && self.end_time.map_or(true, |end| now < end)
    }

    /// Whether the subject falls inside the traffic allocation.
    pub fn is_in_traffic(&self, subject_id: &str) -> bool {
        if self.traffic_allocation >= 1.0 {
            return true;
        }
        let salted = format!("{}:{}", self.experiment_id, subject_id);
        let slot = stable_hash(&salted) % TRAFFIC_RESOLUTION;
        (slot as f64) < self.traffic_allocation * TRAFFIC_RESOLUTION as f64
    }

    /// Group for a subject, or `None` when the experiment is disabled,
    /// has no groups, or the subject is outside the traffic allocation.
    pub fn get_user_group(&self, subject_id: &str) -> Option<&ExperimentGroup> {
        if !self.is_enabled || self.groups.is_empty() {
            return None;
        }
        let total = self.total_weight();
        if total <= 0.0 || !self.is_in_traffic(subject_id) {
            return None;
        }

        let bucket = stable_hash(subject_id) % BUCKET_COUNT;
        let target = bucket as f64 / BUCKET_COUNT as f64 * total;

        // Groups without weight own no buckets, including bucket 0.
        let mut cumulative = 0.0;
        for group in self.groups.iter().filter(|g| g.weight > 0.0) {
            cumulative += group.weight;
            if cumulative > target {
                return Some(group);
            }
        }
        // Rounding fallback.
        self.groups.iter().rev().find(|g| g.weight > 0.0)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        if self.experiment_id.trim().is_empty() {
            result.add_error(
                "experiment_id_empty",
                "experiment id must not be empty",
                Some("experiment_id"),
                None,
            );
        }
        if self.groups.is_empty() {
            result.add_error(
                "no_groups",
                "experiment needs at least one group",
                Some("groups"),
                None,
            );
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.group_id.as_str()) {
                result.add_error(
                    "duplicate_group",
                    format!("group id '{}' appears more than once", group.group_id),
                    Some("groups"),
                    Some(group.group_id.clone()),
                );
            }
            if !group.weight.is_finite() || group.weight < 0.0 {
                result.add_error(
                    "group_weight_negative",
                    format!("group '{}' has a negative weight", group.group_id),
                    Some("weight"),
                    Some(group.weight.to_string()),
                );
            }
        }
        if !self.groups.is_empty() && self.total_weight() <= 0.0 {
            result.add_error(
                "total_weight_zero",
                "group weights must not all be zero",
                Some("groups"),
                None,
            );
        }
        if !(0.0..=1.0).contains(&self.traffic_allocation) {
            result.add_error(
                "traffic_out_of_range",
                "traffic allocation must be within [0, 1]",
                Some("traffic_allocation"),
                Some(self.traffic_allocation.to_string()),
            );
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                result.add_error(
                    "window_inverted",
                    "end time must be after start time",
                    Some("end_time"),
                    Some(end.to_rfc3339()),
                );
            }
        }
        match self.groups.iter().filter(|g| g.is_control).count() {
            0 if !self.groups.is_empty() => {
                result.add_warning("no_control", "experiment has no control group", Some("groups"))
            }
            n if n > 1 => result.add_warning(
                "multiple_controls",
                "experiment has more than one control group",
                Some("groups"),
            ),
            _ => {}
        }
        result.finish(&format!("experiment '{}'", self.experiment_id))
    }
}

/// FNV-1a followed by a 64-bit avalanche so the low digits used for
/// bucketing depend on every input byte.
pub fn stable_hash(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51afd7ed558ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ceb9fe1a85ec53);
    hash ^ (hash >> 33)
}

/// Registry of running experiments.
pub struct ExperimentEngine {
    experiments: DashMap<String, ABTestConfig>,
}

impl ExperimentEngine {
    pub fn new() -> Self {
        Self {
            experiments: DashMap::new(),
        }
    }

    /// Register or replace an experiment. Invalid configurations are rejected.
    pub fn create_experiment(&self, config: ABTestConfig) -> TargetingResult<()> {
        let validation = config.validate();
        if !validation.is_valid() {
            return Err(TargetingError::Validation(validation.summary));
        }
        self.experiments.insert(config.experiment_id.clone(), config);
        Ok(())
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Option<ABTestConfig> {
        self.experiments.get(experiment_id).map(|e| e.clone())
    }

    pub fn remove_experiment(&self, experiment_id: &str) -> Option<ABTestConfig> {
        self.experiments.remove(experiment_id).map(|(_, e)| e)
    }

    /// Pause or resume an experiment without replacing its configuration.
    pub fn set_enabled(&self, experiment_id: &str, enabled: bool) -> TargetingResult<()> {
        let mut experiment = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| TargetingError::NotFound(format!("experiment '{experiment_id}'")))?;
        experiment.is_enabled = enabled;
        Ok(())
    }

    pub fn list_experiments(&self) -> Vec<ABTestConfig> {
        let mut list: Vec<_> = self.experiments.iter().map(|e| e.value().clone()).collect();
        list.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        list
    }

    pub fn assign(&self, experiment_id: &str, subject_id: &str) -> Option<ExperimentAssignment> {
        self.assign_at(experiment_id, subject_id, Utc::now())
    }

    pub fn assign_at(
        &self,
        experiment_id: &str,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> Option<ExperimentAssignment> {
        let experiment = self.experiments.get(experiment_id)?;
        if !experiment.is_active_at(now) {
            debug!(experiment_id, "Experiment not active, no assignment");
            return None;
        }
        let group = experiment.get_user_group(subject_id)?;
        metrics::counter!("experiment.assignments", "experiment" => experiment_id.to_string())
            .increment(1);
        Some(ExperimentAssignment {
            experiment_id: experiment.experiment_id.clone(),
            group_id: group.group_id.clone(),
            group_name: group.name.clone(),
            is_control: group.is_control,
        })
    }
}

impl Default for ExperimentEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn two_way() -> ABTestConfig {
        ABTestConfig::new(
            "exp-1",
            "Creative test",
            vec![
                ExperimentGroup::new("control", 50.0).control(),
                ExperimentGroup::new("variant", 50.0),
            ],
        )
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let config = two_way();
        let first = config.get_user_group("subject-42").unwrap().group_id.clone();
        for _ in 0..100 {
            assert_eq!(config.get_user_group("subject-42").unwrap().group_id, first);
        }
        // An equal copy of the configuration agrees as well.
        let copy = config.clone();
        assert_eq!(copy.get_user_group("subject-42").unwrap().group_id, first);
    }

    #[test]
    fn test_proportions_converge() {
        let config = two_way();
        let n = 10_000;
        let control = (0..n)
            .filter(|i| {
                config.get_user_group(&format!("subject-{i}")).unwrap().group_id == "control"
            })
            .count();
        let share = control as f64 / n as f64;
        assert!((0.45..=0.57).contains(&share), "control share was {share}");
    }

    #[test]
    fn test_weighted_proportions() {
        let config = ABTestConfig::new(
            "exp-2",
            "Skewed",
            vec![ExperimentGroup::new("a", 1.0), ExperimentGroup::new("b", 3.0)],
        );
        let n = 10_000;
        let a = (0..n)
            .filter(|i| config.get_user_group(&format!("user-{i}")).unwrap().group_id == "a")
            .count();
        let share = a as f64 / n as f64;
        assert!((0.20..=0.31).contains(&share), "group a share was {share}");
    }

    #[test]
    fn test_zero_weight_group_never_assigned() {
        let config = ABTestConfig::new(
            "exp-4",
            "Holdout off",
            vec![ExperimentGroup::new("a", 0.0), ExperimentGroup::new("b", 100.0)],
        );
        let bucket_zero = (0..100_000)
            .map(|i| format!("user-{i}"))
            .find(|s| stable_hash(s) % BUCKET_COUNT == 0)
            .unwrap();
        assert_eq!(config.get_user_group(&bucket_zero).unwrap().group_id, "b");
        for i in 0..2_000 {
            assert_eq!(config.get_user_group(&format!("s-{i}")).unwrap().group_id, "b");
        }
    }

    #[test]
    fn test_disabled_or_empty_yields_none() {
        let mut config = two_way();
        config.is_enabled = false;
        assert!(config.get_user_group("s").is_none());

        let empty = ABTestConfig::new("exp-3", "Empty", Vec::new());
        assert!(empty.get_user_group("s").is_none());
    }

    #[test]
    fn test_traffic_allocation_gate() {
        let mut config = two_way();
        config.traffic_allocation = 0.0;
        assert!(config.get_user_group("s").is_none());

        config.traffic_allocation = 0.3;
        let n = 5_000;
        let entered = (0..n)
            .filter(|i| config.get_user_group(&format!("s-{i}")).is_some())
            .count();
        let share = entered as f64 / n as f64;
        assert!((0.25..=0.35).contains(&share), "entered share was {share}");
    }

    #[test]
    fn test_validation() {
        assert!(two_way().validate().is_valid());

        let mut bad = two_way();
        bad.traffic_allocation = 1.5;
        bad.groups.push(ExperimentGroup::new("variant", -1.0));
        let result = bad.validate();
        assert!(result.has_error("traffic_out_of_range"));
        assert!(result.has_error("duplicate_group"));
        assert!(result.has_error("group_weight_negative"));
    }

    #[test]
    fn test_engine_window() {
        let engine = ExperimentEngine::new();
        let mut config = two_way();
        let now = Utc::now();
        config.start_time = Some(now + Duration::hours(1));
        engine.create_experiment(config).unwrap();

        assert!(engine.assign_at("exp-1", "s", now).is_none());
        let assignment = engine
            .assign_at("exp-1", "s", now + Duration::hours(2))
            .unwrap();
        assert_eq!(assignment.experiment_id, "exp-1");
        assert!(engine.assign("missing", "s").is_none());

        let invalid = ABTestConfig::new("", "x", Vec::new());
        assert!(engine.create_experiment(invalid).is_err());
    }

    #[test]
    fn test_pause_and_resume() {
        let engine = ExperimentEngine::new();
        engine.create_experiment(two_way()).unwrap();

        engine.set_enabled("exp-1", false).unwrap();
        assert!(engine.assign("exp-1", "s").is_none());
        engine.set_enabled("exp-1", true).unwrap();
        assert!(engine.assign("exp-1", "s").is_some());

        let err = engine.set_enabled("missing", false).unwrap_err();
        assert!(matches!(err, TargetingError::NotFound(_)));
        assert_eq!(err.to_string(), "Not found: experiment 'missing'");
    }
}
