//! JSON request and response documents for the command line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use targeting_core::facts::{
    BehaviorProfile, DeviceInfo, GeoInfo, InterestProfile, TagSet, UserInfo, UserPreferences, REQUEST_TIME_KEY,
};
use targeting_core::{ABTestConfig, ExperimentAssignment, PropertyCategory, TargetingContext, TargetingResult};
use targeting_criteria::TargetingCriteria;
use targeting_matching::OverallMatchResult;

#[derive(Debug, Deserialize)]
pub struct TargetingRequest {
    #[serde(default = "default_context_id")]
    pub context_id: String,
    #[serde(default)]
    pub facts: RequestFacts,
    #[serde(default)]
    pub criteria: Vec<TargetingCriteria>,
    #[serde(default)]
    pub experiment: Option<ABTestConfig>,
    #[serde(default)]
    pub subject_id: Option<String>,
}

fn default_context_id() -> String {
    "cli-request".to_string()
}

/// Well-known facts, each optional.
#[derive(Debug, Default, Deserialize)]
pub struct RequestFacts {
    pub geo: Option<GeoInfo>,
    pub device: Option<DeviceInfo>,
    pub user: Option<UserInfo>,
    pub interests: Option<InterestProfile>,
    pub tags: Option<TagSet>,
    pub preferences: Option<UserPreferences>,
    pub behavior: Option<BehaviorProfile>,
    pub request_time: Option<DateTime<Utc>>,
}

impl TargetingRequest {
    pub fn build_context(&self) -> TargetingResult<TargetingContext> {
        let mut ctx = TargetingContext::with_id("request", &self.context_id)?.with_source("cli");
        let facts = &self.facts;
        if let Some(geo) = &facts.geo {
            ctx.set_fact(geo)?;
        }
        if let Some(device) = &facts.device {
            ctx.set_fact(device)?;
        }
        if let Some(user) = &facts.user {
            ctx.set_fact(user)?;
        }
        if let Some(interests) = &facts.interests {
            ctx.set_fact(interests)?;
        }
        if let Some(tags) = &facts.tags {
            ctx.set_fact(tags)?;
        }
        if let Some(preferences) = &facts.preferences {
            ctx.set_fact(preferences)?;
        }
        if let Some(behavior) = &facts.behavior {
            ctx.set_fact(behavior)?;
        }
        if let Some(at) = &facts.request_time {
            ctx.set_value(REQUEST_TIME_KEY, at, PropertyCategory::Time)?;
        }
        Ok(ctx)
    }
}

#[derive(Debug, Serialize)]
pub struct TargetingResponse {
    pub context_id: String,
    pub node_id: String,
    pub experiment: Option<ExperimentAssignment>,
    pub matched: bool,
    pub result: OverallMatchResult,
}
