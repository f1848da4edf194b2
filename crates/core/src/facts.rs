//! Well-known facts about a request, stored as JSON properties under fixed keys.

use crate::property::PropertyCategory;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key under which the evaluation time can be overridden (RFC 3339).
/// When absent, matchers use the context timestamp.
pub const REQUEST_TIME_KEY: &str = "request_time";

/// A structured fact with a fixed property key.
pub trait ContextFact: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const CATEGORY: PropertyCategory;
}

/// Resolved location of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub province_code: Option<String>,
    #[serde(default)]
    pub province_name: Option<String>,
    #[serde(default)]
    pub city_code: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl GeoInfo {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

impl ContextFact for GeoInfo {
    const KEY: &'static str = "geo";
    const CATEGORY: PropertyCategory = PropertyCategory::Geo;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Ctv,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Ethernet,
    Cellular,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub connection_type: Option<ConnectionType>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    #[serde(default)]
    pub screen_height: Option<u32>,
}

impl ContextFact for DeviceInfo {
    const KEY: &'static str = "device";
    const CATEGORY: PropertyCategory = PropertyCategory::Device;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

/// Value tier of a subject, lowest to highest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ValueTier {
    Low,
    Medium,
    High,
    Premium,
}

/// Demographics and value signals for the subject of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub education: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub income_level: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub value_tier: Option<ValueTier>,
    #[serde(default)]
    pub lifetime_value: Option<f64>,
    #[serde(default)]
    pub purchase_count: Option<u32>,
}

impl ContextFact for UserInfo {
    const KEY: &'static str = "user";
    const CATEGORY: PropertyCategory = PropertyCategory::Demographic;
}

/// Interest categories with affinity scores in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestProfile {
    #[serde(default)]
    pub categories: BTreeMap<String, f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ContextFact for InterestProfile {
    const KEY: &'static str = "interests";
    const CATEGORY: PropertyCategory = PropertyCategory::Interest;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TagSet {
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl ContextFact for TagSet {
    const KEY: &'static str = "tags";
    const CATEGORY: PropertyCategory = PropertyCategory::Tag;
}

/// Preferences the subject declared explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub blocked_categories: Vec<String>,
    #[serde(default)]
    pub personalization_consent: bool,
    #[serde(default)]
    pub preferred_language: Option<String>,
    #[serde(default)]
    pub do_not_track: bool,
}

impl ContextFact for UserPreferences {
    const KEY: &'static str = "preferences";
    const CATEGORY: PropertyCategory = PropertyCategory::Preference;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorAction {
    pub action: String,
    pub count: u32,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    #[serde(default)]
    pub actions: Vec<BehaviorAction>,
    #[serde(default)]
    pub session_count: u32,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

impl BehaviorProfile {
    pub fn action(&self, name: &str) -> Option<&BehaviorAction> {
        self.actions
            .iter()
            .find(|a| a.action.eq_ignore_ascii_case(name))
    }
}

impl ContextFact for BehaviorProfile {
    const KEY: &'static str = "behavior";
    const CATEGORY: PropertyCategory = PropertyCategory::Behavior;
}
