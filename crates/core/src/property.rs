//! Context property model: typed facts stored as a serialized string
//! plus a declared type tag.
//!
//! Scalars use invariant `Display`/`FromStr` formatting; lists, maps and
//! nested objects are stored as JSON. Decoding never fails loudly: a value
//! that cannot be parsed reads back as `None` (or the caller's default).

use crate::error::{TargetingError, TargetingResult};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Declared type of a serialized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Json,
}

/// Grouping used for categorized projections of a context.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCategory {
    #[default]
    General,
    Geo,
    Device,
    Demographic,
    Interest,
    Behavior,
    Time,
    Preference,
    Value,
    Tag,
}

/// A value that can be stored in a property bag or rule set.
pub trait PropertyValue: Sized {
    fn property_type() -> PropertyType;
    fn to_raw(&self) -> String;
    fn from_raw(raw: &str) -> Option<Self>;
}

impl PropertyValue for String {
    fn property_type() -> PropertyType {
        PropertyType::String
    }
    fn to_raw(&self) -> String {
        self.clone()
    }
    fn from_raw(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl PropertyValue for bool {
    fn property_type() -> PropertyType {
        PropertyType::Boolean
    }
    fn to_raw(&self) -> String {
        self.to_string()
    }
    fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim() {
            s if s.eq_ignore_ascii_case("true") || s == "1" => Some(true),
            s if s.eq_ignore_ascii_case("false") || s == "0" => Some(false),
            _ => None,
        }
    }
}

macro_rules! numeric_property_value {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl PropertyValue for $ty {
                fn property_type() -> PropertyType {
                    PropertyType::$tag
                }
                fn to_raw(&self) -> String {
                    self.to_string()
                }
                fn from_raw(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }
            }
        )*
    };
}

numeric_property_value!(
    i32 => Integer,
    i64 => Integer,
    u32 => Integer,
    u64 => Integer,
    f64 => Decimal,
);

impl PropertyValue for DateTime<Utc> {
    fn property_type() -> PropertyType {
        PropertyType::DateTime
    }
    fn to_raw(&self) -> String {
        self.to_rfc3339()
    }
    fn from_raw(raw: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl PropertyValue for serde_json::Value {
    fn property_type() -> PropertyType {
        PropertyType::Json
    }
    fn to_raw(&self) -> String {
        self.to_string()
    }
    fn from_raw(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

impl<T: Serialize + DeserializeOwned> PropertyValue for Vec<T> {
    fn property_type() -> PropertyType {
        PropertyType::Json
    }
    fn to_raw(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }
    fn from_raw(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

impl<T: Serialize + DeserializeOwned> PropertyValue for BTreeMap<String, T> {
    fn property_type() -> PropertyType {
        PropertyType::Json
    }
    fn to_raw(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
    fn from_raw(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

impl<T: Serialize + DeserializeOwned> PropertyValue for HashMap<String, T> {
    fn property_type() -> PropertyType {
        PropertyType::Json
    }
    fn to_raw(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
    fn from_raw(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Wrapper that stores any serde type as a JSON property.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize + DeserializeOwned> PropertyValue for Json<T> {
    fn property_type() -> PropertyType {
        PropertyType::Json
    }
    fn to_raw(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "null".to_string())
    }
    fn from_raw(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok().map(Json)
    }
}

/// Single fact about a request. Immutable once built; changing a fact
/// means replacing the property in its owning context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextProperty {
    key: String,
    value: String,
    property_type: PropertyType,
    #[serde(default)]
    category: PropertyCategory,
    #[serde(default)]
    is_sensitive: bool,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    data_source: String,
    created_at: DateTime<Utc>,
}

fn default_weight() -> f64 {
    1.0
}

impl ContextProperty {
    pub fn new<T: PropertyValue>(key: impl Into<String>, value: &T) -> TargetingResult<Self> {
        Self::from_raw(key, value.to_raw(), T::property_type())
    }

    /// Build from an already-serialized value.
    pub fn from_raw(
        key: impl Into<String>,
        value: impl Into<String>,
        property_type: PropertyType,
    ) -> TargetingResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(TargetingError::invalid("key", "property key must not be empty"));
        }
        Ok(Self {
            key,
            value: value.into(),
            property_type,
            category: PropertyCategory::General,
            is_sensitive: false,
            weight: 1.0,
            expires_at: None,
            data_source: String::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_category(mut self, category: PropertyCategory) -> Self {
        self.category = category;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> TargetingResult<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(TargetingError::invalid(
                "weight",
                format!("property weight must be a non-negative number, got {weight}"),
            ));
        }
        self.weight = weight;
        Ok(self)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.data_source = source.into();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> TargetingResult<Self> {
        if expires_at < self.created_at {
            return Err(TargetingError::invalid(
                "expires_at",
                format!(
                    "expiry {} precedes assignment time {}",
                    expires_at.to_rfc3339(),
                    self.created_at.to_rfc3339()
                ),
            ));
        }
        self.expires_at = Some(expires_at);
        Ok(self)
    }

    pub fn with_ttl(self, ttl: Duration) -> TargetingResult<Self> {
        let at = self.created_at + ttl;
        self.with_expiry(at)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn raw_value(&self) -> &str {
        &self.value
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn category(&self) -> PropertyCategory {
        self.category
    }

    pub fn is_sensitive(&self) -> bool {
        self.is_sensitive
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Decode the stored value; `None` when it does not parse as `T`.
    pub fn value<T: PropertyValue>(&self) -> Option<T> {
        T::from_raw(&self.value)
    }

    pub fn value_or<T: PropertyValue>(&self, default: T) -> T {
        self.value().unwrap_or(default)
    }

    pub fn json_value(&self) -> serde_json::Value {
        raw_to_json(&self.value, self.property_type)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A stored raw value as JSON. Text that is not valid JSON, and every
/// string or timestamp, becomes a JSON string.
pub(crate) fn raw_to_json(raw: &str, property_type: PropertyType) -> serde_json::Value {
    match property_type {
        PropertyType::String | PropertyType::DateTime => serde_json::Value::String(raw.to_string()),
        _ => serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let prop = ContextProperty::new("age", &34u32).unwrap();
        assert_eq!(prop.property_type(), PropertyType::Integer);
        assert_eq!(prop.raw_value(), "34");
        assert_eq!(prop.value::<u32>(), Some(34));
        assert_eq!(prop.value::<f64>(), Some(34.0));
    }

    #[test]
    fn test_parse_failure_yields_default() {
        let prop = ContextProperty::new("city", &"Paris".to_string()).unwrap();
        assert_eq!(prop.value::<i64>(), None);
        assert_eq!(prop.value_or(7i64), 7);
        assert!(!prop.value_or(false));
    }

    #[test]
    fn test_json_list() {
        let tags = vec!["sports".to_string(), "news".to_string()];
        let prop = ContextProperty::new("tags", &tags).unwrap();
        assert_eq!(prop.property_type(), PropertyType::Json);
        assert_eq!(prop.value::<Vec<String>>(), Some(tags));
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = ContextProperty::new("  ", &1i32).unwrap_err();
        assert_eq!(err.field(), Some("key"));
    }

    #[test]
    fn test_expiry_before_creation_rejected() {
        let prop = ContextProperty::new("k", &1i32).unwrap();
        let past = prop.created_at() - Duration::seconds(5);
        assert!(prop.clone().with_expiry(past).is_err());

        let prop = prop.with_ttl(Duration::seconds(30)).unwrap();
        assert!(!prop.is_expired_at(Utc::now()));
        assert!(prop.is_expired_at(Utc::now() + Duration::seconds(31)));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let prop = ContextProperty::new("k", &1i32).unwrap();
        assert!(prop.clone().with_weight(-0.5).is_err());
        assert_eq!(prop.with_weight(2.5).unwrap().weight(), 2.5);
    }

    #[test]
    fn test_datetime_round_trip() {
        let now = Utc::now();
        let prop = ContextProperty::new("seen_at", &now).unwrap();
        let back: DateTime<Utc> = prop.value().unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
