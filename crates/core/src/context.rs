//! Targeting context: the named, timestamped fact set a decision is made against.
//!
//! Contexts are copy-on-write: projections and merges return new contexts and
//! never touch the source. Properties are kept ordered by key, which is also
//! the order structural equality compares them in.

use crate::error::{TargetingError, TargetingResult};
use crate::facts::{ContextFact, REQUEST_TIME_KEY};
use crate::property::{ContextProperty, PropertyCategory, PropertyType, PropertyValue};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

const IDENTITY_SEPARATOR: char = '+';

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ContextRecord", into = "ContextRecord")]
pub struct TargetingContext {
    context_type: String,
    context_id: String,
    timestamp: DateTime<Utc>,
    data_source: String,
    properties: BTreeMap<String, ContextProperty>,
}

/// Wire shape of a context; deserialization re-checks the invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextRecord {
    context_type: String,
    #[serde(default)]
    context_id: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    data_source: String,
    #[serde(default)]
    properties: Vec<ContextProperty>,
}

impl TryFrom<ContextRecord> for TargetingContext {
    type Error = TargetingError;

    fn try_from(record: ContextRecord) -> Result<Self, Self::Error> {
        let mut context = match record.context_id {
            Some(id) => Self::with_id(record.context_type, id)?,
            None => Self::new(record.context_type)?,
        };
        if let Some(ts) = record.timestamp {
            context.timestamp = ts;
        }
        context.data_source = record.data_source;
        for property in record.properties {
            context.set_property(property, true);
        }
        Ok(context)
    }
}

impl From<TargetingContext> for ContextRecord {
    fn from(context: TargetingContext) -> Self {
        Self {
            context_type: context.context_type,
            context_id: Some(context.context_id),
            timestamp: Some(context.timestamp),
            data_source: context.data_source,
            properties: context.properties.into_values().collect(),
        }
    }
}

impl TargetingContext {
    pub fn new(context_type: impl Into<String>) -> TargetingResult<Self> {
        Self::with_id(context_type, Uuid::new_v4().to_string())
    }

    pub fn with_id(
        context_type: impl Into<String>,
        context_id: impl Into<String>,
    ) -> TargetingResult<Self> {
        let context_type = context_type.into();
        if context_type.trim().is_empty() {
            return Err(TargetingError::invalid(
                "context_type",
                "context type must not be empty",
            ));
        }
        let context_id = context_id.into();
        if context_id.trim().is_empty() {
            return Err(TargetingError::invalid(
                "context_id",
                "context id must not be empty",
            ));
        }
        Ok(Self {
            context_type,
            context_id,
            timestamp: Utc::now(),
            data_source: String::new(),
            properties: BTreeMap::new(),
        })
    }

    pub fn with_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = data_source.into();
        self
    }

    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties in key order.
    pub fn properties(&self) -> impl Iterator<Item = &ContextProperty> {
        self.properties.values()
    }

    pub fn get_property(&self, key: &str) -> Option<&ContextProperty> {
        self.properties.get(key)
    }

    /// Decode a property. Missing keys and unparseable values both yield `None`.
    pub fn get_property_value<T: PropertyValue>(&self, key: &str) -> Option<T> {
        self.properties.get(key).and_then(|p| p.value())
    }

    pub fn get_property_value_or<T: PropertyValue>(&self, key: &str, default: T) -> T {
        self.get_property_value(key).unwrap_or(default)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Upsert a property. Returns whether it was stored; an existing key
    /// is only replaced when `overwrite` is set.
    pub fn set_property(&mut self, property: ContextProperty, overwrite: bool) -> bool {
        if !overwrite && self.properties.contains_key(property.key()) {
            return false;
        }
        self.properties.insert(property.key().to_string(), property);
        true
    }

    /// Returns how many of the given properties were stored.
    pub fn set_properties(
        &mut self,
        properties: impl IntoIterator<Item = ContextProperty>,
        overwrite: bool,
    ) -> usize {
        let mut stored = 0;
        for property in properties {
            if self.set_property(property, overwrite) {
                stored += 1;
            }
        }
        stored
    }

    /// Convenience upsert for a plain value.
    pub fn set_value<T: PropertyValue>(
        &mut self,
        key: impl Into<String>,
        value: &T,
        category: PropertyCategory,
    ) -> TargetingResult<()> {
        let property = ContextProperty::new(key, value)?
            .with_category(category)
            .with_source(self.data_source.clone());
        self.set_property(property, true);
        Ok(())
    }

    pub fn remove_property(&mut self, key: &str) -> Option<ContextProperty> {
        self.properties.remove(key)
    }

    pub fn set_fact<F: ContextFact>(&mut self, fact: &F) -> TargetingResult<()> {
        let raw = serde_json::to_string(fact)?;
        let property = ContextProperty::from_raw(F::KEY, raw, PropertyType::Json)?
            .with_category(F::CATEGORY)
            .with_source(self.data_source.clone());
        self.set_property(property, true);
        Ok(())
    }

    pub fn fact<F: ContextFact>(&self) -> Option<F> {
        let property = self.properties.get(F::KEY)?;
        serde_json::from_str(property.raw_value()).ok()
    }

    /// Time the decision is evaluated at: an explicit `request_time`
    /// property when present, otherwise the context timestamp.
    pub fn request_time(&self) -> DateTime<Utc> {
        self.get_property_value(REQUEST_TIME_KEY)
            .unwrap_or(self.timestamp)
    }

    pub fn properties_by_category(&self, category: PropertyCategory) -> Vec<&ContextProperty> {
        self.properties
            .values()
            .filter(|p| p.category() == category)
            .collect()
    }

    pub fn active_properties(&self) -> Vec<&ContextProperty> {
        self.active_properties_at(Utc::now())
    }

    pub fn active_properties_at(&self, now: DateTime<Utc>) -> Vec<&ContextProperty> {
        self.properties
            .values()
            .filter(|p| !p.is_expired_at(now))
            .collect()
    }

    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.is_expired_at(max_age, Utc::now())
    }

    pub fn is_expired_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp > max_age
    }

    /// Same identity, only the requested keys.
    pub fn lightweight_copy(&self, keys: &[&str]) -> Self {
        self.projected(|p| keys.contains(&p.key()))
    }

    /// Same identity, only properties in the requested categories.
    pub fn categorized_copy(&self, categories: &[PropertyCategory]) -> Self {
        self.projected(|p| categories.contains(&p.category()))
    }

    fn projected(&self, keep: impl Fn(&ContextProperty) -> bool) -> Self {
        Self {
            context_type: self.context_type.clone(),
            context_id: self.context_id.clone(),
            timestamp: self.timestamp,
            data_source: self.data_source.clone(),
            properties: self
                .properties
                .iter()
                .filter(|(_, p)| keep(p))
                .map(|(k, p)| (k.clone(), p.clone()))
                .collect(),
        }
    }

    /// Merge into a new context. For keys present on both sides
    /// `overwrite_existing` picks `other`'s value; otherwise ours is kept.
    ///
    /// The merged type, id and source encode both identities
    /// (`a+b`); identities already encoded are not appended twice, so
    /// re-merging the same context is a no-op. Merging an empty context
    /// returns an unchanged copy.
    pub fn merge(&self, other: &TargetingContext, overwrite_existing: bool) -> Self {
        if other.is_empty() {
            return self.clone();
        }

        let mut merged = Self {
            context_type: merge_identity(&self.context_type, &other.context_type),
            context_id: merge_identity(&self.context_id, &other.context_id),
            timestamp: self.timestamp,
            data_source: merge_identity(&self.data_source, &other.data_source),
            properties: self.properties.clone(),
        };
        for property in other.properties.values() {
            merged.set_property(property.clone(), overwrite_existing);
        }
        merged
    }
}

fn merge_identity(ours: &str, theirs: &str) -> String {
    let mut parts: Vec<&str> = ours
        .split(IDENTITY_SEPARATOR)
        .filter(|p| !p.is_empty())
        .collect();
    for part in theirs.split(IDENTITY_SEPARATOR).filter(|p| !p.is_empty()) {
        if !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(&IDENTITY_SEPARATOR.to_string())
}

impl PartialEq for TargetingContext {
    fn eq(&self, other: &Self) -> bool {
        self.context_type == other.context_type
            && self.context_id == other.context_id
            && self.data_source == other.data_source
            && self.properties == other.properties
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::facts::GeoInfo;

    fn sample(context_type: &str, id: &str) -> TargetingContext {
        let mut ctx = TargetingContext::with_id(context_type, id)
            .unwrap()
            .with_source("sdk");
        ctx.set_value("age", &31u32, PropertyCategory::Demographic)
            .unwrap();
        ctx.set_value("os", &"ios".to_string(), PropertyCategory::Device)
            .unwrap();
        ctx
    }

    #[test]
    fn test_empty_context_type_rejected() {
        assert!(TargetingContext::new("").is_err());
        assert!(TargetingContext::with_id("request", " ").is_err());
    }

    #[test]
    fn test_typed_access_and_defaults() {
        let ctx = sample("request", "r-1");
        assert_eq!(ctx.get_property_value::<u32>("age"), Some(31));
        assert_eq!(ctx.get_property_value_or("missing", 5u32), 5);
        // Unparseable values fall back to the default.
        assert_eq!(ctx.get_property_value_or("os", 9u32), 9);
        assert!(ctx.has_property("os"));
    }

    #[test]
    fn test_set_property_respects_overwrite() {
        let mut ctx = sample("request", "r-1");
        let replacement = ContextProperty::new("age", &40u32).unwrap();
        assert!(!ctx.set_property(replacement.clone(), false));
        assert_eq!(ctx.get_property_value::<u32>("age"), Some(31));
        assert!(ctx.set_property(replacement, true));
        assert_eq!(ctx.get_property_value::<u32>("age"), Some(40));
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let a = sample("request", "r-1");
        let b = TargetingContext::with_id("enrichment", "e-1").unwrap();
        assert_eq!(a.merge(&b, false), a);
        assert_eq!(a.merge(&b, true), a);
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let a = sample("request", "r-1");
        let mut b = TargetingContext::with_id("enrichment", "e-1")
            .unwrap()
            .with_source("dmp");
        b.set_value("age", &55u32, PropertyCategory::Demographic)
            .unwrap();
        b.set_value("segment", &"auto".to_string(), PropertyCategory::Interest)
            .unwrap();

        let once = a.merge(&b, false);
        let twice = once.merge(&b, false);
        assert_eq!(once, twice);
        assert_eq!(once.context_type(), "request+enrichment");
        assert_eq!(once.context_id(), "r-1+e-1");
        assert_eq!(once.get_property_value::<u32>("age"), Some(31));
        assert!(once.has_property("segment"));

        let overwritten = a.merge(&b, true);
        assert_eq!(overwritten.get_property_value::<u32>("age"), Some(55));
        // Source is untouched.
        assert!(!a.has_property("segment"));
    }

    #[test]
    fn test_projections_keep_identity() {
        let ctx = sample("request", "r-1");
        let light = ctx.lightweight_copy(&["age"]);
        assert_eq!(light.len(), 1);
        assert_eq!(light.context_id(), "r-1");

        let device = ctx.categorized_copy(&[PropertyCategory::Device]);
        assert_eq!(device.len(), 1);
        assert!(device.has_property("os"));
        assert_eq!(ctx.properties_by_category(PropertyCategory::Demographic).len(), 1);
    }

    #[test]
    fn test_expiry() {
        let ctx = sample("request", "r-1");
        assert!(!ctx.is_expired(Duration::minutes(5)));
        assert!(ctx.is_expired_at(Duration::minutes(5), Utc::now() + Duration::minutes(6)));

        let mut ctx = ctx;
        let short = ContextProperty::new("flash", &true)
            .unwrap()
            .with_ttl(Duration::seconds(1))
            .unwrap();
        ctx.set_property(short, true);
        let later = Utc::now() + Duration::seconds(2);
        assert_eq!(ctx.active_properties_at(later).len(), 2);
        assert_eq!(ctx.active_properties().len(), 3);
    }

    #[test]
    fn test_facts_round_trip() {
        let mut ctx = TargetingContext::new("request").unwrap();
        let geo = GeoInfo {
            country_code: Some("US".into()),
            city_name: Some("San Francisco".into()),
            ..Default::default()
        };
        ctx.set_fact(&geo).unwrap();
        assert_eq!(ctx.fact::<GeoInfo>(), Some(geo));
        assert_eq!(ctx.properties_by_category(PropertyCategory::Geo).len(), 1);
    }

    #[test]
    fn test_serde_round_trip_preserves_equality() {
        let ctx = sample("request", "r-1");
        let json = serde_json::to_string(&ctx).unwrap();
        let back: TargetingContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);

        let invalid = r#"{"context_type": ""}"#;
        assert!(serde_json::from_str::<TargetingContext>(invalid).is_err());
    }
}
