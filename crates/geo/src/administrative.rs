//! Administrative-boundary targeting by country, province and city.

use serde::{Deserialize, Serialize};
use targeting_core::facts::GeoInfo;
use targeting_core::{TargetingError, TargetingResult};

/// Granularity of an administrative location, least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrativeLevel {
    Country,
    Province,
    City,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrativeMode {
    /// Match only locations in the included list and not in the excluded list.
    #[default]
    Include,
    /// Match everything except the listed locations. Both lists act as
    /// exclusions in this mode.
    Exclude,
}

/// A country, province or city identified by code and/or name.
///
/// Every populated field must agree with the request location for the
/// entry to match. Comparisons ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrativeLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
}

fn field_matches(expected: &Option<String>, actual: &Option<String>) -> bool {
    match (expected, actual) {
        (None, _) => true,
        (Some(e), Some(a)) => e.trim().eq_ignore_ascii_case(a.trim()),
        (Some(_), None) => false,
    }
}

impl AdministrativeLocation {
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country_code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn province(country_code: impl Into<String>, province_code: impl Into<String>) -> Self {
        Self {
            country_code: Some(country_code.into()),
            province_code: Some(province_code.into()),
            ..Default::default()
        }
    }

    pub fn city_named(country_code: impl Into<String>, city_name: impl Into<String>) -> Self {
        Self {
            country_code: Some(country_code.into()),
            city_name: Some(city_name.into()),
            ..Default::default()
        }
    }

    /// Most specific level with any identifier set.
    pub fn level(&self) -> Option<AdministrativeLevel> {
        if self.city_code.is_some() || self.city_name.is_some() {
            Some(AdministrativeLevel::City)
        } else if self.province_code.is_some() || self.province_name.is_some() {
            Some(AdministrativeLevel::Province)
        } else if self.country_code.is_some() || self.country_name.is_some() {
            Some(AdministrativeLevel::Country)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.level().is_none()
    }

    pub fn matches(&self, geo: &GeoInfo) -> bool {
        !self.is_empty()
            && field_matches(&self.country_code, &geo.country_code)
            && field_matches(&self.country_name, &geo.country_name)
            && field_matches(&self.province_code, &geo.province_code)
            && field_matches(&self.province_name, &geo.province_name)
            && field_matches(&self.city_code, &geo.city_code)
            && field_matches(&self.city_name, &geo.city_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeGeoFence {
    #[serde(default)]
    pub included_locations: Vec<AdministrativeLocation>,
    #[serde(default)]
    pub excluded_locations: Vec<AdministrativeLocation>,
    #[serde(default)]
    pub mode: AdministrativeMode,
    /// Preferred granularity when several entries match; most specific wins when unset.
    #[serde(default)]
    pub level_priority: Option<AdministrativeLevel>,
}

impl AdministrativeGeoFence {
    pub fn new(mode: AdministrativeMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn include(mut self, location: AdministrativeLocation) -> Self {
        self.included_locations.push(location);
        self
    }

    pub fn exclude(mut self, location: AdministrativeLocation) -> Self {
        self.excluded_locations.push(location);
        self
    }

    pub fn with_level_priority(mut self, level: AdministrativeLevel) -> Self {
        self.level_priority = Some(level);
        self
    }

    /// Rejects entries with no identifiers and an include fence with nothing to include.
    pub fn validate(&self) -> TargetingResult<()> {
        let mut all = self.included_locations.iter().chain(&self.excluded_locations);
        if all.any(AdministrativeLocation::is_empty) {
            return Err(TargetingError::invalid(
                "locations",
                "every location needs a country, province or city identifier",
            ));
        }
        if self.mode == AdministrativeMode::Include && self.included_locations.is_empty() {
            return Err(TargetingError::invalid(
                "included_locations",
                "include mode requires at least one included location",
            ));
        }
        Ok(())
    }

    fn best_match<'a>(
        &self,
        locations: &'a [AdministrativeLocation],
        geo: &GeoInfo,
    ) -> Option<&'a AdministrativeLocation> {
        let candidates = locations.iter().filter(|l| l.matches(geo));
        match self.level_priority {
            Some(level) => candidates
                .clone()
                .find(|l| l.level() == Some(level))
                .or_else(|| candidates.max_by_key(|l| l.level())),
            None => candidates.max_by_key(|l| l.level()),
        }
    }

    fn blocking_match<'a>(&'a self, geo: &GeoInfo) -> Option<&'a AdministrativeLocation> {
        match self.mode {
            AdministrativeMode::Include => self.best_match(&self.excluded_locations, geo),
            AdministrativeMode::Exclude => self
                .best_match(&self.included_locations, geo)
                .or_else(|| self.best_match(&self.excluded_locations, geo)),
        }
    }

    /// The included entry that admitted this location. Always `None` in
    /// exclude mode, where admission is by absence.
    pub fn matched_location(&self, geo: &GeoInfo) -> Option<&AdministrativeLocation> {
        match self.mode {
            AdministrativeMode::Include if self.blocking_match(geo).is_none() => {
                self.best_match(&self.included_locations, geo)
            }
            _ => None,
        }
    }

    pub fn is_location_matched(&self, geo: &GeoInfo) -> bool {
        match self.mode {
            AdministrativeMode::Include => self.matched_location(geo).is_some(),
            AdministrativeMode::Exclude => self.blocking_match(geo).is_none(),
        }
    }
}
