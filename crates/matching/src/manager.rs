//! Matcher registry and concurrent execution of a targeting decision.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use targeting_cache::{fingerprint, CachePolicy, CacheStore, Freshness, LocalCache};
use targeting_core::config::EngineConfig;
use targeting_core::{TargetingContext, TargetingError, TargetingResult, ValidationResult};
use targeting_criteria::{CriteriaType, TargetingCriteria};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callbacks::CallbackProvider;
use crate::cancel::CancellationSignal;
use crate::error::MatcherError;
use crate::matcher::TargetingMatcher;
use crate::matchers::CriteriaMatcher;
use crate::result::{MatchFailure, MatchResult, OverallMatchResult};

struct ResultCache {
    store: Arc<dyn CacheStore<OverallMatchResult>>,
    policy: CachePolicy,
}

/// Counts and latency figures over the registered matchers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatcherStatistics {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub parallel_safe: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<i32, usize>,
    pub total_expected_us: u64,
    pub max_expected_us: u64,
    pub average_expected_us: u64,
}

/// Owns the matcher registry and dispatches criteria to matchers.
///
/// Registration and lookup may race freely: lookups take a snapshot of
/// the `Arc` so an unregistered matcher finishes any in-flight work.
pub struct MatcherManager {
    matchers: RwLock<HashMap<String, Arc<dyn TargetingMatcher>>>,
    overall_timeout: Duration,
    cache: Option<ResultCache>,
}

type Outcome = Result<MatchResult, MatcherError>;

impl MatcherManager {
    pub fn new(overall_timeout: Duration) -> Self {
        Self {
            matchers: RwLock::new(HashMap::new()),
            overall_timeout,
            cache: None,
        }
    }

    pub fn with_cache(mut self, store: Arc<dyn CacheStore<OverallMatchResult>>, policy: CachePolicy) -> Self {
        self.cache = Some(ResultCache { store, policy });
        self
    }

    /// Registers the built-in matchers with the per-id overrides from
    /// config, and an in-process result cache when enabled.
    pub fn from_config(config: &EngineConfig) -> TargetingResult<Self> {
        let matching = &config.matching;
        let mut manager = Self::new(matching.overall_timeout());
        if matching.cache_enabled {
            let policy = CachePolicy::from(&config.cache);
            let store: LocalCache<OverallMatchResult> = LocalCache::new(policy.retention(), config.cache.max_entries);
            manager = manager.with_cache(Arc::new(store), policy);
        }

        for criteria_type in CriteriaType::ALL {
            let mut matcher =
                CriteriaMatcher::new(criteria_type).with_max_execution_time(matching.default_matcher_timeout());
            if let Some(settings) = matching.settings_for(criteria_type.as_str()) {
                matcher = matcher.with_enabled(settings.enabled);
                if let Some(priority) = settings.priority {
                    matcher = matcher.with_priority(priority);
                }
                if let Some(timeout_ms) = settings.timeout_ms {
                    matcher = matcher.with_max_execution_time(Duration::from_millis(timeout_ms));
                }
            }
            manager.register_matcher(Arc::new(matcher))?;
        }
        for settings in &matching.matchers {
            if manager.get_matcher(&settings.id).is_none() {
                warn!(matcher_id = %settings.id, "Override for unknown matcher ignored");
            }
        }

        info!(
            node = %config.node_id,
            matchers = manager.matcher_count(),
            overall_timeout_ms = matching.overall_timeout_ms,
            cache = matching.cache_enabled,
            "Matcher manager configured"
        );
        Ok(manager)
    }

    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }

    /// Add or replace a matcher. Matchers failing their self-validation
    /// are rejected.
    pub fn register_matcher(&self, matcher: Arc<dyn TargetingMatcher>) -> TargetingResult<()> {
        let validation = matcher.self_validate();
        if !validation.is_valid() {
            return Err(TargetingError::Validation(validation.summary));
        }
        let id = matcher.id().to_string();
        let replaced = self.matchers.write().insert(id.clone(), matcher).is_some();
        info!(matcher_id = %id, replaced, "Matcher registered");
        Ok(())
    }

    pub fn unregister_matcher(&self, matcher_id: &str) -> Option<Arc<dyn TargetingMatcher>> {
        let removed = self.matchers.write().remove(matcher_id);
        if removed.is_some() {
            info!(matcher_id, "Matcher unregistered");
        }
        removed
    }

    pub fn get_matcher(&self, matcher_id: &str) -> Option<Arc<dyn TargetingMatcher>> {
        self.matchers.read().get(matcher_id).cloned()
    }

    pub fn matcher_count(&self) -> usize {
        self.matchers.read().len()
    }

    /// Enabled matchers ordered by priority, then id.
    pub fn get_all_matchers(&self) -> Vec<Arc<dyn TargetingMatcher>> {
        let mut enabled: Vec<_> = self
            .matchers
            .read()
            .values()
            .filter(|m| m.is_enabled())
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.priority().cmp(&b.priority()).then_with(|| a.id().cmp(b.id())));
        enabled
    }

    /// The enabled matcher with the best priority supporting the type.
    pub fn matcher_for(&self, criteria_type: CriteriaType) -> Option<Arc<dyn TargetingMatcher>> {
        self.get_all_matchers()
            .into_iter()
            .find(|m| m.is_supported(criteria_type))
    }

    /// Self-validation of every registered matcher, keyed by id.
    pub fn validate_all_matchers(&self) -> BTreeMap<String, ValidationResult> {
        let snapshot: Vec<_> = self.matchers.read().values().cloned().collect();
        snapshot
            .into_iter()
            .map(|m| (m.id().to_string(), m.self_validate()))
            .collect()
    }

    pub fn get_statistics(&self) -> MatcherStatistics {
        let matchers = self.matchers.read();
        let mut stats = MatcherStatistics {
            total: matchers.len(),
            ..Default::default()
        };
        for matcher in matchers.values() {
            let d = matcher.descriptor();
            if d.enabled {
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
            if d.can_run_in_parallel {
                stats.parallel_safe += 1;
            }
            *stats.by_type.entry(d.matcher_type.to_string()).or_default() += 1;
            *stats.by_priority.entry(d.priority).or_default() += 1;
            let expected = d.expected_execution_time.as_micros() as u64;
            stats.total_expected_us += expected;
            stats.max_expected_us = stats.max_expected_us.max(expected);
        }
        if stats.total > 0 {
            stats.average_expected_us = stats.total_expected_us / stats.total as u64;
        }
        stats
    }

    /// Evaluate every enabled criteria entry concurrently and aggregate.
    ///
    /// Never fails: unsupported criteria, matcher errors, timeouts and
    /// panics become `failures` and are left out of the weighted score.
    pub async fn execute_matching(
        &self,
        context: &TargetingContext,
        criteria: &[TargetingCriteria],
        callbacks: Arc<dyn CallbackProvider>,
    ) -> OverallMatchResult {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.overall_timeout;
        metrics::counter!("matching.requests").increment(1);

        let cache_key = self.cache_key(context, criteria);
        if let Some(hit) = self.cached(cache_key.as_deref(), context, criteria, callbacks.as_ref()).await {
            return hit;
        }

        let context = Arc::new(context.clone());
        let cancel = CancellationSignal::new();
        let watchdog = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                cancel.cancel();
            })
        };

        let mut pending: Vec<(usize, &TargetingCriteria, String, JoinHandle<Outcome>)> = Vec::new();
        let mut failures = Vec::new();
        for (index, entry) in criteria.iter().enumerate() {
            if !entry.is_enabled() {
                debug!(criteria = %entry.name(), "Criteria disabled, skipped");
                continue;
            }
            let Some(matcher) = self.matcher_for(entry.criteria_type()) else {
                warn!(criteria = %entry.name(), criteria_type = %entry.criteria_type(), "No matcher registered");
                failures.push(failure(index, entry, None, MatcherError::UnsupportedCriteria {
                    criteria_type: entry.criteria_type().to_string(),
                }));
                continue;
            };
            let matcher_id = matcher.id().to_string();
            let limit = matcher
                .descriptor()
                .max_execution_time
                .min(deadline.saturating_duration_since(tokio::time::Instant::now()));
            let handle = spawn_matcher(
                matcher,
                Arc::clone(&context),
                entry.clone(),
                Arc::clone(&callbacks),
                cancel.clone(),
                limit,
            );
            pending.push((index, entry, matcher_id, handle));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (index, entry, matcher_id, handle) in pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let error = if join_error.is_panic() {
                        MatcherError::Panicked {
                            matcher_id: matcher_id.clone(),
                        }
                    } else {
                        MatcherError::Cancelled {
                            matcher_id: matcher_id.clone(),
                        }
                    };
                    callbacks.on_match_error(&matcher_id, &error);
                    Err(error)
                }
            };
            match outcome {
                Ok(result) => {
                    metrics::counter!("matching.matcher.completed", "matcher" => matcher_id).increment(1);
                    results.push(result);
                }
                Err(error) => {
                    if error.is_timeout() {
                        metrics::counter!("matching.matcher.timeout", "matcher" => matcher_id.clone()).increment(1);
                    } else {
                        metrics::counter!("matching.matcher.failed", "matcher" => matcher_id.clone()).increment(1);
                    }
                    warn!(matcher_id = %matcher_id, criteria = %entry.name(), error = %error, "Matcher excluded from aggregate");
                    failures.push(failure(index, entry, Some(matcher_id), error));
                }
            }
        }
        watchdog.abort();
        failures.sort_by_key(|f| f.index);

        let mut overall = OverallMatchResult::new(results, failures);
        overall.duration_us = start.elapsed().as_micros() as u64;
        metrics::histogram!("matching.latency_us").record(overall.duration_us as f64);
        debug!(
            context_id = %context.context_id(),
            succeeded = overall.successful_count(),
            failed = overall.failed_count(),
            total_score = overall.total_score,
            duration_us = overall.duration_us,
            "Matching complete"
        );

        self.store(cache_key.as_deref(), &overall).await;
        overall
    }

    fn cache_key(&self, context: &TargetingContext, criteria: &[TargetingCriteria]) -> Option<String> {
        self.cache.as_ref()?;
        match fingerprint(context, criteria) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Fingerprint failed, bypassing cache");
                None
            }
        }
    }

    /// A cached decision is re-issued for the current context: result
    /// entity ids are rewritten and the callback lifecycle is replayed.
    async fn cached(
        &self,
        key: Option<&str>,
        context: &TargetingContext,
        criteria: &[TargetingCriteria],
        callbacks: &dyn CallbackProvider,
    ) -> Option<OverallMatchResult> {
        let (cache, key) = (self.cache.as_ref()?, key?);
        let Some(entry) = cache.store.get(key).await else {
            metrics::counter!("matching.cache.miss").increment(1);
            return None;
        };
        match cache.policy.classify(entry.age) {
            Freshness::Fresh | Freshness::Stale => {
                metrics::counter!("matching.cache.hit").increment(1);
                let mut hit = entry.value;
                hit.from_cache = true;
                // Stored decisions have no failures, so results line up
                // with the enabled criteria.
                let enabled = criteria.iter().filter(|c| c.is_enabled());
                for (result, source) in hit.results.iter_mut().zip(enabled) {
                    result.entity_id = context.context_id().to_string();
                    callbacks.on_match_started(&result.matcher_id, source);
                    callbacks.on_match_completed(&result.matcher_id, result);
                }
                debug!(context_id = %context.context_id(), results = hit.results.len(), "Decision served from cache");
                Some(hit)
            }
            Freshness::Expired => {
                metrics::counter!("matching.cache.miss").increment(1);
                None
            }
        }
    }

    /// Only complete decisions are cached.
    async fn store(&self, key: Option<&str>, overall: &OverallMatchResult) {
        let (Some(cache), Some(key)) = (self.cache.as_ref(), key) else {
            return;
        };
        if overall.failed_count() == 0 {
            cache
                .store
                .set(key, overall.clone(), cache.policy.retention(), cache.policy.priority)
                .await;
        }
    }
}

fn spawn_matcher(
    matcher: Arc<dyn TargetingMatcher>,
    context: Arc<TargetingContext>,
    criteria: TargetingCriteria,
    callbacks: Arc<dyn CallbackProvider>,
    cancel: CancellationSignal,
    limit: Duration,
) -> JoinHandle<Outcome> {
    tokio::spawn(async move {
        let matcher_id = matcher.id().to_string();
        callbacks.on_match_started(&matcher_id, &criteria);
        let started = Instant::now();
        let run = matcher.calculate_match_score(&context, &criteria, callbacks.as_ref(), &cancel);
        let outcome = match tokio::time::timeout(limit, run).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MatcherError::Timeout {
                matcher_id: matcher_id.clone(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        };
        match &outcome {
            Ok(result) => callbacks.on_match_completed(&matcher_id, result),
            Err(error) => callbacks.on_match_error(&matcher_id, error),
        }
        outcome
    })
}

fn failure(index: usize, criteria: &TargetingCriteria, matcher_id: Option<String>, error: MatcherError) -> MatchFailure {
    MatchFailure {
        index,
        criteria_name: criteria.name().to_string(),
        criteria_type: criteria.criteria_type(),
        matcher_id,
        error,
    }
}
