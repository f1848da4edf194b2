//! Concurrent execution through the manager: isolation of slow, failing
//! and panicking matchers, callback accounting, hot registration and the
//! result cache.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use targeting_cache::{CachePolicy, LocalCache};
use targeting_core::facts::{DeviceInfo, DeviceType, GeoInfo, TagSet, REQUEST_TIME_KEY};
use targeting_core::{PropertyCategory, TargetingContext};
use targeting_criteria::{AdministrativeGeoTargeting, CriteriaType, DeviceTargeting, TagTargeting, TargetingCriteria};
use targeting_geo::AdministrativeLocation;
use targeting_matching::{
    CallbackEvent, CallbackProvider, CancellationSignal, CriteriaMatcher, MatchResult, MatcherDescriptor,
    MatcherError, MatcherManager, NoOpCallbacks, OverallMatchResult, RecordingCallbacks, TargetingMatcher,
};

/// Sleeps far past its limit, then errors.
struct SlowMatcher {
    descriptor: MatcherDescriptor,
}

impl SlowMatcher {
    fn new(max: Duration) -> Self {
        let mut descriptor = MatcherDescriptor::new("slow-geo", "Slow geo matcher", CriteriaType::Geo);
        descriptor.max_execution_time = max;
        Self { descriptor }
    }
}

#[async_trait]
impl TargetingMatcher for SlowMatcher {
    fn descriptor(&self) -> &MatcherDescriptor {
        &self.descriptor
    }

    async fn calculate_match_score(
        &self,
        _context: &TargetingContext,
        _criteria: &TargetingCriteria,
        _callbacks: &dyn CallbackProvider,
        _cancel: &CancellationSignal,
    ) -> Result<MatchResult, MatcherError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Err(MatcherError::failed(self.id(), "upstream lookup failed"))
    }
}

/// Waits for the shared cancellation signal and reports it.
struct WaitingMatcher {
    descriptor: MatcherDescriptor,
}

#[async_trait]
impl TargetingMatcher for WaitingMatcher {
    fn descriptor(&self) -> &MatcherDescriptor {
        &self.descriptor
    }

    async fn calculate_match_score(
        &self,
        _context: &TargetingContext,
        _criteria: &TargetingCriteria,
        _callbacks: &dyn CallbackProvider,
        cancel: &CancellationSignal,
    ) -> Result<MatchResult, MatcherError> {
        cancel.cancelled().await;
        cancel.check(self.id())?;
        Err(MatcherError::failed(self.id(), "woke without cancellation"))
    }
}

struct PanickingMatcher {
    descriptor: MatcherDescriptor,
}

#[async_trait]
impl TargetingMatcher for PanickingMatcher {
    fn descriptor(&self) -> &MatcherDescriptor {
        &self.descriptor
    }

    async fn calculate_match_score(
        &self,
        _context: &TargetingContext,
        _criteria: &TargetingCriteria,
        _callbacks: &dyn CallbackProvider,
        _cancel: &CancellationSignal,
    ) -> Result<MatchResult, MatcherError> {
        panic!("matcher bug");
    }
}

fn request_context() -> TargetingContext {
    context_for("req-7")
}

fn context_for(id: &str) -> TargetingContext {
    let mut ctx = TargetingContext::with_id("request", id).unwrap();
    ctx.set_fact(&DeviceInfo {
        device_type: Some(DeviceType::Mobile),
        ..Default::default()
    })
    .unwrap();
    ctx.set_fact(&TagSet {
        tags: vec!["vip".into(), "sports".into()],
    })
    .unwrap();
    ctx.set_fact(&GeoInfo {
        country_code: Some("US".into()),
        city_name: Some("San Francisco".into()),
        ..Default::default()
    })
    .unwrap();
    ctx
}

fn criteria_set() -> Vec<TargetingCriteria> {
    let mut device = DeviceTargeting::new("mobile").unwrap();
    device.set_device_types(&[DeviceType::Mobile]).unwrap();

    let mut tag = TagTargeting::new("vip").unwrap();
    tag.set_required_tags(&["vip".to_string()]).unwrap();

    let mut geo = AdministrativeGeoTargeting::new("us").unwrap();
    geo.set_included_locations(&[AdministrativeLocation::country("US")])
        .unwrap();

    vec![device.into(), tag.into(), geo.into()]
}

fn manager_with(overall: Duration, geo: Arc<dyn TargetingMatcher>) -> MatcherManager {
    let manager = MatcherManager::new(overall);
    manager
        .register_matcher(Arc::new(CriteriaMatcher::new(CriteriaType::Device)))
        .unwrap();
    manager
        .register_matcher(Arc::new(CriteriaMatcher::new(CriteriaType::Tag)))
        .unwrap();
    manager.register_matcher(geo).unwrap();
    manager
}

#[tokio::test]
async fn slow_matcher_is_isolated() {
    let manager = manager_with(
        Duration::from_millis(100),
        Arc::new(SlowMatcher::new(Duration::from_millis(30))),
    );
    let callbacks = RecordingCallbacks::new();

    let started = Instant::now();
    let overall = manager
        .execute_matching(&request_context(), &criteria_set(), callbacks.clone())
        .await;
    assert!(started.elapsed() < Duration::from_millis(400));

    assert_eq!(overall.successful_count(), 2);
    assert_eq!(overall.failed_count(), 1);
    let failure = &overall.failures[0];
    assert_eq!(failure.index, 2);
    assert_eq!(failure.matcher_id.as_deref(), Some("slow-geo"));
    assert!(matches!(failure.error, MatcherError::Timeout { .. }));

    // The failed matcher is excluded, so the two matches score 1.0.
    assert_eq!(overall.total_score, 1.0);
    assert!(overall.is_matched());

    assert_eq!(callbacks.started(), 3);
    assert_eq!(callbacks.completed(), 2);
    assert_eq!(callbacks.errors(), 1);
    let slow_events = callbacks.events_for("slow-geo");
    assert_eq!(slow_events.len(), 2);
    assert!(matches!(slow_events[0], CallbackEvent::Started { .. }));
    assert!(matches!(slow_events[1], CallbackEvent::Error { .. }));
}

#[tokio::test]
async fn deadline_cancels_waiting_matcher() {
    let mut descriptor = MatcherDescriptor::new("waiting-geo", "Waiting geo matcher", CriteriaType::Geo);
    descriptor.max_execution_time = Duration::from_secs(5);
    let manager = manager_with(Duration::from_millis(40), Arc::new(WaitingMatcher { descriptor }));

    let started = Instant::now();
    let overall = manager
        .execute_matching(&request_context(), &criteria_set(), Arc::new(NoOpCallbacks))
        .await;
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(overall.successful_count(), 2);
    assert!(overall.failures[0].error.is_timeout());
}

#[tokio::test]
async fn panicking_matcher_reports_once() {
    let descriptor = MatcherDescriptor::new("panicky-geo", "Panicking geo matcher", CriteriaType::Geo);
    let manager = manager_with(Duration::from_millis(200), Arc::new(PanickingMatcher { descriptor }));
    let callbacks = RecordingCallbacks::new();

    let overall = manager
        .execute_matching(&request_context(), &criteria_set(), callbacks.clone())
        .await;
    assert_eq!(overall.successful_count(), 2);
    assert!(matches!(overall.failures[0].error, MatcherError::Panicked { .. }));

    let events = callbacks.events_for("panicky-geo");
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], CallbackEvent::Error { .. }));
}

#[tokio::test]
async fn every_matcher_failing_scores_zero() {
    let manager = MatcherManager::new(Duration::from_millis(100));
    manager
        .register_matcher(Arc::new(SlowMatcher::new(Duration::from_millis(10))))
        .unwrap();
    let geo_only: Vec<_> = criteria_set().into_iter().skip(2).collect();

    let overall = manager
        .execute_matching(&request_context(), &geo_only, Arc::new(NoOpCallbacks))
        .await;
    assert_eq!(overall.successful_count(), 0);
    assert_eq!(overall.total_score, 0.0);
    assert!(!overall.is_matched());
}

#[tokio::test]
async fn aggregate_matches_default_geo_matcher() {
    let manager = manager_with(
        Duration::from_millis(200),
        Arc::new(CriteriaMatcher::new(CriteriaType::Geo)),
    );
    let ctx = request_context();
    let before = ctx.clone();
    let overall = manager
        .execute_matching(&ctx, &criteria_set(), Arc::new(NoOpCallbacks))
        .await;
    assert_eq!(overall.successful_count(), 3);
    assert!(overall.is_matched());
    let geo = overall.result_for("us").unwrap();
    assert_eq!(geo.matcher_id, "geo");
    assert_eq!(geo.entity_id, "req-7");
    assert_eq!(ctx, before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hot_registration_during_execution() {
    let manager = Arc::new(manager_with(
        Duration::from_millis(200),
        Arc::new(CriteriaMatcher::new(CriteriaType::Geo)),
    ));

    let churn = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for _ in 0..200 {
                manager.unregister_matcher("tag");
                tokio::task::yield_now().await;
                manager
                    .register_matcher(Arc::new(CriteriaMatcher::new(CriteriaType::Tag)))
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..50 {
        let overall = manager
            .execute_matching(&request_context(), &criteria_set(), Arc::new(NoOpCallbacks))
            .await;
        assert_eq!(overall.successful_count() + overall.failed_count(), 3);
        for failure in &overall.failures {
            assert_eq!(failure.criteria_type, CriteriaType::Tag);
            assert_eq!(failure.error.code(), "unsupported_criteria");
        }
    }
    churn.await.unwrap();
    assert!(manager.get_matcher("tag").is_some());
}

#[tokio::test(start_paused = true)]
async fn matcher_limit_bounds_the_wait() {
    let manager = manager_with(
        Duration::from_millis(100),
        Arc::new(SlowMatcher::new(Duration::from_millis(30))),
    );
    let started = tokio::time::Instant::now();
    let overall = manager
        .execute_matching(&request_context(), &criteria_set(), Arc::new(NoOpCallbacks))
        .await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(30), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(100), "{elapsed:?}");
    assert_eq!(overall.failures.len(), 1);
}

fn cached_manager(geo: Arc<dyn TargetingMatcher>) -> (MatcherManager, Arc<LocalCache<OverallMatchResult>>) {
    let policy = CachePolicy::new(Duration::from_secs(30));
    let store = Arc::new(LocalCache::new(policy.retention(), 64));
    let manager = manager_with(Duration::from_millis(200), geo).with_cache(store.clone(), policy);
    (manager, store)
}

#[tokio::test]
async fn cached_decision_is_reissued_for_the_new_context() {
    let (manager, store) = cached_manager(Arc::new(CriteriaMatcher::new(CriteriaType::Geo)));
    let at = chrono::Utc::now();
    let mut first_ctx = context_for("a");
    first_ctx.set_value(REQUEST_TIME_KEY, &at, PropertyCategory::Time).unwrap();
    let mut second_ctx = context_for("b");
    second_ctx.set_value(REQUEST_TIME_KEY, &at, PropertyCategory::Time).unwrap();

    let first = manager
        .execute_matching(&first_ctx, &criteria_set(), Arc::new(NoOpCallbacks))
        .await;
    assert!(!first.from_cache);
    assert_eq!(store.len(), 1);

    let callbacks = RecordingCallbacks::new();
    let second = manager
        .execute_matching(&second_ctx, &criteria_set(), callbacks.clone())
        .await;
    assert!(second.from_cache);
    assert_eq!(second.total_score, first.total_score);
    assert_eq!(second.results.len(), 3);
    assert!(second.results.iter().all(|r| r.entity_id == "b"));
    assert!(first.results.iter().all(|r| r.entity_id == "a"));

    assert_eq!(callbacks.started(), 3);
    assert_eq!(callbacks.completed(), 3);
    assert_eq!(callbacks.errors(), 0);
    let geo_events = callbacks.events_for("geo");
    assert!(matches!(geo_events[0], CallbackEvent::Started { .. }));
    assert!(matches!(geo_events[1], CallbackEvent::Completed { .. }));
}

#[tokio::test]
async fn decision_with_failures_is_not_cached() {
    let (manager, store) = cached_manager(Arc::new(SlowMatcher::new(Duration::from_millis(20))));

    let first = manager
        .execute_matching(&request_context(), &criteria_set(), Arc::new(NoOpCallbacks))
        .await;
    assert_eq!(first.failed_count(), 1);
    assert_eq!(store.len(), 0);

    let second = manager
        .execute_matching(&request_context(), &criteria_set(), Arc::new(NoOpCallbacks))
        .await;
    assert!(!second.from_cache);
    assert_eq!(second.failed_count(), 1);
    assert!(matches!(second.failures[0].error, MatcherError::Timeout { .. }));
}
