mod common;

use common::{clock, handler, millis, outcome, timeout, FakeEngine, FakePage};
use flakeguard_core::accessibility::{
    validate_accessibility_tools, RuleSelection, AUDIT_OPERATION, INVENTORY_SCRIPT,
};
use flakeguard_core::{
    ConformanceLevel, DriverError, FlakeguardConfig, Impact, Resolution, ResilienceHandler,
    ResultSource,
};
use serde_json::json;

fn resolutions<C: flakeguard_core::Clock>(handler: &ResilienceHandler<C>) -> Vec<Resolution> {
    handler.log().reports().iter().map(|r| r.resolution).collect()
}

fn inventory_with_unlabelled_input() -> serde_json::Value {
    json!({
        "images": [
            {"node": {"target": "img.logo", "html": "<img class=\"logo\" alt=\"Logo\">"}, "hasAlt": true}
        ],
        "controls": [
            {"node": {"target": "input#q", "html": "<input id=\"q\">"}, "hasLabel": false}
        ],
        "buttons": [
            {"node": {"target": "button.save", "html": "<button>Save</button>"}, "text": "Save"}
        ]
    })
}

#[tokio::test]
async fn primary_scan_result_is_scored() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new();
    let engine = FakeEngine::new().full_scans(vec![Ok(outcome(&[Impact::Critical], &[1, 1]))]);

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "home", "light", None)
        .await;

    assert_eq!(result.source, ResultSource::Primary);
    assert_eq!(result.score, 17);
    assert!(result.error.is_none());
    assert!(handler.log().is_empty());

    // the reduced scan ran alongside the primary
    let selections = engine.selections();
    assert_eq!(selections.len(), 2);
    assert!(selections
        .iter()
        .any(|s| matches!(s, RuleSelection::Rules(rules) if rules.contains(&"color-contrast".to_string()))));
}

#[tokio::test]
async fn stricter_level_scans_broader_tags() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new();
    let engine = FakeEngine::new();

    handler
        .run_audit_with_fallbacks(&page, &engine, "home", "light", Some(ConformanceLevel::AAA))
        .await;

    let tags = engine
        .selections()
        .into_iter()
        .find_map(|s| match s {
            RuleSelection::Tags(tags) => Some(tags),
            RuleSelection::Rules(_) => None,
        })
        .unwrap();
    assert!(tags.contains(&"wcag2a".to_string()));
    assert!(tags.contains(&"wcag2aa".to_string()));
    assert!(tags.contains(&"wcag2aaa".to_string()));
}

#[tokio::test]
async fn reduced_scan_covers_a_failing_primary() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new();
    let engine = FakeEngine::new()
        .default_full_scan(Err(timeout()))
        .reduced_scan(Ok(outcome(&[], &[4])));

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "home", "dark", None)
        .await;

    assert_eq!(result.source, ResultSource::Fallback);
    assert_eq!(result.score, 100);
    // audit retries stop after two attempts
    assert_eq!(clock.sleeps(), millis(&[1000]));
    assert_eq!(resolutions(&handler), vec![Resolution::Fail, Resolution::Fallback]);

    let last = handler.log().last().unwrap();
    assert_eq!(last.context.operation, AUDIT_OPERATION);
    assert!(last.recovery_successful);
}

#[tokio::test]
async fn manual_checks_follow_failed_scans() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new().on_evaluate(INVENTORY_SCRIPT, Ok(inventory_with_unlabelled_input()));
    let engine = FakeEngine::new()
        .default_full_scan(Err(DriverError::Evaluation("axe.run rejected".into())))
        .reduced_scan(Err(DriverError::Evaluation("axe.run rejected".into())));

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "signup", "light", None)
        .await;

    assert_eq!(result.source, ResultSource::Manual);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].impact, Impact::Critical);
    assert_eq!(result.violations[0].nodes[0].target, "input#q");
    // P = 1 image + 1 button, W = 10
    assert_eq!(result.score, 17);
    // evaluation errors are not retryable
    assert!(clock.sleeps().is_empty());
    assert_eq!(resolutions(&handler), vec![Resolution::Fail, Resolution::Fallback]);
}

#[tokio::test]
async fn unavailable_engine_skips_to_manual_checks() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new().on_evaluate(INVENTORY_SCRIPT, Ok(inventory_with_unlabelled_input()));
    let engine = FakeEngine::new().loaded(Ok(false));

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "home", "light", None)
        .await;

    assert_eq!(result.source, ResultSource::Manual);
    assert!(engine.selections().is_empty());
    assert_eq!(resolutions(&handler), vec![Resolution::Skip, Resolution::Fallback]);

    let skip = &handler.log().reports()[0];
    assert!(!skip.recovery_attempted);
    assert_eq!(skip.error.name, "EngineUnavailableError");
}

#[tokio::test]
async fn total_failure_returns_a_placeholder() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new().on_evaluate(
        INVENTORY_SCRIPT,
        Err(DriverError::TargetClosed("page has been closed".into())),
    );
    let engine = FakeEngine::new().loaded(Ok(false));

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "home", "light", None)
        .await;

    assert_eq!(result.source, ResultSource::Placeholder);
    assert_eq!(result.score, 0);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].impact, Impact::Critical);
    assert!(result.passes.is_empty());
    let error = result.error.as_deref().unwrap();
    assert!(error.starts_with("Accessibility engine unavailable"));
    assert!(error.contains("page has been closed"));
    assert_eq!(resolutions(&handler), vec![Resolution::Skip, Resolution::Fail]);
}

#[tokio::test]
async fn placeholder_names_the_failed_primary_scan() {
    let clock = clock();
    let mut handler = handler(&clock);
    let page = FakePage::new().on_evaluate(
        INVENTORY_SCRIPT,
        Err(DriverError::TargetClosed("page has been closed".into())),
    );
    let engine = FakeEngine::new()
        .default_full_scan(Err(DriverError::timeout("axe.run", 30_000)))
        .reduced_scan(Err(DriverError::Evaluation("axe.run rejected".into())));

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "home", "light", None)
        .await;

    assert_eq!(result.source, ResultSource::Placeholder);
    let error = result.error.as_deref().unwrap();
    assert!(error.starts_with("Timeout 30000ms exceeded while running axe.run"));
    assert!(error.contains("page has been closed"));
    assert!(result.violations[0].description.contains("axe.run"));

    assert_eq!(resolutions(&handler), vec![Resolution::Fail, Resolution::Fail]);
    let last = handler.log().last().unwrap();
    assert_eq!(last.error.name, "TimeoutError");
    assert_eq!(last.context.operation, AUDIT_OPERATION);
}

#[tokio::test]
async fn probe_can_be_disabled() {
    let clock = clock();
    let mut config = FlakeguardConfig::default();
    config.audit.probe_before_scan = false;
    let mut handler = ResilienceHandler::with_clock(config, clock.clone());
    let page = FakePage::new();
    let engine = FakeEngine::new()
        .loaded(Ok(false))
        .full_scans(vec![Ok(outcome(&[], &[2]))]);

    let result = handler
        .run_audit_with_fallbacks(&page, &engine, "home", "light", None)
        .await;

    assert_eq!(result.source, ResultSource::Primary);
    assert_eq!(result.score, 100);
}

#[tokio::test]
async fn probe_reports_each_capability() {
    let page = FakePage::new();
    let engine = FakeEngine::new();
    let tools = validate_accessibility_tools(&page, &engine).await;
    assert!(tools.engine_loaded);
    assert!(tools.dom_query_works);
    assert!(tools.engine_usable());
    assert!(tools.error.is_none());

    let engine = FakeEngine::new().loaded(Err(DriverError::Evaluation("axe is not defined".into())));
    let page = FakePage::new().on_evaluate(
        "body *",
        Err(DriverError::Protocol("Execution context was destroyed".into())),
    );
    let tools = validate_accessibility_tools(&page, &engine).await;
    assert!(!tools.engine_loaded);
    assert!(!tools.dom_query_works);
    let error = tools.error.unwrap();
    assert!(error.contains("axe is not defined"));
    assert!(error.contains("Execution context was destroyed"));
}
