//! End-to-end flows through a guard over recording natives.

use std::sync::{Arc, Mutex};

use serde_json::json;
use zhorn_core::{GuardError, Method, SinkCategory, SinkName};
use zhorn_events::Notification;
use zhorn_interceptor::{ChangeKind, ImageResource, OutboundRequest, PolicyConfig};
use zhorn_policy::{MatchMode, UrlVetter, ValidationError};
use zhorn_test::{
    EventLog, MockElement, SpyValidator, test_guard, test_policy_config, test_shimmed_guard,
};

const COLLECT: &str = "https://a.example.com/collect";

fn blocked_message(err: &GuardError) -> String {
    assert!(err.is_blocked(), "expected a block, got {err:?}");
    err.to_string()
}

// ---------------------------------------------------------------------------
// Basic scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_whitelisted_call_is_forwarded_unchanged() {
    let (guard, host) = test_guard();
    let spy = SpyValidator::approving();
    guard.activate(PolicyConfig::new([COLLECT]).with_validator(spy.clone()));

    let payload = json!({"event": "view"});
    assert!(guard.send_beacon(COLLECT, Some(payload.clone())).unwrap());

    let calls = host.beacon.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, COLLECT);
    assert_eq!(calls[0].data, Some(payload));
    assert_eq!(spy.call_count(), 1);
    assert_eq!(spy.seen()[0].sink, SinkName::SendBeacon);
}

#[test]
fn test_unlisted_destination_is_blocked() {
    let (guard, host) = test_guard();
    let spy = SpyValidator::approving();
    guard.activate(PolicyConfig::new([COLLECT]).with_validator(spy.clone()));

    let request = OutboundRequest::new(Method::Post, "https://evil.example.com/x");
    let err = guard.fetch(&request).unwrap_err();
    let message = blocked_message(&err);

    assert!(message.contains("https://evil.example.com/x"));
    assert!(message.contains(SinkName::Fetch.as_str()));
    assert!(message.ends_with("via HTTP POST"));
    assert_eq!(host.requests.call_count(), 0);
    // The whitelist vetoed first, so the validator never ran.
    assert_eq!(spy.call_count(), 0);
}

#[test]
fn test_script_uri_never_reaches_the_bus() {
    let (guard, host) = test_guard();
    let spy = SpyValidator::approving();
    guard.activate(PolicyConfig::new([COLLECT]).with_validator(spy.clone()));
    let log = EventLog::attach(guard.notifications());

    let image = guard.create_image().unwrap();
    let err = image.set_src("javascript:alert(1)").unwrap_err();

    assert!(err.is_blocked());
    assert_eq!(spy.call_count(), 0);
    assert!(host.images.loads().is_empty());
    assert_eq!(log.event_types(), vec!["callblocked"]);
}

#[test]
fn test_prefix_whitelist_is_anchored_to_origin() {
    let (guard, host) = test_guard();
    guard.activate(
        PolicyConfig::new(["https://a.example.com"]).with_match_mode(MatchMode::Prefix),
    );

    guard
        .send_beacon("https://a.example.com/collect", None)
        .unwrap();
    for lookalike in [
        "https://a.example.com.evil.net/steal",
        "https://a.example.com:8443/collect",
        "https://a.example.community/collect",
    ] {
        let err = guard.send_beacon(lookalike, None).unwrap_err();
        assert!(err.is_blocked(), "{lookalike} should be blocked");
    }
    assert_eq!(host.beacon.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_repeated_activation_returns_same_handle() {
    let (guard, _host) = test_guard();
    let first = guard.activate(test_policy_config());
    let records: Vec<_> = SinkCategory::ALL
        .iter()
        .map(|c| guard.registry().record(*c).unwrap())
        .collect();
    let second = guard.activate(PolicyConfig::new(["https://other.example.com/"]));

    assert_eq!(first, second);
    // No second wrapper layer: every record, and the native it holds, is unchanged.
    for (category, before) in SinkCategory::ALL.iter().zip(&records) {
        let after = guard.registry().record(*category).unwrap();
        assert!(Arc::ptr_eq(before, &after));
        assert!(after.native().same_as(before.native()));
    }
    // The second config was ignored.
    assert!(guard.send_beacon("https://other.example.com/", None).is_err());
    assert!(
        guard
            .send_beacon("https://api.example.com/collect", None)
            .is_ok()
    );
}

#[test]
fn test_destroy_blocks_until_reactivated() {
    let (guard, host) = test_guard();
    let handle = guard.activate(test_policy_config());
    assert!(handle.destroy());
    assert!(!handle.destroy());
    assert!(!guard.is_active());

    let err = guard
        .send_beacon("https://api.example.com/collect", None)
        .unwrap_err();
    assert!(err.is_blocked());
    assert_eq!(host.beacon.call_count(), 0);

    let fresh = guard.activate(test_policy_config());
    assert_ne!(fresh, handle);
    guard
        .send_beacon("https://api.example.com/collect", None)
        .unwrap();
    assert_eq!(host.beacon.call_count(), 1);
}

#[test]
fn test_handle_hides_instance() {
    let (guard, _host) = test_guard();
    let handle = guard.activate(test_policy_config());
    assert!(matches!(
        handle.instance(),
        Err(GuardError::InstanceNotAccessible { subsystem: "interceptor" })
    ));
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

#[test]
fn test_rejecting_validator_blocks() {
    let (guard, host) = test_guard();
    let spy = SpyValidator::rejecting("payload not allowed");
    guard.activate(test_policy_config().with_validator(spy.clone()));

    let request = OutboundRequest::new(Method::Post, "https://api.example.com/collect");
    assert!(guard.xhr_send(&request).unwrap_err().is_blocked());
    assert_eq!(spy.call_count(), 1);
    assert_eq!(host.requests.call_count(), 0);
}

#[test]
fn test_panicking_validator_fails_closed() {
    let (guard, host) = test_guard();
    guard.activate(test_policy_config().with_validator(SpyValidator::panicking("boom")));

    let err = guard
        .send_beacon("https://api.example.com/collect", None)
        .unwrap_err();
    assert!(err.is_blocked());
    assert_eq!(host.beacon.call_count(), 0);
}

#[test]
fn test_param_whitelist_validator() {
    let (guard, host) = test_guard();
    let validator = |vetter: &dyn UrlVetter, intent: &zhorn_core::IntentSnapshot| {
        if vetter.check_params_over_whitelist(
            &intent.destination,
            &["v", "tid", "cid"],
            intent.payload.as_ref(),
        ) {
            Ok(())
        } else {
            Err(ValidationError::new("unexpected parameter"))
        }
    };
    guard.activate(test_policy_config().with_validator(Arc::new(validator)));

    guard
        .send_beacon(
            "https://apis.google-analytics.com/collect?v=1&tid=UA-1",
            Some(json!({"cid": "555"})),
        )
        .unwrap();
    let err = guard
        .send_beacon(
            "https://apis.google-analytics.com/collect?v=1&email=a@b.c",
            None,
        )
        .unwrap_err();
    assert!(err.is_blocked());
    let err = guard
        .send_beacon(
            "https://apis.google-analytics.com/collect?v=1",
            Some(json!({"uid": "42"})),
        )
        .unwrap_err();
    assert!(err.is_blocked());

    assert_eq!(host.beacon.call_count(), 1);
}

#[test]
fn test_validator_may_make_nested_guarded_calls() {
    let (guard, host) = test_guard();
    let weak = guard.downgrade();
    let nested = Arc::new(Mutex::new(Vec::new()));

    let outcomes = Arc::clone(&nested);
    let spy = SpyValidator::with_hook(move |snapshot| {
        if snapshot.destination.contains("/collect")
            && let Some(guard) = weak.upgrade()
        {
            let outcome = guard.send_beacon("https://evil.example.com/side", None);
            outcomes.lock().unwrap().push(outcome.is_ok());
        }
    });
    guard.activate(test_policy_config().with_validator(spy.clone()));

    guard
        .send_beacon("https://api.example.com/collect", None)
        .unwrap();

    // The nested call was blocked by the whitelist; the outer one went through.
    assert_eq!(*nested.lock().unwrap(), vec![false]);
    assert_eq!(host.beacon.call_count(), 1);
    assert_eq!(spy.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Attribute inclusion
// ---------------------------------------------------------------------------

#[test]
fn test_shimmed_mutations_keep_order() {
    let (guard, _host) = test_shimmed_guard();
    let sources = [
        "https://cdn.example.com/a.png",
        "https://cdn.example.com/b.png",
        "https://cdn.example.com/c.png",
    ];
    guard.activate(PolicyConfig::new(sources));

    let img = MockElement::silent("img");
    let element = img.as_element();
    for src in sources {
        guard.set_attribute(&element, "src", src).unwrap();
    }

    // Notifications fire synchronously; writes wait for the drain.
    let changes = img.changes();
    assert_eq!(changes.len(), sources.len());
    assert!(changes.iter().all(|c| c.kind == ChangeKind::Addition));
    assert!(img.writes().is_empty());
    assert_eq!(guard.pending_mutations(), sources.len());

    assert_eq!(guard.run_deferred(), sources.len());
    let written: Vec<_> = img.writes().into_iter().filter_map(|(_, v)| v).collect();
    assert_eq!(written, sources);
    assert_eq!(element.get_attribute("src").as_deref(), Some(sources[2]));
}

#[test]
fn test_blocked_shimmed_mutation_leaves_queue_untouched() {
    let (guard, _host) = test_shimmed_guard();
    guard.activate(PolicyConfig::new(["https://cdn.example.com/a.png"]));

    let img = MockElement::silent("img");
    let element = img.as_element();
    guard
        .set_attribute(&element, "src", "https://cdn.example.com/a.png")
        .unwrap();
    assert!(
        guard
            .set_attribute(&element, "src", "https://evil.example.com/b.png")
            .unwrap_err()
            .is_blocked()
    );

    assert_eq!(img.changes().len(), 1);
    assert_eq!(guard.run_deferred(), 1);
    assert_eq!(
        element.get_attribute("src").as_deref(),
        Some("https://cdn.example.com/a.png")
    );
}

#[test]
fn test_validator_draining_queue_does_not_lose_mutation() {
    let (guard, _host) = test_shimmed_guard();
    let weak = guard.downgrade();
    let spy = SpyValidator::with_hook(move |_| {
        if let Some(guard) = weak.upgrade() {
            guard.run_deferred();
        }
    });
    guard.activate(PolicyConfig::new(["https://cdn.example.com/a.png"]).with_validator(spy.clone()));

    let img = MockElement::silent("img");
    let element = img.as_element();
    guard
        .set_attribute(&element, "src", "https://cdn.example.com/a.png")
        .unwrap();

    assert_eq!(spy.call_count(), 1);
    assert!(img.writes().is_empty());
    assert_eq!(guard.pending_mutations(), 1);
    assert_eq!(guard.run_deferred(), 1);
    assert_eq!(
        element.get_attribute("src").as_deref(),
        Some("https://cdn.example.com/a.png")
    );
}

#[test]
fn test_native_attribute_write_is_certified() {
    let (guard, _host) = test_guard();
    guard.activate(PolicyConfig::new(["https://cdn.example.com/logo.png"]));

    let img = MockElement::new("img");
    let element = img.as_element();
    guard
        .set_attribute(&element, "src", "  https://cdn.example.com/logo.png ")
        .unwrap();
    assert_eq!(
        element.get_attribute("src").as_deref(),
        Some("https://cdn.example.com/logo.png")
    );

    // Unguarded attributes skip the pipeline entirely.
    let log = EventLog::attach(guard.notifications());
    guard.set_attribute(&element, "alt", "logo").unwrap();
    assert!(log.all().is_empty());
}

// ---------------------------------------------------------------------------
// Markup and script URLs
// ---------------------------------------------------------------------------

#[test]
fn test_inner_html_reaches_host_cleaned() {
    let (guard, _host) = test_guard();
    let spy = SpyValidator::approving();
    guard.activate(PolicyConfig::new(["https://cdn.example.com/"]).with_validator(spy.clone()));
    let log = EventLog::attach(guard.notifications());

    let div = MockElement::new("div");
    let element = div.as_element();
    guard
        .set_inner_html(
            &element,
            r#"<b onclick="steal()">hi</b><a href="https://cdn.example.com/">x</a><img src="https://cdn.example.com/">"#,
        )
        .unwrap();

    assert_eq!(
        div.inner_html().as_deref(),
        Some(r#"<b>hi</b><img src="https://cdn.example.com/">"#)
    );
    // One intent per resource left after cleaning.
    assert_eq!(spy.call_count(), 1);
    assert_eq!(spy.seen()[0].sink, SinkName::InnerHtml);
    assert_eq!(log.event_types(), vec!["beforeinclude"]);
}

#[test]
fn test_inner_html_with_unlisted_resource_is_blocked() {
    let (guard, _host) = test_guard();
    guard.activate(PolicyConfig::new(["https://cdn.example.com/"]));

    let div = MockElement::new("div");
    let element = div.as_element();
    let err = guard
        .set_inner_html(&element, r#"<p>hi</p><img src="https://evil.example.com/t.gif">"#)
        .unwrap_err();
    let message = blocked_message(&err);

    assert!(message.contains("https://evil.example.com/t.gif"));
    assert!(message.contains(SinkName::InnerHtml.as_str()));
    assert!(div.inner_html().is_none());
}

#[test]
fn test_script_src_is_policy_checked() {
    let (guard, _host) = test_guard();
    guard.activate(PolicyConfig::new(["https://cdn.example.com/lib.js"]));
    let log = EventLog::attach(guard.notifications());

    let script = MockElement::new("script");
    let element = script.as_element();
    guard
        .set_script_src(&element, "https://cdn.example.com/lib.js")
        .unwrap();
    assert_eq!(
        element.get_attribute("src").as_deref(),
        Some("https://cdn.example.com/lib.js")
    );

    let err = guard
        .set_script_src(&element, "https://evil.example.com/x.js")
        .unwrap_err();
    assert!(blocked_message(&err).contains(SinkName::ScriptSrc.as_str()));
    assert_eq!(
        element.get_attribute("src").as_deref(),
        Some("https://cdn.example.com/lib.js")
    );
    assert_eq!(
        log.event_types(),
        vec!["beforeinclude", "beforeinclude", "callblocked"]
    );
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[test]
fn test_notifications_follow_each_call() {
    let (guard, _host) = test_guard();
    guard.activate(test_policy_config());
    let log = EventLog::attach(guard.notifications());

    guard
        .send_beacon("https://api.example.com/collect", None)
        .unwrap();
    let _ = guard.send_beacon("https://evil.example.com/x", None);
    let element = MockElement::new("img").as_element();
    guard
        .set_attribute(&element, "src", "https://cdn.example.com/assets/app.js")
        .unwrap();

    assert_eq!(
        log.event_types(),
        vec!["beforerequest", "beforerequest", "callblocked", "beforeinclude"]
    );

    let all = log.all();
    match all[1].as_ref() {
        Notification::OutboundIntent { intent, vetoed, .. } => {
            assert!(*vetoed);
            assert_eq!(intent.destination, "https://evil.example.com/x");
        },
        other => panic!("unexpected notification {other:?}"),
    }
}
