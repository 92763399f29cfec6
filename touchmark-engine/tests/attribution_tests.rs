//! Integration tests for first-touch/last-touch attribution-window queries

mod support;

use chrono::Duration;
use support::*;
use touchmark_engine::{AttributionPolicy, AttributionQuery};
use uuid::Uuid;

#[tokio::test]
async fn test_first_and_last_touch_diverge() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(40)).await;

    let first = touchpoint_at(&pool, identity.guid, "google", days_ago(20)).await;
    let last = touchpoint_at(&pool, identity.guid, "newsletter", days_ago(5)).await;
    let conversion = conversion_at(&pool, Some(identity.guid), "purchase", days_ago(0)).await;

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    let credited = results[0].touchpoint.as_ref().unwrap();
    assert_eq!(credited.guid, last.guid);
    assert_eq!(results[0].attributed_source(), Some("newsletter"));

    let results = AttributionQuery::first_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    let credited = results[0].touchpoint.as_ref().unwrap();
    assert_eq!(credited.guid, first.guid);
    assert_eq!(results[0].attributed_source(), Some("google"));
}

#[tokio::test]
async fn test_window_lower_bound_is_inclusive() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(60)).await;

    let converted_at = days_ago(0);
    let boundary = converted_at - Duration::days(30);

    // Exactly on the boundary: eligible. One second earlier: not.
    let eligible = touchpoint_at(&pool, identity.guid, "google", boundary).await;
    touchpoint_at(
        &pool,
        identity.guid,
        "facebook",
        boundary - Duration::seconds(1),
    )
    .await;

    let conversion = conversion_at(&pool, Some(identity.guid), "purchase", converted_at).await;

    for query in [
        AttributionQuery::last_touch(30),
        AttributionQuery::first_touch(30),
    ] {
        let results = query.apply(&pool, &[conversion.guid]).await.unwrap();
        let credited = results[0].touchpoint.as_ref().unwrap();
        assert_eq!(credited.guid, eligible.guid);
    }
}

#[tokio::test]
async fn test_touchpoint_at_conversion_instant_is_not_eligible() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(10)).await;

    let at = days_ago(1);
    touchpoint_at(&pool, identity.guid, "google", at).await;
    let conversion = conversion_at(&pool, Some(identity.guid), "purchase", at).await;

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert!(results[0].touchpoint.is_none());
}

#[tokio::test]
async fn test_per_source_window_override() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(60)).await;

    // Both exposures ten days out; facebook's shortened window excludes it
    let google = touchpoint_at(&pool, identity.guid, "google", days_ago(10)).await;
    touchpoint_at(&pool, identity.guid, "facebook", days_ago(10)).await;
    let conversion = conversion_at(&pool, Some(identity.guid), "purchase", days_ago(0)).await;

    let query = AttributionQuery::last_touch(30).with_source_override("facebook", 7);
    let results = query.apply(&pool, &[conversion.guid]).await.unwrap();

    let credited = results[0].touchpoint.as_ref().unwrap();
    assert_eq!(credited.guid, google.guid);
    assert_eq!(results[0].metadata.window_days, 30);
    assert_eq!(
        results[0].metadata.source_overrides.get("facebook"),
        Some(&7)
    );
}

#[tokio::test]
async fn test_source_override_can_widen_window() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(120)).await;

    // Outside the 30-day default but inside the widened source window
    let old = touchpoint_at(&pool, identity.guid, "podcast", days_ago(45)).await;
    let conversion = conversion_at(&pool, Some(identity.guid), "purchase", days_ago(0)).await;

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert!(results[0].touchpoint.is_none());

    let results = AttributionQuery::last_touch(30)
        .with_source_override("podcast", 90)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert_eq!(results[0].touchpoint.as_ref().unwrap().guid, old.guid);
}

#[tokio::test]
async fn test_timestamp_tie_broken_by_guid() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(10)).await;

    let at = days_ago(3);
    let first_tp = touchpoint_at(&pool, identity.guid, "google", at).await;
    let second_tp = touchpoint_at(&pool, identity.guid, "newsletter", at).await;
    let conversion = conversion_at(&pool, Some(identity.guid), "purchase", days_ago(0)).await;

    let (low, high) = if first_tp.guid < second_tp.guid {
        (first_tp, second_tp)
    } else {
        (second_tp, first_tp)
    };

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert_eq!(results[0].touchpoint.as_ref().unwrap().guid, high.guid);

    let results = AttributionQuery::first_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert_eq!(results[0].touchpoint.as_ref().unwrap().guid, low.guid);
}

#[tokio::test]
async fn test_no_eligible_touchpoint_yields_none_with_metadata() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(10)).await;
    let conversion = conversion_at(&pool, Some(identity.guid), "signup", days_ago(0)).await;

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].touchpoint.is_none());
    assert_eq!(results[0].metadata.policy, AttributionPolicy::LastTouch);
    assert_eq!(results[0].metadata.window_days, 30);
    assert_eq!(results[0].conversion.guid, conversion.guid);
}

#[tokio::test]
async fn test_other_identitys_touchpoints_never_credited() {
    let pool = memory_pool().await;
    let converter = identity_at(&pool, days_ago(10)).await;
    let bystander = identity_at(&pool, days_ago(10)).await;

    touchpoint_at(&pool, bystander.guid, "google", days_ago(2)).await;
    let conversion = conversion_at(&pool, Some(converter.guid), "purchase", days_ago(0)).await;

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[conversion.guid])
        .await
        .unwrap();
    assert!(results[0].touchpoint.is_none());
}

#[tokio::test]
async fn test_bulk_query_attributes_each_conversion_independently() {
    let pool = memory_pool().await;

    let alice = identity_at(&pool, days_ago(30)).await;
    let bob = identity_at(&pool, days_ago(30)).await;
    let alice_tp = touchpoint_at(&pool, alice.guid, "google", days_ago(4)).await;
    let bob_tp = touchpoint_at(&pool, bob.guid, "facebook", days_ago(3)).await;

    let alice_conv = conversion_at(&pool, Some(alice.guid), "purchase", days_ago(2)).await;
    let bob_conv = conversion_at(&pool, Some(bob.guid), "purchase", days_ago(1)).await;
    let orphan_conv = conversion_at(&pool, None, "purchase", days_ago(0)).await;

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[alice_conv.guid, bob_conv.guid, orphan_conv.guid])
        .await
        .unwrap();

    // Ordered by conversion creation time
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].conversion.guid, alice_conv.guid);
    assert_eq!(results[0].touchpoint.as_ref().unwrap().guid, alice_tp.guid);
    assert_eq!(results[1].conversion.guid, bob_conv.guid);
    assert_eq!(results[1].touchpoint.as_ref().unwrap().guid, bob_tp.guid);
    assert_eq!(results[2].conversion.guid, orphan_conv.guid);
    assert!(results[2].touchpoint.is_none());
}

#[tokio::test]
async fn test_apply_for_event_selects_by_event_name() {
    let pool = memory_pool().await;
    let identity = identity_at(&pool, days_ago(30)).await;
    touchpoint_at(&pool, identity.guid, "google", days_ago(5)).await;

    conversion_at(&pool, Some(identity.guid), "purchase", days_ago(2)).await;
    conversion_at(&pool, Some(identity.guid), "purchase", days_ago(1)).await;
    conversion_at(&pool, Some(identity.guid), "signup", days_ago(1)).await;

    let results = AttributionQuery::last_touch(30)
        .apply_for_event(&pool, "purchase")
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.conversion.event == "purchase"));
    assert!(results.iter().all(|r| r.touchpoint.is_some()));
}

#[tokio::test]
async fn test_empty_input_returns_empty() {
    let pool = memory_pool().await;
    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[])
        .await
        .unwrap();
    assert!(results.is_empty());

    let results = AttributionQuery::last_touch(30)
        .apply(&pool, &[Uuid::new_v4()])
        .await
        .unwrap();
    assert!(results.is_empty());
}
