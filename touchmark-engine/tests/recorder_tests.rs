//! Integration tests for scoped conversion recording

mod support;

use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use support::*;
use touchmark_common::db::{self, SourceRef};
use touchmark_common::{AttributionConfig, Error};
use touchmark_engine::{record_conversion, ConversionScope, RecordConversion, RecordOutcome};

#[tokio::test]
async fn test_event_outside_allow_list_is_rejected_and_persists_nothing() {
    let pool = memory_pool().await;
    let config = AttributionConfig::default();
    let identity = identity_at(&pool, days_ago(1)).await;

    let scope = ConversionScope::allowing(["signup", "purchase"]);
    let result = record_conversion(
        &pool,
        &config,
        &scope,
        Some(&identity),
        "newsletter_subscribe",
        RecordConversion::default(),
    )
    .await;

    match result {
        Err(Error::EventNotAllowed { event, allowed }) => {
            assert_eq!(event, "newsletter_subscribe");
            assert_eq!(allowed, vec!["purchase".to_string(), "signup".to_string()]);
        }
        other => panic!("Expected EventNotAllowed, got {:?}", other),
    }
    assert_eq!(count_conversions(&pool).await, 0);
}

#[tokio::test]
async fn test_allowed_event_recorded_with_default_currency() {
    let pool = memory_pool().await;
    let config = AttributionConfig::default();
    let identity = identity_at(&pool, days_ago(1)).await;

    let scope = ConversionScope::allowing(["purchase"]);
    let outcome = record_conversion(
        &pool,
        &config,
        &scope,
        Some(&identity),
        "purchase",
        RecordConversion::default().with_value(Decimal::from_str("19.99").unwrap()),
    )
    .await
    .unwrap();

    let conversion = outcome.recorded().unwrap();
    assert_eq!(conversion.identity, Some(identity.guid));
    assert_eq!(conversion.currency, "EUR");
    assert!(conversion.is_confirmed);

    let stored = db::conversions::get_conversion(&pool, conversion.guid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, Some(Decimal::from_str("19.99").unwrap()));
    assert_eq!(stored.event, "purchase");
}

#[tokio::test]
async fn test_missing_identity_skips_under_default_scope() {
    let pool = memory_pool().await;
    let config = AttributionConfig::default();

    let outcome = record_conversion(
        &pool,
        &config,
        &ConversionScope::unrestricted(),
        None,
        "signup",
        RecordConversion::default(),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, RecordOutcome::SkippedNoIdentity));
    assert_eq!(count_conversions(&pool).await, 0);
}

#[tokio::test]
async fn test_optional_identity_scope_records_anonymous_conversion() {
    let pool = memory_pool().await;
    let config = AttributionConfig::default();

    let scope = ConversionScope::unrestricted().with_optional_identity();
    let outcome = record_conversion(
        &pool,
        &config,
        &scope,
        None,
        "newsletter_subscribe",
        RecordConversion::default(),
    )
    .await
    .unwrap();

    let conversion = outcome.recorded().unwrap();
    assert!(conversion.identity.is_none());
    assert_eq!(count_conversions(&pool).await, 1);
}

#[tokio::test]
async fn test_attributes_round_trip_exactly() {
    let pool = memory_pool().await;
    let config = AttributionConfig::default();
    let identity = identity_at(&pool, days_ago(1)).await;

    let attributes = RecordConversion::default()
        .with_value(Decimal::from_str("0.10").unwrap())
        .with_currency("USD")
        .unconfirmed()
        .with_custom_data(json!({"plan": "pro", "seats": 3}))
        .with_source_ref(SourceRef::new("order", "ord-1001"));

    let outcome = record_conversion(
        &pool,
        &config,
        &ConversionScope::unrestricted(),
        Some(&identity),
        "purchase",
        attributes,
    )
    .await
    .unwrap();
    let conversion = outcome.recorded().unwrap();

    let stored = db::conversions::get_conversion(&pool, conversion.guid)
        .await
        .unwrap()
        .unwrap();
    // Monetary values survive storage without drift
    assert_eq!(stored.value.unwrap().to_string(), "0.10");
    assert_eq!(stored.currency, "USD");
    assert!(!stored.is_confirmed);
    assert_eq!(stored.custom_data, json!({"plan": "pro", "seats": 3}));
    let source_ref = stored.source_ref.unwrap();
    assert_eq!(source_ref.kind, "order");
    assert_eq!(source_ref.id, "ord-1001");
}

#[tokio::test]
async fn test_unrestricted_scope_accepts_any_event() {
    let pool = memory_pool().await;
    let config = AttributionConfig::default();
    let identity = identity_at(&pool, days_ago(1)).await;

    for event in ["signup", "trial_started", "custom_event_42"] {
        let outcome = record_conversion(
            &pool,
            &config,
            &ConversionScope::unrestricted(),
            Some(&identity),
            event,
            RecordConversion::default(),
        )
        .await
        .unwrap();
        assert!(outcome.recorded().is_some());
    }
    assert_eq!(count_conversions(&pool).await, 3);
}
