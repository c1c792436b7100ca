//! End-to-end lifecycle scenarios over the in-memory store.

use chrono::Duration;
use kerbside_billing::domain::types::{Amount, BlockDuration, HandlerId};
use kerbside_billing::domain::RateConfig;
use kerbside_billing::reports::Reporting;
use kerbside_billing::service::SessionLifecycle;
use kerbside_billing::storage::{
    MemoryRateRepository, MemorySessionRepository, RateRepository,
};
use kerbside_billing::BillingError;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct TestContext {
    lifecycle: Arc<SessionLifecycle>,
    reporting: Reporting,
    sessions: Arc<MemorySessionRepository>,
    handler: HandlerId,
}

impl TestContext {
    async fn new() -> Self {
        let sessions = Arc::new(MemorySessionRepository::new());
        let rates = Arc::new(MemoryRateRepository::new());
        let handler = HandlerId::new("gate_a");

        let rate = RateConfig::new(
            "standard",
            Amount::from_decimal(dec!(20)),
            BlockDuration::from_hours(2).expect("nonzero"),
            Amount::from_decimal(dec!(10)),
            BlockDuration::from_hours(1).expect("nonzero"),
        )
        .expect("valid rate");
        rates.create_rate(&rate).await.expect("create rate");
        rates
            .assign_handler(&handler, &rate.id)
            .await
            .expect("assign rate");

        Self {
            lifecycle: Arc::new(SessionLifecycle::new(sessions.clone(), rates.clone())),
            reporting: Reporting::new(sessions.clone(), rates),
            sessions,
            handler,
        }
    }
}

#[tokio::test]
async fn test_preview_matches_tier_table() {
    let context = TestContext::new().await;
    let session = context
        .lifecycle
        .open_session("KA01AB1234", &context.handler, "cash")
        .await
        .expect("check-in should succeed");

    let cases = [
        (Duration::zero(), dec!(20), 0),
        (Duration::minutes(119), dec!(20), 0),
        (Duration::hours(2), dec!(20), 0),
        (Duration::minutes(121), dec!(30), 1),
        (Duration::hours(4), dec!(40), 2),
    ];

    for (elapsed, expected_total, expected_units) in cases {
        let breakdown = context
            .lifecycle
            .preview_charge(
                "KA01AB1234",
                &context.handler,
                session.checkin_time + elapsed,
            )
            .await
            .expect("preview should succeed");

        assert_eq!(
            breakdown.total_charge.as_decimal(),
            expected_total,
            "total after {elapsed}"
        );
        assert_eq!(breakdown.extra_units, expected_units, "units after {elapsed}");
        assert_eq!(
            breakdown.initial_payment.add(breakdown.additional_charge),
            breakdown.total_charge,
            "split must sum to total"
        );
    }

    // Previewing commits nothing: the session is still active and can be
    // closed normally afterwards.
    assert_eq!(context.sessions.completed_count().await, 0);
    context
        .lifecycle
        .close_session("KA01AB1234", &context.handler, None)
        .await
        .expect("checkout should succeed after previews");
}

#[tokio::test]
async fn test_full_visit_lifecycle() {
    let context = TestContext::new().await;

    let session = context
        .lifecycle
        .open_session("ka01 ab 1234", &context.handler, "Cash")
        .await
        .expect("check-in should succeed");
    assert_eq!(session.vehicle_number.as_str(), "KA01 AB 1234");

    let (closed, breakdown) = context
        .lifecycle
        .close_session("KA01 AB 1234", &context.handler, Some("card"))
        .await
        .expect("checkout should succeed");

    // An immediate checkout still owes the full initial block
    assert_eq!(breakdown.total_charge.as_decimal(), dec!(20));
    assert_eq!(breakdown.additional_charge.as_decimal(), dec!(0));
    let charge = closed.charge.expect("charge recorded");
    assert_eq!(charge.total_charge.as_decimal(), dec!(20));
    assert_eq!(charge.additional_payment_mode, None);
    assert!(closed.checkout_time.is_some());

    // The move to completed storage frees the key for the next visit
    assert_eq!(context.sessions.completed_count().await, 1);
    context
        .lifecycle
        .open_session("KA01 AB 1234", &context.handler, "cash")
        .await
        .expect("second visit should check in");
}

#[tokio::test]
async fn test_double_checkin_is_recoverable_rejection() {
    let context = TestContext::new().await;
    context
        .lifecycle
        .open_session("KA01AB1234", &context.handler, "cash")
        .await
        .expect("first check-in should succeed");

    let error = context
        .lifecycle
        .open_session("KA01AB1234", &context.handler, "upi")
        .await
        .expect_err("second check-in must be rejected");

    assert!(matches!(error, BillingError::DuplicateActiveSession { .. }));
    assert!(error.is_recoverable(), "attendant should be re-prompted");

    // The rejection must not have created a second record
    assert_eq!(
        context
            .lifecycle
            .active_sessions(Some(&context.handler))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_checkout_without_session_leaves_stores_untouched() {
    let context = TestContext::new().await;

    let error = context
        .lifecycle
        .close_session("KA01AB1234", &context.handler, None)
        .await
        .expect_err("checkout without check-in must fail");

    assert!(matches!(error, BillingError::NoActiveSession { .. }));
    assert!(error.is_recoverable());
    assert_eq!(context.sessions.completed_count().await, 0);
    assert!(context
        .lifecycle
        .active_sessions(None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_concurrent_checkins_for_distinct_vehicles_all_succeed() {
    let context = TestContext::new().await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let lifecycle = context.lifecycle.clone();
        let handler = context.handler.clone();
        handles.push(tokio::spawn(async move {
            lifecycle
                .open_session(&format!("KA01AB{i:04}"), &handler, "cash")
                .await
        }));
    }

    for handle in handles {
        handle
            .await
            .expect("task completes")
            .expect("distinct vehicles never contend");
    }

    assert_eq!(
        context
            .lifecycle
            .active_sessions(Some(&context.handler))
            .await
            .unwrap()
            .len(),
        10
    );
}

#[tokio::test]
async fn test_daily_summary_reflects_the_days_traffic() {
    let context = TestContext::new().await;

    let first = context
        .lifecycle
        .open_session("KA01AB1234", &context.handler, "cash")
        .await
        .expect("check-in");
    context
        .lifecycle
        .open_session("KA01CD5678", &context.handler, "upi")
        .await
        .expect("check-in");
    context
        .lifecycle
        .close_session("KA01AB1234", &context.handler, None)
        .await
        .expect("checkout");

    let date = first.checkin_time.date_naive();
    let summary = context
        .reporting
        .daily_financial_summary(&context.handler, date)
        .await
        .expect("summary");

    assert_eq!(summary.checkins.total_count, 2);
    assert_eq!(summary.checkins.total_amount.as_decimal(), dec!(40));
    assert_eq!(summary.checkouts.total_count, 1);
    assert_eq!(summary.checkouts.total_initial.as_decimal(), dec!(20));
    assert_eq!(summary.checkouts.total_additional.as_decimal(), dec!(0));

    // Initial payments count once, on the check-in day
    assert_eq!(summary.collected_total().as_decimal(), dec!(40));
}
