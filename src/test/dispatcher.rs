use chrono::Utc;
use std::sync::Arc;

use crate::models::NotificationKind;
use crate::notifications::dispatcher::dispatch;
use crate::notifications::scanner::scan;
use crate::notifications::sender::{DeliveryOutcome, PushSender};
use crate::test::utils::{FakeSender, TestDbBuilder, engine_with_sender};

#[tokio::test]
async fn candidate_without_tokens_still_gets_history_record() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .course("Physics I", "ana@uni.edu")
        .element("Physics I", "Past due", Some(-1), false)
        .build()
        .await
        .expect("Failed to build test db");

    let now = Utc::now();
    let result = scan(&db.pool, now).await.expect("Scan failed");
    let sender = FakeSender::new();
    let dyn_sender: Arc<dyn PushSender> = sender.clone();

    let outcome = dispatch(
        &db.pool,
        &dyn_sender,
        &result.overdue[0],
        NotificationKind::Overdue,
        now,
    )
    .await
    .expect("Dispatch failed");

    assert!(outcome.history_written);
    assert_eq!(outcome.delivered, 0);
    assert!(sender.sent().is_empty());

    let history = db.history_rows().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].2, "overdue");
}

#[tokio::test]
async fn invalid_token_is_removed_and_sibling_survives() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .course("Physics I", "ana@uni.edu")
        .element("Physics I", "Past due", Some(-1), false)
        .device("ana@uni.edu", "token-good")
        .device("ana@uni.edu", "token-stale")
        .build()
        .await
        .expect("Failed to build test db");

    let sender = FakeSender::new();
    sender.set_outcome("token-stale", DeliveryOutcome::InvalidToken);
    let dyn_sender: Arc<dyn PushSender> = sender.clone();

    let now = Utc::now();
    let result = scan(&db.pool, now).await.expect("Scan failed");
    let outcome = dispatch(
        &db.pool,
        &dyn_sender,
        &result.overdue[0],
        NotificationKind::Overdue,
        now,
    )
    .await
    .expect("Dispatch failed");

    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.invalid_tokens, 1);
    assert!(outcome.history_written);

    let remaining = db.device_tokens("ana@uni.edu").await;
    assert_eq!(remaining, vec!["token-good".to_string()]);

    // One record for the candidate, not one per token.
    assert_eq!(db.history_rows().await.len(), 1);
}

#[tokio::test]
async fn transient_failure_keeps_token_registered() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .course("Physics I", "ana@uni.edu")
        .element("Physics I", "Past due", Some(-1), false)
        .device("ana@uni.edu", "token-flaky")
        .build()
        .await
        .expect("Failed to build test db");

    let sender = FakeSender::new();
    sender.set_outcome("token-flaky", DeliveryOutcome::TransientFailure);
    let dyn_sender: Arc<dyn PushSender> = sender.clone();

    let now = Utc::now();
    let result = scan(&db.pool, now).await.expect("Scan failed");
    let outcome = dispatch(
        &db.pool,
        &dyn_sender,
        &result.overdue[0],
        NotificationKind::Overdue,
        now,
    )
    .await
    .expect("Dispatch failed");

    assert_eq!(outcome.transient_failures, 1);
    assert!(outcome.history_written);
    assert_eq!(db.device_tokens("ana@uni.edu").await.len(), 1);
}

#[tokio::test]
async fn history_write_failure_does_not_fail_dispatch() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .course("Physics I", "ana@uni.edu")
        .element("Physics I", "Past due", Some(-1), false)
        .device("ana@uni.edu", "token-good")
        .build()
        .await
        .expect("Failed to build test db");

    let now = Utc::now();
    let result = scan(&db.pool, now).await.expect("Scan failed");

    sqlx::query("DROP TABLE notification_history")
        .execute(&db.pool)
        .await
        .expect("Failed to drop table");

    let sender = FakeSender::new();
    let dyn_sender: Arc<dyn PushSender> = sender.clone();
    let outcome = dispatch(
        &db.pool,
        &dyn_sender,
        &result.overdue[0],
        NotificationKind::Overdue,
        now,
    )
    .await
    .expect("Dispatch failed");

    assert_eq!(outcome.delivered, 1);
    assert!(!outcome.history_written);
}

#[tokio::test]
async fn cycle_dispatches_both_kinds_and_rescan_excludes_them() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .course("Physics I", "ana@uni.edu")
        .element("Physics I", "Past due", Some(-1), false)
        .element("Physics I", "Due soon", Some(3), false)
        .device("ana@uni.edu", "token-good")
        .build()
        .await
        .expect("Failed to build test db");

    let sender = FakeSender::new();
    let engine = engine_with_sender(&db, sender.clone());

    let now = Utc::now();
    let summary = engine.run_cycle_inner(now).await.expect("Cycle failed");

    assert_eq!(summary.overdue, 1);
    assert_eq!(summary.due_soon, 1);
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.history_failures, 0);

    let history = db.history_rows().await;
    assert_eq!(history.len(), 2);
    let kinds: Vec<&str> = history.iter().map(|row| row.2.as_str()).collect();
    assert!(kinds.contains(&"overdue"));
    assert!(kinds.contains(&"due_soon"));

    // Same-day rescan finds nothing left to send.
    let rescan = scan(&db.pool, now).await.expect("Scan failed");
    assert!(rescan.overdue.is_empty());
    assert!(rescan.due_soon.is_empty());

    let repeat = engine.run_cycle_inner(now).await.expect("Cycle failed");
    assert_eq!(repeat.overdue, 0);
    assert_eq!(repeat.due_soon, 0);
    assert_eq!(db.history_rows().await.len(), 2);
}

#[tokio::test]
async fn notification_body_names_element_and_course() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .course("Physics I", "ana@uni.edu")
        .element("Physics I", "Kinematics report", Some(-1), false)
        .device("ana@uni.edu", "token-good")
        .build()
        .await
        .expect("Failed to build test db");

    let sender = FakeSender::new();
    let engine = engine_with_sender(&db, sender.clone());
    engine
        .run_cycle_inner(Utc::now())
        .await
        .expect("Cycle failed");

    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.body.contains("Kinematics report"));
    assert!(sent[0].1.body.contains("Physics I"));
}

#[tokio::test]
async fn candidates_of_different_teachers_notify_their_own_devices() {
    let db = TestDbBuilder::new()
        .teacher("ana@uni.edu", "Ana")
        .teacher("luis@uni.edu", "Luis")
        .course("Physics I", "ana@uni.edu")
        .course("Chemistry I", "luis@uni.edu")
        .element("Physics I", "Past due physics", Some(-1), false)
        .element("Chemistry I", "Past due chemistry", Some(-2), false)
        .device("ana@uni.edu", "token-ana")
        .device("luis@uni.edu", "token-luis")
        .build()
        .await
        .expect("Failed to build test db");

    let sender = FakeSender::new();
    let engine = engine_with_sender(&db, sender.clone());
    engine
        .run_cycle_inner(Utc::now())
        .await
        .expect("Cycle failed");

    let mut tokens: Vec<String> = sender.sent().into_iter().map(|(token, _)| token).collect();
    tokens.sort();
    assert_eq!(tokens, vec!["token-ana".to_string(), "token-luis".to_string()]);

    let history = db.history_rows().await;
    assert_eq!(history.len(), 2);
    assert!(
        history
            .iter()
            .any(|row| row.0 == db.user_id("ana@uni.edu")
                && row.1 == db.element_id("Past due physics"))
    );
    assert!(
        history
            .iter()
            .any(|row| row.0 == db.user_id("luis@uni.edu")
                && row.1 == db.element_id("Past due chemistry"))
    );
}
