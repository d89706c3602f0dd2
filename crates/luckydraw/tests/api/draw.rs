use luckydraw::ConnectorError;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::helpers::{
    accepting_scheduler, join_activity, message_activity, recording_connector, spawn_app,
    MockChatConnectorClient, Outbox, TestApp, CHANNEL_ID, MAIN_ACTIVITY_ID,
};

async fn create_competition(app: &TestApp, text: &str) -> String {
    let competition: Value = app
        .post_activity(&message_activity(text))
        .await
        .json()
        .await
        .unwrap();
    competition["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_draw_announces_winners_once() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let id = create_competition(&app, "<at>Lucky Draw</at> gift, 2, 10min").await;
    for (participant, name) in [("aad-alice", "Alice"), ("aad-bob", "Bob")] {
        app.post_activity(&join_activity(&id, participant, name)).await;
    }

    let response = app.trigger_draw(&id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first: Value = response.json().await.unwrap();
    assert_eq!(first["is_completed"], true);
    let mut winners: Vec<String> = first["winner_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_str().unwrap().to_string())
        .collect();
    winners.sort();
    assert_eq!(winners, vec!["aad-alice", "aad-bob"]);

    // announcement + result
    let sent = outbox.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].0, CHANNEL_ID);
    let result = sent[1].1.hero_card().unwrap();
    assert!(result.title.starts_with("Our winners are: "));
    assert!(result.title.contains("Alice"));
    assert!(result.title.contains("Bob"));

    let last_update = outbox.updated().pop().unwrap();
    assert_eq!(last_update.0, MAIN_ACTIVITY_ID);
    assert!(last_update.1.hero_card().unwrap().buttons.is_empty());

    let second: Value = app.trigger_draw(&id).await.json().await.unwrap();
    assert_eq!(second["winner_ids"], first["winner_ids"]);
    assert_eq!(second["drawn_at"], first["drawn_at"]);
    assert_eq!(outbox.sent().len(), 2);
}

#[tokio::test]
async fn test_failed_result_post_is_retried_by_next_trigger() {
    let sends = Arc::new(AtomicUsize::new(0));
    let mut connector = MockChatConnectorClient::new();
    {
        let sends = sends.clone();
        connector
            .expect_send_activity()
            .returning(move |_, _, _| match sends.fetch_add(1, Ordering::SeqCst) {
                // the result post on the first trigger
                1 => Err(ConnectorError::MissingActivityId(String::new())),
                n => Ok(format!("activity-{}", n)),
            });
    }
    connector.expect_update_activity().returning(|_, _, _, _| Ok(()));
    let app = spawn_app(accepting_scheduler(), connector).await;
    let id = create_competition(&app, "<at>Lucky Draw</at> gift, 1").await;
    app.post_activity(&join_activity(&id, "aad-alice", "Alice"))
        .await;

    let failed = app.trigger_draw(&id).await;
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let stored: Value = app.get_competition(&id).await.json().await.unwrap();
    assert_eq!(stored["is_completed"], true);
    assert!(stored["result_activity_id"].is_null());

    let retried: Value = app.trigger_draw(&id).await.json().await.unwrap();
    assert_eq!(retried["winner_ids"], stored["winner_ids"]);
    assert_eq!(retried["result_activity_id"], "activity-2");
    assert_eq!(sends.load(Ordering::SeqCst), 3);

    let again = app.trigger_draw(&id).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(sends.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_draw_without_competitors() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let id = create_competition(&app, "<at>Lucky Draw</at> gift, 3").await;

    let drawn: Value = app.trigger_draw(&id).await.json().await.unwrap();

    assert_eq!(drawn["is_completed"], true);
    assert_eq!(drawn["winner_ids"].as_array().unwrap().len(), 0);
    let sent = outbox.sent();
    assert_eq!(
        sent[1].1.hero_card().unwrap().title,
        "No one joined, no winner"
    );
}

#[tokio::test]
async fn test_join_after_draw_changes_nothing() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let id = create_competition(&app, "<at>Lucky Draw</at> gift, 1").await;
    app.post_activity(&join_activity(&id, "aad-alice", "Alice")).await;
    let drawn: Value = app.trigger_draw(&id).await.json().await.unwrap();

    let response = app
        .post_activity(&join_activity(&id, "aad-carol", "Carol"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let competition: Value = app.get_competition(&id).await.json().await.unwrap();
    assert_eq!(competition["competitors"], drawn["competitors"]);
    assert_eq!(competition["winner_ids"], drawn["winner_ids"]);
}

#[tokio::test]
async fn test_concurrent_joins_all_land() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let id = create_competition(&app, "<at>Lucky Draw</at> gift, 3").await;

    let mut handles = vec![];
    for i in 0..10 {
        let app = app.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            app.post_activity(&join_activity(
                &id,
                &format!("aad-{}", i),
                &format!("Member {}", i),
            ))
            .await
            .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let competition: Value = app.get_competition(&id).await.json().await.unwrap();
    assert_eq!(competition["competitors"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_unknown_competition_is_not_found() {
    let app = spawn_app(accepting_scheduler(), MockChatConnectorClient::new()).await;
    let id = uuid::Uuid::now_v7().to_string();

    assert_eq!(app.trigger_draw(&id).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.get_competition(&id).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get_competition("not-a-uuid").await.status(),
        StatusCode::BAD_REQUEST
    );
}
