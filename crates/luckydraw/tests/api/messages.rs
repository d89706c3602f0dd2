use luckydraw::CardContent;
use reqwest::StatusCode;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::helpers::{
    accepting_scheduler, detail_activity, join_activity, message_activity, recording_connector,
    spawn_app, MockChatConnectorClient, MockDrawSchedulerClient, Outbox, CHANNEL_ID,
    MAIN_ACTIVITY_ID,
};

#[tokio::test]
async fn test_create_command_announces_competition() {
    let before = OffsetDateTime::now_utc();
    let mut scheduler = MockDrawSchedulerClient::new();
    scheduler
        .expect_schedule_draw()
        .withf(move |_, at| *at >= before + Duration::minutes(10))
        .times(1)
        .returning(|_, _| Ok(()));
    let outbox = Outbox::default();
    let app = spawn_app(scheduler, recording_connector(&outbox)).await;

    let response = app
        .post_activity(&message_activity(
            "<at>Lucky Draw</at> Surface Pro, 2, 10min, https://img.example.com/surface.png",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let competition: Value = response.json().await.unwrap();
    assert_eq!(competition["gift"], "Surface Pro");
    assert_eq!(competition["winner_count"], 2);
    assert_eq!(
        competition["gift_image_url"],
        "https://img.example.com/surface.png"
    );
    assert_eq!(competition["offset_hours"], 8.0);
    assert_eq!(competition["main_activity_id"], MAIN_ACTIVITY_ID);
    assert_eq!(competition["is_completed"], false);
    assert_eq!(competition["creator"]["participant_id"], "aad-creator");
    assert_eq!(competition["origin"]["channel_id"], CHANNEL_ID);

    let planned =
        OffsetDateTime::parse(competition["planned_draw_time"].as_str().unwrap(), &Rfc3339)
            .unwrap();
    assert!(planned >= before + Duration::minutes(10));
    assert!(planned <= OffsetDateTime::now_utc() + Duration::minutes(10));

    let sent = outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, CHANNEL_ID);
    let card = sent[0].1.hero_card().unwrap();
    assert_eq!(card.title, "Surface Pro");
    assert_eq!(card.buttons.len(), 2);
}

#[tokio::test]
async fn test_fullwidth_commas_create_the_same_competition() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;

    let ascii: Value = app
        .post_activity(&message_activity("<at>Lucky Draw</at> prize, 3, 1h"))
        .await
        .json()
        .await
        .unwrap();
    let fullwidth: Value = app
        .post_activity(&message_activity("<at>Lucky Draw</at> prize\u{FF0C}3\u{FF0C}1h"))
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(ascii["gift"], fullwidth["gift"]);
    assert_eq!(ascii["winner_count"], fullwidth["winner_count"]);
    assert_ne!(ascii["id"], fullwidth["id"]);
}

#[tokio::test]
async fn test_unknown_text_gets_help_reply() {
    let mut scheduler = MockDrawSchedulerClient::new();
    scheduler.expect_schedule_draw().never();
    let outbox = Outbox::default();
    let app = spawn_app(scheduler, recording_connector(&outbox)).await;

    for text in [
        "hello there",
        "<at>Lucky Draw</at> hello",
        "<at>Lucky Draw</at> gift, two",
        "<at>Lucky Draw</at> gift, 2, next tuesday-ish",
    ] {
        let response = app.post_activity(&message_activity(text)).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", text);
    }

    let sent = outbox.sent();
    assert_eq!(sent.len(), 4);
    for (conversation_id, reply) in sent {
        assert!(conversation_id.starts_with(CHANNEL_ID));
        assert_eq!(reply.reply_to_id.as_deref(), Some("1557000000000"));
        assert!(reply.text.unwrap().contains("@Lucky Draw"));
    }
}

#[tokio::test]
async fn test_invalid_competition_gets_help_reply() {
    let mut scheduler = MockDrawSchedulerClient::new();
    scheduler.expect_schedule_draw().never();
    let outbox = Outbox::default();
    let app = spawn_app(scheduler, recording_connector(&outbox)).await;

    for text in [
        "<at>Lucky Draw</at> gift, 0",
        "<at>Lucky Draw</at> gift, -2",
        "<at>Lucky Draw</at> gift, 1, 2000-01-01 10:00",
    ] {
        let response = app.post_activity(&message_activity(text)).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", text);
    }

    let sent = outbox.sent();
    assert_eq!(sent.len(), 3);
    for (_, reply) in &sent {
        assert_eq!(reply.reply_to_id.as_deref(), Some("1557000000000"));
        assert!(reply.attachments.is_empty());
        assert!(reply.text.as_deref().unwrap().contains("@Lucky Draw"));
    }
    assert!(outbox.updated().is_empty());
}

#[tokio::test]
async fn test_help_reply_follows_sender_locale() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;

    let mut activity = message_activity("<at>Lucky Draw</at> hello");
    activity["locale"] = json!("zh-CN");
    app.post_activity(&activity).await;

    let sent = outbox.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.text.as_deref().unwrap().starts_with("发起抽奖"));
}

#[tokio::test]
async fn test_other_channels_are_ignored() {
    let mut connector = MockChatConnectorClient::new();
    connector.expect_send_activity().never();
    let app = spawn_app(accepting_scheduler(), connector).await;

    let mut activity = message_activity("<at>Lucky Draw</at> gift, 1");
    activity["channelId"] = json!("slack");
    let response = app.post_activity(&activity).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_join_updates_announcement() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let competition: Value = app
        .post_activity(&message_activity("<at>Lucky Draw</at> gift, 1"))
        .await
        .json()
        .await
        .unwrap();
    let id = competition["id"].as_str().unwrap();

    for _ in 0..2 {
        let response = app
            .post_activity(&join_activity(id, "aad-alice", "Alice"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let competition: Value = app.get_competition(id).await.json().await.unwrap();
    assert_eq!(
        competition["competitors"],
        json!([{"participant_id": "aad-alice", "display_name": "Alice"}])
    );

    let updated = outbox.updated();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[1].0, MAIN_ACTIVITY_ID);
    assert!(updated[1].1.hero_card().unwrap().text.contains("Alice"));
}

#[tokio::test]
async fn test_view_detail_returns_task_module() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let competition: Value = app
        .post_activity(&message_activity("<at>Lucky Draw</at> gift, 1"))
        .await
        .json()
        .await
        .unwrap();
    let id = competition["id"].as_str().unwrap();
    app.post_activity(&join_activity(id, "aad-bob", "Bob")).await;

    let response = app.post_activity(&detail_activity(id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let task: Value = response.json().await.unwrap();
    assert_eq!(task["task"]["type"], "continue");
    assert_eq!(task["task"]["value"]["title"], "gift");
    let body = task["task"]["value"]["card"]["content"]["body"]
        .as_array()
        .unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[1]["text"], "1. Bob");
}

#[tokio::test]
async fn test_invoke_errors() {
    let app = spawn_app(accepting_scheduler(), MockChatConnectorClient::new()).await;

    let response = app
        .post_activity(&join_activity(
            &uuid::Uuid::now_v7().to_string(),
            "aad-alice",
            "Alice",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut unknown = join_activity(&uuid::Uuid::now_v7().to_string(), "aad-alice", "Alice");
    unknown["value"]["userAction"] = json!("Cheat");
    let response = app.post_activity(&unknown).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "unrecognized action: Cheat");
}

#[tokio::test]
async fn test_task_module_card_is_adaptive() {
    let outbox = Outbox::default();
    let app = spawn_app(accepting_scheduler(), recording_connector(&outbox)).await;
    let competition: Value = app
        .post_activity(&message_activity("<at>Lucky Draw</at> gift, 1"))
        .await
        .json()
        .await
        .unwrap();

    let (_, card) = &outbox.sent()[0];
    assert!(matches!(
        card.attachments[0].content,
        CardContent::Hero(_)
    ));

    let task: Value = app
        .post_activity(&detail_activity(competition["id"].as_str().unwrap()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(
        task["task"]["value"]["card"]["contentType"],
        "application/vnd.microsoft.card.adaptive"
    );
}
