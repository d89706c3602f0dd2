use async_trait::async_trait;
use luckydraw::{
    app, AppState, BotSettings, CardBuilder, ChatConnector, CompetitionService,
    CompetitionSettings, CompetitionStore, ConnectorError, DBConnection, DBSettings,
    DrawScheduler, OutgoingActivity, SchedulerError, SqliteSettings,
};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use tokio::net::TcpListener;
use uuid::Uuid;

mock! {
    pub DrawSchedulerClient {}

    #[async_trait]
    impl DrawScheduler for DrawSchedulerClient {
        async fn schedule_draw(
            &self,
            competition_id: Uuid,
            at: OffsetDateTime,
        ) -> Result<(), SchedulerError>;
    }
}

mock! {
    pub ChatConnectorClient {}

    #[async_trait]
    impl ChatConnector for ChatConnectorClient {
        async fn send_activity(
            &self,
            service_url: &str,
            conversation_id: &str,
            activity: &OutgoingActivity,
        ) -> Result<String, ConnectorError>;

        async fn update_activity(
            &self,
            service_url: &str,
            conversation_id: &str,
            activity_id: &str,
            activity: &OutgoingActivity,
        ) -> Result<(), ConnectorError>;
    }
}

pub const SERVICE_URL: &str = "https://smba.example.net/amer/";
pub const CHANNEL_ID: &str = "19:channel@thread.skype";
pub const MAIN_ACTIVITY_ID: &str = "1557000000001";

/// Cards handed to the connector, in call order
#[derive(Clone, Default)]
pub struct Outbox {
    pub sent: Arc<Mutex<Vec<(String, OutgoingActivity)>>>,
    pub updated: Arc<Mutex<Vec<(String, OutgoingActivity)>>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<(String, OutgoingActivity)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(String, OutgoingActivity)> {
        self.updated.lock().unwrap().clone()
    }
}

/// Connector that accepts everything and records it; new activities get `MAIN_ACTIVITY_ID`
pub fn recording_connector(outbox: &Outbox) -> MockChatConnectorClient {
    let mut connector = MockChatConnectorClient::new();
    let sent = outbox.sent.clone();
    connector
        .expect_send_activity()
        .returning(move |_, conversation_id, activity| {
            sent.lock()
                .unwrap()
                .push((conversation_id.to_string(), activity.clone()));
            Ok(MAIN_ACTIVITY_ID.to_string())
        });
    let updated = outbox.updated.clone();
    connector
        .expect_update_activity()
        .returning(move |_, _, activity_id, activity| {
            updated
                .lock()
                .unwrap()
                .push((activity_id.to_string(), activity.clone()));
            Ok(())
        });
    connector
}

pub fn accepting_scheduler() -> MockDrawSchedulerClient {
    let mut scheduler = MockDrawSchedulerClient::new();
    scheduler.expect_schedule_draw().returning(|_, _| Ok(()));
    scheduler
}

#[derive(Clone)]
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn post_activity(&self, activity: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/messages", self.address))
            .json(activity)
            .send()
            .await
            .expect("failed to post activity")
    }

    pub async fn trigger_draw(&self, competition_id: &str) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/api/v1/competitions/{}/draw",
                self.address, competition_id
            ))
            .send()
            .await
            .expect("failed to trigger draw")
    }

    pub async fn get_competition(&self, competition_id: &str) -> reqwest::Response {
        self.client
            .get(format!(
                "{}/api/v1/competitions/{}",
                self.address, competition_id
            ))
            .send()
            .await
            .expect("failed to get competition")
    }
}

pub async fn spawn_app(
    scheduler: MockDrawSchedulerClient,
    connector: MockChatConnectorClient,
) -> TestApp {
    let db_settings = DBSettings {
        sqlite: SqliteSettings::in_memory(),
        ..DBSettings::default()
    };
    let db_connection = DBConnection::new(&db_settings, &format!("test_{}", Uuid::now_v7()))
        .await
        .expect("failed to open test database");

    // Concurrent join tests contend hard on one row
    let competition_settings = CompetitionSettings {
        max_mutate_attempts: 50,
        ..CompetitionSettings::default()
    };
    let competitions = CompetitionService::new(
        CompetitionStore::new(db_connection, competition_settings.max_mutate_attempts),
        Arc::new(scheduler),
        Duration::minutes(1),
    );
    let app_state = AppState {
        competitions: Arc::new(competitions),
        connector: Arc::new(connector),
        cards: Arc::new(CardBuilder::new(BotSettings::default())),
        competition_settings,
    };

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let port = listener.local_addr().unwrap().port();
    let router = app(app_state, vec![]);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

pub fn message_activity(text: &str) -> Value {
    json!({
        "type": "message",
        "id": "1557000000000",
        "channelId": "msteams",
        "serviceUrl": SERVICE_URL,
        "text": text,
        "locale": "en-US",
        "localTimestamp": "2019-05-01T18:00:00.000+08:00",
        "from": {"id": "29:creator", "name": "Creator", "aadObjectId": "aad-creator"},
        "conversation": {"id": format!("{};messageid=1557000000000", CHANNEL_ID)},
        "channelData": {
            "tenant": {"id": "tenant-id"},
            "team": {"id": "team-id"},
            "channel": {"id": CHANNEL_ID}
        }
    })
}

pub fn join_activity(competition_id: &str, participant_id: &str, name: &str) -> Value {
    json!({
        "type": "invoke",
        "channelId": "msteams",
        "serviceUrl": SERVICE_URL,
        "from": {"id": format!("29:{}", participant_id), "name": name, "aadObjectId": participant_id},
        "conversation": {"id": CHANNEL_ID},
        "value": {"userAction": "Join", "competitionId": competition_id}
    })
}

pub fn detail_activity(competition_id: &str) -> Value {
    json!({
        "type": "invoke",
        "name": "task/fetch",
        "channelId": "msteams",
        "serviceUrl": SERVICE_URL,
        "from": {"id": "29:viewer", "name": "Viewer"},
        "conversation": {"id": CHANNEL_ID},
        "value": {"data": {"type": "task/fetch", "userAction": "ViewDetail", "competitionId": competition_id}}
    })
}
