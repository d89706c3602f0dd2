use crate::{
    api::{
        cards::CardBuilder,
        routes::{draw_competition, get_competition, health, receive_activity},
    },
    config::{CompetitionSettings, SchedulerMode, Settings},
    domain::{CompetitionService, CompetitionStore},
    infra::{
        connector::{BotConnectorClient, ChatConnector, NoopConnector},
        db::DBConnection,
        file_utils::create_folder,
        scheduler::{DrawScheduler, LocalScheduler, RemoteScheduler},
    },
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::{net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    select,
    signal::unix::{signal, SignalKind},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
    competitions: Arc<CompetitionService>,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config.clone()).await?;
        let competitions = app_state.competitions.clone();
        let server = build_server(listener, app_state, config.api_settings.origins).await?;

        // Timers from the last run died with the process. The listener is already
        // bound, so callbacks that are due right away queue up until serving starts.
        if config.scheduler_settings.mode == SchedulerMode::Local {
            competitions.reschedule_open().await?;
        }

        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
            competitions,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();
                self.background_tasks.close();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                self.competitions.close().await;
                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();
                self.background_tasks.close();

                let _ =
                    tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                        .await;
                self.competitions.close().await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub competitions: Arc<CompetitionService>,
    pub connector: Arc<dyn ChatConnector>,
    pub cards: Arc<CardBuilder>,
    pub competition_settings: CompetitionSettings,
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    let tracker = TaskTracker::new();
    let cancel_token = CancellationToken::new();

    create_folder(&config.db_settings.data_folder)?;
    let db_connection = DBConnection::new(&config.db_settings, "competitions").await?;
    info!(
        "Competitions database ready at {}",
        db_connection.database_path
    );
    let store = CompetitionStore::new(
        db_connection,
        config.competition_settings.max_mutate_attempts,
    );

    let scheduler_client = build_reqwest_client(Duration::from_secs(30))?;
    let scheduler_settings = &config.scheduler_settings;
    let scheduler: Arc<dyn DrawScheduler> = match scheduler_settings.mode {
        SchedulerMode::Local => {
            info!(
                "Local draw scheduler configured, callbacks to {}",
                scheduler_settings.callback_base_url
            );
            Arc::new(LocalScheduler::new(
                scheduler_client,
                &scheduler_settings.callback_base_url,
                tracker.clone(),
                cancel_token.clone(),
            )?)
        }
        SchedulerMode::Remote => {
            info!(
                "Remote draw scheduler configured at {}",
                scheduler_settings.timer_url
            );
            Arc::new(RemoteScheduler::new(
                scheduler_client,
                &scheduler_settings.timer_url,
                &scheduler_settings.callback_base_url,
            )?)
        }
    };

    let connector_settings = &config.connector_settings;
    let connector: Arc<dyn ChatConnector> = if connector_settings.enabled {
        info!("Bot connector client configured");
        Arc::new(BotConnectorClient::new(
            build_reqwest_client(Duration::from_secs(connector_settings.timeout_secs))?,
            connector_settings.bearer_token.clone(),
        ))
    } else {
        warn!("Bot connector disabled, cards will only be logged");
        Arc::new(NoopConnector)
    };

    let competitions = CompetitionService::new(
        store,
        scheduler,
        config.competition_settings.past_tolerance(),
    );

    let app_state = AppState {
        competitions: Arc::new(competitions),
        connector,
        cards: Arc::new(CardBuilder::new(config.bot_settings)),
        competition_settings: config.competition_settings,
    };
    Ok((app_state, tracker, cancel_token))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    Router::new()
        .route("/api/messages", post(receive_activity))
        .route("/api/v1/health_check", get(health))
        .route("/api/v1/competitions/{competition_id}", get(get_competition))
        .route(
            "/api/v1/competitions/{competition_id}/draw",
            post(draw_competition),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

pub fn build_reqwest_client(timeout: Duration) -> Result<ClientWithMiddleware, reqwest::Error> {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    let client = Client::builder().timeout(timeout).build()?;
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build())
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
