use async_trait::async_trait;
use hyper::header::CONTENT_TYPE;
use log::{debug, error, info, warn};
use mime::APPLICATION_JSON;
use reqwest_middleware::{
    reqwest::{Method, StatusCode, Url},
    ClientWithMiddleware,
};
use serde::Serialize;
use std::time::Duration as StdDuration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::sleep;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid scheduler url: {0}")]
    InvalidUrl(String),
    #[error("problem sending request to timer service: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("timer service rejected request with status {0}: {1}")]
    Rejected(StatusCode, String),
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Arranges for the draw callback of a competition to be called at or after `at`.
/// Delivery is at least once at best, the draw itself must tolerate repeats.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DrawScheduler: Send + Sync {
    async fn schedule_draw(
        &self,
        competition_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), SchedulerError>;
}

/// `{base}/api/v1/competitions/{id}/draw`
pub fn draw_callback_url(base_url: &Url, competition_id: Uuid) -> Result<Url, SchedulerError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| SchedulerError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend([
            "api",
            "v1",
            "competitions",
            &competition_id.to_string(),
            "draw",
        ]);
    Ok(url)
}

/// Body understood by the timer service
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledHttpRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub method: String,
    pub url: String,
}

pub struct RemoteScheduler {
    client: ClientWithMiddleware,
    timer_url: Url,
    callback_base_url: Url,
}

impl RemoteScheduler {
    pub fn new(
        client: ClientWithMiddleware,
        timer_url: &str,
        callback_base_url: &str,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            client,
            timer_url: Url::parse(timer_url)
                .map_err(|e| SchedulerError::InvalidUrl(format!("{}: {}", timer_url, e)))?,
            callback_base_url: Url::parse(callback_base_url).map_err(|e| {
                SchedulerError::InvalidUrl(format!("{}: {}", callback_base_url, e))
            })?,
        })
    }

    pub fn build_request(
        &self,
        competition_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<ScheduledHttpRequest, SchedulerError> {
        Ok(ScheduledHttpRequest {
            time: at,
            method: Method::POST.to_string(),
            url: draw_callback_url(&self.callback_base_url, competition_id)?.to_string(),
        })
    }
}

#[async_trait]
impl DrawScheduler for RemoteScheduler {
    async fn schedule_draw(
        &self,
        competition_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), SchedulerError> {
        let body = self.build_request(competition_id, at)?;
        debug!("scheduling draw: {:?}", body);

        let response = self
            .client
            .post(self.timer_url.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("error sending to timer service: {}", e);
                SchedulerError::SendRetry(e)
            })?;

        let status = response.status();
        if status.is_success() {
            info!("draw for {} scheduled at {}", competition_id, at);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SchedulerError::Rejected(status, body))
        }
    }
}

/// In-process timers for single node deployments. Pending draws are dropped on
/// shutdown; open competitions are rescheduled on the next start.
pub struct LocalScheduler {
    client: ClientWithMiddleware,
    callback_base_url: Url,
    tracker: TaskTracker,
    cancel_token: CancellationToken,
}

impl LocalScheduler {
    pub fn new(
        client: ClientWithMiddleware,
        callback_base_url: &str,
        tracker: TaskTracker,
        cancel_token: CancellationToken,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            client,
            callback_base_url: Url::parse(callback_base_url).map_err(|e| {
                SchedulerError::InvalidUrl(format!("{}: {}", callback_base_url, e))
            })?,
            tracker,
            cancel_token,
        })
    }
}

#[async_trait]
impl DrawScheduler for LocalScheduler {
    async fn schedule_draw(
        &self,
        competition_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), SchedulerError> {
        if self.cancel_token.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        let url = draw_callback_url(&self.callback_base_url, competition_id)?;
        let delay: StdDuration = (at - OffsetDateTime::now_utc())
            .try_into()
            .unwrap_or(StdDuration::ZERO);

        let client = self.client.clone();
        let cancel_token = self.cancel_token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancel_token.cancelled() => {
                    debug!("draw timer for {} cancelled", competition_id);
                    return;
                }
            }

            match client.post(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("draw callback for {} delivered", competition_id);
                }
                Ok(response) => {
                    warn!(
                        "draw callback {} answered with status {}",
                        url,
                        response.status()
                    );
                }
                Err(e) => error!("draw callback {} failed: {}", url, e),
            }
        });

        debug!("draw for {} scheduled locally in {:?}", competition_id, delay);
        Ok(())
    }
}
